//! Host statistics collector.
//!
//! Reads CPU, memory, swap, root disk and network counters through `sysinfo`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sysinfo::{Disks, Networks, System};

use crate::collector::{CollectionError, Collector};
use crate::record::{MetricRecord, MonotonicClock, RecordType};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

fn default_mount_point() -> String {
    "/".to_string()
}

/// Configuration for the host statistics collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmStatsConfig {
    /// Unique name for this collector instance.
    pub name: String,
    /// Partition key for produced records (default: the host name).
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Mount point whose usage is reported (default: "/").
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
}

impl VmStatsConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: None,
            mount_point: default_mount_point(),
        }
    }

    /// Set the partition key.
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Set the mount point to report.
    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }
}

/// Host statistics collector.
pub struct VmStatsCollector {
    config: VmStatsConfig,
    partition_key: String,
    system: System,
    primed: bool,
    clock: MonotonicClock,
}

impl VmStatsCollector {
    pub fn new(config: VmStatsConfig) -> Self {
        let partition_key = config
            .partition_key
            .clone()
            .or_else(System::host_name)
            .unwrap_or_else(|| config.name.clone());

        Self {
            config,
            partition_key,
            system: System::new(),
            primed: false,
            clock: MonotonicClock::new(),
        }
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// CPU usage is a delta between two refreshes; the very first sample
    /// needs a second refresh after the minimum update interval.
    async fn refresh_cpu(&mut self) {
        self.system.refresh_cpu_all();
        if !self.primed {
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
            self.system.refresh_cpu_usage();
            self.primed = true;
        }
    }

    fn cpu_section(&self) -> Result<serde_json::Value, CollectionError> {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(CollectionError::Unavailable(
                "no CPU information available".to_string(),
            ));
        }

        let per_core: Vec<f64> = cpus.iter().map(|c| round2(c.cpu_usage() as f64)).collect();
        Ok(json!({
            "usage_percent": round2(self.system.global_cpu_usage() as f64),
            "count": cpus.len(),
            "frequency_mhz": cpus[0].frequency(),
            "per_core": per_core,
        }))
    }

    fn memory_section(&self) -> serde_json::Value {
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();

        json!({
            "total_gb": gb(total),
            "available_gb": gb(self.system.available_memory()),
            "used_gb": gb(used),
            "usage_percent": percent(used, total),
            "swap_total_gb": gb(swap_total),
            "swap_used_gb": gb(swap_used),
            "swap_percent": percent(swap_used, swap_total),
        })
    }

    fn disk_section(&self) -> serde_json::Value {
        let disks = Disks::new_with_refreshed_list();
        let wanted = Path::new(&self.config.mount_point);
        let Some(disk) = disks.list().iter().find(|d| d.mount_point() == wanted) else {
            tracing::debug!(
                name = %self.config.name,
                mount_point = %self.config.mount_point,
                "Mount point not found, reporting empty disk section"
            );
            return json!({ "mount_point": self.config.mount_point });
        };

        let total = disk.total_space();
        let free = disk.available_space();
        let used = total.saturating_sub(free);
        json!({
            "mount_point": self.config.mount_point,
            "total_gb": gb(total),
            "used_gb": gb(used),
            "free_gb": gb(free),
            "usage_percent": percent(used, total),
        })
    }

    fn network_section(&self) -> serde_json::Value {
        let networks = Networks::new_with_refreshed_list();
        let (mut sent, mut recv, mut pkt_sent, mut pkt_recv, mut err_in, mut err_out) =
            (0u64, 0u64, 0u64, 0u64, 0u64, 0u64);
        for data in networks.list().values() {
            sent += data.total_transmitted();
            recv += data.total_received();
            pkt_sent += data.total_packets_transmitted();
            pkt_recv += data.total_packets_received();
            err_in += data.total_errors_on_received();
            err_out += data.total_errors_on_transmitted();
        }

        let drops = network_drops();
        json!({
            "bytes_sent": sent,
            "bytes_recv": recv,
            "packets_sent": pkt_sent,
            "packets_recv": pkt_recv,
            "errors_in": err_in,
            "errors_out": err_out,
            "drops_in": drops.map(|(dropped_in, _)| dropped_in),
            "drops_out": drops.map(|(_, dropped_out)| dropped_out),
        })
    }

    fn system_info(ip_address: Option<String>) -> serde_json::Value {
        json!({
            "platform": System::name(),
            "platform_version": System::os_version(),
            "kernel_version": System::kernel_version(),
            "architecture": std::env::consts::ARCH,
            "hostname": System::host_name(),
            "ip_address": ip_address,
            "boot_time": System::boot_time(),
            "uptime_hours": round2(System::uptime() as f64 / 3600.0),
        })
    }
}

impl std::fmt::Debug for VmStatsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmStatsCollector")
            .field("config", &self.config)
            .field("partition_key", &self.partition_key)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for VmStatsCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn record_type(&self) -> RecordType {
        RecordType::VmStats
    }

    async fn collect(&mut self) -> Result<MetricRecord, CollectionError> {
        self.refresh_cpu().await;
        self.system.refresh_memory();

        let cpu = self.cpu_section()?;
        let ip_address = host_ip_address().await;
        let timestamp = self.clock.now_ms();
        let record = MetricRecord::new(&self.partition_key, RecordType::VmStats, timestamp)
            .with_field("source", json!(System::host_name()))
            .with_field("system_info", Self::system_info(ip_address))
            .with_field("cpu", cpu)
            .with_field("memory", self.memory_section())
            .with_field("disk", self.disk_section())
            .with_field("network", self.network_section());

        Ok(record)
    }
}

/// First IPv4 address the host name resolves to.
async fn host_ip_address() -> Option<String> {
    let host = System::host_name()?;
    match tokio::net::lookup_host((host.as_str(), 0)).await {
        Ok(mut addrs) => addrs.find(|a| a.is_ipv4()).map(|a| a.ip().to_string()),
        Err(e) => {
            tracing::debug!(host = %host, error = %e, "Host name does not resolve");
            None
        }
    }
}

/// Packets dropped on receive and transmit, summed over all interfaces.
///
/// `sysinfo` does not report drops, so they come from `/proc/net/dev`.
fn network_drops() -> Option<(u64, u64)> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/net/dev")
            .ok()
            .map(|raw| parse_net_dev_drops(&raw))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_net_dev_drops(raw: &str) -> (u64, u64) {
    raw.lines()
        .skip(2)
        .filter_map(|line| {
            let (_, stats) = line.split_once(':')?;
            let fields: Vec<u64> = stats
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
            (fields.len() >= 16).then(|| (fields[3], fields[11]))
        })
        .fold((0, 0), |(rx, tx), (d_rx, d_tx)| (rx + d_rx, tx + d_tx))
}

fn gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
