//! HTTP stream-ingestion sink.
//!
//! POSTs the record JSON to a single endpoint. Stream and partition key
//! travel as headers; the response body carries the shard and sequence number.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::publisher::{PublishError, PutAck, Sink, SinkSetupError};

/// Header carrying the target stream.
pub const STREAM_ID_HEADER: &str = "X-Stream-Id";

/// Header carrying the partition key.
pub const PARTITION_KEY_HEADER: &str = "X-Partition-Key";

/// Longest error body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 256;

/// Sink that delivers records to an HTTP ingestion endpoint.
#[derive(Clone)]
pub struct HttpSink {
    endpoint: Url,
    client: Client,
    auth: Option<HeaderValue>,
}

impl HttpSink {
    /// Build a sink for `endpoint`.
    ///
    /// # Errors
    /// Fails if the endpoint is not a URL, the token is not a valid header
    /// value, or the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SinkSetupError> {
        let endpoint = Url::parse(endpoint).map_err(|source| SinkSetupError::Endpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let auth = auth_token
            .filter(|t| !t.is_empty())
            .map(|t| {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", t))
                    .map_err(|e| SinkSetupError::Credentials(e.to_string()))?;
                value.set_sensitive(true);
                Ok::<_, SinkSetupError>(value)
            })
            .transpose()?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            client,
            auth,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

/// Map a non-success status to a publish error.
fn classify_status(status: StatusCode, body: &str) -> PublishError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{}: {}", status, excerpt)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => PublishError::Throttled(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Unauthorized(detail),
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => PublishError::InvalidRecord(detail),
        _ => PublishError::Unavailable(detail),
    }
}

#[async_trait::async_trait]
impl Sink for HttpSink {
    async fn put(
        &self,
        stream_id: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PutAck, PublishError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(STREAM_ID_HEADER, stream_id)
            .header(PARTITION_KEY_HEADER, partition_key)
            .body(payload);
        if let Some(auth) = &self.auth {
            request = request.header(reqwest::header::AUTHORIZATION, auth.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        match response.json::<PutAck>().await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                // Accepted, but the acknowledgement could not be read.
                tracing::debug!(error = %e, "Sink returned an unreadable acknowledgement");
                Ok(PutAck::default())
            }
        }
    }
}
