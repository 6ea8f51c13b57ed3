//! Transport - issues a descriptor against its datasource

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::descriptor::{HttpMethod, QueryDescriptor};
use crate::error::TransportError;
use crate::hooks::RequestContext;

/// Header carrying [`RequestContext::trace_id`]
pub const TRACE_HEADER: &str = "x-request-id";

/// Header carrying the issuing widget id
pub const WIDGET_HEADER: &str = "x-widget-id";

/// Header carrying [`RequestContext::issued_at`] as RFC 3339
pub const ISSUED_AT_HEADER: &str = "x-issued-at";

/// Issues one request for a descriptor
///
/// Implementations own their timeout policy; a timeout is reported as an
/// ordinary [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn issue(&self, descriptor: &QueryDescriptor, ctx: &RequestContext) -> Result<Value, TransportError>;
}

/// HTTP transport speaking JSON query bodies
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        debug!(base_url = ?config.base_url, timeout_ms = config.timeout_ms, "HttpTransport::new: called");
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| TransportError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Resolve the descriptor's url, joining relative paths onto the base url
    fn resolve(&self, descriptor: &QueryDescriptor) -> Result<Url, TransportError> {
        let raw = descriptor.url().ok_or_else(|| TransportError::InvalidUrl {
            url: String::new(),
            reason: format!("datasource '{}' has no url", descriptor.source_id()),
        })?;

        let invalid = |e: url::ParseError| TransportError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        };

        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(raw).map_err(invalid),
                None => Err(invalid(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(e) => Err(invalid(e)),
        }
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue(&self, descriptor: &QueryDescriptor, ctx: &RequestContext) -> Result<Value, TransportError> {
        let url = self.resolve(descriptor)?;
        debug!(
            widget_id = %ctx.widget_id,
            request_id = ctx.request_id,
            method = ?descriptor.method(),
            %url,
            "HttpTransport::issue: called"
        );

        let body = descriptor
            .request_body()
            .map_err(|e| TransportError::InvalidResponse(format!("could not encode query: {}", e)))?;

        let request = match descriptor.method() {
            HttpMethod::Post => self.client.post(url).json(&body),
            HttpMethod::Get => self.client.get(url).query(&[("query", body.to_string())]),
        };

        let response = request
            .header(TRACE_HEADER, ctx.trace_id.to_string())
            .header(WIDGET_HEADER, ctx.widget_id.as_str())
            .header(ISSUED_AT_HEADER, ctx.issued_at.to_rfc3339())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), request_id = ctx.request_id, "HttpTransport::issue: error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        debug!(request_id = ctx.request_id, "HttpTransport::issue: response received");
        Ok(value)
    }
}
