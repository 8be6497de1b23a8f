//! Request boundary: one config string in, one liveness verdict out.
//!
//! Decoding happens before any network work, so an unusable config never
//! costs a connection attempt. Unreachable endpoints are ordinary replies,
//! not errors.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::decoder::{decode_config, declared_scheme, DecodeError};
use crate::metrics;
use crate::prober::tcp_connect::probe_tcp;
use crate::prober::ProbeResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestConfigRequest {
    #[serde(default)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestConfigReply {
    Active {
        #[serde(rename = "pingMs")]
        ping_ms: u64,
    },
    Inactive {
        reason: String,
    },
}

impl From<ProbeResult> for TestConfigReply {
    fn from(result: ProbeResult) -> Self {
        match result {
            ProbeResult::Active { latency_ms } => TestConfigReply::Active { ping_ms: latency_ms },
            ProbeResult::Inactive { reason } => TestConfigReply::Inactive {
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Config is required.")]
    MissingConfig,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Internal Server Error")]
    Internal(String),
}

impl ServiceError {
    /// Whether the caller sent something unusable, as opposed to a failure here.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Internal(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        let error = match err {
            ServiceError::Internal(detail) => Some(detail.clone()),
            _ => None,
        };
        ErrorBody {
            message: err.to_string(),
            error,
        }
    }
}

pub async fn test_config(
    request: TestConfigRequest,
    timeout_ms: u64,
) -> Result<TestConfigReply, ServiceError> {
    let config = request
        .config
        .filter(|c| !c.trim().is_empty())
        .ok_or(ServiceError::MissingConfig)
        .inspect_err(|_| metrics::inc_invalid("unknown"))?;

    contain(evaluate(config, timeout_ms)).await
}

async fn evaluate(config: String, timeout_ms: u64) -> Result<TestConfigReply, ServiceError> {
    let decoded = decode_config(&config).inspect_err(|e| {
        warn!("rejecting config: {}", e);
        let label = declared_scheme(&config).map_or("unknown", |s| s.metrics_label());
        metrics::inc_invalid(label);
    })?;

    let scheme = decoded.scheme.metrics_label();
    let result = probe_tcp(&decoded.endpoint, timeout_ms).await;
    match result {
        ProbeResult::Active { latency_ms } => metrics::observe_active(scheme, latency_ms),
        ProbeResult::Inactive { reason } => metrics::observe_inactive(scheme, reason.as_str()),
    }

    Ok(result.into())
}

/// Run `work` on its own task so a panic inside it becomes an `Internal` error.
async fn contain<F>(work: F) -> Result<TestConfigReply, ServiceError>
where
    F: Future<Output = Result<TestConfigReply, ServiceError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("config test task failed: {}", e);
            Err(ServiceError::Internal(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn request(config: &str) -> TestConfigRequest {
        TestConfigRequest {
            config: Some(config.to_string()),
        }
    }

    #[tokio::test]
    async fn missing_or_blank_config_is_rejected() {
        let err = test_config(TestConfigRequest::default(), 1000).await.unwrap_err();
        assert_eq!(err, ServiceError::MissingConfig);
        assert_eq!(ErrorBody::from(&err).message, "Config is required.");

        let err = test_config(request("   "), 1000).await.unwrap_err();
        assert_eq!(err, ServiceError::MissingConfig);
    }

    #[tokio::test]
    async fn decode_errors_surface_as_client_errors() {
        let err = test_config(request("not a uri"), 1000).await.unwrap_err();
        assert_eq!(err, ServiceError::Decode(DecodeError::MalformedURI));
        assert!(err.is_client_error());
        assert_eq!(
            serde_json::to_value(ErrorBody::from(&err)).unwrap(),
            serde_json::json!({ "message": "Invalid config URL format." })
        );

        let err = test_config(request("vless://not-valid-base64!!"), 1000).await.unwrap_err();
        assert_eq!(err, ServiceError::Decode(DecodeError::InvalidPayloadEncoding));
    }

    #[tokio::test]
    async fn unknown_schemes_do_not_grow_the_request_series() {
        let before = metrics::request_count("other", "invalid");
        for i in 0..20 {
            let err = test_config(request(&format!("x{}://no-port", i)), 1000).await.unwrap_err();
            assert_eq!(err, ServiceError::Decode(DecodeError::MissingHostOrPort));
        }
        assert!(metrics::request_count("other", "invalid") >= before + 20);
        assert_eq!(metrics::request_count("x0", "invalid"), 0);
    }

    #[tokio::test]
    async fn decode_failures_are_counted_under_the_declared_scheme() {
        let vless_before = metrics::request_count("vless", "invalid");
        let unknown_before = metrics::request_count("unknown", "invalid");

        let _ = test_config(request("vless://not-valid-base64!!"), 1000).await;
        let _ = test_config(TestConfigRequest::default(), 1000).await;

        assert!(metrics::request_count("vless", "invalid") > vless_before);
        assert!(metrics::request_count("unknown", "invalid") > unknown_before);
    }

    #[tokio::test]
    async fn reachable_endpoint_replies_active() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reply = test_config(request(&format!("trojan://pw@127.0.0.1:{}#node", port)), 1000)
            .await
            .unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json["pingMs"].as_u64().is_some());
    }

    #[tokio::test]
    async fn closed_endpoint_replies_inactive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let reply = test_config(request(&format!("ss://127.0.0.1:{}", port)), 1000)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({ "status": "inactive", "reason": "Connection refused" })
        );
    }

    #[tokio::test]
    async fn panics_are_reported_as_internal_errors() {
        let err = contain(async {
            let latencies: Vec<u64> = Vec::new();
            Ok(TestConfigReply::Active { ping_ms: latencies[0] })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(!err.is_client_error());
        let body = ErrorBody::from(&err);
        assert_eq!(body.message, "Internal Server Error");
        assert!(body.error.is_some());
    }

    #[tokio::test]
    #[ignore = "needs a resolver that answers NXDOMAIN"]
    async fn unknown_host_replies_host_not_found() {
        let reply = test_config(request("trojan://example.test:443"), 5000).await.unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({ "status": "inactive", "reason": "Host not found" })
        );
    }
}
