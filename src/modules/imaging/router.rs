//! 访问路由器：向影像归档转发操作并归一化失败
//! Access router: forwards operations to imaging archives and normalizes failures
//!
//! 每次外呼都有显式截止时间；不做自动重试。
//! Every outbound call carries an explicit deadline; nothing is retried.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::models::{ArchiveStatus, ErrorEnvelope, ImagingOp, OpBody, OpKind, RoutedResponse};
use super::path_guard::PathGuard;
use crate::comm::{HealthCheck, HealthStatus};
use crate::conf::ImagingSettings;
use crate::modules::directory::models::{EndpointRef, ResolutionSource};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("影像归档超时: {url} ({after_ms}ms)")]
    Timeout { url: String, after_ms: u64 },

    #[error("影像归档不可用: {url}: {message}")]
    Unavailable { url: String, message: String },

    #[error("影像归档拒绝请求: {status}: {}", .envelope.error)]
    Rejected { status: u16, envelope: ErrorEnvelope },

    #[error("影像归档传输错误: {message}")]
    Transport { message: String },

    #[error("无效的影像请求: {field}: {message}")]
    InvalidRequest { field: &'static str, message: String },
}

pub struct AccessRouter {
    client: reqwest::Client,
    guard: PathGuard,
    request_timeout: Duration,
    probe_timeout: Duration,
    probe_before_binary: bool,
    probe_path: String,
    fallback: Option<EndpointRef>,
}

impl AccessRouter {
    pub fn new(settings: &ImagingSettings) -> Result<Self, RouteError> {
        let request_timeout = Duration::from_millis(settings.request_timeout_ms);
        let probe_timeout = Duration::from_millis(settings.probe_timeout_ms);
        let client = reqwest::Client::builder()
            .connect_timeout(probe_timeout.min(request_timeout))
            .build()
            .map_err(|e| RouteError::Transport {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        let guard = PathGuard::new().map_err(|e| RouteError::Transport {
            message: format!("failed to compile path guard: {}", e),
        })?;
        Ok(Self {
            client,
            guard,
            request_timeout,
            probe_timeout,
            probe_before_binary: settings.probe_before_binary,
            probe_path: settings.probe_path.clone(),
            fallback: settings.fallback_endpoint.as_ref().map(|url| EndpointRef {
                hospital_id: None,
                base_url: url.clone(),
                source: ResolutionSource::Fallback,
            }),
        })
    }

    /// 校验归档路径 / Validate an archive path
    pub fn check_path(&self, path: &str) -> Result<(), RouteError> {
        self.guard.check(path).map_err(|reason| RouteError::InvalidRequest {
            field: "path",
            message: reason.to_string(),
        })
    }

    /// 有界探活：独立的短超时，用于区分"不可达"与"慢"
    /// Bounded liveness probe with its own short deadline
    pub async fn probe(&self, endpoint: &EndpointRef) -> Result<ArchiveStatus, RouteError> {
        let url = endpoint.url_for(&self.probe_path);
        let started = Instant::now();
        let request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(self.probe_timeout);
        let response = send_with_deadline(request, &url, self.probe_timeout).await?;
        let status = response.status().as_u16();
        let body = read_body(response, &url, self.probe_timeout).await?;
        let latency_ms = elapsed_ms(started);

        if !(200..300).contains(&status) {
            let envelope = ErrorEnvelope::from_upstream(status, &body);
            warn!(url = %url, status, "⚠️ archive probe rejected");
            return Err(RouteError::Rejected { status, envelope });
        }
        debug!(url = %url, latency_ms, "archive probe ok");
        Ok(ArchiveStatus {
            hospital_id: endpoint.hospital_id.clone(),
            base_url: endpoint.base_url.clone(),
            reachable: true,
            latency_ms,
            system: serde_json::from_slice(&body).ok(),
        })
    }

    /// 转发一次操作 / Forward one operation
    pub async fn route_operation(&self, op: ImagingOp) -> Result<RoutedResponse, RouteError> {
        self.check_path(&op.path)?;
        if op.kind.is_binary() && self.probe_before_binary {
            self.probe(&op.endpoint).await?;
        }

        let url = op.url();
        let started = Instant::now();
        let accept = match op.kind {
            OpKind::Metadata => "application/json",
            OpKind::FetchBinary | OpKind::UploadBinary => "*/*",
        };
        let mut request = self
            .client
            .request(op.method.to_reqwest(), &url)
            .header(ACCEPT, accept)
            .timeout(self.request_timeout);
        request = match op.body {
            OpBody::Empty => request,
            OpBody::Json(value) => request.json(&value),
            OpBody::Bytes { data, content_type } => request
                .header(
                    CONTENT_TYPE,
                    content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                )
                .body(data),
        };

        let response = send_with_deadline(request, &url, self.request_timeout).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !response.status().is_success() {
            let body = read_body(response, &url, self.request_timeout).await?;
            let envelope = ErrorEnvelope::from_upstream(status, &body);
            warn!(url = %url, status, error = %envelope.error, "⚠️ archive rejected operation");
            return Err(RouteError::Rejected { status, envelope });
        }

        if content_type.as_deref().is_some_and(is_json) {
            let body = read_body(response, &url, self.request_timeout).await?;
            let value = if body.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&body).map_err(|e| RouteError::Transport {
                    message: format!("archive returned invalid JSON: {}", e),
                })?
            };
            debug!(url = %url, status, elapsed_ms = elapsed_ms(started), "archive json response");
            return Ok(RoutedResponse::Json { status, body: value });
        }

        debug!(url = %url, status, content_type = ?content_type, "streaming archive response");
        let content_length = response.content_length();
        let after_ms = duration_ms(self.request_timeout);
        let stream_url = url.clone();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify(&stream_url, after_ms, e)))
            .boxed();
        Ok(RoutedResponse::Stream {
            status,
            content_type,
            content_length,
            stream,
        })
    }
}

#[async_trait]
impl HealthCheck for AccessRouter {
    /// 探测兜底归档 / Probe the fallback archive when one is configured
    async fn check_health(&self) -> HealthStatus {
        match &self.fallback {
            None => HealthStatus::new(
                "imaging_router",
                true,
                Some("no fallback archive configured".to_string()),
            ),
            Some(endpoint) => match self.probe(endpoint).await {
                Ok(status) => HealthStatus::new(
                    "imaging_router",
                    true,
                    Some(format!("fallback reachable in {}ms", status.latency_ms)),
                ),
                Err(e) => HealthStatus::new("imaging_router", false, Some(e.to_string())),
            },
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

/// reqwest 错误分类 / Map a reqwest error onto the failure taxonomy
fn classify(url: &str, after_ms: u64, e: reqwest::Error) -> RouteError {
    if e.is_timeout() {
        warn!(url, after_ms, "⏰ archive call timed out");
        RouteError::Timeout {
            url: url.to_string(),
            after_ms,
        }
    } else if e.is_connect() {
        warn!(url, error = %e, "🔌 archive unreachable");
        RouteError::Unavailable {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        warn!(url, error = %e, "archive transport error");
        RouteError::Transport {
            message: e.to_string(),
        }
    }
}

/// 发送并套上外层截止时间 / Send under an outer deadline
async fn send_with_deadline(
    request: reqwest::RequestBuilder,
    url: &str,
    deadline: Duration,
) -> Result<reqwest::Response, RouteError> {
    let after_ms = duration_ms(deadline);
    match tokio::time::timeout(deadline, request.send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(classify(url, after_ms, e)),
        Err(_) => {
            warn!(url, after_ms, "⏰ archive call exceeded deadline");
            Err(RouteError::Timeout {
                url: url.to_string(),
                after_ms,
            })
        }
    }
}

async fn read_body(response: reqwest::Response, url: &str, deadline: Duration) -> Result<Vec<u8>, RouteError> {
    let after_ms = duration_ms(deadline);
    match tokio::time::timeout(deadline, response.bytes()).await {
        Ok(Ok(bytes)) => Ok(bytes.to_vec()),
        Ok(Err(e)) => Err(classify(url, after_ms, e)),
        Err(_) => Err(RouteError::Timeout {
            url: url.to_string(),
            after_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_types() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("application/dicom+json"));
        assert!(!is_json("application/dicom"));
        assert!(!is_json("image/png"));
    }

    #[tokio::test]
    async fn test_invalid_path_fails_before_network() {
        let router = AccessRouter::new(&ImagingSettings::default()).unwrap();
        let op = ImagingOp::new(
            OpKind::Metadata,
            super::super::models::OpMethod::Get,
            EndpointRef {
                hospital_id: None,
                base_url: "http://127.0.0.1:1".to_string(),
                source: ResolutionSource::Fallback,
            },
            "/instances/../../etc",
        );
        let err = router.route_operation(op).await.unwrap_err();
        assert!(matches!(err, RouteError::InvalidRequest { field: "path", .. }));
    }

    #[tokio::test]
    async fn test_health_without_fallback_is_healthy() {
        let router = AccessRouter::new(&ImagingSettings::default()).unwrap();
        let status = router.check_health().await;
        assert!(status.healthy);
        assert_eq!(status.component, "imaging_router");
    }
}
