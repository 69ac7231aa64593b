use actix_web::web::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::router::RouteError;
use crate::modules::directory::models::EndpointRef;

/// 操作类型 / Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    /// JSON 元数据 / JSON metadata
    Metadata,
    /// 下载二进制（DICOM、预览图）/ Download binary content
    FetchBinary,
    /// 上传二进制 / Upload binary content
    UploadBinary,
}

impl OpKind {
    pub fn is_binary(&self) -> bool {
        matches!(self, OpKind::FetchBinary | OpKind::UploadBinary)
    }

    /// 未显式指定时按方法推断 / Default kind for a method
    pub fn default_for(method: OpMethod) -> Self {
        match method {
            OpMethod::Get => OpKind::FetchBinary,
            _ => OpKind::Metadata,
        }
    }
}

/// 允许转发的 HTTP 方法 / Methods the router forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl OpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpMethod::Get => "GET",
            OpMethod::Post => "POST",
            OpMethod::Put => "PUT",
            OpMethod::Delete => "DELETE",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            OpMethod::Get => reqwest::Method::GET,
            OpMethod::Post => reqwest::Method::POST,
            OpMethod::Put => reqwest::Method::PUT,
            OpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for OpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(OpMethod::Get),
            "POST" => Ok(OpMethod::Post),
            "PUT" => Ok(OpMethod::Put),
            "DELETE" => Ok(OpMethod::Delete),
            other => Err(format!("method '{}' is not forwarded", other)),
        }
    }
}

/// 请求体 / Outbound body
#[derive(Debug, Clone, Default)]
pub enum OpBody {
    #[default]
    Empty,
    Json(Value),
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
}

/// 一次归档操作 / One archive operation
#[derive(Debug, Clone)]
pub struct ImagingOp {
    pub kind: OpKind,
    pub method: OpMethod,
    pub endpoint: EndpointRef,
    pub path: String,
    pub body: OpBody,
}

impl ImagingOp {
    pub fn new(kind: OpKind, method: OpMethod, endpoint: EndpointRef, path: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            endpoint,
            path: path.into(),
            body: OpBody::Empty,
        }
    }

    pub fn with_body(mut self, body: OpBody) -> Self {
        self.body = body;
        self
    }

    pub fn url(&self) -> String {
        self.endpoint.url_for(&self.path)
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, RouteError>>;

/// 路由结果 / Result of a routed operation
pub enum RoutedResponse {
    /// 已解析并重新序列化的 JSON / Parsed and re-serialized JSON
    Json { status: u16, body: Value },
    /// 原样透传的字节流 / Verbatim byte stream
    Stream {
        status: u16,
        content_type: Option<String>,
        content_length: Option<u64>,
        stream: ByteStream,
    },
}

impl RoutedResponse {
    pub fn status(&self) -> u16 {
        match self {
            RoutedResponse::Json { status, .. } | RoutedResponse::Stream { status, .. } => *status,
        }
    }
}

impl fmt::Debug for RoutedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutedResponse::Json { status, body } => f
                .debug_struct("Json")
                .field("status", status)
                .field("body", body)
                .finish(),
            RoutedResponse::Stream {
                status,
                content_type,
                content_length,
                ..
            } => f
                .debug_struct("Stream")
                .field("status", status)
                .field("content_type", content_type)
                .field("content_length", content_length)
                .finish_non_exhaustive(),
        }
    }
}

/// 上游错误归一化 `{error, details}` / Normalized upstream error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: String,
    #[schema(value_type = Object)]
    pub details: Value,
}

/// 非 JSON 错误体的截断长度 / Cap for echoed non-JSON error text
const MAX_ERROR_TEXT: usize = 512;

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, details: Value) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }

    /// 从上游响应体构造 / Build from an upstream error body
    ///
    /// JSON 体取 `Message`/`message`/`error` 作为摘要，原文放入 details；
    /// 其他内容截断后作为摘要。
    /// JSON bodies keep their content as `details`; other bodies become a
    /// truncated summary.
    pub fn from_upstream(status: u16, body: &[u8]) -> Self {
        if let Ok(parsed) = serde_json::from_slice::<Value>(body) {
            let summary = ["Message", "message", "error", "HttpError"]
                .iter()
                .find_map(|k| parsed.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| default_summary(status));
            return Self::new(summary, parsed);
        }

        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        let summary = if text.is_empty() {
            default_summary(status)
        } else {
            text.chars().take(MAX_ERROR_TEXT).collect()
        };
        Self::new(summary, json!({ "httpStatus": status }))
    }
}

fn default_summary(status: u16) -> String {
    format!("imaging archive responded with status {}", status)
}

/// `GET /imaging/system` 的结果 / Archive liveness result
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStatus {
    pub hospital_id: Option<String>,
    pub base_url: String,
    pub reachable: bool,
    pub latency_ms: u64,
    /// 归档自报的系统信息 / System info reported by the archive
    #[schema(value_type = Object)]
    pub system: Option<Value>,
}

/// `POST /imaging/op` 请求体 / Generic proxy request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpRequest {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[schema(value_type = Object)]
    pub body: Option<Value>,
    pub image_id: Option<String>,
    /// 显式指定操作类型 / Optional explicit kind
    pub kind: Option<OpKind>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    pub image_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthanc_style_error_body() {
        let body = br#"{"HttpError":"Not Found","HttpStatus":404,"Message":"Unknown resource"}"#;
        let env = ErrorEnvelope::from_upstream(404, body);
        assert_eq!(env.error, "Unknown resource");
        assert_eq!(env.details["HttpStatus"], 404);
    }

    #[test]
    fn test_plain_text_error_body_is_truncated() {
        let body = "x".repeat(2_000);
        let env = ErrorEnvelope::from_upstream(500, body.as_bytes());
        assert_eq!(env.error.len(), MAX_ERROR_TEXT);
        assert_eq!(env.details["httpStatus"], 500);
    }

    #[test]
    fn test_empty_error_body() {
        let env = ErrorEnvelope::from_upstream(503, b"");
        assert!(env.error.contains("503"));
    }

    #[test]
    fn test_method_defaults() {
        assert_eq!("get".parse::<OpMethod>().unwrap(), OpMethod::Get);
        assert!("PATCH".parse::<OpMethod>().is_err());
        assert_eq!(OpKind::default_for(OpMethod::Get), OpKind::FetchBinary);
        assert_eq!(OpKind::default_for(OpMethod::Post), OpKind::Metadata);
    }
}
