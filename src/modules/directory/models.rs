use serde::{Deserialize, Serialize};

/// 医院影像归档端点 / A hospital's imaging archive endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagingEndpoint {
    pub hospital_id: String,
    pub base_url: String,
}

/// 影像记录 / An image stored in a specific archive
///
/// 除 `description` 外创建后不可变。
/// Immutable once created except for `description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub owner_hospital_id: String,
    /// 归档内部 ID（如 Orthanc instance id）/ Archive-native id
    pub archive_native_id: String,
    pub medical_record_id: Option<String>,
    pub description: Option<String>,
}

/// 端点命中的规则 / Which resolution rule produced the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    ImageOrigin,
    ActingDoctor,
    Fallback,
}

/// 已解析的端点 / A resolved endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRef {
    pub hospital_id: Option<String>,
    pub base_url: String,
    pub source: ResolutionSource,
}

impl EndpointRef {
    /// 拼接归档路径 / Join an archive path onto the base url
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_normalizes_slashes() {
        let ep = EndpointRef {
            hospital_id: Some("h1".to_string()),
            base_url: "http://pacs-h1:8042/".to_string(),
            source: ResolutionSource::ImageOrigin,
        };
        assert_eq!(ep.url_for("/instances/abc123"), "http://pacs-h1:8042/instances/abc123");
        assert_eq!(ep.url_for("system"), "http://pacs-h1:8042/system");
    }
}
