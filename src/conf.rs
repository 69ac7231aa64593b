//! 强类型应用配置
//! Typed application settings
//!
//! 由 [`ConfigManager`] 反序列化而来，所有段均有默认值，
//! 因此空配置也能启动一个仅含内存后端的实例。
//! Deserialized from a [`ConfigManager`]; every section has defaults so an
//! empty configuration boots a memory-backed instance.

use crate::comm::config::{ConfigError, ConfigManager};
use serde::{Deserialize, Serialize};

/// 顶层配置 / Top level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub realtime: RealtimeSettings,
    pub imaging: ImagingSettings,
    pub directory: DirectorySettings,
    pub sharing: SharingSettings,
    pub notifications: NotificationSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

/// 实时通道配置 / Realtime channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// 连接建立后必须在此时间内 join / Connections must join within this window
    pub join_deadline_ms: u64,
    /// 心跳超时 / Heartbeat timeout
    pub heartbeat_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 5200,
            join_deadline_ms: 5_000,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

/// 影像归档访问配置 / Imaging archive access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingSettings {
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// 二进制操作前是否先探活 / Probe before binary operations
    pub probe_before_binary: bool,
    pub probe_path: String,
    pub fallback_endpoint: Option<String>,
}

impl Default for ImagingSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            probe_before_binary: false,
            probe_path: "/system".to_string(),
            fallback_endpoint: None,
        }
    }
}

/// 医院目录种子数据 / Static seed for the in-memory directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub cache_ttl_secs: u64,
    pub hospitals: Vec<HospitalSeed>,
    pub users: Vec<UserSeed>,
    pub images: Vec<ImageSeed>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            hospitals: Vec::new(),
            users: Vec::new(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalSeed {
    pub id: String,
    pub imaging_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: String,
    pub role: String,
    pub hospital_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSeed {
    pub id: String,
    pub owner_hospital_id: String,
    pub archive_native_id: String,
    pub medical_record_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingSettings {
    pub allow_reshare: bool,
    pub max_reshare_depth: u32,
}

impl Default for SharingSettings {
    fn default() -> Self {
        Self {
            allow_reshare: false,
            max_reshare_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub purge_interval_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            purge_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// 为空时使用内存后端 / Memory backend when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppSettings {
    /// 从配置管理器加载并校验 / Load from a manager and validate
    pub fn from_manager(manager: &ConfigManager) -> Result<Self, ConfigError> {
        let settings: AppSettings = manager.deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验取值范围 / Range checks
    pub fn validate(&self) -> Result<(), ConfigError> {
        let imaging = &self.imaging;
        if imaging.request_timeout_ms == 0 {
            return Err(invalid("imaging.request_timeout_ms", "must be greater than 0"));
        }
        if imaging.probe_timeout_ms == 0 {
            return Err(invalid("imaging.probe_timeout_ms", "must be greater than 0"));
        }
        if imaging.probe_timeout_ms > imaging.request_timeout_ms {
            return Err(invalid(
                "imaging.probe_timeout_ms",
                "must not exceed imaging.request_timeout_ms",
            ));
        }
        if !imaging.probe_path.starts_with('/') {
            return Err(invalid("imaging.probe_path", "must start with '/'"));
        }
        if let Some(url) = &imaging.fallback_endpoint {
            check_base_url("imaging.fallback_endpoint", url)?;
        }
        for hospital in &self.directory.hospitals {
            if let Some(url) = &hospital.imaging_endpoint {
                check_base_url("directory.hospitals.imaging_endpoint", url)?;
            }
        }
        for user in &self.directory.users {
            if user.role.parse::<crate::identity::Role>().is_err() {
                return Err(invalid("directory.users.role", &format!("unknown role '{}'", user.role)));
            }
        }
        let n = &self.notifications;
        if n.default_page_size == 0 || n.max_page_size == 0 {
            return Err(invalid("notifications.default_page_size", "must be greater than 0"));
        }
        if n.default_page_size > n.max_page_size {
            return Err(invalid(
                "notifications.default_page_size",
                "must not exceed notifications.max_page_size",
            ));
        }
        if self.realtime.join_deadline_ms == 0 {
            return Err(invalid("realtime.join_deadline_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn check_base_url(key: &str, url: &str) -> Result<(), ConfigError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(key, &format!("'{}' is not an http(s) url", url)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cm = ConfigManager::from_toml_str("").unwrap();
        let s = AppSettings::from_manager(&cm).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.imaging.probe_timeout_ms, 5_000);
        assert!(!s.sharing.allow_reshare);
        assert!(s.database.url.is_none());
    }

    #[test]
    fn test_seed_sections_deserialize() {
        let cm = ConfigManager::from_toml_str(
            r#"
            [imaging]
            fallback_endpoint = "http://pacs-central:8042"

            [[directory.hospitals]]
            id = "h1"
            imaging_endpoint = "http://pacs-h1:8042"

            [[directory.users]]
            id = "doc-a"
            role = "doctor"
            hospital_id = "h1"
            "#,
        )
        .unwrap();
        let s = AppSettings::from_manager(&cm).unwrap();
        assert_eq!(s.directory.hospitals.len(), 1);
        assert_eq!(s.directory.users[0].hospital_id.as_deref(), Some("h1"));
    }

    #[test]
    fn test_probe_timeout_must_not_exceed_request_timeout() {
        let mut s = AppSettings::default();
        s.imaging.probe_timeout_ms = 60_000;
        s.imaging.request_timeout_ms = 1_000;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "imaging.probe_timeout_ms"
        ));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let mut s = AppSettings::default();
        s.directory.users.push(UserSeed {
            id: "x".to_string(),
            role: "janitor".to_string(),
            hospital_id: None,
        });
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_fallback_must_be_http() {
        let mut s = AppSettings::default();
        s.imaging.fallback_endpoint = Some("ftp://pacs".to_string());
        assert!(s.validate().is_err());
    }
}
