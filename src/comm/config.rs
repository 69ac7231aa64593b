use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// 配置错误类型 / Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },
    #[error("配置格式错误: {message}")]
    FormatError { message: String },
    #[error("配置项 '{key}' 不存在")]
    KeyNotFound { key: String },
    #[error("配置项 '{key}' 类型转换失败: {message}")]
    TypeConversionError { key: String, message: String },
    #[error("配置项 '{key}' 取值非法: {message}")]
    InvalidValue { key: String, message: String },
    #[error("配置初始化失败: {message}")]
    InitializationError { message: String },
}

/// 配置数据源信息 / Config source info
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置源类型 / Config source kind
pub enum ConfigSource {
    /// 文件配置源
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源
    Env {
        prefix: String,
        separator: &'static str,
    },
    /// 字符串配置源（测试常用）/ Inline string source (mostly for tests)
    String { content: String, format: FileFormat },
}

impl ConfigSource {
    fn source_info(&self, priority: u8) -> ConfigSourceInfo {
        match self {
            ConfigSource::File { path, required, .. } => ConfigSourceInfo {
                source_type: "File".to_string(),
                description: format!("文件配置源: {} (必需: {})", path, required),
                priority,
                loaded: false,
            },
            ConfigSource::Env { prefix, separator } => ConfigSourceInfo {
                source_type: "Environment".to_string(),
                description: format!("环境变量配置源: 前缀={}, 分隔符={}", prefix, separator),
                priority,
                loaded: false,
            },
            ConfigSource::String { .. } => ConfigSourceInfo {
                source_type: "String".to_string(),
                description: "字符串配置源".to_string(),
                priority,
                loaded: false,
            },
        }
    }

    fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> ConfigBuilder<config::builder::DefaultState> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                builder.add_source(file_source.required(required))
            }
            ConfigSource::Env { prefix, separator } => builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator(separator)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .ignore_empty(true),
            ),
            ConfigSource::String { content, format } => {
                builder.add_source(File::from_str(&content, format))
            }
        }
    }
}

/// 配置管理器 / Configuration manager
///
/// 显式构造并注入，不再使用全局单例。
/// Constructed explicitly and injected; there is no global instance.
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 默认配置源（按优先级从低到高）/ Default sources, lowest priority first
    ///
    /// development.toml -> default.toml -> production.toml -> 额外文件 -> 环境变量
    pub fn load(extra_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut sources = vec![
            ConfigSource::File {
                path: "config/development.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/default.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/production.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
        ];
        if let Some(path) = extra_file {
            sources.push(ConfigSource::File {
                path: path.to_string(),
                format: None,
                required: true,
            });
        }
        sources.push(ConfigSource::Env {
            prefix: "IMAGING".to_string(),
            separator: "__",
        });
        Self::with_sources(sources)
    }

    /// 使用指定的配置源创建配置管理器 / Build from an explicit source list
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        for (index, source) in sources.into_iter().enumerate() {
            let priority = u8::try_from(index + 1).unwrap_or(u8::MAX);
            let mut info = source.source_info(priority);

            // 可选文件不存在时跳过 / Skip optional files that do not exist
            if let ConfigSource::File { path, required, .. } = &source {
                let exists = std::path::Path::new(path).exists()
                    || std::path::Path::new(&format!("{}.toml", path)).exists();
                if !exists {
                    if *required {
                        return Err(ConfigError::FileNotFound { path: path.clone() });
                    }
                    sources_info.push(info);
                    continue;
                }
            }

            builder = source.add_to_builder(builder);
            info.loaded = true;
            sources_info.push(info);
        }

        let config = builder
            .build()
            .map_err(|e| ConfigError::FormatError {
                message: e.to_string(),
            })?;
        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 从单个 TOML 字符串构建（测试用）/ Build from a single TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::with_sources(vec![ConfigSource::String {
            content: content.to_string(),
            format: FileFormat::Toml,
        }])
    }

    /// 获取指定 key 的配置值
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.config.get(key).map_err(|e| {
            if matches!(e, config::ConfigError::NotFound(_)) {
                ConfigError::KeyNotFound {
                    key: key.to_string(),
                }
            } else {
                ConfigError::TypeConversionError {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    /// 获取指定 key 的配置值，如果不存在返回默认值
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// 整体反序列化为强类型配置 / Deserialize the whole tree into a typed struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.config
            .clone()
            .try_deserialize::<T>()
            .map_err(|e| ConfigError::FormatError {
                message: e.to_string(),
            })
    }

    /// 获取所有配置源信息
    pub fn sources_info(&self) -> &[ConfigSourceInfo] {
        &self.sources_info
    }

    /// 获取配置源统计信息 (total, loaded, skipped)
    pub fn sources_stats(&self) -> (usize, usize, usize) {
        let total = self.sources_info.len();
        let loaded = self.sources_info.iter().filter(|info| info.loaded).count();
        (total, loaded, total - loaded)
    }

    /// 记录配置源详细信息 / Log source details
    pub fn log_sources_info(&self) {
        for info in &self.sources_info {
            let status = if info.loaded { "✓ 已加载" } else { "✗ 跳过" };
            tracing::info!(
                "config source #{} {} - {} [{}]",
                info.priority,
                info.source_type,
                info.description,
                status
            );
        }
        let (total, loaded, skipped) = self.sources_stats();
        tracing::info!(
            "统计: 总计 {} 个配置源，成功 {} 个，跳过 {} 个",
            total,
            loaded,
            skipped
        );
    }

    /// 导出所有配置（用于调试）/ Dump every key for debugging
    pub fn get_all(&self) -> HashMap<String, serde_json::Value> {
        self.config
            .clone()
            .try_deserialize::<HashMap<String, serde_json::Value>>()
            .unwrap_or_default()
    }
}
