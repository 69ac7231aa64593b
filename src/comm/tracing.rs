use chrono::{Datelike, Timelike};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::conf::LoggingSettings;

struct LogTimer;

impl fmt::time::FormatTime for LogTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        let cs = now.timestamp_subsec_millis() / 10;
        let s = format!(
            "{:04}-{:02}-{:02}:{:02}:{:02}:{:02}:{:02}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            cs
        );
        w.write_str(&s)
    }
}

/// 初始化日志 / Install the global tracing subscriber
///
/// `RUST_LOG` 优先于 `logging.level`。重复调用是无害的。
/// `RUST_LOG` wins over `logging.level`. Repeated calls are harmless.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},sqlx=warn", settings.level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if settings.json_format {
        let formatting_layer = BunyanFormattingLayer::new("imaging-hub".into(), std::io::stdout);
        Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(formatting_layer)
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_timer(LogTimer)
                    .compact()
                    .with_target(false),
            )
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}
