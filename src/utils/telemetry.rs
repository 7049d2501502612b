// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::{LogFormat, LoggingSettings};

const DEFAULT_FILTER: &str = "info,matchday=debug";

/// 初始化日志
///
/// `RUST_LOG` 优先，其次是配置中的 `logging.level`。
pub fn init_telemetry(settings: &LoggingSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
