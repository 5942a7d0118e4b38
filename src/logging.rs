//! # 日志配置模块
//!
//! 基于 `tracing-subscriber` 的紧凑格式输出，`RUST_LOG` 优先于命令行级别

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 默认日志级别
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// 由日志级别得到默认过滤规则
#[must_use]
pub fn default_filter(log_level: Option<&str>) -> String {
    let level = log_level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL);

    // 访问日志由 tower-http 输出，默认只保留请求级别的摘要
    format!("{level},tower_http=info,hyper=warn,hyper_util=warn")
}

/// 初始化日志系统
///
/// 设置了 `RUST_LOG` 时完全按其过滤，否则使用 [`default_filter`]。
/// 重复调用（例如测试中）不会 panic。
pub fn init_logging(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
