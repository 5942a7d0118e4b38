//! # OpenAI 鉴权代理主程序
//!
//! 校验调用方令牌，注入上游凭据后把请求转发到 `OpenAI` API

use clap::Parser;
use openai_auth_proxy::{
    app::{Application, Settings},
    config::DEFAULT_CONFIG_FILE,
    logging,
    proxy::OPENAI_BASE_URL,
};
use std::path::PathBuf;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "openai-auth-proxy", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, env = "OPENAI_PROXY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// 监听端口，优先于配置文件中的 port
    #[arg(long, env = "BIND_PORT")]
    port: Option<String>,

    /// 出站代理地址，设置后关闭上游 TLS 证书校验
    #[arg(long, env = "PROXY_URL")]
    proxy_url: Option<String>,

    /// 日志级别，设置了 RUST_LOG 时以 RUST_LOG 为准
    #[arg(long)]
    log_level: Option<String>,

    /// 不监控配置文件变更
    #[arg(long)]
    no_watch: bool,
}

impl From<Cli> for Settings {
    fn from(cli: Cli) -> Self {
        Self {
            config_path: cli.config,
            bind_port: cli.port,
            proxy_url: cli.proxy_url,
            upstream_base_url: OPENAI_BASE_URL.to_string(),
            watch: !cli.no_watch,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref());

    let settings = Settings::from(cli);
    let result = match Application::bootstrap(&settings) {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!("服务启动失败: {e:?}");
        std::process::exit(1);
    }
}
