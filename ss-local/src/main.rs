use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use ss_local::{Config, LocalServer, ShadowsocksConnector};

#[derive(Parser)]
#[command(name = "ss-local")]
#[command(about = "SOCKS5 proxy client for shadowsocks servers")]
#[command(disable_version_flag = true)]
struct Args {
    /// Enable debug logging
    #[arg(short = 'd')]
    debug: bool,

    /// Print version and exit
    #[arg(short = 'v')]
    version: bool,

    /// Config file path [default: $HOME/.shadowsocks/config.json]
    #[arg(short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,
}

fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".shadowsocks").join("config.json")
}

fn init_logger(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("ss-local {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logger(args.debug);

    let config_path = args.config.unwrap_or_else(default_config_path);
    debug!("加载配置文件: {}", config_path.display());
    let config = Config::load(&config_path)?;
    let endpoint = config.remote_endpoint()?;
    info!("远端服务器: {}，加密方式: {}", endpoint, endpoint.cipher);

    let connector = ShadowsocksConnector::new(Arc::new(endpoint));
    let server = LocalServer::bind(config.local_addr(), connector, config.read_timeout())
        .await
        .with_context(|| format!("监听 {} 失败", config.local_addr()))?;

    server.run().await;
    Ok(())
}
