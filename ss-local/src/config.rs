use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shadowsocks::ServerAddr;
use shadowsocks::config::ServerConfig as SsServerConfig;
use thiserror::Error;

use crate::tunnel::{self, CipherKind, UnsupportedCipher};

const DEFAULT_LOCAL_PORT: u16 = 1080;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// 启动阶段的配置错误，出现即退出进程
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置文件中没有服务器")]
    NoServers,

    #[error("服务器密码或端口不能为空")]
    MissingPasswordOrPort,

    #[error(transparent)]
    UnsupportedCipher(#[from] UnsupportedCipher),

    #[error("无效的服务器配置: {0}")]
    InvalidServer(String),
}

/// 远端服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 服务器地址，IP 或域名
    pub server: String,
    #[serde(alias = "port", default)]
    pub server_port: u16,
    #[serde(default)]
    pub password: String,
    /// 加密方式，为空时使用 chacha20-ietf-poly1305
    #[serde(default)]
    pub method: Option<String>,
}

/// 配置文件
///
/// ```json
/// {
///     "local_port": 1080,
///     "timeout": 300,
///     "servers": [
///         { "server": "1.2.3.4", "server_port": 8388, "password": "secret",
///           "method": "chacha20-ietf-poly1305" }
///     ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    /// 握手和请求阶段的读超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// 校验第一个服务器并生成只读的远端配置
    pub fn remote_endpoint(&self) -> Result<RemoteEndpoint, ConfigError> {
        let server = self.servers.first().ok_or(ConfigError::NoServers)?;
        if server.password.is_empty() || server.server_port == 0 {
            return Err(ConfigError::MissingPasswordOrPort);
        }

        let cipher = match server.method.as_deref() {
            None | Some("") => tunnel::DEFAULT_CIPHER,
            Some(method) => tunnel::parse_cipher(method)?,
        };

        let addr = match server.server.parse::<IpAddr>() {
            Ok(ip) => ServerAddr::SocketAddr(SocketAddr::new(ip, server.server_port)),
            Err(_) => ServerAddr::DomainName(server.server.clone(), server.server_port),
        };
        // 主密钥由密码派生（EVP_BytesToKey）
        let server_config = SsServerConfig::new(addr, server.password.clone(), cipher)
            .map_err(|e| ConfigError::InvalidServer(e.to_string()))?;

        Ok(RemoteEndpoint {
            host: server.server.clone(),
            port: server.server_port,
            cipher,
            server_config,
        })
    }

    /// 监听所有网卡上的本地端口
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.local_port))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// 启动后不再变化的远端服务器信息，由所有会话共享
#[derive(Clone)]
pub struct RemoteEndpoint {
    pub host: String,
    pub port: u16,
    pub cipher: CipherKind,
    server_config: SsServerConfig,
}

impl RemoteEndpoint {
    /// 包含派生好的主密钥
    pub fn server_config(&self) -> &SsServerConfig {
        &self.server_config
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for RemoteEndpoint {
    // 不打印密钥
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}
