//! 本地 SOCKS5 代理：接受浏览器或应用的连接，经加密隧道转发到远端 shadowsocks 服务器

pub mod config;
pub mod error;
pub mod relay;
pub mod session;
pub mod socks;
pub mod tunnel;

pub use config::{Config, ConfigError, RemoteEndpoint};
pub use error::SocksError;
pub use session::{ClientSession, LocalServer};
pub use tunnel::{Connector, ShadowsocksConnector};
