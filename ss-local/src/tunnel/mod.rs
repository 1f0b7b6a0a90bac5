//! 到远端 shadowsocks 服务器的加密隧道

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use shadowsocks::config::ServerType;
use shadowsocks::context::{Context, SharedContext};
use shadowsocks::relay::socks5::Address as TargetAddress;
use shadowsocks::relay::tcprelay::ProxyClientStream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::RemoteEndpoint;
use crate::socks::Address;

pub use shadowsocks::crypto::CipherKind;

/// 配置中没有写加密方式时使用
pub const DEFAULT_CIPHER: CipherKind = CipherKind::CHACHA20_POLY1305;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("不支持的加密方式: {0}")]
pub struct UnsupportedCipher(pub String);

/// 解析加密方式名称，只接受 AEAD 方式
pub fn parse_cipher(name: &str) -> Result<CipherKind, UnsupportedCipher> {
    match name.to_ascii_lowercase().as_str() {
        "aes-128-gcm" => Ok(CipherKind::AES_128_GCM),
        "aes-256-gcm" => Ok(CipherKind::AES_256_GCM),
        "chacha20-ietf-poly1305" => Ok(CipherKind::CHACHA20_POLY1305),
        _ => Err(UnsupportedCipher(name.to_string())),
    }
}

/// 为一次 CONNECT 请求打开通往远端的字节流
///
/// `raw_address` 是请求中原样截取的 ATYP‖DST.ADDR‖DST.PORT，
/// 由实现负责转交给远端。
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn open(&self, raw_address: &[u8]) -> io::Result<Self::Stream>;
}

/// 使用 shadowsocks AEAD 协议连接远端服务器
#[derive(Clone)]
pub struct ShadowsocksConnector {
    context: SharedContext,
    endpoint: Arc<RemoteEndpoint>,
}

impl ShadowsocksConnector {
    pub fn new(endpoint: Arc<RemoteEndpoint>) -> Self {
        Self {
            context: Context::new_shared(ServerType::Local),
            endpoint,
        }
    }
}

fn target_address(address: Address) -> TargetAddress {
    match address {
        Address::Ipv4(ip, port) => TargetAddress::SocketAddress(SocketAddr::from((ip, port))),
        Address::Ipv6(ip, port) => TargetAddress::SocketAddress(SocketAddr::from((ip, port))),
        Address::Domain(domain, port) => TargetAddress::DomainNameAddress(domain, port),
    }
}

#[async_trait]
impl Connector for ShadowsocksConnector {
    type Stream = ProxyClientStream<TcpStream>;

    async fn open(&self, raw_address: &[u8]) -> io::Result<Self::Stream> {
        let target = Address::decode(raw_address)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let endpoint = &self.endpoint;
        let remote = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        if let Err(e) = remote.set_nodelay(true) {
            debug!("设置远端连接 TCP_NODELAY 失败: {}", e);
        }

        let mut stream = ProxyClientStream::from_stream(
            self.context.clone(),
            remote,
            endpoint.server_config(),
            target_address(target),
        );
        // 空写入会立即发出盐和目标地址，不必等客户端的第一段数据
        stream.write(&[]).await?;
        stream.flush().await?;

        debug!("连接远端服务器 {} 成功", endpoint);
        Ok(stream)
    }
}
