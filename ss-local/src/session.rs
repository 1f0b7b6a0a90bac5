//! 单个连接的生命周期和本地监听循环

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::error::SocksError;
use crate::relay::Relay;
use crate::socks;
use crate::tunnel::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    RequestPending,
    Relaying,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Handshaking => "握手",
            SessionState::RequestPending => "等待请求",
            SessionState::Relaying => "转发",
            SessionState::Closed => "已关闭",
        };
        f.write_str(name)
    }
}

/// 一个已接受的客户端连接，由处理它的任务独占
pub struct ClientSession<S> {
    client: S,
    peer: String,
    state: SessionState,
    read_timeout: Duration,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(client: S, peer: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            client,
            peer: peer.into(),
            state: SessionState::Handshaking,
            read_timeout,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!("{} 会话状态: {} -> {}", self.peer, self.state, next);
        self.state = next;
    }

    /// 握手 -> 请求 -> 成功应答 -> 打开隧道 -> 转发
    ///
    /// 任何一步出错都直接返回，客户端连接随之关闭，不发送错误应答。
    pub async fn run<C: Connector>(mut self, connector: &C) -> Result<(), SocksError> {
        let (tunnel, target) = match self.establish(connector).await {
            Ok(established) => established,
            Err(e) => {
                self.advance(SessionState::Closed);
                return Err(e);
            }
        };
        self.advance(SessionState::Relaying);

        // 转发期间不再有读超时
        let stats = Relay::new().run(self.client, tunnel).await;

        debug!(
            "{} 会话状态: {} -> {}，到 {} 的连接上行 {} 字节，下行 {} 字节",
            self.peer,
            SessionState::Relaying,
            SessionState::Closed,
            target,
            stats.upstream,
            stats.downstream
        );
        Ok(())
    }

    async fn establish<C: Connector>(
        &mut self,
        connector: &C,
    ) -> Result<(C::Stream, String), SocksError> {
        socks::handshake(&mut self.client, self.read_timeout).await?;
        self.advance(SessionState::RequestPending);

        let request = socks::read_request(&mut self.client, self.read_timeout).await?;
        let target = request.address().to_string();
        debug!("{} 请求访问 {}", self.peer, target);

        socks::send_success_reply(&mut self.client).await?;

        let tunnel = connector
            .open(request.raw_address())
            .await
            .map_err(SocksError::TunnelConnect)?;
        Ok((tunnel, target))
    }
}

/// 本地 SOCKS5 监听端
pub struct LocalServer<C> {
    listener: TcpListener,
    connector: Arc<C>,
    read_timeout: Duration,
}

impl<C: Connector> LocalServer<C> {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        connector: C,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("SOCKS5 代理客户端启动在 {}", listener.local_addr()?);

        Ok(Self {
            listener,
            connector: Arc::new(connector),
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 接受连接并为每个连接启动一个任务，单个连接出错不影响监听
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("新 SOCKS5 连接来自: {}", addr);
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!("设置 {} 的 TCP_NODELAY 失败: {}", addr, e);
                    }
                    let connector = self.connector.clone();
                    let session = ClientSession::new(socket, addr.to_string(), self.read_timeout);

                    tokio::spawn(async move {
                        match session.run(connector.as_ref()).await {
                            Ok(()) => {}
                            Err(SocksError::TunnelConnect(e)) => {
                                error!("{} 连接远端服务器失败: {}", addr, e);
                            }
                            Err(e) => debug!("处理 SOCKS5 连接 {} 时出错: {}", addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("接受 SOCKS5 连接时出错: {}", e);
                }
            }
        }
    }
}
