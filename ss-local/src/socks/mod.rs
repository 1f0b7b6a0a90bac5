//! SOCKS5 协议（RFC 1928）中 CONNECT 命令需要的部分

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::SocksError;

mod address;
mod handshake;
mod reply;
mod request;

pub use address::Address;
pub use handshake::handshake;
pub use reply::{SUCCESS_REPLY, send_success_reply};
pub use request::{Request, read_request};

pub const SOCKS_VERSION: u8 = 0x05;
pub const NO_AUTHENTICATION: u8 = 0x00;
pub const CONNECT_COMMAND: u8 = 0x01;
pub const IPV4_ADDRESS: u8 = 0x01;
pub const DOMAIN_NAME: u8 = 0x03;
pub const IPV6_ADDRESS: u8 = 0x04;

/// 至少读取 `min` 个字节，可能多读（最多填满 `buf`）
async fn read_at_least<R>(reader: &mut R, buf: &mut [u8], min: usize) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut n = 0;
    while n < min {
        let read = reader.read(&mut buf[n..]).await?;
        if read == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        n += read;
    }
    Ok(n)
}

/// 给握手和请求阶段的读取加上超时
async fn with_read_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, SocksError>
where
    F: Future<Output = Result<T, SocksError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SocksError::Timeout)?
}
