use std::time::Duration;

use bytes::Bytes;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Address, CONNECT_COMMAND, SOCKS_VERSION, read_at_least, with_read_timeout};
use crate::error::SocksError;

// VER + CMD + RSV
const HEADER_LEN: usize = 3;
// 最长的请求是 255 字节的域名，多留一个字节用于发现多余数据
const REQUEST_BUF_LEN: usize = HEADER_LEN + 1 + 1 + 255 + 2 + 1;

/// 解析后的 CONNECT 请求
#[derive(Debug, Clone)]
pub struct Request {
    /// 原始的 ATYP‖DST.ADDR‖DST.PORT，原样转交给隧道
    raw: Bytes,
    address: Address,
}

impl Request {
    pub fn raw_address(&self) -> &[u8] {
        &self.raw
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// 读取并校验 SOCKS5 请求
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub async fn read_request<S>(client: &mut S, timeout: Duration) -> Result<Request, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_BUF_LEN];

    // 至少读到 VER、CMD、RSV、ATYP 和地址的第一个字节
    let request_len = with_read_timeout(timeout, async {
        let n = read_at_least(client, &mut buf, HEADER_LEN + 2).await?;

        if buf[0] != SOCKS_VERSION {
            return Err(SocksError::Version(buf[0]));
        }

        let command = buf[1];
        if command != CONNECT_COMMAND {
            return Err(SocksError::Command(command));
        }

        let request_len = HEADER_LEN + Address::frame_len(buf[3], buf[4])?;
        if n > request_len {
            return Err(SocksError::ExtraRequestData);
        }
        if n < request_len {
            client.read_exact(&mut buf[n..request_len]).await?;
        }
        Ok(request_len)
    })
    .await?;

    let raw = Bytes::copy_from_slice(&buf[HEADER_LEN..request_len]);
    let address = Address::decode(&raw)?;
    debug!("访问目标: {}", address);

    Ok(Request { raw, address })
}
