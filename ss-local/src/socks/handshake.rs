use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{NO_AUTHENTICATION, SOCKS_VERSION, read_at_least, with_read_timeout};
use crate::error::SocksError;

// VER + NMETHODS + 最多 255 个 METHODS，多留一个字节用于发现多余数据
const HANDSHAKE_BUF_LEN: usize = 1 + 1 + 255 + 1;

/// 处理 SOCKS5 握手
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// 不论客户端声明了哪些方法，都回复 `05 00`（无需认证）。
pub async fn handshake<S>(client: &mut S, timeout: Duration) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_BUF_LEN];

    with_read_timeout(timeout, async {
        let n = read_at_least(client, &mut buf, 2).await?;

        let version = buf[0];
        if version != SOCKS_VERSION {
            return Err(SocksError::Version(version));
        }

        let frame_len = buf[1] as usize + 2;
        if n > frame_len {
            return Err(SocksError::ExtraAuthData);
        }
        if n < frame_len {
            client.read_exact(&mut buf[n..frame_len]).await?;
        }
        Ok(())
    })
    .await?;

    client.write_all(&[SOCKS_VERSION, NO_AUTHENTICATION]).await?;
    debug!("SOCKS5 握手完成");
    Ok(())
}
