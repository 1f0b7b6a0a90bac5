use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::SocksError;

/// 固定的成功应答：BND.ADDR 为 `0.0.0.0`，BND.PORT 为占位值 `0x0843`
///
/// 实际数据走远端隧道，本地没有有意义的绑定地址。CONNECT 客户端通常不会关心这个字段。
pub const SUCCESS_REPLY: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43];

/// 在打开隧道之前回复客户端请求成功
pub async fn send_success_reply<S>(client: &mut S) -> Result<(), SocksError>
where
    S: AsyncWrite + Unpin,
{
    client.write_all(&SUCCESS_REPLY).await?;
    Ok(())
}
