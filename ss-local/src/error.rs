use std::io;
use thiserror::Error;

/// 单个 SOCKS5 会话中可能出现的错误
///
/// 所有错误都只终止当前会话，不会回写任何错误应答给客户端。
#[derive(Error, Debug)]
pub enum SocksError {
    /// 版本号不是 5
    #[error("不支持的SOCKS版本: {0}")]
    Version(u8),

    /// 协商阶段总是选择无认证，目前不会产生
    #[error("不支持的认证方法")]
    MethodUnsupported,

    /// 握手报文超出 NMETHODS 声明的长度
    #[error("握手报文包含多余数据")]
    ExtraAuthData,

    /// 未知的地址类型
    #[error("不支持的地址类型: {0}")]
    AddressType(u8),

    /// 命令不是 CONNECT
    #[error("不支持的命令: {0}")]
    Command(u8),

    /// 请求报文超出地址类型推算出的长度
    #[error("请求报文包含多余数据")]
    ExtraRequestData,

    /// 握手或请求阶段读超时
    #[error("读取客户端数据超时")]
    Timeout,

    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),

    /// 无法建立到远端的加密隧道
    #[error("连接远端服务器失败: {0}")]
    TunnelConnect(#[source] io::Error),
}
