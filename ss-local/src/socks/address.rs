use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Buf;

use super::{DOMAIN_NAME, IPV4_ADDRESS, IPV6_ADDRESS};
use crate::error::SocksError;

/// SOCKS5 地址帧：ATYP‖DST.ADDR‖DST.PORT
///
/// 帧长度由 ATYP 推算，见 [`Address::frame_len`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr, u16),
    Ipv6(Ipv6Addr, u16),
    Domain(String, u16),
}

impl Address {
    /// 根据地址类型和紧随其后的第一个字节，计算整个地址帧的长度
    ///
    /// 域名的第一个字节是长度，IPv4/IPv6 忽略它。
    pub fn frame_len(atyp: u8, first: u8) -> Result<usize, SocksError> {
        match atyp {
            IPV4_ADDRESS => Ok(1 + 4 + 2),
            IPV6_ADDRESS => Ok(1 + 16 + 2),
            DOMAIN_NAME => Ok(1 + 1 + first as usize + 2),
            _ => Err(SocksError::AddressType(atyp)),
        }
    }

    /// 从原始地址帧解码，长度必须与地址类型完全吻合
    pub fn decode(raw: &[u8]) -> Result<Self, SocksError> {
        let Some(&atyp) = raw.first() else {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        };
        let expected = Self::frame_len(atyp, raw.get(1).copied().unwrap_or(0))?;
        if raw.len() < expected {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        if raw.len() > expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("地址帧长度不匹配: 期望 {} 字节, 实际 {} 字节", expected, raw.len()),
            )
            .into());
        }

        let mut buf = &raw[1..];
        let address = match atyp {
            IPV4_ADDRESS => {
                let ip = Ipv4Addr::from(buf.get_u32());
                Address::Ipv4(ip, buf.get_u16())
            }
            IPV6_ADDRESS => {
                let ip = Ipv6Addr::from(buf.get_u128());
                Address::Ipv6(ip, buf.get_u16())
            }
            _ => {
                let len = buf.get_u8() as usize;
                let domain = String::from_utf8_lossy(&buf[..len]).into_owned();
                buf.advance(len);
                Address::Domain(domain, buf.get_u16())
            }
        };
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip, port) => fmt::Display::fmt(&SocketAddr::from((*ip, *port)), f),
            Address::Ipv6(ip, port) => fmt::Display::fmt(&SocketAddr::from((*ip, *port)), f),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ipv4() {
        let raw = [0x01, 0x5D, 0xB8, 0xD8, 0x22, 0x00, 0x50];
        let address = Address::decode(&raw).unwrap();

        assert_eq!(address, Address::Ipv4(Ipv4Addr::new(93, 184, 216, 34), 80));
        assert_eq!(address.to_string(), "93.184.216.34:80");
    }

    #[test]
    fn test_decode_ipv6_is_bracketed() {
        let mut raw = vec![0x04];
        raw.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        raw.extend_from_slice(&443u16.to_be_bytes());

        let address = Address::decode(&raw).unwrap();
        assert_eq!(address.to_string(), "[::1]:443");
    }

    #[test]
    fn test_decode_domain() {
        let mut raw = vec![0x03, 11];
        raw.extend_from_slice(b"example.com");
        raw.extend_from_slice(&8080u16.to_be_bytes());

        let address = Address::decode(&raw).unwrap();
        assert_eq!(address, Address::Domain("example.com".to_string(), 8080));
        assert_eq!(address.to_string(), "example.com:8080");
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Address::frame_len(IPV4_ADDRESS, 0xAA).unwrap(), 7);
        assert_eq!(Address::frame_len(IPV6_ADDRESS, 0xAA).unwrap(), 19);
        assert_eq!(Address::frame_len(DOMAIN_NAME, 10).unwrap(), 14);
        assert!(matches!(
            Address::frame_len(0x02, 0),
            Err(SocksError::AddressType(0x02))
        ));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let short = [0x01, 127, 0, 0, 1, 0x00];
        assert!(matches!(Address::decode(&short), Err(SocksError::Io(_))));

        let long = [0x01, 127, 0, 0, 1, 0x00, 0x50, 0xFF];
        assert!(matches!(Address::decode(&long), Err(SocksError::Io(_))));

        assert!(matches!(Address::decode(&[]), Err(SocksError::Io(_))));
    }
}
