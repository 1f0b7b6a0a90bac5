use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shadowsocks::config::{ServerAddr, ServerConfig, ServerType};
use shadowsocks::context::Context;
use shadowsocks::relay::tcprelay::proxy_listener::ProxyListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::net::TcpStream;

use ss_local::socks::SUCCESS_REPLY;
use ss_local::tunnel::DEFAULT_CIPHER;
use ss_local::{Config, Connector, LocalServer, ShadowsocksConnector};

const TIMEOUT: Duration = Duration::from_secs(5);
const IPV4_REQUEST: [u8; 10] = [0x05, 0x01, 0x00, 0x01, 0x5D, 0xB8, 0xD8, 0x22, 0x00, 0x50];

/// 打开内存回显流的隧道
struct EchoConnector;

#[async_trait]
impl Connector for EchoConnector {
    type Stream = DuplexStream;

    async fn open(&self, _raw_address: &[u8]) -> io::Result<DuplexStream> {
        let (local, remote) = duplex(4096);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(remote);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        Ok(local)
    }
}

async fn start<C: Connector>(connector: C) -> SocketAddr {
    let server = LocalServer::bind("127.0.0.1:0", connector, TIMEOUT)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn socks_connect(addr: SocketAddr, request: &[u8]) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);

    client.write_all(request).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43]);
    assert_eq!(reply, SUCCESS_REPLY);

    client
}

#[tokio::test]
async fn test_echo_through_local_server() {
    let addr = start(EchoConnector).await;
    let mut client = socks_connect(addr, &IPV4_REQUEST).await;

    for message in [&b"first"[..], &b"second message"[..]] {
        client.write_all(message).await.unwrap();
        let mut echoed = vec![0u8; message.len()];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, message);
    }
}

#[tokio::test]
async fn test_bad_connection_does_not_stop_listener() {
    let addr = start(EchoConnector).await;

    // 错误的版本号，连接被静默关闭
    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(&[0x04, 0x00]).await.unwrap();
    let mut received = Vec::new();
    bad.read_to_end(&mut received).await.unwrap();
    assert!(received.is_empty());

    let mut client = socks_connect(addr, &IPV4_REQUEST).await;
    client.write_all(b"still alive").await.unwrap();
    let mut echoed = [0u8; 11];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"still alive");
}

/// 模拟远端 shadowsocks 服务器：校验目标地址，然后回显
async fn simulated_remote(listener: ProxyListener, expected_target: &str) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let target = stream.handshake().await.unwrap();
    assert_eq!(target.to_string(), expected_target);

    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await.unwrap();
        stream.flush().await.unwrap();
    }
    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_round_trip_through_encrypted_tunnel() {
    let server = ServerConfig::new(
        ServerAddr::SocketAddr("127.0.0.1:0".parse().unwrap()),
        "integration",
        DEFAULT_CIPHER,
    )
    .unwrap();
    let remote = ProxyListener::bind(Context::new_shared(ServerType::Server), &server)
        .await
        .unwrap();
    let remote_port = remote.local_addr().unwrap().port();

    let config = Config::from_json(&format!(
        r#"{{"servers": [{{"server": "127.0.0.1", "server_port": {}, "password": "integration"}}]}}"#,
        remote_port
    ))
    .unwrap();
    let endpoint = config.remote_endpoint().unwrap();

    let mut domain_request = vec![0x05, 0x01, 0x00, 0x03, 11];
    domain_request.extend_from_slice(b"example.com");
    domain_request.extend_from_slice(&443u16.to_be_bytes());

    let remote = tokio::spawn(simulated_remote(remote, "example.com:443"));

    let addr = start(ShadowsocksConnector::new(Arc::new(endpoint))).await;
    let mut client = socks_connect(addr, &domain_request).await;

    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    let (mut reader, mut writer) = client.split();
    let sending = async {
        writer.write_all(&payload).await.unwrap();
    };
    let receiving = async {
        let mut echoed = vec![0u8; payload.len()];
        reader.read_exact(&mut echoed).await.unwrap();
        echoed
    };
    let ((), echoed) = tokio::join!(sending, receiving);
    assert_eq!(echoed, payload);

    // 客户端关闭后远端读到 EOF
    drop(client);
    tokio::time::timeout(TIMEOUT, remote).await.unwrap().unwrap();
}
