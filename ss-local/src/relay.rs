//! 客户端与隧道之间的双向转发

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

const RELAY_BUFFER_LEN: usize = 8192;
// 关闭写端时最多等待这么久把缓冲区里剩余的数据发出去
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl RelayState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RelayState::Open,
            1 => RelayState::Closing,
            _ => RelayState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 客户端 -> 隧道
    Upstream,
    /// 隧道 -> 客户端
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("客户端到隧道"),
            Direction::Downstream => f.write_str("隧道到客户端"),
        }
    }
}

/// Open -> Closing -> Closed 状态机
///
/// 离开 Open 的转换只会成功一次，之后的调用者看到的都是 Closing 或 Closed。
pub struct Teardown {
    state: AtomicU8,
    notify: Notify,
}

impl Teardown {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RelayState::Open as u8),
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 尝试从 Open 进入 Closing，只有第一个调用者返回 true 并负责通知另一方
    pub fn begin_close(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                RelayState::Open as u8,
                RelayState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    fn finish(&self) {
        self.state.store(RelayState::Closed as u8, Ordering::Release);
    }

    /// 等待状态离开 Open
    async fn closing(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // 先登记再检查状态，避免错过通知
        notified.as_mut().enable();
        if self.state() != RelayState::Open {
            return;
        }
        notified.await;
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub upstream: u64,
    pub downstream: u64,
}

/// 一个会话的转发过程
#[derive(Default)]
pub struct Relay {
    teardown: Arc<Teardown>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RelayState {
        self.teardown.state()
    }

    /// 在客户端和隧道之间双向转发，直到任意一个方向结束
    ///
    /// 两个方向各自在独立的任务里运行。先结束的一方把状态切到 Closing 并唤醒另一方；
    /// 每个流的写端只关闭一次，两个任务都退出后流才被释放，状态最终变为 Closed。
    pub async fn run<C, T>(&self, client: C, tunnel: T) -> RelayStats
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (tunnel_read, tunnel_write) = tokio::io::split(tunnel);

        let upstream = tokio::spawn(pump(
            Direction::Upstream,
            client_read,
            tunnel_write,
            self.teardown.clone(),
        ));
        let downstream = tokio::spawn(pump(
            Direction::Downstream,
            tunnel_read,
            client_write,
            self.teardown.clone(),
        ));

        let (upstream, downstream) = tokio::join!(upstream, downstream);
        self.teardown.finish();

        RelayStats {
            upstream: upstream.unwrap_or_else(|e| {
                debug!("转发任务异常退出: {}", e);
                0
            }),
            downstream: downstream.unwrap_or_else(|e| {
                debug!("转发任务异常退出: {}", e);
                0
            }),
        }
    }
}

async fn pump<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    teardown: Arc<Teardown>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; RELAY_BUFFER_LEN];

    tokio::select! {
        result = copy(&mut reader, &mut writer, &mut buf, &mut total) => {
            if let Err(e) = result {
                debug!("{}的数据传输出错: {}", direction, e);
            }
        }
        _ = teardown.closing() => {}
    }

    if teardown.begin_close() {
        debug!("{}的数据传输先结束，关闭连接", direction);
    }

    // 对端已经读到 EOF 或出错，这里的错误不再有意义
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await;
    total
}

async fn copy<R, W>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    total: &mut u64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *total += n as u64;
    }
}
