//! TCP bindings for the broadcast and collection channels
//!
//! Each accepted connection gets its own task. Publisher connections drain a
//! `broadcast` channel; collector connections decode lines and funnel them
//! into a single bounded `mpsc` queue that only the coordinator loop reads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CollectionChannel, ControlChannel};
use crate::error::HqError;
use crate::protocol::{self, Command, TurretMessage};

/// Commands buffered per subscriber before a slow turret starts missing them
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

async fn bind(channel: &'static str, addr: &str) -> Result<TcpListener, HqError> {
    debug!(channel, addr, "bind: called");
    TcpListener::bind(addr).await.map_err(|source| HqError::Bind {
        channel,
        addr: addr.to_string(),
        source,
    })
}

fn local_addr_of(channel: &'static str, listener: &TcpListener, addr: &str) -> Result<SocketAddr, HqError> {
    listener.local_addr().map_err(|source| HqError::Bind {
        channel,
        addr: addr.to_string(),
        source,
    })
}

/// Publishes control commands to every connected turret
pub struct Publisher {
    tx: broadcast::Sender<Arc<str>>,
    /// Deliveries promised by `broadcast` and not yet written or discarded
    in_flight: Arc<AtomicIsize>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Publisher {
    /// Bind the broadcast channel and start accepting subscribers
    pub async fn bind(addr: &str) -> Result<Self, HqError> {
        Self::bind_with_buffer(addr, DEFAULT_COMMAND_BUFFER).await
    }

    pub async fn bind_with_buffer(addr: &str, buffer: usize) -> Result<Self, HqError> {
        let listener = bind("broadcast", addr).await?;
        let local_addr = local_addr_of("broadcast", &listener, addr)?;
        let (tx, _) = broadcast::channel(buffer.max(1));
        let in_flight = Arc::new(AtomicIsize::new(0));

        let accept_tx = tx.clone();
        let accept_in_flight = in_flight.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Publisher: turret subscribed");
                        let rx = accept_tx.subscribe();
                        tokio::spawn(serve_subscriber(stream, peer, rx, accept_in_flight.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Publisher: accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        });

        info!(%local_addr, "Broadcast channel bound");
        Ok(Self {
            tx,
            in_flight,
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait until every broadcast line has been written to its subscriber
    ///
    /// Used before process exit so the terminal `stop` is not lost with the
    /// runtime. A line counts as delivered once `write_all` returns, or once
    /// its turret has gone away. Gives up after `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        debug!(in_flight = self.in_flight(), queued = self.tx.len(), "Publisher::drain: done");
    }

    fn in_flight(&self) -> isize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl ControlChannel for Publisher {
    fn broadcast(&self, command: &Command) -> usize {
        let line = match protocol::encode_line(command) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = %command.kind, "Publisher: failed to encode command");
                return 0;
            }
        };
        // No subscribers is OK
        let reached = self.tx.send(Arc::from(line)).unwrap_or(0);
        // Subscribers may finish before this lands; the count dips below zero briefly
        self.in_flight.fetch_add(reached as isize, Ordering::AcqRel);
        debug!(kind = %command.kind, reached, "Publisher::broadcast");
        reached
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Forward broadcast lines to one turret until either side goes away
async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Arc<str>>,
    in_flight: Arc<AtomicIsize>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut scratch = [0u8; 256];

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(line) => {
                    let written = write_half.write_all(line.as_bytes()).await;
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    if let Err(e) = written {
                        debug!(%peer, error = %e, "serve_subscriber: write failed, dropping turret");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    in_flight.fetch_sub(missed as isize, Ordering::AcqRel);
                    warn!(%peer, missed, "serve_subscriber: turret lagged, commands skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Turrets never talk on this channel; a read only tells us it hung up
            read = read_half.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    debug!(%peer, "serve_subscriber: turret disconnected");
                    break;
                }
                Ok(_) => {}
            },
        }
    }

    // Whatever is still queued for this turret will never be written
    loop {
        match rx.try_recv() {
            Ok(_) => {
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                in_flight.fetch_sub(missed as isize, Ordering::AcqRel);
            }
            Err(_) => break,
        }
    }
}

/// Collects registration and result messages from every turret
pub struct Collector {
    rx: mpsc::Receiver<TurretMessage>,
    local_addr: SocketAddr,
    rejected: Arc<AtomicU64>,
    accept_task: JoinHandle<()>,
}

impl Collector {
    /// Bind the collection channel and start accepting turrets
    pub async fn bind(addr: &str, max_message_size: usize, queue_capacity: usize) -> Result<Self, HqError> {
        let listener = bind("collection", addr).await?;
        let local_addr = local_addr_of("collection", &listener, addr)?;
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rejected = Arc::new(AtomicU64::new(0));

        let accept_rejected = rejected.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Collector: turret connected");
                        tokio::spawn(serve_sender(
                            stream,
                            peer,
                            tx.clone(),
                            max_message_size,
                            accept_rejected.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Collector: accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        });

        info!(%local_addr, "Collection channel bound");
        Ok(Self {
            rx,
            local_addr,
            rejected,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Lines dropped at the boundary because they failed to decode or validate
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CollectionChannel for Collector {
    async fn poll(&mut self, wait: Duration) -> Result<Option<TurretMessage>, HqError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(HqError::Transport("collection queue closed".to_string())),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Decode lines from one turret into the shared queue
async fn serve_sender(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<TurretMessage>,
    max_message_size: usize,
    rejected: Arc<AtomicU64>,
) {
    let mut reader = BufReader::new(stream);

    loop {
        let decoded = match protocol::read_line(&mut reader, max_message_size).await {
            Ok(Some(line)) => protocol::decode_message(&line),
            Ok(None) => {
                debug!(%peer, "serve_sender: turret disconnected");
                break;
            }
            Err(e) => Err(e),
        };

        match decoded {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    debug!(%peer, "serve_sender: collector gone");
                    break;
                }
            }
            Err(e) if e.is_recoverable() => {
                rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %e, "serve_sender: dropped malformed message");
            }
            Err(e) => {
                rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %e, "serve_sender: dropping connection");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandKind, Registration, StopReason, TurretStatus};
    use tokio::io::AsyncBufReadExt;

    async fn wait_for_subscribers(publisher: &Publisher, count: usize) {
        for _ in 0..200 {
            if publisher.subscriber_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscribers never reached {}", count);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let publisher = Publisher::bind("127.0.0.1:0").await.unwrap();
        let addr = publisher.local_addr().to_string();

        let result = Collector::bind(&addr, 1024, 16).await;
        assert!(matches!(result, Err(HqError::Bind { channel: "collection", .. })));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let publisher = Publisher::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.broadcast(&Command::status_request()), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let publisher = Publisher::bind("127.0.0.1:0").await.unwrap();
        let addr = publisher.local_addr();

        let first = TcpStream::connect(addr).await.unwrap();
        let second = TcpStream::connect(addr).await.unwrap();
        wait_for_subscribers(&publisher, 2).await;

        assert_eq!(publisher.broadcast(&Command::start()), 2);

        for stream in [first, second] {
            let mut lines = tokio::io::BufReader::new(stream).lines();
            let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let cmd = protocol::decode_command(&line).unwrap();
            assert_eq!(cmd.kind, CommandKind::Start);
        }
    }

    #[tokio::test]
    async fn test_collector_forwards_valid_and_drops_malformed() {
        let mut collector = Collector::bind("127.0.0.1:0", 1024, 16).await.unwrap();
        let mut stream = TcpStream::connect(collector.local_addr()).await.unwrap();

        let reg = TurretMessage::Registration(Registration {
            turret: "nav".to_string(),
            status: TurretStatus::Ready,
            uuid: "u1".to_string(),
        });
        stream.write_all(b"this is not json\n").await.unwrap();
        stream.write_all(b"{\"turret\":\"nav\",\"status\":\"ready\",\"uuid\":\"u2\"}\n").await.unwrap();
        protocol::send_message(&mut stream, &reg).await.unwrap();

        let received = collector.poll(Duration::from_secs(2)).await.unwrap();
        assert_eq!(received, Some(reg));
        assert_eq!(collector.rejected_count(), 2);
    }

    #[tokio::test]
    async fn test_collector_survives_non_utf8_line() {
        let mut collector = Collector::bind("127.0.0.1:0", 1024, 16).await.unwrap();
        let mut stream = TcpStream::connect(collector.local_addr()).await.unwrap();

        let reg = TurretMessage::Registration(Registration {
            turret: "nav".to_string(),
            status: TurretStatus::Ready,
            uuid: "u1".to_string(),
        });
        stream.write_all(b"\xff\xfe garbage\n").await.unwrap();
        protocol::send_message(&mut stream, &reg).await.unwrap();

        let received = collector.poll(Duration::from_secs(2)).await.unwrap();
        assert_eq!(received, Some(reg));
        assert_eq!(collector.rejected_count(), 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_written_stop() {
        let publisher = Publisher::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(publisher.local_addr()).await.unwrap();
        wait_for_subscribers(&publisher, 1).await;

        assert_eq!(publisher.broadcast(&Command::stop(StopReason::Completed)), 1);
        publisher.drain(Duration::from_secs(2)).await;
        assert_eq!(publisher.in_flight(), 0);

        let mut lines = tokio::io::BufReader::new(stream).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(protocol::decode_command(&line).unwrap().kind, CommandKind::Stop);
    }

    #[tokio::test]
    async fn test_drain_does_not_wait_for_departed_turret() {
        let publisher = Publisher::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(publisher.local_addr()).await.unwrap();
        wait_for_subscribers(&publisher, 1).await;
        drop(stream);

        publisher.broadcast(&Command::start());
        let started = std::time::Instant::now();
        publisher.drain(Duration::from_secs(10)).await;

        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
        assert_eq!(publisher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_collector_poll_times_out_empty() {
        let mut collector = Collector::bind("127.0.0.1:0", 1024, 16).await.unwrap();
        let received = collector.poll(Duration::from_millis(20)).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_collector_drops_oversized_connection() {
        let mut collector = Collector::bind("127.0.0.1:0", 32, 16).await.unwrap();
        let mut stream = TcpStream::connect(collector.local_addr()).await.unwrap();

        let huge = format!("{}\n", "x".repeat(128));
        stream.write_all(huge.as_bytes()).await.unwrap();

        let received = collector.poll(Duration::from_millis(200)).await.unwrap();
        assert!(received.is_none());
        assert_eq!(collector.rejected_count(), 1);
    }
}
