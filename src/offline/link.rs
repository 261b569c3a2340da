use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{LiveError, Result};

/// Largest frame accepted from the network.
const MAX_FRAME: usize = 64 * 1024;

/// A local broadcast medium carrying encoded frames.
///
/// A frame sent on a link reaches every other device on the same medium.
/// Whether the sender hears its own frame depends on the medium; receivers
/// filter by sender id.
pub trait LocalLink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn send(&self, frame: &str) -> Result<()>;

    /// Stop receiving. Idempotent.
    fn close(&self);
}

/// A link plus the stream of frames it receives.
pub struct OpenedLink {
    pub link: Box<dyn LocalLink>,
    pub frames: UnboundedReceiver<String>,
}

/// Deferred attempt to open one link strategy.
pub type LinkOpener = Box<dyn FnOnce() -> Result<OpenedLink> + Send>;

/// Try each strategy in order and keep the first that opens.
pub fn select_link(candidates: Vec<(&'static str, LinkOpener)>) -> Result<OpenedLink> {
    let mut last_error = None;
    for (name, open) in candidates {
        match open() {
            Ok(opened) => {
                debug!("Local link ready: {}", name);
                return Ok(opened);
            }
            Err(err) => {
                warn!("Local link {} unavailable, trying next: {}", name, err);
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| LiveError::TransportUnavailable("no local link configured".to_string())))
}

struct BusMember {
    id: u64,
    tx: UnboundedSender<String>,
}

#[derive(Default)]
struct BusInner {
    members: Vec<BusMember>,
    next_id: u64,
}

/// Same-host broadcast medium shared between links on one machine.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    inner: Arc<Mutex<BusInner>>,
    unavailable: Arc<AtomicBool>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn connect(&self) -> Result<OpenedLink> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LiveError::TransportUnavailable("loopback bus closed".to_string()));
        }
        let (tx, frames) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.members.push(BusMember { id, tx });
        let link = LoopbackLink {
            id,
            bus: Arc::clone(&self.inner),
        };
        Ok(OpenedLink {
            link: Box::new(link),
            frames,
        })
    }

    /// Opener for [`select_link`].
    pub fn opener(&self) -> LinkOpener {
        let bus = self.clone();
        Box::new(move || bus.connect())
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().members.len()
    }
}

/// One device's attachment to a [`LoopbackBus`]. Does not hear itself.
pub struct LoopbackLink {
    id: u64,
    bus: Arc<Mutex<BusInner>>,
}

impl LocalLink for LoopbackLink {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn send(&self, frame: &str) -> Result<()> {
        let mut inner = self.bus.lock();
        let id = self.id;
        inner
            .members
            .retain(|member| member.id == id || member.tx.send(frame.to_string()).is_ok());
        Ok(())
    }

    fn close(&self) {
        self.bus.lock().members.retain(|member| member.id != self.id);
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// LAN broadcast over UDP.
///
/// Every device binds the same port and sends to the broadcast address, so
/// a device also receives its own frames.
pub struct UdpBroadcastLink {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UdpBroadcastLink {
    /// Bind `port` on all interfaces. Must be called inside a tokio runtime.
    pub fn bind(port: u16) -> Result<OpenedLink> {
        let std_socket = StdUdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        std_socket.set_broadcast(true)?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        let (tx, frames) = mpsc::unbounded_channel();
        let reader_socket = Arc::clone(&socket);
        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_FRAME];
            loop {
                match reader_socket.recv_from(&mut buf).await {
                    Ok((len, _)) => match std::str::from_utf8(&buf[..len]) {
                        Ok(frame) => {
                            if tx.send(frame.to_string()).is_err() {
                                break;
                            }
                        }
                        Err(_) => debug!("Dropping non-UTF-8 frame"),
                    },
                    Err(err) => {
                        warn!("UDP receive failed: {}", err);
                        break;
                    }
                }
            }
        });

        let link = Self {
            socket,
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)),
            reader: Mutex::new(Some(reader)),
        };
        Ok(OpenedLink {
            link: Box::new(link),
            frames,
        })
    }

    pub fn opener(port: u16) -> LinkOpener {
        Box::new(move || Self::bind(port))
    }
}

impl LocalLink for UdpBroadcastLink {
    fn name(&self) -> &'static str {
        "udp-broadcast"
    }

    fn send(&self, frame: &str) -> Result<()> {
        match self.socket.try_send_to(frame.as_bytes(), self.target) {
            Ok(_) => Ok(()),
            Err(err) => Err(LiveError::TransportUnavailable(format!("UDP send failed: {}", err))),
        }
    }

    fn close(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

impl Drop for UdpBroadcastLink {
    fn drop(&mut self) {
        self.close();
    }
}
