// (c) 2025 peerlink developers

//! The dual-stream connection state machine
//!
//! A [`Connection`] owns two sockets (the *message* channel and the *file*
//! channel, plain TCP or TLS-wrapped) and four cooperative tasks that
//! service them. Exactly one task reads and one task writes each socket;
//! that single-reader/single-writer discipline is an invariant enforced by
//! ownership of the split stream halves.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ─start/seek─▶ Connecting ─established─▶ Connected
//!       ▲                        │ setup failure           │ disconnect,
//!       │                        ▼                         ▼ peer EOF, error
//!       └──────────────── Disconnected ◀─tasks drained─ Disconnecting
//! ```
//!
//! `start`/`seek` on a connection that is not `Disconnected` logs an error
//! and does nothing. Observable states are monotone through one pass of the
//! diagram; the terminal state is always `Disconnected` with every flag
//! signalled so parked tasks unblock and observe it.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::protocol::file::FileRequest;
use crate::protocol::package::Package;
use crate::sync::flag::AwaitFlag;
use crate::sync::map::ConcurrentMap;
use crate::sync::queue::InboundQueue;

mod setup;
mod tasks;
pub(crate) mod tls;

/// Connection lifecycle states. See the [module docs](self) for the
/// transition diagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Transport variant for a connection.
pub(crate) enum Transport {
    Tcp,
    Tls(tls::TlsMaterial),
}

/// An inbound non-file package paired with the connection it arrived on, so
/// handlers can reply directly.
pub struct PackageIn {
    pub package: Package,
    pub connection: Connection,
}

pub(crate) type SharedInbound = Arc<InboundQueue<PackageIn>>;

/// Handle to a dual-stream connection. Cheap to clone; the underlying
/// connection is destroyed when the last handle and the last of its four
/// tasks are gone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    runtime: tokio::runtime::Handle,
    transport: Transport,
    settings: Arc<Settings>,
    inbound: SharedInbound,

    state: AtomicU8,
    /// Count of I/O tasks still running; the last one out performs the final
    /// transition to `Disconnected`.
    live_tasks: AtomicUsize,

    out_queue: Mutex<VecDeque<Package>>,
    file_request_queue: Mutex<VecDeque<Package>>,
    file_info_queue: Mutex<VecDeque<Package>>,

    send_message_flag: AwaitFlag,
    send_file_flag: AwaitFlag,
    receive_file_flag: AwaitFlag,
    /// One-shot per session; re-armed by the next `start`/`seek`.
    shutdown: AwaitFlag,

    pending_files: ConcurrentMap<u64, String>,
    next_request_id: AtomicU64,

    endpoints: Mutex<Option<(IpAddr, [u16; 2])>>,
    worker_stop: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn new(
        runtime: tokio::runtime::Handle,
        transport: Transport,
        settings: Arc<Settings>,
        inbound: SharedInbound,
        worker_stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                runtime,
                transport,
                settings,
                inbound,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                live_tasks: AtomicUsize::new(0),
                out_queue: Mutex::new(VecDeque::new()),
                file_request_queue: Mutex::new(VecDeque::new()),
                file_info_queue: Mutex::new(VecDeque::new()),
                send_message_flag: AwaitFlag::new(),
                send_file_flag: AwaitFlag::new(),
                receive_file_flag: AwaitFlag::new(),
                shutdown: AwaitFlag::new(),
                pending_files: ConcurrentMap::new(),
                next_request_id: AtomicU64::new(0),
                endpoints: Mutex::new(None),
                worker_stop,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    /// Dials a peer that is seeking on `address`/`ports` (`[0]` = message
    /// channel, `[1]` = file channel). On success the four I/O tasks are
    /// spawned and `on_connected` is invoked. A connection that is not
    /// `Disconnected` logs an error and ignores the call.
    pub fn start(&self, address: IpAddr, ports: [u16; 2], on_connected: impl FnOnce() + Send + 'static) {
        if !self
            .inner
            .try_transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            error!("connection already started");
            return;
        }
        self.inner.shutdown.reset();
        let inner = Arc::clone(&self.inner);
        let _task = self.inner.runtime.spawn(async move {
            match setup::dial(&inner, address, ports).await {
                Ok(true) => on_connected(),
                Ok(false) => {
                    debug!("connection setup abandoned");
                    inner.fail_setup();
                }
                Err(e) => {
                    error!("connection setup failed: {e:#}");
                    inner.fail_setup();
                }
            }
        });
    }

    /// Binds local acceptors on `address`/`ports` (0 = ephemeral) and waits
    /// to be dialed. Once both acceptors are bound, `on_listening` is
    /// invoked with the actual bound endpoints so the peer can advertise
    /// them. A connection that is not `Disconnected` logs an error and
    /// ignores the call.
    pub fn seek(
        &self,
        address: IpAddr,
        ports: [u16; 2],
        on_listening: impl FnOnce(IpAddr, [u16; 2]) + Send + 'static,
        on_connected: impl FnOnce() + Send + 'static,
    ) {
        if !self
            .inner
            .try_transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            error!("connection already started");
            return;
        }
        self.inner.shutdown.reset();
        let inner = Arc::clone(&self.inner);
        let _task = self.inner.runtime.spawn(async move {
            match setup::listen(&inner, address, ports, on_listening).await {
                Ok(true) => on_connected(),
                Ok(false) => {
                    debug!("connection setup abandoned");
                    inner.fail_setup();
                }
                Err(e) => {
                    error!("connection setup failed: {e:#}");
                    inner.fail_setup();
                }
            }
        });
    }

    /// Queues a package on the message channel. FIFO per connection.
    pub fn send(&self, package: Package) {
        self.inner.enqueue_out(package);
    }

    /// Requests `source_path` from the peer, to be written as `destination`
    /// (a bare filename) under the configured download directory.
    pub fn request_file(&self, source_path: impl Into<String>, destination: impl Into<String>) {
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .pending_files
            .insert_or_assign(request_id, destination.into());
        let request = FileRequest {
            request_id,
            source_path: source_path.into(),
        };
        match request.into_package() {
            Ok(package) => self.send(package),
            Err(e) => warn!("could not encode file request: {e}"),
        }
    }

    /// Tears the connection down. Idempotent; safe to call from any thread,
    /// any number of times, including from package handlers.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// [`disconnect`](Self::disconnect), plus instructs the owning client's
    /// worker threads to stop.
    pub fn destroy(&self) {
        self.inner.disconnect();
        self.inner.worker_stop.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// The connection's address: the bound local address after `seek`, the
    /// peer's address after `start`.
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.inner.endpoints.lock().map(|(addr, _)| addr)
    }

    /// The connection's ports, same orientation as [`address`](Self::address).
    #[must_use]
    pub fn ports(&self) -> Option<[u16; 2]> {
        self.inner.endpoints.lock().map(|(_, ports)| ports)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("endpoints", &*self.inner.endpoints.lock())
            .finish_non_exhaustive()
    }
}

impl ConnectionInner {
    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn try_transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn enqueue_out(&self, package: Package) {
        self.out_queue.lock().push_back(package);
        self.send_message_flag.signal();
    }

    pub(crate) fn set_endpoints(&self, address: IpAddr, ports: [u16; 2]) {
        *self.endpoints.lock() = Some((address, ports));
    }

    /// Terminal path for a failed or abandoned setup: no tasks were spawned,
    /// so the state can fall straight back to `Disconnected`.
    fn fail_setup(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.wake_all();
    }

    pub(crate) fn disconnect(&self) {
        // Only the first caller performs the transition; everyone signals.
        if self.try_transition(ConnectionState::Connected, ConnectionState::Disconnecting)
            || self.try_transition(ConnectionState::Connecting, ConnectionState::Disconnecting)
        {
            info!("disconnecting");
        }
        if self.state() == ConnectionState::Disconnecting
            && self.live_tasks.load(Ordering::Acquire) == 0
        {
            // Nothing to wind down: either setup is still in flight (it will
            // observe the shutdown flag and bail out) or it never began.
            self.set_state(ConnectionState::Disconnected);
        }
        self.shutdown.signal();
        self.wake_all();
    }

    /// Called by each I/O task as it exits; the last one completes the
    /// transition to `Disconnected`.
    fn task_exited(&self) {
        if self.live_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.set_state(ConnectionState::Disconnected);
            info!("disconnected");
            self.wake_all();
        }
    }

    fn wake_all(&self) {
        self.send_message_flag.signal();
        self.send_file_flag.signal();
        self.receive_file_flag.signal();
    }
}

/// Races an I/O future against the connection's shutdown flag.
/// `Ok(None)` means the shutdown won; the caller should exit cleanly.
pub(crate) async fn guarded<T>(
    inner: &ConnectionInner,
    operation: impl Future<Output = io::Result<T>>,
) -> anyhow::Result<Option<T>> {
    tokio::select! {
        biased;
        () = inner.shutdown.wait() => Ok(None),
        result = operation => Ok(Some(result?)),
    }
}

/// The benign-peer-shutdown error set: expected ways for the far end (or our
/// own close) to interrupt an in-flight operation. Logged at info, not error.
/// A missing TLS `close_notify` surfaces as `UnexpectedEof` here.
pub(crate) fn is_benign_disconnect(error: &io::Error) -> bool {
    use io::ErrorKind::{
        BrokenPipe, ConnectionAborted, ConnectionReset, NotConnected, UnexpectedEof,
    };
    matches!(
        error.kind(),
        UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe | NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::{Connection, ConnectionState, PackageIn, SharedInbound, Transport};
    use crate::config::Settings;
    use crate::protocol::package::Package;
    use crate::sync::queue::InboundQueue;
    use pretty_assertions::assert_eq;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn test_connection_on(inbound: SharedInbound) -> Connection {
        Connection::new(
            tokio::runtime::Handle::current(),
            Transport::Tcp,
            Arc::new(Settings::default()),
            inbound,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn test_connection() -> Connection {
        test_connection_on(Arc::new(InboundQueue::new()))
    }

    async fn wait_for_state(connection: &Connection, wanted: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while connection.state() != wanted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for {wanted}, currently {}",
                connection.state()
            );
        });
    }

    #[tokio::test]
    async fn fresh_connection_is_disconnected() {
        let connection = test_connection();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.address(), None);
        assert_eq!(connection.ports(), None);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_when_idle() {
        let connection = test_connection();
        connection.disconnect();
        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seek_then_start_connects_and_disconnects() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let seeker = test_connection();
        let dialer = test_connection();

        let (tx, rx) = mpsc::channel();
        seeker.seek(
            loopback,
            [0, 0],
            move |addr, ports| {
                let _ = tx.send((addr, ports));
            },
            || {},
        );
        let (addr, ports) = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(addr, loopback);
        assert_ne!(ports[0], 0);
        assert_ne!(ports[1], 0);
        assert_eq!(seeker.ports(), Some(ports));

        dialer.start(addr, ports, || {});
        wait_for_state(&seeker, ConnectionState::Connected).await;
        wait_for_state(&dialer, ConnectionState::Connected).await;

        // A second start while connected is rejected without a state change.
        dialer.start(addr, ports, || panic!("must not connect twice"));
        assert_eq!(dialer.state(), ConnectionState::Connected);

        dialer.disconnect();
        wait_for_state(&dialer, ConnectionState::Disconnected).await;
        wait_for_state(&seeker, ConnectionState::Disconnected).await;

        // Repeated disconnects remain no-ops.
        dialer.disconnect();
        seeker.disconnect();
        assert_eq!(dialer.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn packages_reach_the_peer_inbound_queue() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let seeker_inbound: SharedInbound = Arc::new(InboundQueue::new());
        let seeker = test_connection_on(Arc::clone(&seeker_inbound));
        let dialer = test_connection();

        let (tx, rx) = mpsc::channel();
        seeker.seek(
            loopback,
            [0, 0],
            move |addr, ports| {
                let _ = tx.send((addr, ports));
            },
            || {},
        );
        let (addr, ports) = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        dialer.start(addr, ports, || {});
        wait_for_state(&dialer, ConnectionState::Connected).await;

        dialer.send(Package::new(1, ("hi".to_string(), 7u32)).unwrap());

        let mut delivered: Option<PackageIn> = None;
        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if let Some(package_in) = seeker_inbound.try_pop() {
                    delivered = Some(package_in);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        let mut delivered = delivered.expect("package should arrive");
        assert_eq!(delivered.package.package_type(), 1);
        assert_eq!(delivered.package.read::<String>().unwrap(), "hi");
        assert_eq!(delivered.package.read::<u32>().unwrap(), 7);
        assert_eq!(delivered.connection.state(), ConnectionState::Connected);

        dialer.disconnect();
        drop(delivered);
        wait_for_state(&seeker, ConnectionState::Disconnected).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_during_seek_aborts_setup() {
        let connection = test_connection();
        connection.seek(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            [0, 0],
            |_, _| {},
            || panic!("never establishes"),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.disconnect();
        wait_for_state(&connection, ConnectionState::Disconnected).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dial_failure_returns_to_disconnected() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        // Grab a port with no listener behind it.
        let listener = std::net::TcpListener::bind((loopback, 0)).unwrap();
        let dead_port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = test_connection();
        connection.start(loopback, [dead_port, dead_port], || {
            panic!("must not connect");
        });
        wait_for_state(&connection, ConnectionState::Disconnected).await;
    }
}
