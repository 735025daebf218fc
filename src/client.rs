// (c) 2025 peerlink developers

//! The peer client
//!
//! A [`Client`] owns the executor (a single-worker tokio runtime, mirroring
//! the one-driver-thread-per-peer topology), a dispatch thread that drains
//! the shared inbound queue into user-registered handlers, and at most one
//! live [`Connection`]. The two peers of a link are symmetric: one
//! [`seeks`](Client::seek) (binds and waits), the other
//! [`connects`](Client::connect) (dials the advertised endpoints).
//!
//! Handlers are registered per message type, before connecting:
//!
//! ```no_run
//! use peerlink::{Client, MessageSet, Settings};
//!
//! #[derive(Clone, Copy)]
//! #[repr(u16)]
//! enum Message {
//!     Chat = 0,
//! }
//! impl MessageSet for Message {
//!     const COUNT: u16 = 1;
//!     fn to_wire(self) -> u16 {
//!         self as u16
//!     }
//!     fn from_wire(value: u16) -> Option<Self> {
//!         (value == 0).then_some(Message::Chat)
//!     }
//! }
//!
//! let client: Client<Message> = Client::new(Settings::default()).unwrap();
//! client.add_handler(Message::Chat, |mut package_in| {
//!     let text: String = package_in.package.read().unwrap();
//!     println!("peer says: {text}");
//! });
//! client.connect("192.168.1.20".parse().unwrap(), [50000, 50001], || {}).unwrap();
//! client.send(Message::Chat, ("hello".to_string(),)).unwrap();
//! ```

use std::io;
use std::marker::PhantomData;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{ClientMode, Settings};
use crate::connection::tls::{self, TlsMaterial};
use crate::connection::{Connection, ConnectionState, SharedInbound, Transport};
use crate::protocol::package::Package;
use crate::protocol::wire::{WireArgs, WireError};
use crate::protocol::MessageSet;
use crate::sync::queue::InboundQueue;
use crate::util::{self, Credentials, UniqueNameGenerator};

pub use crate::connection::PackageIn;

type Handler = Box<dyn Fn(PackageIn) + Send + Sync>;
type HandlerTable = Arc<RwLock<Vec<Option<Handler>>>>;

/// Polling interval of the dispatch thread; also bounds how long `Drop`
/// waits for it.
const DISPATCH_PARK: Duration = Duration::from_millis(100);

/// One endpoint of the peer-to-peer transport. See the [module docs](self).
pub struct Client<M: MessageSet> {
    settings: Arc<Settings>,
    mode: Mutex<ClientMode>,

    runtime: Option<tokio::runtime::Runtime>,
    handle: tokio::runtime::Handle,
    worker_stop: Arc<AtomicBool>,
    dispatch: Option<std::thread::JoinHandle<()>>,

    inbound: SharedInbound,
    connection: RwLock<Option<Connection>>,
    handlers: HandlerTable,

    tls: Mutex<Option<TlsMaterial>>,
    names: Mutex<Option<UniqueNameGenerator>>,

    _marker: PhantomData<M>,
}

impl<M: MessageSet> Client<M> {
    /// Constructs an idle client: runtime and dispatch thread running, no
    /// connection yet.
    ///
    /// # Errors
    /// Runtime or thread creation failures.
    pub fn new(settings: Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("peerlink-driver")
            .enable_all()
            .build()
            .context("building the connection runtime")?;
        let handle = runtime.handle().clone();

        let inbound: SharedInbound = Arc::new(InboundQueue::new());
        let mut table: Vec<Option<Handler>> = Vec::new();
        table.resize_with(usize::from(M::COUNT), || None);
        let handlers: HandlerTable = Arc::new(RwLock::new(table));
        let worker_stop = Arc::new(AtomicBool::new(false));

        let dispatch = {
            let inbound = Arc::clone(&inbound);
            let handlers = Arc::clone(&handlers);
            let stop = Arc::clone(&worker_stop);
            std::thread::Builder::new()
                .name("peerlink-dispatch".to_string())
                .spawn(move || dispatch_loop::<M>(&inbound, &handlers, &stop))
                .context("spawning the dispatch thread")?
        };

        let mode = settings.mode;
        Ok(Self {
            settings: Arc::new(settings),
            mode: Mutex::new(mode),
            runtime: Some(runtime),
            handle,
            worker_stop,
            dispatch: Some(dispatch),
            inbound,
            connection: RwLock::new(None),
            handlers,
            tls: Mutex::new(None),
            names: Mutex::new(None),
            _marker: PhantomData,
        })
    }

    /// Selects the transport for connections made after this call.
    pub fn set_mode(&self, mode: ClientMode) {
        *self.mode.lock() = mode;
    }

    #[must_use]
    pub fn mode(&self) -> ClientMode {
        *self.mode.lock()
    }

    /// Registers the handler invoked (on the dispatch thread) for every
    /// inbound package of `message_type`. Replaces any previous handler.
    pub fn add_handler(
        &self,
        message_type: M,
        handler: impl Fn(PackageIn) + Send + Sync + 'static,
    ) {
        let index = usize::from(message_type.to_wire());
        if let Some(slot) = self.handlers.write().get_mut(index) {
            *slot = Some(Box::new(handler));
        } else {
            warn!("handler index {index} is outside the message set; ignored");
        }
    }

    /// Dials a seeking peer at `address`/`ports`.
    ///
    /// # Errors
    /// TLS material problems (certificate generation or parsing). Network
    /// failures are reported asynchronously as a transition back to
    /// [`ConnectionState::Disconnected`].
    pub fn connect(
        &self,
        address: IpAddr,
        ports: [u16; 2],
        on_connected: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let connection = self.new_connection()?;
        connection.start(address, ports, on_connected);
        Ok(())
    }

    /// Binds acceptors on `address` (port 0 = ephemeral) and waits to be
    /// dialed. `on_listening` receives the bound endpoints, for advertising
    /// to the prospective peer.
    ///
    /// # Errors
    /// As [`connect`](Self::connect).
    pub fn seek(
        &self,
        address: IpAddr,
        ports: [u16; 2],
        on_listening: impl FnOnce(IpAddr, [u16; 2]) + Send + 'static,
        on_connected: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let connection = self.new_connection()?;
        connection.seek(address, ports, on_listening, on_connected);
        Ok(())
    }

    /// [`seek`](Self::seek) on this host's private IPv4 address with
    /// ephemeral ports. Fails soft when the host has no private IPv4: logs
    /// and returns without seeking.
    ///
    /// # Errors
    /// As [`connect`](Self::connect).
    pub fn seek_local(
        &self,
        on_listening: impl FnOnce(IpAddr, [u16; 2]) + Send + 'static,
        on_connected: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let Some(address) = util::addr::private_ipv4() else {
            warn!("no private IPv4 address found; not seeking a local connection");
            return Ok(());
        };
        self.seek(IpAddr::V4(address), [0, 0], on_listening, on_connected)
    }

    /// Builds a package from `message_type` and `args` and queues it on the
    /// message channel.
    ///
    /// # Errors
    /// [`WireError::SizeOverflow`] if the arguments exceed the body size
    /// field.
    pub fn send(&self, message_type: M, args: impl WireArgs) -> Result<(), WireError> {
        let package = Package::new(message_type.to_wire(), args)?;
        self.send_package(package);
        Ok(())
    }

    /// Queues an already-built package on the message channel.
    pub fn send_package(&self, package: Package) {
        if let Some(connection) = self.connection.read().as_ref() {
            connection.send(package);
        } else {
            warn!("send with no connection; package dropped");
        }
    }

    /// Asks the peer for `source_path` (a path on *its* filesystem), to be
    /// stored as `destination` under this client's download directory.
    pub fn request_file(&self, source_path: impl Into<String>, destination: impl Into<String>) {
        if let Some(connection) = self.connection.read().as_ref() {
            connection.request_file(source_path, destination);
        } else {
            warn!("file request with no connection; dropped");
        }
    }

    /// As [`request_file`](Self::request_file), with the destination name
    /// drawn from the unique-name generator. Returns the chosen name.
    ///
    /// # Errors
    /// Filesystem failures operating the generator's counter file.
    pub fn request_file_auto(&self, source_path: impl Into<String>) -> io::Result<String> {
        let name = {
            let mut names = self.names.lock();
            match &mut *names {
                Some(generator) => generator.next_name()?,
                slot @ None => {
                    let generator = UniqueNameGenerator::new(
                        &self.settings.download_directory,
                        "received_",
                        "",
                    )?;
                    let name = generator.next_name()?;
                    *slot = Some(generator);
                    name
                }
            }
        };
        self.request_file(source_path, name.clone());
        Ok(name)
    }

    /// Tears down the current connection, if any. Idempotent.
    pub fn disconnect(&self) {
        if let Some(connection) = self.connection.read().as_ref() {
            connection.disconnect();
        }
    }

    /// State of the current connection; `Disconnected` when there is none.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection
            .read()
            .as_ref()
            .map_or(ConnectionState::Disconnected, Connection::state)
    }

    /// Advertised address of the current connection (see
    /// [`Connection::address`]).
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.connection.read().as_ref().and_then(Connection::address)
    }

    /// Advertised ports of the current connection.
    #[must_use]
    pub fn ports(&self) -> Option<[u16; 2]> {
        self.connection.read().as_ref().and_then(Connection::ports)
    }

    fn new_connection(&self) -> Result<Connection> {
        let transport = match self.mode() {
            ClientMode::Tcp => Transport::Tcp,
            ClientMode::Tls => Transport::Tls(self.tls_material()?),
        };
        let connection = Connection::new(
            self.handle.clone(),
            transport,
            Arc::clone(&self.settings),
            Arc::clone(&self.inbound),
            Arc::clone(&self.worker_stop),
        );
        *self.connection.write() = Some(connection.clone());
        Ok(connection)
    }

    /// Builds (once) and clones the TLS connector/acceptor pair,
    /// synthesizing a certificate in the configured directory if needed.
    fn tls_material(&self) -> Result<TlsMaterial> {
        let mut cached = self.tls.lock();
        if let Some(material) = cached.as_ref() {
            return Ok(material.clone());
        }
        let credentials = Credentials::load_or_generate(&self.settings.certificate_directory)?;
        let material = tls::build_material(&credentials)?;
        *cached = Some(material.clone());
        Ok(material)
    }
}

impl<M: MessageSet> Drop for Client<M> {
    fn drop(&mut self) {
        self.disconnect();
        self.worker_stop.store(true, Ordering::Release);
        if let Some(thread) = self.dispatch.take() {
            let _ = thread.join();
        }
        if let Some(runtime) = self.runtime.take() {
            // Cannot block on worker teardown here: drop may run inside an
            // async context.
            runtime.shutdown_background();
        }
    }
}

fn dispatch_loop<M: MessageSet>(
    inbound: &SharedInbound,
    handlers: &HandlerTable,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(package_in) = inbound.pop_timeout(DISPATCH_PARK) else {
            continue;
        };
        let wire_type = package_in.package.package_type();
        if M::from_wire(wire_type).is_none() {
            warn!("dropping package with unknown message type {wire_type}");
            continue;
        }
        let table = handlers.read();
        if let Some(Some(handler)) = table.get(usize::from(wire_type)) {
            handler(package_in);
        } else {
            debug!("no handler registered for message type {wire_type}");
        }
    }
}
