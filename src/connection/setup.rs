// (c) 2025 peerlink developers

//! Connection establishment: dial and accept paths
//!
//! Both transports follow the same choreography. Dialing connects the
//! message socket first (completing its TLS handshake, if any), then the
//! file socket, then its handshake. Accepting mirrors that order, which is
//! what makes the TLS variant deadlock-free: the dialer's message handshake
//! completes against the acceptor's before either side touches the file
//! socket. Both sockets must succeed or the whole attempt fails.

use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::{guarded, tasks, ConnectionInner, ConnectionState, Transport};

/// Actively connects to a seeking peer. `Ok(false)` means the attempt was
/// abandoned because the connection was shut down mid-setup.
pub(super) async fn dial(
    inner: &Arc<ConnectionInner>,
    address: IpAddr,
    ports: [u16; 2],
) -> Result<bool> {
    debug!("dialing {address} ports {ports:?}");
    match &inner.transport {
        Transport::Tcp => {
            let Some(message) = guarded(inner, TcpStream::connect((address, ports[0]))).await?
            else {
                return Ok(false);
            };
            let Some(file_stream) = guarded(inner, TcpStream::connect((address, ports[1]))).await?
            else {
                return Ok(false);
            };
            inner.set_endpoints(address, ports);
            info!("established TCP connection to {address}:{}, {address}:{}", ports[0], ports[1]);
            launch(inner, message.into_split(), file_stream.into_split())
        }
        Transport::Tls(material) => {
            let server_name = ServerName::IpAddress(address.into());
            let Some(message) = guarded(inner, TcpStream::connect((address, ports[0]))).await?
            else {
                return Ok(false);
            };
            let Some(message) =
                guarded(inner, material.connector.connect(server_name.clone(), message)).await?
            else {
                return Ok(false);
            };
            let Some(file_stream) = guarded(inner, TcpStream::connect((address, ports[1]))).await?
            else {
                return Ok(false);
            };
            let Some(file_stream) =
                guarded(inner, material.connector.connect(server_name, file_stream)).await?
            else {
                return Ok(false);
            };
            inner.set_endpoints(address, ports);
            info!("established TLS connection to {address}:{}, {address}:{}", ports[0], ports[1]);
            launch(inner, tokio::io::split(message), tokio::io::split(file_stream))
        }
    }
}

/// Binds both acceptors (`0` = ephemeral), reports the bound endpoints via
/// `on_listening`, then awaits one inbound connection per channel.
pub(super) async fn listen(
    inner: &Arc<ConnectionInner>,
    address: IpAddr,
    ports: [u16; 2],
    on_listening: impl FnOnce(IpAddr, [u16; 2]) + Send,
) -> Result<bool> {
    let message_listener = TcpListener::bind((address, ports[0])).await?;
    let file_listener = TcpListener::bind((address, ports[1])).await?;
    let local = message_listener.local_addr()?;
    let bound_ports = [local.port(), file_listener.local_addr()?.port()];
    inner.set_endpoints(local.ip(), bound_ports);
    info!(
        "seeking a connection on {}:{}, {}:{}",
        local.ip(),
        bound_ports[0],
        local.ip(),
        bound_ports[1]
    );
    on_listening(local.ip(), bound_ports);

    let Some((message, peer)) = guarded(inner, message_listener.accept()).await? else {
        return Ok(false);
    };
    match &inner.transport {
        Transport::Tcp => {
            let Some((file_stream, _)) = guarded(inner, file_listener.accept()).await? else {
                return Ok(false);
            };
            info!("accepted TCP connection from {peer}");
            launch(inner, message.into_split(), file_stream.into_split())
        }
        Transport::Tls(material) => {
            let Some(message) = guarded(inner, material.acceptor.accept(message)).await? else {
                return Ok(false);
            };
            let Some((file_stream, _)) = guarded(inner, file_listener.accept()).await? else {
                return Ok(false);
            };
            let Some(file_stream) = guarded(inner, material.acceptor.accept(file_stream)).await?
            else {
                return Ok(false);
            };
            info!("accepted TLS connection from {peer}");
            launch(inner, tokio::io::split(message), tokio::io::split(file_stream))
        }
    }
}

/// Marks the connection established and spawns the four I/O tasks, each
/// owning its half of its socket. `Ok(false)` if a concurrent disconnect
/// won the race.
fn launch<MR, MW, FR, FW>(
    inner: &Arc<ConnectionInner>,
    message: (MR, MW),
    file_stream: (FR, FW),
) -> Result<bool>
where
    MR: AsyncRead + Unpin + Send + 'static,
    MW: AsyncWrite + Unpin + Send + 'static,
    FR: AsyncRead + Unpin + Send + 'static,
    FW: AsyncWrite + Unpin + Send + 'static,
{
    inner.live_tasks.store(4, Ordering::Release);
    if !inner.try_transition(ConnectionState::Connecting, ConnectionState::Connected) {
        inner.live_tasks.store(0, Ordering::Release);
        return Ok(false);
    }

    let (message_reader, message_writer) = message;
    let (file_reader, file_writer) = file_stream;
    let _ = inner
        .runtime
        .spawn(tasks::receive_message(Arc::clone(inner), message_reader));
    let _ = inner
        .runtime
        .spawn(tasks::send_message(Arc::clone(inner), message_writer));
    let _ = inner
        .runtime
        .spawn(tasks::receive_file(Arc::clone(inner), file_reader));
    let _ = inner
        .runtime
        .spawn(tasks::send_file(Arc::clone(inner), file_writer));
    Ok(true)
}
