// (c) 2025 peerlink developers

//! The four per-connection I/O tasks
//!
//! * **receive-message** reads frames off the message socket, routing
//!   file-protocol packages to their internal deques and everything else to
//!   the shared inbound queue;
//! * **send-message** drains the outbound queue FIFO onto the message
//!   socket;
//! * **receive-file** consumes routed `file_receive_info` packages and pulls
//!   the announced bytes off the file socket into the download directory;
//! * **send-file** consumes routed `file_request` packages, announces the
//!   size on the message channel, and streams the source file's bytes.
//!
//! Each task is generic over its stream half, so the TCP and TLS transports
//! share every line of this logic. Every task has a single failure envelope:
//! run to completion, classify on failure, then disconnect. Benign peer
//! shutdowns (the EOF/reset family) log at info; anything else logs at error
//! unless the connection is already on its way down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, error, info, warn};

use crate::protocol::file::{FileInfo, FileRequest};
use crate::protocol::package::{Package, PackageHeader};

use super::{guarded, is_benign_disconnect, Connection, ConnectionInner, ConnectionState, PackageIn};

pub(super) async fn receive_message<R>(inner: Arc<ConnectionInner>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let result = receive_message_loop(&inner, &mut reader).await;
    conclude(&inner, "receive-message", result);
}

pub(super) async fn send_message<W>(inner: Arc<ConnectionInner>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let result = send_message_loop(&inner, &mut writer).await;
    close_writer(&mut writer).await;
    conclude(&inner, "send-message", result);
}

pub(super) async fn receive_file<R>(inner: Arc<ConnectionInner>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let result = receive_file_loop(&inner, &mut reader).await;
    conclude(&inner, "receive-file", result);
}

pub(super) async fn send_file<W>(inner: Arc<ConnectionInner>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let result = send_file_loop(&inner, &mut writer).await;
    close_writer(&mut writer).await;
    conclude(&inner, "send-file", result);
}

/// Common exit envelope: classify, disconnect, account.
fn conclude(inner: &Arc<ConnectionInner>, task: &str, result: Result<()>) {
    match result {
        Ok(()) => debug!("{task} task finished"),
        Err(e) => classify_failure(inner, task, &e),
    }
    inner.disconnect();
    inner.task_exited();
}

fn classify_failure(inner: &Arc<ConnectionInner>, task: &str, error: &anyhow::Error) {
    if let Some(io_error) = error.root_cause().downcast_ref::<std::io::Error>() {
        if is_benign_disconnect(io_error) {
            info!("connection closed by peer");
            return;
        }
    }
    if inner.state() == ConnectionState::Connected {
        error!("{task}: {error:#}");
    } else {
        debug!("{task} (while disconnecting): {error:#}");
    }
}

/// Graceful close of a write half; for TLS this sends `close_notify`.
/// Tolerates the benign error set and a stuck peer.
async fn close_writer<W: AsyncWrite + Unpin>(writer: &mut W) {
    match tokio::time::timeout(Duration::from_secs(5), writer.shutdown()).await {
        Ok(Ok(())) | Err(_) => {}
        Ok(Err(e)) => {
            if !is_benign_disconnect(&e) {
                debug!("socket shutdown: {e}");
            }
        }
    }
}

async fn receive_message_loop<R>(inner: &Arc<ConnectionInner>, reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; PackageHeader::WIRE_SIZE];
    while inner.state() == ConnectionState::Connected {
        if guarded(inner, reader.read_exact(&mut header_bytes)).await?.is_none() {
            return Ok(());
        }
        let header = PackageHeader::from_wire(&header_bytes);
        if header.flags == 0 && header.size as usize > inner.settings.max_package_size {
            warn!(
                "package of type {} is {} bytes, over the advisory cap of {}",
                header.package_type, header.size, inner.settings.max_package_size
            );
        }

        let mut body = BytesMut::zeroed(header.size as usize);
        if guarded(inner, reader.read_exact(&mut body[..])).await?.is_none() {
            return Ok(());
        }
        let package = Package::from_parts(header, body.freeze());

        if header.flags & PackageHeader::FLAG_FILE_RECEIVE_INFO != 0 {
            inner.file_info_queue.lock().push_back(package);
            inner.receive_file_flag.signal();
            continue;
        }
        if header.flags & PackageHeader::FLAG_FILE_REQUEST != 0 {
            inner.file_request_queue.lock().push_back(package);
            inner.send_file_flag.signal();
            continue;
        }
        inner.inbound.push(PackageIn {
            package,
            connection: Connection::from_inner(Arc::clone(inner)),
        });
    }
    Ok(())
}

async fn send_message_loop<W>(inner: &Arc<ConnectionInner>, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        if inner.state() != ConnectionState::Connected {
            return Ok(());
        }
        let next = inner.out_queue.lock().pop_front();
        if let Some(package) = next {
            let frame = package.to_wire();
            let written = guarded(inner, async {
                writer.write_all(&frame).await?;
                writer.flush().await
            })
            .await?;
            if written.is_none() {
                return Ok(());
            }
        } else {
            inner.send_message_flag.reset();
            if !inner.out_queue.lock().is_empty() {
                continue; // a producer raced the reset
            }
            tokio::select! {
                biased;
                () = inner.shutdown.wait() => return Ok(()),
                () = inner.send_message_flag.wait() => {}
            }
        }
    }
}

async fn receive_file_loop<R>(inner: &Arc<ConnectionInner>, reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::zeroed(inner.settings.file_buffer_size);
    loop {
        if inner.state() != ConnectionState::Connected {
            return Ok(());
        }
        let next = inner.file_info_queue.lock().pop_front();
        let Some(mut package) = next else {
            inner.receive_file_flag.reset();
            if !inner.file_info_queue.lock().is_empty() {
                continue;
            }
            tokio::select! {
                biased;
                () = inner.shutdown.wait() => return Ok(()),
                () = inner.receive_file_flag.wait() => {}
            }
            continue;
        };

        let info = match FileInfo::from_package(&mut package) {
            Ok(info) => info,
            Err(e) => {
                warn!("dropping malformed file-info package: {e}");
                continue;
            }
        };
        let Some(destination) = inner.pending_files.get(&info.request_id) else {
            anyhow::bail!("no pending file request with id {}", info.request_id);
        };
        let _ = inner.pending_files.erase(&info.request_id);

        let path = inner.settings.download_directory.join(&destination);
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        debug!(
            "transfer {}: receiving {} bytes into {}",
            info.request_id,
            info.byte_count,
            path.display()
        );

        let mut remaining = info.byte_count as usize;
        while remaining > 0 {
            let chunk = remaining.min(buffer.len());
            if guarded(inner, reader.read_exact(&mut buffer[..chunk])).await?.is_none() {
                return Ok(());
            }
            file.write_all(&buffer[..chunk])
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            remaining -= chunk;
        }
        file.flush().await?;
        debug!("transfer {} complete", info.request_id);
    }
}

async fn send_file_loop<W>(inner: &Arc<ConnectionInner>, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::zeroed(inner.settings.file_buffer_size);
    loop {
        if inner.state() != ConnectionState::Connected {
            return Ok(());
        }
        let next = inner.file_request_queue.lock().pop_front();
        let Some(mut package) = next else {
            inner.send_file_flag.reset();
            if !inner.file_request_queue.lock().is_empty() {
                continue;
            }
            tokio::select! {
                biased;
                () = inner.shutdown.wait() => return Ok(()),
                () = inner.send_file_flag.wait() => {}
            }
            continue;
        };

        let request = match FileRequest::from_package(&mut package) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping malformed file-request package: {e}");
                continue;
            }
        };

        let path = Path::new(&request.source_path);
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening requested file {}", path.display()))?;
        let metadata = file.metadata().await?;
        anyhow::ensure!(metadata.is_file(), "{} is not a regular file", path.display());
        let byte_count = u32::try_from(metadata.len())
            .with_context(|| format!("{} is too large to transfer", path.display()))?;

        // Announce the size on the message channel; the peer's receive-file
        // task starts pulling bytes once it sees this.
        let info = FileInfo {
            request_id: request.request_id,
            byte_count,
        };
        match info.into_package() {
            Ok(announcement) => inner.enqueue_out(announcement),
            Err(e) => {
                warn!("could not encode file info: {e}");
                continue;
            }
        }
        debug!(
            "transfer {}: sending {} ({byte_count} bytes)",
            request.request_id,
            path.display()
        );

        let mut remaining = byte_count as usize;
        while remaining > 0 {
            let chunk = remaining.min(buffer.len());
            file.read_exact(&mut buffer[..chunk])
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            if guarded(inner, writer.write_all(&buffer[..chunk])).await?.is_none() {
                return Ok(());
            }
            remaining -= chunk;
        }
        if guarded(inner, writer.flush()).await?.is_none() {
            return Ok(());
        }
        debug!("transfer {} sent", request.request_id);
    }
}
