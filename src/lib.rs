// (c) 2025 peerlink developers

//! `peerlink` is a peer-to-peer streaming transport carrying framed control
//! messages and on-demand file transfers between exactly two endpoints, over
//! a pair of long-lived TCP connections (optionally wrapped in TLS 1.3).
//!
//! ## Overview
//!
//! Each peer is symmetric: it may actively dial another peer's advertised
//! endpoints ([`Client::connect`]), or bind ephemeral local ports and wait to
//! be dialed ([`Client::seek`] / [`Client::seek_local`]). Once the pair of
//! streams is up, either side may:
//!
//! * send typed, length-prefixed [`Package`]s on the message channel;
//! * request a file by path and receive it into a named destination, with the
//!   bulk bytes flowing on the dedicated file channel;
//! * tear the connection down cleanly.
//!
//! ## How it works
//!
//! A [`Connection`] owns two sockets: the *message* channel and the *file*
//! channel. Four cooperative tasks (receive-message, send-message,
//! receive-file, send-file) service them, with exactly one reader and one
//! writer per socket. Inbound non-file packages land on a shared queue which
//! a dispatch thread drains into user-registered handlers keyed by message
//! type. File requests are intercepted by the receive-message task and routed
//! to the send-file task; file-info replies are routed to the receive-file
//! task.
//!
//! ## Wire format
//!
//! All integers on the wire are big-endian. A frame on the message channel is
//! a fixed 7-byte header (`type: u16 | size: u32 | flags: u8`) followed by
//! `size` body bytes. See [`protocol`] for the details, including the
//! file-request sub-protocol.
//!
//! ## Security model
//!
//! TLS mode uses self-signed EC P-256 certificates with peer verification
//! disabled; the trust boundary is assumed to be elsewhere (e.g. a private
//! network). There is no peer discovery, no reconnection after a terminal
//! disconnect, and no ordering guarantee *between* the two channels.

pub mod client;
pub use client::{Client, PackageIn};

pub mod config;
pub use config::{ClientMode, Settings};

pub mod connection;
pub use connection::{Connection, ConnectionState};

pub mod protocol;
pub use protocol::package::{Package, PackageHeader};
pub use protocol::wire::{WireArgs, WireError, WireValue};
pub use protocol::MessageSet;

pub mod sync;
pub use sync::flag::AwaitFlag;
pub use sync::map::ConcurrentMap;

pub mod util;
