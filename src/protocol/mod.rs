// (c) 2025 peerlink developers

//! Wire protocol definitions
//!
//! # On-Wire Framing
//!
//! Every message-channel frame is sent in two parts:
//!
//! * a [`PackageHeader`](package::PackageHeader): exactly 7 bytes, serialized
//!   field-by-field: `type` (u16), `size` (u32), `flags` (u8), each
//!   big-endian, no padding;
//! * the body: `size` bytes of big-endian encoded values, appended
//!   left-to-right by the sender and extracted in the same order by the
//!   receiver.
//!
//! Encoding rules for body values:
//!
//! * fixed-layout scalars: their byte width, big-endian;
//! * strings: a u32 big-endian length prefix, then the raw UTF-8 bytes
//!   (no NUL terminator);
//! * vectors of scalars: a u32 big-endian element count, then each element
//!   big-endian.
//!
//! # The file-request sub-protocol
//!
//! File transfers ride on top of package framing, distinguished by header
//! flags rather than the `type` field (which is zero for these frames):
//!
//! * `file_request` ([`FLAG_FILE_REQUEST`](package::PackageHeader::FLAG_FILE_REQUEST)):
//!   body is `(request_id: u64, source_path: string)`. Sent by the peer that
//!   wants the file.
//! * `file_receive_info` ([`FLAG_FILE_RECEIVE_INFO`](package::PackageHeader::FLAG_FILE_RECEIVE_INFO)):
//!   body is `(request_id: u64, byte_count: u32)`. Sent by the responder on
//!   the *message* channel before any bytes flow.
//! * file bytes: a raw unframed run of exactly `byte_count` bytes on the
//!   *file* channel. The receiver must consume exactly that many before the
//!   next transfer.
//!
//! The requester remembers `request_id → destination filename` locally; the
//! responder echoes the id back, so the receiver never has to trust a
//! peer-supplied filename. Transfers are serialized per connection by the
//! single send-file task, which is what makes the unframed byte run safe:
//! the info frame for a transfer always precedes its bytes.

pub mod file;
pub mod package;
pub mod wire;

/// Maps an application message enumeration onto the wire `type` field.
///
/// Implementations are expected to be dense: every value in
/// `0..Self::COUNT` should map to a variant, because the client's handler
/// table is indexed by the wire value.
///
/// ```
/// use peerlink::MessageSet;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// #[repr(u16)]
/// enum Message {
///     Chat = 0,
///     Ping = 1,
/// }
///
/// impl MessageSet for Message {
///     const COUNT: u16 = 2;
///     fn to_wire(self) -> u16 {
///         self as u16
///     }
///     fn from_wire(value: u16) -> Option<Self> {
///         match value {
///             0 => Some(Message::Chat),
///             1 => Some(Message::Ping),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait MessageSet: Copy + Send + Sync + 'static {
    /// Total number of message variants; bounds the handler table.
    const COUNT: u16;
    /// The wire value for this variant.
    fn to_wire(self) -> u16;
    /// Reverses [`to_wire`](Self::to_wire); `None` for out-of-range values.
    fn from_wire(value: u16) -> Option<Self>;
}
