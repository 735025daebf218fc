// (c) 2025 peerlink developers

//! Package framing: header, body, typed append/extract
//!
//! A [`Package`] owns a [`PackageHeader`] and a raw body buffer. Bodies are
//! built from an ordered tuple of typed arguments (sized exactly, allocated
//! once, filled with an advancing write cursor) and parsed by issuing reads
//! in the same order and types against a monotonic, bounds-checked read
//! cursor.

use bytes::Bytes;

use super::wire::{WireArgs, WireError, WireValue};

/// Fixed-size frame header. On the wire this is exactly
/// [`WIRE_SIZE`](Self::WIRE_SIZE) bytes: `package_type` (u16), `size` (u32),
/// `flags` (u8), each big-endian, serialized field-by-field with no padding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackageHeader {
    /// Message type, interpreted by the application's message enumeration.
    pub package_type: u16,
    /// Body length in bytes.
    pub size: u32,
    /// Bitset of `FLAG_*` values.
    pub flags: u8,
}

impl PackageHeader {
    /// The on-wire size of the header. Fixed; any change would be a breaking
    /// protocol change.
    pub const WIRE_SIZE: usize = 7;

    /// Marks a package whose body is `(request_id: u64, source_path: string)`.
    pub const FLAG_FILE_REQUEST: u8 = 1 << 1;
    /// Marks a package whose body is `(request_id: u64, byte_count: u32)`.
    pub const FLAG_FILE_RECEIVE_INFO: u8 = 1 << 2;

    /// Serializes field-by-field, big-endian.
    #[must_use]
    pub fn to_wire(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..2].copy_from_slice(&self.package_type.to_be_bytes());
        out[2..6].copy_from_slice(&self.size.to_be_bytes());
        out[6] = self.flags;
        out
    }

    /// Inverse of [`to_wire`](Self::to_wire).
    #[must_use]
    pub fn from_wire(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        Self {
            package_type: u16::from_be_bytes([bytes[0], bytes[1]]),
            size: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            flags: bytes[6],
        }
    }
}

impl std::fmt::Display for PackageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type: {}, size: {}, flags: {:#04x}",
            self.package_type, self.size, self.flags
        )
    }
}

/// A typed, length-prefixed message. See the [module docs](self).
///
/// Once built, the body is immutable; readers advance a private cursor that
/// never rewinds and never exceeds `header.size`.
#[derive(Clone, Debug)]
pub struct Package {
    header: PackageHeader,
    body: Bytes,
    read_offset: usize,
}

impl Package {
    /// Builds a package from a wire type value and an ordered tuple of typed
    /// arguments. The exact body size is computed up front and the body is
    /// allocated exactly once.
    ///
    /// # Errors
    /// [`WireError::SizeOverflow`] if the encoded body would exceed the
    /// 32-bit size field.
    pub fn new(package_type: u16, args: impl WireArgs) -> Result<Self, WireError> {
        let size = args.wire_size().ok_or(WireError::SizeOverflow)?;
        let size32 = u32::try_from(size).map_err(|_| WireError::SizeOverflow)?;
        let mut body = Vec::with_capacity(size);
        args.encode(&mut body);
        debug_assert_eq!(body.len(), size);
        Ok(Self {
            header: PackageHeader {
                package_type,
                size: size32,
                flags: 0,
            },
            body: body.into(),
            read_offset: 0,
        })
    }

    /// Reassembles a package received from the wire. `body.len()` must equal
    /// `header.size`; the receive path guarantees this by construction.
    #[must_use]
    pub fn from_parts(header: PackageHeader, body: Bytes) -> Self {
        debug_assert_eq!(body.len(), header.size as usize);
        Self {
            header,
            body,
            read_offset: 0,
        }
    }

    /// Sets header flags, builder-style.
    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.header.flags = flags;
        self
    }

    #[must_use]
    pub fn header(&self) -> PackageHeader {
        self.header
    }

    /// Convenience accessor for `header().package_type`.
    #[must_use]
    pub fn package_type(&self) -> u16 {
        self.header.package_type
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Current read cursor position. Equals `header.size` after a full parse.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read_offset
    }

    /// Extracts the next value, by value.
    ///
    /// # Errors
    /// [`WireError::BodyOverrun`] if the read would exceed the body. The
    /// cursor is not rewound.
    pub fn read<T: WireValue>(&mut self) -> Result<T, WireError> {
        T::decode(&self.body, &mut self.read_offset)
    }

    /// Extracts the next value into a provided slot. On failure the slot is
    /// left zero-initialised (its `Default`).
    ///
    /// # Errors
    /// As [`read`](Self::read).
    pub fn read_into<T: WireValue + Default>(&mut self, slot: &mut T) -> Result<(), WireError> {
        match self.read::<T>() {
            Ok(value) => {
                *slot = value;
                Ok(())
            }
            Err(e) => {
                *slot = T::default();
                Err(e)
            }
        }
    }

    /// Serializes the whole frame (header then body) for the wire.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PackageHeader::WIRE_SIZE + self.body.len());
        out.extend_from_slice(&self.header.to_wire());
        out.extend_from_slice(&self.body);
        out
    }
}
