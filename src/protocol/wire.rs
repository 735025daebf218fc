// (c) 2025 peerlink developers

//! Typed big-endian wire values
//!
//! [`WireValue`] is implemented for the fixed-layout scalars, [`String`] and
//! `Vec<scalar>`; [`WireArgs`] lifts it to ordered tuples so a package body
//! can be sized and filled in one pass each. Decoding is the exact inverse
//! of encoding and is bounds-checked on every operation.

use std::mem::size_of;

/// Errors arising from package encode/decode.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireError {
    /// A read ran past the end of the package body. The read cursor is not
    /// rewound; the output slot (if any) is left zero-initialised.
    #[error("read ran past the end of the package body")]
    BodyOverrun,
    /// The encoded body would not fit the 32-bit size field.
    #[error("package body exceeds the 32-bit size field")]
    SizeOverflow,
}

/// A value that can be appended to, and extracted from, a package body.
pub trait WireValue: Sized {
    /// Exact number of bytes this value occupies on the wire.
    fn wire_size(&self) -> usize;
    /// Appends the big-endian encoding of this value to `out`.
    fn encode(&self, out: &mut Vec<u8>);
    /// Decodes one value from `body` at `*cursor`, advancing the cursor.
    ///
    /// # Errors
    /// [`WireError::BodyOverrun`] if the body is exhausted. The cursor may
    /// have been partially advanced (it never rewinds).
    fn decode(body: &[u8], cursor: &mut usize) -> Result<Self, WireError>;
}

/// A fixed-layout scalar; element type for `Vec<T>` bodies.
pub trait WireScalar: WireValue + Copy + Default {
    /// Byte width on the wire.
    const WIDTH: usize;
}

macro_rules! scalar_wire_value {
    ($($t:ty),* $(,)?) => {$(
        impl WireValue for $t {
            fn wire_size(&self) -> usize {
                size_of::<$t>()
            }
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }
            fn decode(body: &[u8], cursor: &mut usize) -> Result<Self, WireError> {
                let end = cursor
                    .checked_add(size_of::<$t>())
                    .ok_or(WireError::BodyOverrun)?;
                let bytes = body.get(*cursor..end).ok_or(WireError::BodyOverrun)?;
                *cursor = end;
                let arr = bytes.try_into().map_err(|_| WireError::BodyOverrun)?;
                Ok(<$t>::from_be_bytes(arr))
            }
        }
        impl WireScalar for $t {
            const WIDTH: usize = size_of::<$t>();
        }
    )*};
}

scalar_wire_value!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Width of the length/count prefix carried by strings and vectors.
const PREFIX: usize = size_of::<u32>();

impl WireValue for String {
    fn wire_size(&self) -> usize {
        PREFIX + self.len()
    }
    fn encode(&self, out: &mut Vec<u8>) {
        // The u32 cast is safe: Package::new rejects any body whose total
        // size exceeds u32::MAX before this runs.
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        out.extend_from_slice(self.as_bytes());
    }
    fn decode(body: &[u8], cursor: &mut usize) -> Result<Self, WireError> {
        let len = u32::decode(body, cursor)? as usize;
        let end = cursor.checked_add(len).ok_or(WireError::BodyOverrun)?;
        let bytes = body.get(*cursor..end).ok_or(WireError::BodyOverrun)?;
        *cursor = end;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl<T: WireScalar> WireValue for Vec<T> {
    fn wire_size(&self) -> usize {
        PREFIX + self.len() * T::WIDTH
    }
    fn encode(&self, out: &mut Vec<u8>) {
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        for element in self {
            element.encode(out);
        }
    }
    fn decode(body: &[u8], cursor: &mut usize) -> Result<Self, WireError> {
        let count = u32::decode(body, cursor)? as usize;
        let data = count.checked_mul(T::WIDTH).ok_or(WireError::BodyOverrun)?;
        let end = cursor.checked_add(data).ok_or(WireError::BodyOverrun)?;
        if end > body.len() {
            return Err(WireError::BodyOverrun);
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::decode(body, cursor)?);
        }
        Ok(out)
    }
}

/// An ordered tuple of [`WireValue`]s, as accepted by
/// [`Package::new`](super::package::Package::new).
///
/// Implemented for `()` and for tuples of up to eight values.
pub trait WireArgs {
    /// Sum of the members' wire sizes; `None` on arithmetic overflow.
    fn wire_size(&self) -> Option<usize>;
    /// Appends each member's encoding, left to right.
    fn encode(&self, out: &mut Vec<u8>);
}

impl WireArgs for () {
    fn wire_size(&self) -> Option<usize> {
        Some(0)
    }
    fn encode(&self, _out: &mut Vec<u8>) {}
}

macro_rules! tuple_wire_args {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: WireValue),+> WireArgs for ($($name,)+) {
            fn wire_size(&self) -> Option<usize> {
                let mut total = 0usize;
                $( total = total.checked_add(self.$idx.wire_size())?; )+
                Some(total)
            }
            fn encode(&self, out: &mut Vec<u8>) {
                $( self.$idx.encode(out); )+
            }
        }
    };
}

tuple_wire_args!(A: 0);
tuple_wire_args!(A: 0, B: 1);
tuple_wire_args!(A: 0, B: 1, C: 2);
tuple_wire_args!(A: 0, B: 1, C: 2, D: 3);
tuple_wire_args!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_wire_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_wire_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_wire_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
