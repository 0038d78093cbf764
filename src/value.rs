//! Basic leaf values and the argument enums of the compound accessors.
//!
//! The wire format has ten fixed-size basic leaves and three string-like
//! leaves.  Fixed leaves are covered by the [`Fixed`] trait; string-like
//! leaves are read and written through the dedicated string accessors and
//! [`Value::Str`].

use core::mem::size_of;

/// Fixed-size basic leaf types.
///
/// A fixed leaf occupies exactly [`Fixed::SIZE`] bytes on the wire, equal
/// to its alignment, and is encoded little-endian on every platform.
pub trait Fixed: Copy + Default {
  /// The type-string character of the element.
  const ELEMENT: u8;
  /// Serialized size in bytes.
  const SIZE: usize;

  /// Decodes a value from exactly [`Fixed::SIZE`] leading bytes.
  fn decode(bytes: &[u8]) -> Self;

  /// Encodes the value into exactly [`Fixed::SIZE`] leading bytes.
  fn encode(self, out: &mut [u8]);
}

macro_rules! gen_fixed {
  ($ty:ident, $element:expr) => {
    impl Fixed for $ty {
      const ELEMENT: u8 = $element;
      const SIZE: usize = size_of::<$ty>();

      fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; size_of::<$ty>()];
        raw.copy_from_slice(&bytes[..size_of::<$ty>()]);
        <$ty>::from_le_bytes(raw)
      }

      fn encode(self, out: &mut [u8]) {
        out[..size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
      }
    }
  };
}

gen_fixed!(u8, b'y');
gen_fixed!(i16, b'n');
gen_fixed!(u16, b'q');
gen_fixed!(i32, b'i');
gen_fixed!(u32, b'u');
gen_fixed!(i64, b'x');
gen_fixed!(u64, b't');
gen_fixed!(f64, b'd');

impl Fixed for bool {
  const ELEMENT: u8 = b'b';
  const SIZE: usize = 1;

  fn decode(bytes: &[u8]) -> Self {
    bytes[0] != 0
  }

  fn encode(self, out: &mut [u8]) {
    out[0] = self as u8;
  }
}

/// A file-descriptor handle (`h`).
///
/// Wire-identical to `u`; whether handles participate in out-of-band
/// transport is up to the embedding.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Handle(pub u32);

impl Fixed for Handle {
  const ELEMENT: u8 = b'h';
  const SIZE: usize = 4;

  fn decode(bytes: &[u8]) -> Self {
    Handle(u32::decode(bytes))
  }

  fn encode(self, out: &mut [u8]) {
    self.0.encode(out)
  }
}

/// One decoded leaf produced by [`crate::Variant::readv`].
///
/// `Str` borrows zero-copy from the variant's spans; string-like leaves
/// that are truncated, unterminated, or not valid UTF-8 decode as the
/// empty string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value<'a> {
  Bool(bool),
  Byte(u8),
  Int16(i16),
  Uint16(u16),
  Int32(i32),
  Uint32(u32),
  Int64(i64),
  Uint64(u64),
  Handle(Handle),
  Double(f64),
  Str(&'a str),
}

macro_rules! gen_value_accessor {
  ($fn:ident, $variant:ident, $ty:ty) => {
    /// Returns the contained value, if this is the matching leaf kind.
    pub fn $fn(&self) -> Option<$ty> {
      match *self {
        Value::$variant(value) => Some(value),
        _ => None,
      }
    }
  };
}

impl<'a> Value<'a> {
  gen_value_accessor!(as_bool, Bool, bool);
  gen_value_accessor!(as_byte, Byte, u8);
  gen_value_accessor!(as_i16, Int16, i16);
  gen_value_accessor!(as_u16, Uint16, u16);
  gen_value_accessor!(as_i32, Int32, i32);
  gen_value_accessor!(as_u32, Uint32, u32);
  gen_value_accessor!(as_i64, Int64, i64);
  gen_value_accessor!(as_u64, Uint64, u64);
  gen_value_accessor!(as_handle, Handle, Handle);
  gen_value_accessor!(as_f64, Double, f64);
  gen_value_accessor!(as_str, Str, &'a str);
}

/// Steering arguments for [`crate::Variant::readv`], consumed by the
/// container elements of the signature.
#[derive(Clone, Copy, Debug)]
pub enum ReadArg<'a> {
  /// Expected inner type of the next `v`; `None` skips the variant
  /// without descending into it.
  VariantType(Option<&'a str>),
  /// Expected presence of the next `m`.
  Maybe(bool),
  /// Number of elements to read from the next `a`.
  Count(usize),
}

/// Arguments for [`crate::Variant::writev`]: one entry per leaf value or
/// steering decision in the signature.  Tuples and pairs consume nothing.
#[derive(Clone, Copy, Debug)]
pub enum WriteArg<'a> {
  Bool(bool),
  Byte(u8),
  Int16(i16),
  Uint16(u16),
  Int32(i32),
  Uint32(u32),
  Int64(i64),
  Uint64(u64),
  Handle(Handle),
  Double(f64),
  Str(&'a str),
  /// Inner type of the next `v`.
  VariantType(&'a str),
  /// Presence of the next `m`.
  Maybe(bool),
  /// Element count of the next `a`.
  Count(usize),
}
