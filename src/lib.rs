//! A zero-copy codec for the GVariant binary serialization format.
//!
//! # Overview
//!
//! GVariant is a typed, self-describing, little-endian serialization
//! format designed for zero-copy message exchange.  A value is described
//! by a short textual _type signature_ (for example `(usav)`), and laid
//! out as a byte sequence whose structure is fully determined by that
//! signature, with dynamic sizing carried in trailing _framing offsets_.
//!
//! - __Zero copy__.  Readers wrap caller-provided byte spans and
//!   deserialize in place; strings are handed out as borrows into the
//!   wrapped data.  Writers can splice pre-serialized spans into their
//!   output without copying ([`Variant::insert`]).
//! - __Scatter-gather__.  A value does not have to be linear in memory:
//!   both readers and writers operate on ordered sequences of spans.
//! - __Fault tolerant__.  Malformed wire data never causes out-of-bounds
//!   access and is never fatal by itself; affected elements decode as
//!   their default values.  Only type-shape disagreements between the
//!   caller and the data are errors.
//!
//! # Reading and writing
//!
//! A [`Variant`] is either _unsealed_ (a writer, building up serialized
//! content) or _sealed_ (read-only).  Data access either goes element by
//! element ([`Variant::read`], [`Variant::write`], with explicit
//! [`Variant::enter`]/[`Variant::exit`] container navigation), or in
//! batches driven by a signature string:
//!
//! ```
//! use gvariant::{ReadArg, Value, Variant, WriteArg};
//!
//! let mut cv = Variant::new("(us)").unwrap();
//! cv.writev("(us)", &[WriteArg::Uint32(7), WriteArg::Str("seven")])
//!   .unwrap();
//! cv.seal().unwrap();
//!
//! let values = cv.readv("(us)", &[]).unwrap();
//! assert_eq!(values, [Value::Uint32(7), Value::Str("seven")]);
//! ```
//!
//! Errors additionally latch into a per-variant _poison_ slot
//! ([`Variant::poison`]), so a caller assembling a compound value may
//! ignore intermediate results and check once before sealing.
//!
//! # The null variant
//!
//! [`Variant::null`] returns the implicit null variant, which serves all
//! queries as the unit type `()` and rejects any state mutation with
//! [`VariantErr::NullVariantMutation`].

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod macros;

mod buffer;
mod element;
mod level;
mod reader;
pub mod signature;
mod util;
mod value;
mod varg;
mod variant;
mod word;
mod writer;

pub use self::{
  buffer::MAX_SPANS,
  value::{Fixed, Handle, ReadArg, Value, WriteArg},
  varg::MAX_VARG,
  variant::{Variant, VariantErr},
};
