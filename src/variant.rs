//! The variant object: lifecycle, poison, and introspection.
//!
//! A [`Variant`] represents a single serialized value, basic or compound.
//! Writer variants are created empty and unsealed; sealing freezes them
//! for reading.  Reader variants wrap caller-provided spans and are born
//! sealed.  The reader and writer primitives live in `reader.rs` and
//! `writer.rs`; this module owns the shared state.

use crate::{
  buffer::{alloc_zeroed, Span, SpanBuf, FRONT_SHARE, MAX_SPANS},
  level::{Level, LevelStack},
  signature::signature_one,
  util::align_up,
};
use alloc::{boxed::Box, vec::Vec};
use core::fmt::{Debug, Display, Formatter};

/// Initial buffer allocation for dynamic-size writer variants, in bytes.
const WRITER_HINT: usize = 2048;

/// Errors raised while building or consuming variants.
///
/// Every public operation reports its error; additionally the first error
/// on a variant is latched into its poison slot (see
/// [`Variant::poison`]).
// Kept small and `Copy`; the poison slot stores it by value and the codec
// paths return it constantly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VariantErr {
  /// Unrecognized element, bracket mismatch, or trailing garbage in a
  /// type signature.
  InvalidType,

  /// A pair must hold exactly one basic key and one value.
  PairShape,

  /// Signature nesting exceeds [`crate::signature::MAX_DEPTH`].
  NestingTooDeep,

  /// Signature length exceeds [`crate::signature::MAX_SIGNATURE`].
  SignatureTooLong(usize),

  /// The requested element disagrees with the residual type, the
  /// container is exhausted, or a close does not match the open
  /// container.
  TypeMismatch,

  /// Summed span lengths do not fit the machine word.
  BufferTooLarge,

  /// Buffer allocation failed.
  OutOfMemory,

  /// The span count would exceed [`MAX_SPANS`].
  TooManySpans {
    needed: usize,
  },

  /// Attempt to mutate the implicit null variant.
  NullVariantMutation,

  /// Internal invariant violation; reported rather than ignored, but
  /// never expected.
  Internal,
}

impl Display for VariantErr {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    Debug::fmt(self, f)
  }
}

#[cfg(feature = "std")]
impl std::error::Error for VariantErr {}

/// A serialized GVariant value.
///
/// The lifetime `'a` bounds any caller-provided spans the variant
/// references; a writer variant that never had spans inserted is
/// `Variant<'static>`.
///
/// ```
/// use gvariant::Variant;
///
/// let cv = Variant::new_from_buffer("u", &[0xff, 0x00, 0xff, 0x00]).unwrap();
/// assert!(cv.is_sealed());
/// assert_eq!(cv.peek_type(), "u");
/// ```
pub struct Variant<'a> {
  /// The root type string.
  pub(crate) ty: Box<[u8]>,
  /// Spans backing the serialized form.
  pub(crate) buf: SpanBuf<'a>,
  /// Reader/writer cursor state.
  pub(crate) stack: LevelStack,
  /// First error that contaminated the variant.
  pub(crate) poison: Option<VariantErr>,
  /// Sealed variants are read-only.
  pub(crate) sealed: bool,
  /// The implicit null variant; behaves as the unit type.
  pub(crate) null: bool,
}

impl Variant<'static> {
  /// Creates a new variant of type `ty`, unsealed and ready for writing.
  ///
  /// All buffer space is allocated and owned by the variant itself.  The
  /// type string is copied.
  pub fn new(ty: &str) -> Result<Variant<'static>, VariantErr> {
    let info = signature_one(ty.as_bytes())?;

    // allocate the initial buffer, except if the type is fixed-size
    let size = if info.size > 0 {
      info.size
    } else {
      WRITER_HINT
    };
    let front_len = align_up(size * FRONT_SHARE / 100, 8).min(size);
    let buf = SpanBuf::new(alloc::vec![
      Span::owned(alloc_zeroed(front_len)?),
      Span::empty(),
      Span::empty(),
      Span::owned(alloc_zeroed(size - front_len)?),
    ]);

    Ok(Variant {
      ty: Box::from(ty.as_bytes()),
      buf,
      stack: LevelStack::new(Level::writer_root(info.size, ty.as_bytes())),
      poison: None,
      sealed: false,
      null: false,
    })
  }

  /// Returns the implicit null variant.
  ///
  /// The null variant serves all queries as if it were the unit type
  /// `()`, and rejects every attempt to alter its internal state with
  /// [`VariantErr::NullVariantMutation`].
  pub fn null() -> Variant<'static> {
    Variant {
      ty: Box::from(&b"()"[..]),
      buf: SpanBuf::new(Vec::new()),
      stack: LevelStack::new(Level::root(0, b"()")),
      poison: None,
      sealed: true,
      null: true,
    }
  }
}

impl<'a> Variant<'a> {
  /// Wraps caller-provided spans as a sealed variant of type `ty`.
  ///
  /// The span *list* is copied into the variant; the underlying bytes are
  /// not, and must stay accessible for the lifetime of the variant.
  pub fn new_from_spans(
    ty: &str,
    spans: &[&'a [u8]],
  ) -> Result<Variant<'a>, VariantErr> {
    signature_one(ty.as_bytes())?;
    if spans.len() > MAX_SPANS {
      return Err(err!(
        debug,
        VariantErr::TooManySpans {
          needed: spans.len()
        }
      ));
    }

    let buf =
      SpanBuf::new(spans.iter().map(|bytes| Span::borrowed(bytes)).collect());
    let size = buf.total_len()?;

    Ok(Variant {
      ty: Box::from(ty.as_bytes()),
      buf,
      stack: LevelStack::new(Level::root(size, ty.as_bytes())),
      poison: None,
      sealed: true,
      null: false,
    })
  }

  /// Wraps a single linear buffer as a sealed variant of type `ty`.
  pub fn new_from_buffer(
    ty: &str,
    data: &'a [u8],
  ) -> Result<Variant<'a>, VariantErr> {
    Variant::new_from_spans(ty, &[data])
  }

  /// Whether the variant is sealed.  Unsealed variants can be written to
  /// but not read from, and vice versa.
  pub fn is_sealed(&self) -> bool {
    self.sealed
  }

  /// Returns the first error that contaminated this variant, if any.
  ///
  /// Every failed operation also latches its error here, so callers may
  /// ignore intermediate results and inspect the poison once at a logical
  /// boundary.  Use of the poison channel is fully optional.
  pub fn poison(&self) -> Option<VariantErr> {
    self.poison
  }

  /// The root type string of this variant.
  pub fn type_str(&self) -> &str {
    // SAFETY: validated type strings are ASCII by construction.
    unsafe { core::str::from_utf8_unchecked(&self.ty) }
  }

  /// The spans backing the serialized form.
  ///
  /// Meaningful on sealed variants; on a writer this exposes work in
  /// progress.
  pub fn spans(&self) -> impl Iterator<Item = &[u8]> {
    self.buf.iter()
  }

  /// Latches `err` into the poison slot.
  ///
  /// Returns the *first* poison of the variant: once poisoned, every
  /// later fault reports the original error.
  pub(crate) fn poison_with(&mut self, err: VariantErr) -> VariantErr {
    if let Some(first) = self.poison {
      return first;
    }
    self.poison = Some(err);
    err
  }

  /// Number of dynamic elements left at the current level.
  ///
  /// Arrays report their remaining element count, maybes 1 or 0; any
  /// other container reports 1 while type characters remain.  A non-zero
  /// result means data can still be read at this level.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn peek_count(&self) -> usize {
    if self.null {
      return 1;
    }
    assert!(self.sealed, "peek_count on an unsealed variant");

    let level = self.stack.top();
    match level.enclosing {
      b'a' | b'm' => level.index,
      _ => (!level.types().is_empty()) as usize,
    }
  }

  /// The residual type string at the current level: the types that can be
  /// read from the current position without exiting a container.
  ///
  /// The null variant and an entered null `v` report `"()"`.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn peek_type(&self) -> &str {
    if self.null {
      return "()";
    }
    assert!(self.sealed, "peek_type on an unsealed variant");

    // SAFETY: residual types are suffixes of validated ASCII signatures.
    unsafe { core::str::from_utf8_unchecked(self.stack.top().types()) }
  }

  /// Resets the reader cursor to the start of the root container.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn rewind(&mut self) {
    if self.null {
      return;
    }
    assert!(self.sealed, "rewind on an unsealed variant");

    while self.stack.pop().is_some() {}
    let size = self.stack.top().size;
    *self.stack.top_mut() = Level::root(size, &self.ty);
  }
}

impl<'a> Debug for Variant<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let mut d = f.debug_struct("Variant");
    d.field("type", &self.type_str());
    d.field("sealed", &self.sealed);
    d.field("null", &self.null);
    d.field("spans", &self.buf.count());
    d.field("poison", &self.poison);
    d.finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn lifecycle_reader() {
    let _ = env_logger::try_init();
    let data = [0xffu8, 0x00, 0xff, 0x00];
    let cv = Variant::new_from_buffer("u", &data).unwrap();
    assert!(cv.is_sealed());
    assert_eq!(cv.poison(), None);
    assert_eq!(cv.type_str(), "u");
    assert_eq!(cv.peek_type(), "u");
    assert_eq!(cv.peek_count(), 1);
    assert_eq!(cv.spans().count(), 1);
  }

  #[test]
  fn lifecycle_writer() {
    let _ = env_logger::try_init();
    let cv = Variant::new("(uu)").unwrap();
    assert!(!cv.is_sealed());
    assert_eq!(cv.type_str(), "(uu)");
  }

  #[test]
  fn rejects_malformed_types() {
    let _ = env_logger::try_init();
    assert_eq!(Variant::new("(u").unwrap_err(), VariantErr::InvalidType);
    assert_eq!(
      Variant::new_from_buffer("uu", &[]).unwrap_err(),
      VariantErr::InvalidType
    );
    assert_eq!(Variant::new("{vu}").unwrap_err(), VariantErr::PairShape);
  }

  #[test]
  fn null_variant_queries() {
    let _ = env_logger::try_init();
    let cv = Variant::null();
    assert!(cv.is_sealed());
    assert_eq!(cv.peek_type(), "()");
    assert_eq!(cv.peek_count(), 1);
    assert_eq!(cv.poison(), None);
  }

  #[test]
  fn poison_latches_first_error() {
    let _ = env_logger::try_init();
    let data = [0u8; 4];
    let mut cv = Variant::new_from_buffer("u", &data).unwrap();
    assert_eq!(
      cv.poison_with(VariantErr::TypeMismatch),
      VariantErr::TypeMismatch
    );
    // later faults report the original poison
    assert_eq!(
      cv.poison_with(VariantErr::Internal),
      VariantErr::TypeMismatch
    );
    assert_eq!(cv.poison(), Some(VariantErr::TypeMismatch));
  }
}
