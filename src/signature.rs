//! Parsing of GVariant type signatures.
//!
//! A signature is a stream of GVariant types: strip the opening and closing
//! brackets from a tuple and you get a signature.  The parser here is a
//! non-recursive pushdown machine that parses one complete type from a
//! signature at a time and reports summary information about it.  It does
//! not build recursive type information; if you parse a single, deeply
//! nested type, you only get information about the top level.  Inspect each
//! child type if you need specific information on it; re-parsing is faster
//! in practice than building a dynamic tree, unless types are very deeply
//! nested.

use crate::{element::element, variant::VariantErr};
use smallvec::SmallVec;

/// Maximum nesting depth of a type signature.
///
/// The format itself allows arbitrary depth, but applications should limit
/// the depth of types they accept from untrusted sources, so parsing
/// complexity stays bounded.  This limit applies to true type signatures
/// only; recursion through `v` elements is not restricted by it.
pub const MAX_DEPTH: usize = 255;

/// Maximum length of a type signature, in bytes.
///
/// Types are static, so this limit should be impossible to hit; it exists
/// to keep all internal size computations free of overflow.
pub const MAX_SIGNATURE: usize = 65535;

/// Summary information for one parsed type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TypeInfo<'t> {
  /// Alignment of the type, as a power of two.
  pub alignment: u8,
  /// Size in bytes if the type is fixed-size, or 0.
  pub size: usize,
  /// Size of the bound child if it is fixed-size, or 0.
  pub bound_size: usize,
  /// Maximum nesting depth observed inside the type.
  pub depth: usize,
  /// The exact characters of the parsed type.
  pub ty: &'t [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
  /// Bound container (`m`, `a`), implicitly closed by the next leaf.
  Bound,
  /// Tuple, including the implicit tuple at level 0.
  Tuple,
  /// First entry of a pair.
  PairFirst,
  /// Second entry of a pair.
  PairSecond,
}

#[derive(Clone, Copy)]
struct Frame {
  shape: Shape,
  /// Largest alignment seen so far in this container, as a power of two.
  alignment: u8,
  /// Padding bytes inserted when the container was max-aligned on entry;
  /// reclaimable if the final alignment turns out smaller.
  aligned: u8,
}

/// Parses the leading type of `signature`.
///
/// Returns `Ok(Some(info))` if a type was parsed, `Ok(None)` if the
/// signature is empty, and an error if the leading type is malformed.  The
/// caller can use [`TypeInfo::ty`] to skip over the type and parse the next
/// one.
pub fn signature_next(signature: &[u8]) -> Result<Option<TypeInfo<'_>>, VariantErr> {
  if signature.len() > MAX_SIGNATURE {
    return Err(err!(debug, VariantErr::SignatureTooLong(signature.len())));
  }

  // The maximum *valid* depth cannot exceed the signature length, so the
  // backtracking stack is bounded by it as well.
  let max_depth = MAX_DEPTH.min(signature.len());
  let mut stack: SmallVec<[Frame; 32]> = SmallVec::new();

  let mut state = Frame {
    shape: Shape::Tuple,
    alignment: 0,
    aligned: 0,
  };
  let mut size = 0usize;
  let mut known_depth = 0usize;
  let mut fixed_size = true;
  let mut end_of_pair = false;

  let mut i = 0;
  while i < signature.len() {
    let c = signature[i];
    let el = element(c);

    if !el.real {
      return Err(err!(debug, VariantErr::InvalidType));
    }

    let is_leaf;
    match c {
      b'm' | b'a' | b'(' | b'{' => {
        if stack.len() >= max_depth {
          return Err(err!(debug, VariantErr::NestingTooDeep));
        }
        // pairs hold exactly two entries and the first must be basic
        if end_of_pair || state.shape == Shape::PairFirst {
          return Err(err!(debug, VariantErr::PairShape));
        }

        stack.push(state);
        if stack.len() > known_depth {
          known_depth = stack.len();
        }

        state.shape = match c {
          b'(' => Shape::Tuple,
          b'{' => Shape::PairFirst,
          _ => Shape::Bound,
        };

        // The alignment of the container is unknown until it closes, so
        // assume the maximum and reclaim the padding afterwards.
        let aligned = crate::util::align_up(size, 8);
        state.alignment = 0;
        state.aligned = (aligned - size) as u8;
        size = aligned;

        is_leaf = false;
      },
      b')' | b'}' => {
        if c == b')' {
          // level 0 is an implicit tuple, it cannot be closed
          if stack.is_empty() || state.shape != Shape::Tuple {
            return Err(err!(debug, VariantErr::InvalidType));
          }
          // special case: the unit type has fixed size 1
          if signature[i - 1] == b'(' {
            size += 1;
          }
        } else if !end_of_pair {
          // distinguish an incomplete pair from a plain bracket mismatch
          let in_pair = state.shape == Shape::PairFirst
            || state.shape == Shape::PairSecond;
          return Err(err!(
            debug,
            if in_pair {
              VariantErr::PairShape
            } else {
              VariantErr::InvalidType
            }
          ));
        }

        // The container was max-aligned when opened.  If the alignment now
        // turns out smaller, shift it back, then pad the container to a
        // multiple of its own alignment.
        if fixed_size {
          size -= (state.aligned & !((1u8 << state.alignment) - 1)) as usize;
          size = crate::util::align_up(size, 1 << state.alignment);
        }

        let mut saved = match stack.pop() {
          Some(frame) => frame,
          None => return Err(err!(debug, VariantErr::InvalidType)),
        };
        if state.alignment > saved.alignment {
          saved.alignment = state.alignment;
        }
        state = saved;

        end_of_pair = false;
        is_leaf = true;
      },
      _ => {
        // basic leaves and `v`
        if end_of_pair {
          return Err(err!(debug, VariantErr::PairShape));
        }
        if state.shape == Shape::PairFirst && !el.basic {
          return Err(err!(debug, VariantErr::PairShape));
        }

        if !el.fixed {
          fixed_size = false;
        }
        if el.alignment > state.alignment {
          state.alignment = el.alignment;
        }
        if fixed_size {
          // the fixed size of an element equals its alignment
          size = crate::util::align_up(size, 1usize << el.alignment);
          size += 1usize << el.alignment;
        }

        is_leaf = true;
      },
    }

    // A leaf implicitly closes all open bound containers on top of the
    // stack.  Once back at level 0, a full type has been parsed.
    if is_leaf {
      let mut bound_size = 0;

      while state.shape == Shape::Bound {
        // Bound containers are never fixed-size, but if the direct child
        // is, its size is reported to the caller.
        bound_size = if fixed_size { size } else { 0 };
        fixed_size = false;

        let mut saved = match stack.pop() {
          Some(frame) => frame,
          None => return Err(err!(error, VariantErr::Internal)),
        };
        if state.alignment > saved.alignment {
          saved.alignment = state.alignment;
        }
        state = saved;
      }

      // advance a possible pair
      if state.shape == Shape::PairFirst {
        state.shape = Shape::PairSecond;
      } else if state.shape == Shape::PairSecond {
        end_of_pair = true;
      }

      if stack.is_empty() {
        return Ok(Some(TypeInfo {
          alignment: state.alignment,
          size: if fixed_size { size } else { 0 },
          bound_size,
          depth: known_depth,
          ty: &signature[..i + 1],
        }));
      }
    }

    i += 1;
  }

  // A non-empty signature that ran out before completing a type is
  // malformed; an empty signature reports "nothing parsed".
  if i > 0 {
    return Err(err!(debug, VariantErr::InvalidType));
  }
  Ok(None)
}

/// Parses `signature` as exactly one complete type.
///
/// Fails if the signature is empty, malformed, or not entirely consumed by
/// the single type.
pub fn signature_one(signature: &[u8]) -> Result<TypeInfo<'_>, VariantErr> {
  match signature_next(signature)? {
    Some(info) if info.ty.len() == signature.len() => Ok(info),
    _ => Err(err!(debug, VariantErr::InvalidType)),
  }
}
