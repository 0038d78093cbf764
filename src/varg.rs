//! Stack-based walker over compound signatures.
//!
//! The compound accessors ([`crate::Variant::readv`] and
//! [`crate::Variant::writev`]) process a dynamic set of types from a
//! signature string.  Signatures nest, so the walker keeps one frame per
//! open container; frames for arrays and maybes additionally carry the
//! remaining element count.  The walker is independent of any variant:
//! child frames are derived by parsing the walker's own signature slice.

use crate::{signature::signature_next, variant::VariantErr};
use smallvec::SmallVec;

/// Maximum frame depth of a single compound access.
///
/// Deeper signatures must enter and exit their containers explicitly;
/// exceeding the limit in a single call is a programming error.
pub const MAX_VARG: usize = 16;

/// One step of the walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Next {
  /// The signature is exhausted.
  End,
  /// The current container is done; leave it.
  Leave,
  /// The next element of interest.
  Element(u8),
}

struct VargLevel<'t> {
  ty: &'t [u8],
  pos: usize,
  /// Remaining element count for array/maybe frames, `None` otherwise.
  n_array: Option<usize>,
}

/// Walker state for one compound access.
pub(crate) struct Varg<'t> {
  levels: SmallVec<[VargLevel<'t>; MAX_VARG]>,
}

impl<'t> Varg<'t> {
  pub fn new(signature: &'t [u8]) -> Varg<'t> {
    let mut levels = SmallVec::new();
    levels.push(VargLevel {
      ty: signature,
      pos: 0,
      n_array: None,
    });
    Varg { levels }
  }

  /// Yields the next element, a level exit, or the end of the stream.
  pub fn next(&mut self) -> Next {
    let vlevel = match self.levels.last_mut() {
      Some(vlevel) => vlevel,
      None => return Next::End,
    };

    let c = match vlevel.n_array {
      None => {
        if vlevel.pos >= vlevel.ty.len() {
          0
        } else {
          let c = vlevel.ty[vlevel.pos];
          vlevel.pos += 1;
          c
        }
      },
      Some(0) => 0,
      Some(n) => {
        // array frames re-read their element type every round
        vlevel.n_array = Some(n - 1);
        vlevel.ty[vlevel.pos - 1]
      },
    };

    if c == 0 {
      if self.levels.len() == 1 {
        return Next::End;
      }
      self.levels.pop();
      return Next::Leave;
    }
    Next::Element(c)
  }

  /// Pushes a caller-provided type as a new frame (used for `v`).
  pub fn push_types(&mut self, ty: &'t [u8]) {
    self.push(VargLevel {
      ty,
      pos: 0,
      n_array: None,
    });
  }

  /// Enters the bound container whose marker [`Varg::next`] just
  /// yielded, pushing a frame that walks its element `n_array` times.
  pub fn enter_bound(&mut self, n_array: usize) -> Result<(), VariantErr> {
    self.enter(true, Some(n_array))
  }

  /// Enters the unbound container whose opening bracket [`Varg::next`]
  /// just yielded.
  pub fn enter_unbound(&mut self) -> Result<(), VariantErr> {
    self.enter(false, None)
  }

  fn enter(
    &mut self,
    bound: bool,
    n_array: Option<usize>,
  ) -> Result<(), VariantErr> {
    let (child, advance) = {
      let vlevel = match self.levels.last() {
        Some(vlevel) => vlevel,
        None => return Err(err!(error, VariantErr::Internal)),
      };
      // the container marker sits one position back
      let start = vlevel.pos - 1;
      let info = match signature_next(&vlevel.ty[start..]) {
        Ok(Some(info)) => info,
        Ok(None) => return Err(err!(debug, VariantErr::InvalidType)),
        Err(err) => return Err(err),
      };
      let n = info.ty.len();
      let child = if bound {
        // the frame covers the element type, pointing past its first
        // character so it can be re-read per element
        VargLevel {
          ty: &vlevel.ty[start + 1..start + n],
          pos: 1,
          n_array,
        }
      } else {
        // both brackets are dropped
        VargLevel {
          ty: &vlevel.ty[start + 1..start + n - 1],
          pos: 0,
          n_array: None,
        }
      };
      (child, n - 1)
    };

    // Only non-array frames consume the container from their own type;
    // array frames stay put on their element.
    if let Some(vlevel) = self.levels.last_mut() {
      if vlevel.n_array.is_none() {
        vlevel.pos += advance;
      }
    }
    self.push(child);
    Ok(())
  }

  fn push(&mut self, level: VargLevel<'t>) {
    assert!(
      self.levels.len() < MAX_VARG,
      "compound signature exceeds MAX_VARG frames"
    );
    self.levels.push(level);
  }
}
