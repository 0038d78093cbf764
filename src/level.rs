//! Per-container cursor state and the chunked level stack.
//!
//! Serialized variants nest two ways: natively (tuples, arrays, maybes,
//! pairs) and through recursion (`v` embeds a blob together with its type
//! string).  Iteration state for each entered container is kept in a
//! [`Level`]; the stack of levels lives in a [`LevelStack`].
//!
//! The container-specific `index` field:
//!  - arrays: number of remaining elements to be parsed; 0 means end.
//!  - tuples/pairs (reader): number of *already* parsed dynamic-sized
//!    children plus one.
//!  - tuples/pairs/arrays (writer): number of framing entries staged at the
//!    tail.
//!  - variant recursion: offset of the embedded type string (reader), or
//!    its length (writer).
//!  - maybes: 1 if non-empty, 0 if `Nothing`.
//!
//! Payload data backing a level is not required to be linear in memory, so
//! cursors are (span, intra-span, logical-offset) tuples rather than plain
//! offsets.  Cursor movement mostly happens on the logical offset alone;
//! the span components are reconciled lazily when the cursor is
//! dereferenced (folding/unfolding, see `buffer.rs`).

use crate::word::WordSize;
use smallvec::SmallVec;

/// Number of levels per stack chunk.
const CHUNK_LEVELS: usize = 16;

/// Cursor state of one entered container.
#[derive(Clone, Debug)]
pub(crate) struct Level {
  /// Bytes available to this container.
  pub size: usize,
  /// Tail cursor, intra-span byte index.
  ///
  /// Sealed variants address spans from the front (`v_tail` is an absolute
  /// span index and the cursor walks backwards from the container end);
  /// unsealed variants stage framing scratch at the back of the span list
  /// (`v_tail` counts spans from the end, `i_tail` grows forward).
  pub i_tail: usize,
  /// Tail cursor, span index component.
  pub v_tail: u16,
  /// Cached word size of this container.
  pub word: WordSize,
  /// Enclosing container kind (`(`, `{`, `a`, `m`, `v`; the root behaves
  /// as a tuple).
  pub enclosing: u8,
  /// Front cursor, span index.
  pub v_front: u16,
  /// Front cursor, intra-span byte index.
  pub i_front: usize,
  /// Logical byte offset from the container start.
  pub offset: usize,
  /// Container-specific counter, see the module docs.
  pub index: usize,
  /// Residual type of this level.
  ty: SmallVec<[u8; 16]>,
  /// Consumed prefix of `ty`.
  ty_pos: u16,
}

impl Level {
  /// Root level of a sealed variant covering `size` bytes.
  pub fn root(size: usize, ty: &[u8]) -> Level {
    Level {
      size,
      i_tail: size,
      v_tail: 0,
      word: WordSize::select(size, 0),
      enclosing: b'(',
      v_front: 0,
      i_front: 0,
      offset: 0,
      // the number of parsed dynamic-size children, plus one
      index: 1,
      ty: SmallVec::from_slice(ty),
      ty_pos: 0,
    }
  }

  /// Root level of a fresh writer variant.
  pub fn writer_root(size: usize, ty: &[u8]) -> Level {
    Level {
      size,
      i_tail: 0,
      v_tail: 0,
      word: WordSize::select(0, 0),
      enclosing: b'(',
      v_front: 0,
      i_front: 0,
      offset: 0,
      index: 0,
      ty: SmallVec::from_slice(ty),
      ty_pos: 0,
    }
  }

  /// Child level entered below `parent` while reading.
  ///
  /// The child covers `size` bytes starting at the parent's (aligned)
  /// front cursor; its tail cursor is initialized unfolded.
  pub fn enter(parent: &Level, enclosing: u8, size: usize, ty: &[u8]) -> Level {
    Level {
      size,
      i_tail: parent.i_front.saturating_add(size),
      v_tail: parent.v_front,
      word: WordSize::select(size, 0),
      enclosing,
      v_front: parent.v_front,
      i_front: parent.i_front,
      offset: 0,
      index: 0,
      ty: SmallVec::from_slice(ty),
      ty_pos: 0,
    }
  }

  /// Child level begun below `parent` while writing.
  pub fn begin(parent: &Level, enclosing: u8, size: usize) -> Level {
    Level {
      size,
      i_tail: parent.i_tail,
      v_tail: parent.v_tail,
      word: WordSize::select(0, 0),
      enclosing,
      v_front: parent.v_front,
      i_front: parent.i_front,
      offset: 0,
      index: 0,
      ty: SmallVec::new(),
      ty_pos: 0,
    }
  }

  /// The remaining type characters to be consumed at this level.
  #[inline(always)]
  pub fn types(&self) -> &[u8] {
    &self.ty[self.ty_pos as usize..]
  }

  /// The full residual type this level was entered with.
  #[inline(always)]
  pub fn all_types(&self) -> &[u8] {
    &self.ty
  }

  /// Marks `n` leading characters of the residual type as consumed.
  pub fn consume(&mut self, n: usize) {
    debug_assert!(self.ty_pos as usize + n <= self.ty.len());
    self.ty_pos += n as u16;
  }

  /// Replaces the residual type of this level.
  pub fn set_types(&mut self, ty: &[u8]) {
    self.ty = SmallVec::from_slice(ty);
    self.ty_pos = 0;
  }

  /// Aligns the front cursor; `alignment` is a power-of-two exponent.
  ///
  /// `i_front` does not reflect global alignment (spans split
  /// arbitrarily), so the padding is computed from the logical offset;
  /// every container is aligned to its maximum alignment, hence offset 0
  /// is aligned.
  pub fn align_front(&mut self, alignment: u8) {
    let offset =
      crate::util::align_up(self.offset, 1usize << alignment);
    self.i_front = self.i_front.saturating_add(offset - self.offset);
    self.offset = offset;
  }
}

/// Stack of levels, chunked so that depth excursions past the inline
/// chunk spill into further linked chunks instead of reallocating.
///
/// One emptied chunk is cached for reuse.  The root level is never popped.
pub(crate) struct LevelStack {
  chunks: alloc::vec::Vec<alloc::vec::Vec<Level>>,
  spare: Option<alloc::vec::Vec<Level>>,
}

impl LevelStack {
  pub fn new(root: Level) -> LevelStack {
    let mut first = alloc::vec::Vec::with_capacity(CHUNK_LEVELS);
    first.push(root);
    LevelStack {
      chunks: alloc::vec![first],
      spare: None,
    }
  }

  /// True iff the stack holds exactly one entry in the first chunk.
  pub fn is_root(&self) -> bool {
    self.chunks.len() == 1 && self.chunks[0].len() == 1
  }

  pub fn depth(&self) -> usize {
    (self.chunks.len() - 1) * CHUNK_LEVELS
      + self.chunks[self.chunks.len() - 1].len()
  }

  pub fn top(&self) -> &Level {
    match self.chunks.last().and_then(|chunk| chunk.last()) {
      Some(level) => level,
      None => unreachable!("level stack is never empty"),
    }
  }

  pub fn top_mut(&mut self) -> &mut Level {
    match self.chunks.last_mut().and_then(|chunk| chunk.last_mut()) {
      Some(level) => level,
      None => unreachable!("level stack is never empty"),
    }
  }

  pub fn push(&mut self, level: Level) {
    if self
      .chunks
      .last()
      .map(|chunk| chunk.len() >= CHUNK_LEVELS)
      .unwrap_or(true)
    {
      let chunk = self
        .spare
        .take()
        .unwrap_or_else(|| alloc::vec::Vec::with_capacity(CHUNK_LEVELS));
      self.chunks.push(chunk);
    }
    match self.chunks.last_mut() {
      Some(chunk) => chunk.push(level),
      None => unreachable!("level stack chunk just ensured"),
    }
  }

  /// Pops the current level; the root level stays put and yields `None`.
  pub fn pop(&mut self) -> Option<Level> {
    if self.is_root() {
      return None;
    }
    let level = self.chunks.last_mut().and_then(|chunk| chunk.pop());
    if self.chunks.len() > 1
      && self.chunks.last().map(|c| c.is_empty()).unwrap_or(false)
    {
      if let Some(chunk) = self.chunks.pop() {
        if self.spare.is_none() {
          self.spare = Some(chunk);
        }
      }
    }
    level
  }
}
