//! Serialization into unsealed variants.
//!
//! Writes append content at the front of the scatter buffer.  Framing
//! offsets of dynamic-sized children are staged at the tail as 8-byte
//! scratch entries while their container is open; closing the container
//! determines the final word size and compacts the staged entries into
//! the container's framing table.  Sealing closes all open containers,
//! releases unused buffer space, and re-initializes the variant for
//! reading.

use crate::{
  level::Level,
  signature::{signature_next, signature_one},
  value::{Fixed, WriteArg},
  varg::{Next, Varg},
  variant::{Variant, VariantErr},
  word::WordSize,
};
use smallvec::SmallVec;

impl<'a> Variant<'a> {
  fn check_writable(&self) -> Result<(), VariantErr> {
    if self.null {
      return Err(err!(debug, VariantErr::NullVariantMutation));
    }
    assert!(!self.sealed, "write on a sealed variant");
    Ok(())
  }

  /// Appends the next element at the current level: checks it against
  /// the residual type, reserves `n_front` aligned bytes for its
  /// serialized form, and stages a framing entry when the container
  /// requires one.  Returns the reserved front region.
  fn append(
    &mut self,
    element: u8,
    n_front: usize,
  ) -> Result<(usize, usize), VariantErr> {
    {
      let level = self.stack.top();
      if level.types().first() != Some(&element) {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
      }
    }

    let (alignment, fixed_size, n_ty) = {
      let level = self.stack.top();
      match signature_next(level.types()) {
        Ok(Some(info)) => (info.alignment, info.size, info.ty.len()),
        _ => {
          return Err(self.poison_with(err!(error, VariantErr::Internal)))
        },
      }
    };
    debug_assert!(fixed_size == 0 || n_front == 0 || n_front == fixed_size);

    // Dynamic-sized children of tuples, pairs and arrays record their end
    // offset in a framing slot; the final child of a tuple or pair does
    // not (its end is the container's end).
    let need_frame = {
      let level = self.stack.top();
      fixed_size == 0
        && match level.enclosing {
          b'(' | b'{' => n_ty < level.types().len(),
          b'a' => true,
          _ => false,
        }
    };

    // A framing slot needs 8-byte alignment and 8 bytes at the tail.
    let reserved = {
      let level = self.stack.top_mut();
      self.buf.reserve(
        level,
        alignment,
        n_front,
        if need_frame { 3 } else { 0 },
        if need_frame { 8 } else { 0 },
      )
    };
    let reserved = match reserved {
      Ok(reserved) => reserved,
      Err(err) => return Err(self.poison_with(err)),
    };

    if need_frame {
      let offset = {
        let level = self.stack.top_mut();
        level.index += 1;
        level.offset
      };
      let (vt, off) = reserved.tail;
      self.buf.span_mut(vt).bytes_mut()[off..off + 8]
        .copy_from_slice(&(offset as u64).to_le_bytes());
    }

    {
      let level = self.stack.top_mut();
      match level.enclosing {
        b'a' => {},
        b'm' => {
          // non-empty dynamic maybes get their marker byte on close
          if fixed_size == 0 {
            level.index += 1;
          }
          level.consume(n_ty);
        },
        _ => level.consume(n_ty),
      }
    }

    Ok(reserved.front)
  }

  pub(crate) fn begin_one(
    &mut self,
    container: u8,
    v_type: Option<&str>,
  ) -> Result<(), VariantErr> {
    if container == b'v' {
      // the embedded type must itself be one complete, valid type
      let ty = match v_type {
        Some(ty) => ty,
        None => {
          return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)))
        },
      };
      if let Err(err) = signature_one(ty.as_bytes()) {
        return Err(self.poison_with(err));
      }
    }

    // capture the child's residual type before `append` consumes the
    // container element
    let (interior, size): (SmallVec<[u8; 16]>, usize) = {
      let level = self.stack.top();
      let types = level.types();
      if types.first() != Some(&container) {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
      }
      let info = match signature_next(types) {
        Ok(Some(info)) => info,
        _ => {
          return Err(self.poison_with(err!(error, VariantErr::Internal)))
        },
      };
      let n = info.ty.len();
      let interior = match container {
        b'v' => SmallVec::from_slice(v_type.unwrap_or_default().as_bytes()),
        b'm' | b'a' => SmallVec::from_slice(&info.ty[1..]),
        b'(' | b'{' => SmallVec::from_slice(&info.ty[1..n - 1]),
        _ => {
          return Err(self.poison_with(err!(debug, VariantErr::InvalidType)))
        },
      };
      (interior, info.size)
    };

    self.append(container, 0)?;

    let mut child = Level::begin(self.stack.top(), container, size);
    child.set_types(&interior);
    if container == b'v' {
      // remember the embedded type length for the close
      child.index = interior.len();
    }
    self.stack.push(child);
    Ok(())
  }

  pub(crate) fn end_one(&mut self) -> Result<(), VariantErr> {
    if self.stack.is_root() {
      return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
    }

    // fixed-size containers are zero-padded up to their static size
    {
      let (size, offset) = {
        let level = self.stack.top();
        (level.size, level.offset)
      };
      if size > 0 && offset < size {
        let pad = size - offset;
        let reserved = {
          let level = self.stack.top_mut();
          self.buf.reserve(level, 0, pad, 0, 0)
        };
        let reserved = match reserved {
          Ok(reserved) => reserved,
          Err(err) => return Err(self.poison_with(err)),
        };
        let (vi, off) = reserved.front;
        self.buf.span_mut(vi).bytes_mut()[off..off + pad].fill(0);
      }
    }

    let (word, n_front) = {
      let level = self.stack.top();
      let word = WordSize::select(level.offset, level.index);
      let n_front = match level.enclosing {
        b'v' => level.index + 1,
        b'm' => (level.index > 0) as usize,
        b'a' | b'(' | b'{' => level.index * word.bytes(),
        _ => {
          return Err(self.poison_with(err!(error, VariantErr::Internal)))
        },
      };
      (word, n_front)
    };

    let reserved = {
      let level = self.stack.top_mut();
      self.buf.reserve(level, 0, n_front, 0, 0)
    };
    let reserved = match reserved {
      Ok(reserved) => reserved,
      Err(err) => return Err(self.poison_with(err)),
    };

    let prev = match self.stack.pop() {
      Some(prev) => prev,
      None => return Err(self.poison_with(err!(error, VariantErr::Internal))),
    };
    let (fvi, foff) = reserved.front;

    match prev.enclosing {
      b'v' => {
        // from the front: the value, a NUL byte, the embedded type
        let front =
          &mut self.buf.span_mut(fvi).bytes_mut()[foff..foff + n_front];
        front[0] = 0;
        front[1..].copy_from_slice(prev.all_types());
      },
      b'm' => {
        if prev.index > 0 {
          self.buf.span_mut(fvi).bytes_mut()[foff] = 0;
        }
      },
      _ => {
        // Compact the staged 8-byte entries into the framing table,
        // re-encoded at the final word size.  The scratch is walked
        // newest-first; arrays therefore fill their table backwards to
        // restore element order, tuples and pairs forwards (their table
        // is stored reversed).
        let count = prev.index;
        let wz = word.bytes();
        let mut slot = if prev.enclosing == b'a' {
          count.wrapping_sub(1)
        } else {
          0
        };
        let backwards = prev.enclosing == b'a';

        let mut v_abs = self.buf.count() - 1 - prev.v_tail as usize;
        let mut rem = prev.i_tail;
        for _ in 0..count {
          while rem < 8 {
            assert!(rem == 0);
            v_abs += 1;
            rem = self.buf.span(v_abs).len();
            assert!(rem % 8 == 0);
          }
          rem -= 8;

          let entry = {
            let bytes = self.buf.span(v_abs).bytes();
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[rem..rem + 8]);
            u64::from_le_bytes(raw) as usize
          };
          let at = foff + slot * wz;
          word.store(
            entry,
            &mut self.buf.span_mut(fvi).bytes_mut()[at..at + wz],
          );
          slot = if backwards {
            slot.wrapping_sub(1)
          } else {
            slot + 1
          };
        }
      },
    }

    // The parent was aligned when the child was entered, so the child's
    // offset is exactly the byte count to advance by.
    {
      let level = self.stack.top_mut();
      level.i_front += prev.offset;
      level.offset += prev.offset;
    }

    // A closed dynamic-sized child stores its end offset into the framing
    // slot reserved when it was begun (except as the final child of a
    // tuple or pair).
    if prev.size == 0 {
      let (store, v_tail, i_tail, offset) = {
        let level = self.stack.top();
        let store = match level.enclosing {
          b'(' | b'{' => !level.types().is_empty(),
          b'a' => true,
          _ => false,
        };
        (store, level.v_tail as usize, level.i_tail, level.offset)
      };
      if store {
        assert!(i_tail >= 8 && i_tail % 8 == 0);
        let v_abs = self.buf.count() - 1 - v_tail;
        self.buf.span_mut(v_abs).bytes_mut()[i_tail - 8..i_tail]
          .copy_from_slice(&(offset as u64).to_le_bytes());
      }
    }

    Ok(())
  }

  /// Begins the containers listed in `containers`, moving the cursor into
  /// them for subsequent writes (`v`, `m`, `a`, `(`, `{`).
  ///
  /// Each `v` consumes the next entry of `v_types` as the embedded type
  /// of the variant.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn begin(
    &mut self,
    containers: &str,
    v_types: &[&str],
  ) -> Result<(), VariantErr> {
    self.check_writable()?;

    let mut v_types = v_types.iter();
    for c in containers.bytes() {
      match c {
        b'v' => self.begin_one(b'v', v_types.next().copied())?,
        b'm' | b'a' | b'(' | b'{' => self.begin_one(c, None)?,
        _ => {
          return Err(self.poison_with(err!(debug, VariantErr::InvalidType)))
        },
      }
    }
    Ok(())
  }

  /// Ends the containers listed in `containers` (`v`, `m`, `a`, `)`,
  /// `}`), emitting their framing offsets.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn end(&mut self, containers: &str) -> Result<(), VariantErr> {
    self.check_writable()?;

    for c in containers.bytes() {
      let enclosing = match c {
        b'v' | b'm' | b'a' => c,
        b')' => b'(',
        b'}' => b'{',
        _ => {
          return Err(self.poison_with(err!(debug, VariantErr::InvalidType)))
        },
      };
      if enclosing != self.stack.top().enclosing {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
      }
      self.end_one()?;
    }
    Ok(())
  }

  /// Writes the next fixed-size basic leaf.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn write<T: Fixed>(&mut self, value: T) -> Result<(), VariantErr> {
    self.check_writable()?;

    let (vi, off) = self.append(T::ELEMENT, T::SIZE)?;
    value.encode(&mut self.buf.span_mut(vi).bytes_mut()[off..off + T::SIZE]);
    Ok(())
  }

  /// Writes the next string-like leaf (`s`, `o`, or `g`), including its
  /// terminating NUL byte.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn write_str(&mut self, s: &str) -> Result<(), VariantErr> {
    self.check_writable()?;

    let element = match self.stack.top().types().first() {
      Some(&c @ (b's' | b'o' | b'g')) => c,
      _ => {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)))
      },
    };
    self.write_str_element(element, s)
  }

  pub(crate) fn write_str_element(
    &mut self,
    element: u8,
    s: &str,
  ) -> Result<(), VariantErr> {
    let n = s.len() + 1;
    let (vi, off) = self.append(element, n)?;
    let out = &mut self.buf.span_mut(vi).bytes_mut()[off..off + n];
    out[..s.len()].copy_from_slice(s.as_bytes());
    out[s.len()] = 0;
    Ok(())
  }

  /// Writes a batch of data according to `signature`.
  ///
  /// Every element consumes one entry of `args`: leaves their value, `v`
  /// a [`WriteArg::VariantType`], `m` a [`WriteArg::Maybe`], `a` a
  /// [`WriteArg::Count`]; tuples and pairs consume nothing.  Processing
  /// stops at the first error.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn writev(
    &mut self,
    signature: &str,
    args: &[WriteArg<'_>],
  ) -> Result<(), VariantErr> {
    if signature.is_empty() {
      return Ok(());
    }
    if self.null {
      if signature == "()" {
        return Ok(());
      }
      return Err(err!(debug, VariantErr::TypeMismatch));
    }
    assert!(!self.sealed, "writev on a sealed variant");

    let mut varg = Varg::new(signature.as_bytes());
    let mut args = args.iter();
    loop {
      match varg.next() {
        Next::End => break,
        Next::Leave => {
          let _ = self.end_one();
        },
        Next::Element(c) => match c {
          b'v' => {
            let ty = match args.next() {
              Some(&WriteArg::VariantType(ty)) => ty,
              _ => {
                return Err(
                  self.poison_with(err!(debug, VariantErr::TypeMismatch)),
                )
              },
            };
            self.begin_one(b'v', Some(ty))?;
            varg.push_types(ty.as_bytes());
          },
          b'm' | b'a' => {
            self.begin_one(c, None)?;
            let count = match args.next() {
              Some(&WriteArg::Maybe(present)) if c == b'm' => present as usize,
              Some(&WriteArg::Count(count)) if c == b'a' => count,
              _ => {
                return Err(
                  self.poison_with(err!(debug, VariantErr::TypeMismatch)),
                )
              },
            };
            if let Err(err) = varg.enter_bound(count) {
              return Err(self.poison_with(err));
            }
          },
          b'(' | b'{' => {
            self.begin_one(c, None)?;
            if let Err(err) = varg.enter_unbound() {
              return Err(self.poison_with(err));
            }
          },
          c => self.write_leaf(c, args.next())?,
        },
      }
    }
    Ok(())
  }

  fn write_leaf(
    &mut self,
    element: u8,
    arg: Option<&WriteArg<'_>>,
  ) -> Result<(), VariantErr> {
    match (element, arg) {
      (b'b', Some(&WriteArg::Bool(v))) => self.write(v),
      (b'y', Some(&WriteArg::Byte(v))) => self.write(v),
      (b'n', Some(&WriteArg::Int16(v))) => self.write(v),
      (b'q', Some(&WriteArg::Uint16(v))) => self.write(v),
      (b'i', Some(&WriteArg::Int32(v))) => self.write(v),
      (b'u', Some(&WriteArg::Uint32(v))) => self.write(v),
      (b'x', Some(&WriteArg::Int64(v))) => self.write(v),
      (b't', Some(&WriteArg::Uint64(v))) => self.write(v),
      (b'h', Some(&WriteArg::Handle(v))) => self.write(v),
      (b'd', Some(&WriteArg::Double(v))) => self.write(v),
      (b's' | b'o' | b'g', Some(&WriteArg::Str(s))) => {
        self.write_str_element(element, s)
      },
      (b'b' | b'y' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'h' | b'd'
      | b's' | b'o' | b'g', _) => {
        Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)))
      },
      _ => Err(self.poison_with(err!(debug, VariantErr::InvalidType))),
    }
  }

  /// Splices pre-serialized content for the next element, zero-copy.
  ///
  /// The next element at the current level must equal `ty` exactly; a
  /// fixed-size element requires the summed span length to match its
  /// size.  The spans are referenced, not copied, and must stay
  /// accessible for the lifetime of the variant.
  ///
  /// It is a programming error to call this on a sealed variant.
  pub fn insert(
    &mut self,
    ty: &str,
    spans: &[&'a [u8]],
  ) -> Result<(), VariantErr> {
    self.check_writable()?;

    let (alignment, fixed_size, n_ty) = {
      let info = match signature_one(ty.as_bytes()) {
        Ok(info) => info,
        Err(err) => return Err(self.poison_with(err)),
      };
      (info.alignment, info.size, info.ty.len())
    };

    {
      let level = self.stack.top();
      let types = level.types();
      if types.len() < n_ty || &types[..n_ty] != ty.as_bytes() {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
      }
    }

    let mut total = 0usize;
    for bytes in spans {
      total = match total.checked_add(bytes.len()) {
        Some(total) => total,
        None => {
          return Err(self.poison_with(err!(debug, VariantErr::BufferTooLarge)))
        },
      };
    }
    if fixed_size > 0 && total != fixed_size {
      return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
    }

    let need_frame = {
      let level = self.stack.top();
      fixed_size == 0
        && match level.enclosing {
          b'(' | b'{' => n_ty < level.types().len(),
          b'a' => true,
          _ => false,
        }
    };

    // align the front and stage the framing slot before splicing; the
    // splice shifts absolute span indices
    let reserved = {
      let level = self.stack.top_mut();
      self.buf.reserve(
        level,
        alignment,
        0,
        if need_frame { 3 } else { 0 },
        if need_frame { 8 } else { 0 },
      )
    };
    let reserved = match reserved {
      Ok(reserved) => reserved,
      Err(err) => return Err(self.poison_with(err)),
    };

    if need_frame {
      let end = {
        let level = self.stack.top_mut();
        level.index += 1;
        level.offset + total
      };
      let (vt, off) = reserved.tail;
      self.buf.span_mut(vt).bytes_mut()[off..off + 8]
        .copy_from_slice(&(end as u64).to_le_bytes());
    }

    let spliced = {
      let level = self.stack.top_mut();
      self.buf.splice(level, spans)
    };
    if let Err(err) = spliced {
      return Err(self.poison_with(err));
    }

    {
      let level = self.stack.top_mut();
      level.offset += total;
      match level.enclosing {
        b'a' => {},
        b'm' => {
          if fixed_size == 0 {
            level.index += 1;
          }
          level.consume(n_ty);
        },
        _ => level.consume(n_ty),
      }
    }
    Ok(())
  }

  /// Closes all open containers, releases unused buffer space, and seals
  /// the variant; afterwards it is read-only and its cursor sits at the
  /// root, as if freshly wrapped.
  ///
  /// Sealing a sealed variant merely rewinds it.
  pub fn seal(&mut self) -> Result<(), VariantErr> {
    if self.null {
      return Ok(());
    }
    if self.sealed {
      self.rewind();
      return Ok(());
    }

    while !self.stack.is_root() {
      self.end_one()?;
    }

    let (v_front, i_front, offset) = {
      let level = self.stack.top_mut();
      self.buf.fold_front(level);
      (level.v_front as usize, level.i_front, level.offset)
    };
    self.buf.span_mut(v_front).clip(i_front);
    self.buf.truncate(v_front + 1);

    self.sealed = true;
    *self.stack.top_mut() = Level::root(offset, &self.ty);
    Ok(())
  }
}
