//! Deserialization of sealed variants.
//!
//! All readers follow the serialized format closely.  A malformed tail is
//! never fatal by itself: a slot that falls outside its container is
//! truncated to empty and the affected element decodes as its default
//! value.  Errors are reserved for type-shape faults, i.e. the caller's
//! requested element disagreeing with the residual type, or an exhausted
//! container.

use crate::{
  signature::{signature_next, signature_one},
  value::{Fixed, Handle, ReadArg, Value},
  varg::{Next, Varg},
  variant::{Variant, VariantErr},
  level::Level,
};
use alloc::vec::Vec;

/// Slot information produced by a reader peek.
pub(crate) struct Peeked {
  /// Fixed size of the element, or 0.
  pub fixed_size: usize,
  /// Bound-child size of the element, or 0.
  pub bound_size: usize,
  /// Type characters the element occupies.
  pub n_ty: usize,
  /// Bytes available to the element; 0 when the slot is truncated.
  pub slot: usize,
  /// End offset of the element within the current container.
  pub end: usize,
}

impl<'a> Variant<'a> {
  /// Computes the slot of the next element at the current level.
  ///
  /// The caller states the element it expects; a disagreement with the
  /// residual type or an exhausted container is a [`VariantErr::TypeMismatch`].
  /// If the container cannot satisfy the element, the slot is truncated
  /// to 0 and the default value applies.
  pub(crate) fn peek(&mut self, element: u8) -> Result<Peeked, VariantErr> {
    {
      let level = self.stack.top();
      let types = level.types();
      if types.first() != Some(&element) || level.index == 0 {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
      }
    }

    // residual types are suffixes of validated signatures, so this parse
    // cannot fail
    let (alignment, fixed_size, bound_size, n_ty) = {
      let level = self.stack.top();
      match signature_next(level.types()) {
        Ok(Some(info)) => {
          (info.alignment, info.size, info.bound_size, info.ty.len())
        },
        _ => {
          return Err(self.poison_with(err!(error, VariantErr::Internal)))
        },
      }
    };

    let level = self.stack.top_mut();
    level.align_front(alignment);

    let mut end = level.offset;
    if fixed_size > 0 {
      end = end.saturating_add(fixed_size);
    } else {
      let word = level.word;
      let wz = word.bytes();

      match level.enclosing {
        b'v' => {
          // captured on entry: offset of the embedded type string
          end = level.index - 1;
        },
        b'm' => {
          end = level.size - 1;
        },
        b'a' => {
          let skip = (level.index - 1).saturating_mul(wz);
          let tail = self.buf.tail(level, skip);
          if wz <= tail.len() {
            end = word.fetch(&tail[tail.len() - wz..]);
          }
        },
        b'(' | b'{' => {
          let skip = (level.index - 1).saturating_mul(wz);
          if n_ty == level.types().len() {
            // the final child ends where the framing table begins
            if skip <= level.size {
              end = level.size - skip;
            }
          } else {
            let tail = self.buf.tail(level, skip);
            if wz <= tail.len() {
              end = word.fetch(&tail[tail.len() - wz..]);
            }
          }
        },
        _ => {
          return Err(self.poison_with(err!(error, VariantErr::Internal)))
        },
      }
    }

    let level = self.stack.top();
    let slot = if end >= level.offset && end <= level.size {
      end - level.offset
    } else {
      0
    };

    Ok(Peeked {
      fixed_size,
      bound_size,
      n_ty,
      slot,
      end,
    })
  }

  /// Maps the current slot; `None` if `slot` bytes are not linearly
  /// accessible at the front cursor.
  fn front_slot(&mut self, slot: usize) -> Option<&[u8]> {
    let level = self.stack.top_mut();
    let front = self.buf.front(level);
    if slot <= front.len() {
      Some(&front[..slot])
    } else {
      None
    }
  }

  /// Moves the front cursor past the peeked element and updates the
  /// container bookkeeping.
  pub(crate) fn advance(&mut self, peeked: &Peeked) {
    let level = self.stack.top_mut();
    self.buf.jump(level, peeked.end);

    match level.enclosing {
      b'm' | b'a' => {
        level.index -= 1;
      },
      b'(' | b'{' => {
        if peeked.fixed_size == 0 {
          level.index += 1;
        }
        level.consume(peeked.n_ty);
      },
      _ => {
        level.consume(peeked.n_ty);
      },
    }
  }

  pub(crate) fn enter_one(&mut self, container: u8) -> Result<(), VariantErr> {
    let peeked = self.peek(container)?;

    let mut child = {
      let level = self.stack.top();
      let types = level.types();
      let interior = match container {
        b'(' | b'{' => &types[1..peeked.n_ty - 1],
        _ => &types[1..peeked.n_ty],
      };
      Level::enter(level, container, peeked.slot, interior)
    };

    match container {
      b'v' => {
        // The embedded type trails the child slot, separated from the
        // value by a NUL byte.  Scan the linearly mapped tail backwards;
        // anything unparseable degrades to the null variant.
        let mut embedded: Option<smallvec::SmallVec<[u8; 16]>> = None;
        {
          let tail = self.buf.tail(&mut child, 0);
          let mut i = 1;
          while i < tail.len() {
            if tail[tail.len() - i - 1] == 0 {
              break;
            }
            i += 1;
          }
          if i < tail.len()
            && signature_one(&tail[tail.len() - i..]).is_ok()
          {
            embedded =
              Some(smallvec::SmallVec::from_slice(&tail[tail.len() - i..]));
          }
        }
        match embedded {
          Some(ty) => {
            child.index = child.size - ty.len();
            child.set_types(&ty);
          },
          None => {
            child.set_types(b"()");
            child.index = 1;
          },
        }
      },
      b'm' => {
        // Non-empty iff sized: a dynamic child occupies any non-zero
        // size, a fixed child exactly its fixed size.
        if child.size > 0
          && (peeked.bound_size == 0 || peeked.bound_size == child.size)
        {
          child.index = 1;
        }
      },
      b'a' => {
        if peeked.bound_size > 0 {
          // fixed-size elements; a remainder makes the array empty
          if child.size % peeked.bound_size == 0 {
            child.index = child.size / peeked.bound_size;
          }
        } else {
          // dynamic elements: the last framing word bounds the table
          let word = child.word;
          let wz = word.bytes();
          let tail = self.buf.tail(&mut child, 0);
          if wz <= tail.len() {
            let last = word.fetch(&tail[tail.len() - wz..]);
            if last < child.size {
              let num = child.size - last;
              if num % wz == 0 {
                child.index = num / wz;
              }
            }
          }
        }
      },
      b'(' | b'{' => {
        child.index = 1;
      },
      _ => {
        return Err(self.poison_with(err!(error, VariantErr::Internal)))
      },
    }

    self.advance(&peeked);
    self.stack.push(child);
    Ok(())
  }

  pub(crate) fn exit_one(&mut self) -> Result<(), VariantErr> {
    if self.stack.pop().is_none() {
      return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)));
    }
    Ok(())
  }

  /// Enters the containers ahead, one level per character of
  /// `containers` (`v`, `m`, `a`, `(`, `{`).
  ///
  /// The operation stops at the first element that is not a container of
  /// the requested kind.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn enter(&mut self, containers: &str) -> Result<(), VariantErr> {
    if self.null {
      return Err(err!(debug, VariantErr::NullVariantMutation));
    }
    assert!(self.sealed, "enter on an unsealed variant");

    for c in containers.bytes() {
      match c {
        b'v' | b'm' | b'a' | b'(' | b'{' => self.enter_one(c)?,
        _ => {
          return Err(self.poison_with(err!(debug, VariantErr::InvalidType)))
        },
      }
    }
    Ok(())
  }

  /// Exits the current containers, one level per character of
  /// `containers` (`v`, `m`, `a`, `)`, `}`).
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn exit(&mut self, containers: &str) -> Result<(), VariantErr> {
    if self.null {
      return Err(err!(debug, VariantErr::NullVariantMutation));
    }
    assert!(self.sealed, "exit on an unsealed variant");

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
      self.exit_one()?;
    }
    Ok(())
  }

  /// Reads the next fixed-size basic leaf.
  ///
  /// A slot that is truncated or not linearly mapped yields the default
  /// value; only a type disagreement is an error.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn read<T: Fixed>(&mut self) -> Result<T, VariantErr> {
    if self.null {
      return Err(err!(debug, VariantErr::TypeMismatch));
    }
    assert!(self.sealed, "read on an unsealed variant");

    let peeked = self.peek(T::ELEMENT)?;
    let value = match self.front_slot(peeked.slot) {
      Some(front) if peeked.slot == T::SIZE => T::decode(front),
      _ => T::default(),
    };
    self.advance(&peeked);
    Ok(value)
  }

  /// Reads the next string-like leaf (`s`, `o`, or `g`), zero-copy.
  ///
  /// A slot without a terminating NUL, spanning a buffer seam, or holding
  /// invalid UTF-8 yields the empty string.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn read_str(&mut self) -> Result<&str, VariantErr> {
    if self.null {
      return Err(err!(debug, VariantErr::TypeMismatch));
    }
    assert!(self.sealed, "read on an unsealed variant");

    let element = match self.stack.top().types().first() {
      Some(&c @ (b's' | b'o' | b'g')) => c,
      _ => {
        return Err(self.poison_with(err!(debug, VariantErr::TypeMismatch)))
      },
    };
    self.read_str_element(element)
  }

  pub(crate) fn read_str_element(
    &mut self,
    element: u8,
  ) -> Result<&str, VariantErr> {
    let peeked = self.peek(element)?;
    let raw: *const [u8] = match self.front_slot(peeked.slot) {
      Some(front) if peeked.slot > 0 && front[peeked.slot - 1] == 0 => {
        &front[..peeked.slot - 1]
      },
      _ => &[] as &[u8],
    };
    self.advance(&peeked);

    // SAFETY: the slice points into sealed span storage (or is the empty
    // slice).  Reader operations only move cursor state; they never
    // mutate or reallocate the spans, so the bytes stay valid for the
    // borrow of `self`.
    let bytes: &[u8] = unsafe { &*raw };
    Ok(core::str::from_utf8(bytes).unwrap_or(""))
  }

  /// Reads a batch of data according to `signature`.
  ///
  /// Every leaf in the signature produces one [`Value`], in order.
  /// Containers consume steering arguments from `args`: each `v` one
  /// [`ReadArg::VariantType`], each `m` one [`ReadArg::Maybe`], each `a`
  /// one [`ReadArg::Count`]; tuples and pairs consume nothing.
  ///
  /// Elements whose backing data is malformed decode as defaults; an
  /// error is returned iff the signature (or a steering argument)
  /// disagrees with the variant.  The cursor is left where the failure
  /// occurred.
  ///
  /// It is a programming error to call this on an unsealed variant.
  pub fn readv<'s>(
    &'s mut self,
    signature: &str,
    args: &[ReadArg<'_>],
  ) -> Result<Vec<Value<'s>>, VariantErr> {
    let mut out = Vec::new();
    if signature.is_empty() {
      return Ok(out);
    }
    if self.null {
      if signature == "()" {
        return Ok(out);
      }
      return Err(err!(debug, VariantErr::TypeMismatch));
    }
    assert!(self.sealed, "readv on an unsealed variant");

    let mut varg = Varg::new(signature.as_bytes());
    let mut args = args.iter();
    loop {
      match varg.next() {
        Next::End => break,
        Next::Leave => {
          let _ = self.exit_one();
        },
        Next::Element(c) => match c {
          b'v' => {
            self.enter_one(b'v')?;
            match args.next() {
              Some(&ReadArg::VariantType(Some(ty))) => {
                varg.push_types(ty.as_bytes())
              },
              Some(&ReadArg::VariantType(None)) => {
                let _ = self.exit_one();
              },
              _ => {
                return Err(
                  self.poison_with(err!(debug, VariantErr::TypeMismatch)),
                )
              },
            }
          },
          b'm' | b'a' => {
            self.enter_one(c)?;
            let count = match args.next() {
              Some(&ReadArg::Maybe(present)) if c == b'm' => present as usize,
              Some(&ReadArg::Count(count)) if c == b'a' => count,
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
            self.enter_one(c)?;
            if let Err(err) = varg.enter_unbound() {
              return Err(self.poison_with(err));
            }
          },
          b's' | b'o' | b'g' => {
            let s = self.read_str_element(c)?;
            // SAFETY: same justification as in `read_str_element`; the
            // lifetime is re-bound to the full borrow of `self`, across
            // which only cursor state changes.
            let s: &'s str = unsafe { core::mem::transmute(s) };
            out.push(Value::Str(s));
          },
          c => out.push(self.read_leaf(c)?),
        },
      }
    }
    Ok(out)
  }

  fn read_leaf(&mut self, element: u8) -> Result<Value<'static>, VariantErr> {
    Ok(match element {
      b'b' => Value::Bool(self.read::<bool>()?),
      b'y' => Value::Byte(self.read::<u8>()?),
      b'n' => Value::Int16(self.read::<i16>()?),
      b'q' => Value::Uint16(self.read::<u16>()?),
      b'i' => Value::Int32(self.read::<i32>()?),
      b'u' => Value::Uint32(self.read::<u32>()?),
      b'x' => Value::Int64(self.read::<i64>()?),
      b't' => Value::Uint64(self.read::<u64>()?),
      b'h' => Value::Handle(self.read::<Handle>()?),
      b'd' => Value::Double(self.read::<f64>()?),
      _ => {
        return Err(self.poison_with(err!(debug, VariantErr::InvalidType)))
      },
    })
  }
}
