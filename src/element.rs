//! Static per-element properties of GVariant type strings.
//!
//! A GVariant type is built out of _elements_, where an element is a single
//! character of a type string.  Every character maps to a static property
//! record; characters outside the recognized alphabet map to an invalid
//! record.  The four API-only pseudo-elements (`r`, `e`, `?`, `*`) are
//! recognized, but rejected for wire use (`real` is unset).

/// Static properties of a single type-string character.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Element {
  /// Alignment as a power of two; fixed-size elements occupy exactly
  /// `1 << alignment` bytes.
  pub alignment: u8,
  /// The character belongs to the recognized alphabet.
  pub valid: bool,
  /// The character may appear in wire type strings.
  pub real: bool,
  /// Basic (leaf) element.
  pub basic: bool,
  /// Fixed-size element.
  pub fixed: bool,
}

impl Element {
  const INVALID: Element = Element {
    alignment: 0,
    valid: false,
    real: false,
    basic: false,
    fixed: false,
  };

  const fn leaf_fixed(alignment: u8) -> Element {
    Element {
      alignment,
      valid: true,
      real: true,
      basic: true,
      fixed: true,
    }
  }

  const fn leaf_string() -> Element {
    Element {
      alignment: 0,
      valid: true,
      real: true,
      basic: true,
      fixed: false,
    }
  }

  const fn container(alignment: u8) -> Element {
    Element {
      alignment,
      valid: true,
      real: true,
      basic: false,
      fixed: false,
    }
  }

  const fn api_only() -> Element {
    Element {
      alignment: 0,
      valid: true,
      real: false,
      basic: false,
      fixed: false,
    }
  }
}

const fn classify(element: u8) -> Element {
  match element {
    b'b' | b'y' => Element::leaf_fixed(0),
    b'n' | b'q' => Element::leaf_fixed(1),
    b'i' | b'u' | b'h' => Element::leaf_fixed(2),
    b'x' | b't' | b'd' => Element::leaf_fixed(3),
    b's' | b'o' | b'g' => Element::leaf_string(),
    b'v' => Element::container(3),
    b'm' | b'a' | b'(' | b')' | b'{' | b'}' => Element::container(0),
    b'r' | b'e' | b'?' | b'*' => Element::api_only(),
    _ => Element::INVALID,
  }
}

static ELEMENTS: [Element; 256] = {
  let mut table = [Element::INVALID; 256];
  let mut i = 0;
  while i < 256 {
    table[i] = classify(i as u8);
    i += 1;
  }
  table
};

/// Returns the property record for `element`.  O(1), total.
#[inline(always)]
pub(crate) fn element(element: u8) -> &'static Element {
  &ELEMENTS[element as usize]
}
