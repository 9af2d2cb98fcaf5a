//! Range module: byte-range specifications used by slicing (`field[0:2]`).

use std::fmt;
use serde::{Serialize, Deserialize};

/// Where a range item stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeEnd {
    /// `[i:n]`: `n` bytes starting at `i`.
    Length(u32),
    /// `[i-j]`: up to and including offset `j` (negative counts from the end).
    Offset(i32),
    /// `[i:]`: everything from `i` onwards.
    ToTheEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeItem {
    /// Start offset; negative counts from the end of the value.
    pub start: i32,
    pub end: RangeEnd,
}

impl RangeItem {
    pub fn length(start: i32, len: u32) -> Self {
        Self { start, end: RangeEnd::Length(len) }
    }

    pub fn offset(start: i32, end: i32) -> Self {
        Self { start, end: RangeEnd::Offset(end) }
    }

    pub fn to_end(start: i32) -> Self {
        Self { start, end: RangeEnd::ToTheEnd }
    }

    /// `[i]`, a single byte.
    pub fn single(start: i32) -> Self {
        Self::length(start, 1)
    }

    /// Byte bounds within a value of `len` bytes, clamped to the value.
    fn bounds(&self, len: usize) -> (usize, usize) {
        let len = len as i64;
        let resolve = |off: i32| if off < 0 { len + off as i64 } else { off as i64 };
        let start = resolve(self.start).clamp(0, len);
        let end = match self.end {
            RangeEnd::Length(n) => start + n as i64,
            RangeEnd::Offset(j) => resolve(j) + 1,
            RangeEnd::ToTheEnd => len,
        };
        (start as usize, end.clamp(start, len) as usize)
    }
}

/// A list of byte ranges; slicing concatenates what each item selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    items: Vec<RangeItem>,
}

impl RangeSpec {
    pub fn new(items: Vec<RangeItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[RangeItem] {
        &self.items
    }

    /// Returns the selected bytes. Items reaching past either end of `bytes`
    /// are cut short, so a short value yields a short (or empty) slice.
    pub fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for item in &self.items {
            let (start, end) = item.bounds(bytes.len());
            out.extend_from_slice(&bytes[start..end]);
        }
        out
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = &[0, 1, 2, 3, 4, 5];

    #[test]
    fn test_length_item() {
        let r = RangeSpec::new(vec![RangeItem::length(1, 3)]);
        assert_eq!(r.apply(DATA), vec![1, 2, 3]);
    }

    #[test]
    fn test_offset_item_is_inclusive() {
        let r = RangeSpec::new(vec![RangeItem::offset(2, 4)]);
        assert_eq!(r.apply(DATA), vec![2, 3, 4]);
    }

    #[test]
    fn test_negative_offsets() {
        let r = RangeSpec::new(vec![RangeItem::single(-1)]);
        assert_eq!(r.apply(DATA), vec![5]);
        let r = RangeSpec::new(vec![RangeItem::offset(-3, -2)]);
        assert_eq!(r.apply(DATA), vec![3, 4]);
    }

    #[test]
    fn test_to_the_end_and_concatenation() {
        let r = RangeSpec::new(vec![RangeItem::single(0), RangeItem::to_end(4)]);
        assert_eq!(r.apply(DATA), vec![0, 4, 5]);
    }

    #[test]
    fn test_out_of_bounds_items_are_truncated() {
        assert_eq!(RangeSpec::new(vec![RangeItem::length(4, 3)]).apply(DATA), vec![4, 5]);
        assert_eq!(RangeSpec::new(vec![RangeItem::length(0, 4)]).apply(&[1, 2]), vec![1, 2]);
        assert!(RangeSpec::new(vec![RangeItem::single(9)]).apply(DATA).is_empty());
        assert_eq!(RangeSpec::new(vec![RangeItem::offset(-9, 1)]).apply(DATA), vec![0, 1]);
        assert!(RangeSpec::new(vec![RangeItem::offset(3, 1)]).apply(DATA).is_empty());
        assert!(RangeSpec::new(vec![]).apply(DATA).is_empty());
    }

    #[test]
    fn test_display() {
        let r = RangeSpec::new(vec![
            RangeItem::length(0, 2),
            RangeItem::offset(4, 6),
            RangeItem::to_end(-2),
        ]);
        assert_eq!(r.to_string(), "0:2,4-6,-2:");
    }
}
