//! Wrap-around comparisons in 32-bit sequence space.
//!
//! Two sequence numbers are ordered by the sign of their wrapping difference,
//! which is correct as long as they are less than `2^31` apart.  Every window
//! this crate keeps is many orders of magnitude smaller than that.

/// `a < b` in sequence space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a <= b` in sequence space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}
