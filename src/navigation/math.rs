//! Deterministic cost arithmetic for grid searches.
//!
//! Search costs are fixed-point so open-set ordering is total and identical on
//! every platform. World-space positions stay `f32`; only costs live here.

use fixed::types::I48F16;

/// Fixed-point number type used for all search costs.
///
/// I48F16: 48 integer bits, 16 fractional bits (~0.000015 precision).
pub type FixedNum = I48F16;

/// Cost of an orthogonal step.
pub const STRAIGHT_COST: FixedNum = FixedNum::from_bits(1 << 16);

/// Cost of a diagonal step (√2 in I48F16).
pub const DIAGONAL_COST: FixedNum = FixedNum::from_bits(92_682);

/// Octile distance: the exact 8-connected step cost between two cells on an
/// empty grid.
#[inline]
pub fn octile(dx: usize, dy: usize) -> FixedNum {
    let (min, max) = if dx < dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL_COST * FixedNum::from_num(min) + STRAIGHT_COST * FixedNum::from_num(max - min)
}

#[inline]
pub fn manhattan(dx: usize, dy: usize) -> FixedNum {
    FixedNum::from_num(dx + dy)
}

#[inline]
pub fn chebyshev(dx: usize, dy: usize) -> FixedNum {
    FixedNum::from_num(dx.max(dy))
}

pub fn euclidean(dx: usize, dy: usize) -> FixedNum {
    let sq = FixedNum::from_num(dx * dx + dy * dy);
    if sq == FixedNum::ZERO {
        return FixedNum::ZERO;
    }
    sq.sqrt()
}
