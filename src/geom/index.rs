//! `IntVect`: a point in the D-dimensional integer index space.
//!
//! Every cell, corner, and extent in the hierarchy is addressed by an
//! `IntVect`. The crate is compiled for a fixed spatial dimension
//! ([`SPACE_DIM`]); lower-dimensional problems use degenerate extents.
//!
//! This module provides:
//! - A transparent newtype over `[i64; SPACE_DIM]` with layout guarantees.
//! - Element-wise arithmetic, min/max, and floor-division coarsening that is
//!   correct for negative indices (grown boxes can reach below the domain).
//! - `Display`/`FromStr` in the `(a,b,c)` form used by grid files and
//!   checkpoint headers.

use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub};
use std::str::FromStr;

use crate::amr_error::AmrError;

/// Spatial dimensionality this build manages. Checkpoints record it and
/// restart refuses a file written for a different value.
pub const SPACE_DIM: usize = 3;

/// D-dimensional integer index vector.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct IntVect(pub [i64; SPACE_DIM]);

/// Floor division of an index coordinate by a positive ratio.
///
/// Ordinary integer division truncates toward zero; index coarsening must
/// floor so that cell `-1` coarsens to `-1`, not `0`.
#[inline]
pub(crate) fn coarsen_coord(i: i64, ratio: i64) -> i64 {
    debug_assert!(ratio > 0);
    if i < 0 {
        -((-i - 1) / ratio) - 1
    } else {
        i / ratio
    }
}

impl IntVect {
    /// The zero vector.
    #[inline]
    pub const fn zero() -> Self {
        IntVect([0; SPACE_DIM])
    }

    /// All components equal to `v`.
    #[inline]
    pub const fn splat(v: i64) -> Self {
        IntVect([v; SPACE_DIM])
    }

    /// The unit vector (all ones); the identity refinement ratio.
    #[inline]
    pub const fn unit() -> Self {
        IntVect([1; SPACE_DIM])
    }

    #[inline]
    pub fn new(v: [i64; SPACE_DIM]) -> Self {
        IntVect(v)
    }

    /// Element-wise minimum.
    #[inline]
    pub fn min_with(self, other: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] = out.0[d].min(other.0[d]);
        }
        out
    }

    /// Element-wise maximum.
    #[inline]
    pub fn max_with(self, other: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] = out.0[d].max(other.0[d]);
        }
        out
    }

    /// Largest component value.
    #[inline]
    pub fn max_component(self) -> i64 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// True iff every component of `self` is `<=` the matching component.
    #[inline]
    pub fn all_le(self, other: IntVect) -> bool {
        (0..SPACE_DIM).all(|d| self.0[d] <= other.0[d])
    }

    /// True iff every component of `self` is `>=` the matching component.
    #[inline]
    pub fn all_ge(self, other: IntVect) -> bool {
        (0..SPACE_DIM).all(|d| self.0[d] >= other.0[d])
    }

    /// True iff every component is strictly positive (a valid ratio).
    #[inline]
    pub fn all_positive(self) -> bool {
        self.0.iter().all(|&v| v > 0)
    }

    /// Component-wise floor-division coarsening by a positive ratio vector.
    #[inline]
    pub fn coarsen(self, ratio: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] = coarsen_coord(out.0[d], ratio.0[d]);
        }
        out
    }

    /// Component-wise multiplication (refinement of a coordinate).
    #[inline]
    pub fn scale(self, ratio: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] *= ratio.0[d];
        }
        out
    }

    /// Shift one component by `off`.
    #[inline]
    pub fn shifted(self, dir: usize, off: i64) -> IntVect {
        let mut out = self;
        out.0[dir] += off;
        out
    }
}

impl Index<usize> for IntVect {
    type Output = i64;
    #[inline]
    fn index(&self, d: usize) -> &i64 {
        &self.0[d]
    }
}

impl IndexMut<usize> for IntVect {
    #[inline]
    fn index_mut(&mut self, d: usize) -> &mut i64 {
        &mut self.0[d]
    }
}

impl Add for IntVect {
    type Output = IntVect;
    #[inline]
    fn add(self, rhs: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] += rhs.0[d];
        }
        out
    }
}

impl AddAssign for IntVect {
    #[inline]
    fn add_assign(&mut self, rhs: IntVect) {
        for d in 0..SPACE_DIM {
            self.0[d] += rhs.0[d];
        }
    }
}

impl Sub for IntVect {
    type Output = IntVect;
    #[inline]
    fn sub(self, rhs: IntVect) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] -= rhs.0[d];
        }
        out
    }
}

impl Mul<i64> for IntVect {
    type Output = IntVect;
    #[inline]
    fn mul(self, rhs: i64) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] *= rhs;
        }
        out
    }
}

impl Neg for IntVect {
    type Output = IntVect;
    #[inline]
    fn neg(self) -> IntVect {
        let mut out = self;
        for d in 0..SPACE_DIM {
            out.0[d] = -out.0[d];
        }
        out
    }
}

impl From<[i64; SPACE_DIM]> for IntVect {
    fn from(v: [i64; SPACE_DIM]) -> Self {
        IntVect(v)
    }
}

impl fmt::Debug for IntVect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntVect{}", self)
    }
}

/// Prints as `(a,b,c)`; this is the native textual form.
impl fmt::Display for IntVect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for d in 0..SPACE_DIM {
            if d > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", self.0[d])?;
        }
        write!(f, ")")
    }
}

impl FromStr for IntVect {
    type Err = AmrError;

    fn from_str(s: &str) -> Result<Self, AmrError> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(|| AmrError::header(format!("expected (a,b,c), got `{s}`")))?;
        let mut out = [0i64; SPACE_DIM];
        let mut parts = inner.split(',');
        for v in out.iter_mut() {
            let tok = parts
                .next()
                .ok_or_else(|| AmrError::header(format!("too few components in `{s}`")))?;
            *v = tok
                .trim()
                .parse::<i64>()
                .map_err(|e| AmrError::header(format!("bad component `{tok}`: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(AmrError::header(format!("too many components in `{s}`")));
        }
        Ok(IntVect(out))
    }
}

#[cfg(test)]
mod layout_tests {
    //! Compile-time assertion that `IntVect` has the array's exact layout.
    use super::*;
    use static_assertions::assert_eq_size;

    // If this fails, our repr(transparent) guarantee is broken!
    assert_eq_size!(IntVect, [i64; SPACE_DIM]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarsen_floors_negative_coords() {
        assert_eq!(coarsen_coord(-1, 2), -1);
        assert_eq!(coarsen_coord(-2, 2), -1);
        assert_eq!(coarsen_coord(-3, 2), -2);
        assert_eq!(coarsen_coord(0, 2), 0);
        assert_eq!(coarsen_coord(3, 2), 1);
        assert_eq!(coarsen_coord(4, 4), 1);
    }

    #[test]
    fn elementwise_ops() {
        let a = IntVect([1, -2, 3]);
        let b = IntVect([4, 5, -6]);
        assert_eq!(a + b, IntVect([5, 3, -3]));
        assert_eq!(b - a, IntVect([3, 7, -9]));
        assert_eq!(a.min_with(b), IntVect([1, -2, -6]));
        assert_eq!(a.max_with(b), IntVect([4, 5, 3]));
        assert_eq!(a * 2, IntVect([2, -4, 6]));
        assert_eq!(a.scale(IntVect([2, 2, 4])), IntVect([2, -4, 12]));
    }

    #[test]
    fn coarsen_vector() {
        let v = IntVect([7, -1, 8]);
        assert_eq!(v.coarsen(IntVect::splat(2)), IntVect([3, -1, 4]));
        assert_eq!(v.coarsen(IntVect([4, 2, 8])), IntVect([1, -1, 1]));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let v = IntVect([-3, 0, 12]);
        let s = v.to_string();
        assert_eq!(s, "(-3,0,12)");
        assert_eq!(s.parse::<IntVect>().unwrap(), v);
        assert!("(1,2)".parse::<IntVect>().is_err());
        assert!("(1,2,3,4)".parse::<IntVect>().is_err());
        assert!("1,2,3".parse::<IntVect>().is_err());
    }

    #[test]
    fn comparison_helpers() {
        let a = IntVect([0, 0, 0]);
        let b = IntVect([1, 1, 1]);
        assert!(a.all_le(b));
        assert!(b.all_ge(a));
        assert!(!b.all_le(a));
        assert!(IntVect::splat(2).all_positive());
        assert!(!IntVect([2, 0, 2]).all_positive());
    }
}
