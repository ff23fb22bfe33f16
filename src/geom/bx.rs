//! `AmrBox`: an axis-aligned rectangular region of the integer index space.
//!
//! A box is a pair of inclusive corners plus a per-dimension centering
//! (cell- or node-based). Boxes are the unit of everything above them:
//! patch layouts, nesting domains, tag regions, checkpoint metadata.
//!
//! The textual form `((lo) (hi) (type))` printed by [`Display`] and parsed
//! by [`FromStr`] is the native representation consumed by manual grid
//! files and emitted in diagnostics.
//!
//! [`Display`]: std::fmt::Display
//! [`FromStr`]: std::str::FromStr

use std::fmt;
use std::str::FromStr;

use crate::amr_error::AmrError;
use crate::geom::index::{IntVect, SPACE_DIM};

/// Per-dimension centering: cell-based (`0`) or node-based (`1`).
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct IndexType {
    node: [bool; SPACE_DIM],
}

impl IndexType {
    /// Cell-centered in every dimension (the common case).
    #[inline]
    pub const fn cell() -> Self {
        IndexType {
            node: [false; SPACE_DIM],
        }
    }

    /// Node-centered in every dimension.
    #[inline]
    pub const fn node() -> Self {
        IndexType {
            node: [true; SPACE_DIM],
        }
    }

    #[inline]
    pub fn is_node(&self, dir: usize) -> bool {
        self.node[dir]
    }

    #[inline]
    pub fn set_node(&mut self, dir: usize, node: bool) {
        self.node[dir] = node;
    }
}

impl fmt::Debug for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = IntVect(self.node.map(|n| n as i64));
        write!(f, "{}", v)
    }
}

impl FromStr for IndexType {
    type Err = AmrError;
    fn from_str(s: &str) -> Result<Self, AmrError> {
        let v: IntVect = s.parse()?;
        let mut node = [false; SPACE_DIM];
        for d in 0..SPACE_DIM {
            node[d] = match v[d] {
                0 => false,
                1 => true,
                other => {
                    return Err(AmrError::header(format!("bad centering flag {other}")));
                }
            };
        }
        Ok(IndexType { node })
    }
}

/// Axis-aligned box with inclusive corners.
///
/// # Invariants
/// - `lo <= hi` per dimension, or the box is empty ([`is_ok`] is false).
/// - All algebra (`grow`, `refine`, `coarsen`, `chop`) preserves centering.
///
/// [`is_ok`]: AmrBox::is_ok
#[derive(Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AmrBox {
    lo: IntVect,
    hi: IntVect,
    btype: IndexType,
}

impl AmrBox {
    /// Cell-centered box from inclusive corners.
    #[inline]
    pub fn new(lo: IntVect, hi: IntVect) -> Self {
        AmrBox {
            lo,
            hi,
            btype: IndexType::cell(),
        }
    }

    /// Box with explicit centering.
    #[inline]
    pub fn with_type(lo: IntVect, hi: IntVect, btype: IndexType) -> Self {
        AmrBox { lo, hi, btype }
    }

    /// An unambiguously empty box.
    #[inline]
    pub fn empty() -> Self {
        AmrBox::new(IntVect::unit(), IntVect::zero())
    }

    #[inline]
    pub fn lo(&self) -> IntVect {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> IntVect {
        self.hi
    }

    #[inline]
    pub fn btype(&self) -> IndexType {
        self.btype
    }

    #[inline]
    pub fn small_end(&self, dir: usize) -> i64 {
        self.lo[dir]
    }

    #[inline]
    pub fn big_end(&self, dir: usize) -> i64 {
        self.hi[dir]
    }

    /// True iff the box is non-empty.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.lo.all_le(self.hi)
    }

    /// Extent along `dir` (index count, inclusive corners).
    #[inline]
    pub fn length(&self, dir: usize) -> i64 {
        self.hi[dir] - self.lo[dir] + 1
    }

    /// Extents in all dimensions.
    #[inline]
    pub fn size(&self) -> IntVect {
        self.hi - self.lo + IntVect::unit()
    }

    /// Total number of index points.
    #[inline]
    pub fn num_pts(&self) -> u64 {
        if !self.is_ok() {
            return 0;
        }
        (0..SPACE_DIM).map(|d| self.length(d) as u64).product()
    }

    /// Length of the longest side and its direction; ties go to the lower
    /// direction index.
    pub fn longside(&self) -> (i64, usize) {
        let mut best = (self.length(0), 0);
        for d in 1..SPACE_DIM {
            if self.length(d) > best.0 {
                best = (self.length(d), d);
            }
        }
        best
    }

    #[inline]
    pub fn contains(&self, p: IntVect) -> bool {
        self.lo.all_le(p) && p.all_le(self.hi)
    }

    #[inline]
    pub fn contains_box(&self, other: &AmrBox) -> bool {
        !other.is_ok() || (self.lo.all_le(other.lo) && other.hi.all_le(self.hi))
    }

    #[inline]
    pub fn intersects(&self, other: &AmrBox) -> bool {
        self.intersection(other).is_some()
    }

    /// Overlap of two boxes, or `None` when disjoint.
    pub fn intersection(&self, other: &AmrBox) -> Option<AmrBox> {
        let lo = self.lo.max_with(other.lo);
        let hi = self.hi.min_with(other.hi);
        let out = AmrBox::with_type(lo, hi, self.btype);
        out.is_ok().then_some(out)
    }

    /// Smallest box containing both operands.
    pub fn min_box(&self, other: &AmrBox) -> AmrBox {
        if !self.is_ok() {
            return *other;
        }
        if !other.is_ok() {
            return *self;
        }
        AmrBox::with_type(
            self.lo.min_with(other.lo),
            self.hi.max_with(other.hi),
            self.btype,
        )
    }

    /// Grow by `n` on both faces of every dimension.
    #[inline]
    pub fn grow(&self, n: i64) -> AmrBox {
        AmrBox::with_type(self.lo - IntVect::splat(n), self.hi + IntVect::splat(n), self.btype)
    }

    /// Grow by `n` on both faces of one dimension.
    #[inline]
    pub fn grow_dir(&self, dir: usize, n: i64) -> AmrBox {
        AmrBox::with_type(
            self.lo.shifted(dir, -n),
            self.hi.shifted(dir, n),
            self.btype,
        )
    }

    /// Grow only the low face of `dir`.
    #[inline]
    pub fn grow_lo(&self, dir: usize, n: i64) -> AmrBox {
        AmrBox::with_type(self.lo.shifted(dir, -n), self.hi, self.btype)
    }

    /// Grow only the high face of `dir`.
    #[inline]
    pub fn grow_hi(&self, dir: usize, n: i64) -> AmrBox {
        AmrBox::with_type(self.lo, self.hi.shifted(dir, n), self.btype)
    }

    /// Translate along one dimension.
    #[inline]
    pub fn shift(&self, dir: usize, off: i64) -> AmrBox {
        AmrBox::with_type(
            self.lo.shifted(dir, off),
            self.hi.shifted(dir, off),
            self.btype,
        )
    }

    /// Translate by a vector.
    #[inline]
    pub fn shift_vec(&self, off: IntVect) -> AmrBox {
        AmrBox::with_type(self.lo + off, self.hi + off, self.btype)
    }

    /// Refine to a finer index space. A cell-centered box covering cells
    /// `[lo,hi]` covers `[lo*r, hi*r + r-1]` after refinement; node-centered
    /// dimensions scale both corners exactly.
    pub fn refine(&self, ratio: IntVect) -> AmrBox {
        debug_assert!(ratio.all_positive());
        let mut lo = self.lo;
        let mut hi = self.hi;
        for d in 0..SPACE_DIM {
            lo[d] *= ratio[d];
            hi[d] = if self.btype.is_node(d) {
                hi[d] * ratio[d]
            } else {
                hi[d] * ratio[d] + (ratio[d] - 1)
            };
        }
        AmrBox::with_type(lo, hi, self.btype)
    }

    /// Coarsen to a coarser index space with floor semantics; the result
    /// covers every coarse cell any fine cell of `self` maps into.
    pub fn coarsen(&self, ratio: IntVect) -> AmrBox {
        debug_assert!(ratio.all_positive());
        AmrBox::with_type(self.lo.coarsen(ratio), self.hi.coarsen(ratio), self.btype)
    }

    /// Split at index `pos` along `dir` into `([lo, pos-1], [pos, hi])`.
    /// `pos` must be strictly inside the box.
    pub fn chop(&self, dir: usize, pos: i64) -> (AmrBox, AmrBox) {
        debug_assert!(pos > self.lo[dir] && pos <= self.hi[dir]);
        let mut lo_hi = self.hi;
        lo_hi[dir] = pos - 1;
        let mut hi_lo = self.lo;
        hi_lo[dir] = pos;
        (
            AmrBox::with_type(self.lo, lo_hi, self.btype),
            AmrBox::with_type(hi_lo, self.hi, self.btype),
        )
    }

    /// Iterate every index point, slowest dimension last. Intended for tag
    /// manipulation on modest regions, not bulk field traversal.
    pub fn points(&self) -> impl Iterator<Item = IntVect> + '_ {
        let b = *self;
        let n = b.num_pts();
        (0..n).map(move |mut k| {
            let mut p = b.lo;
            for d in 0..SPACE_DIM {
                let len = b.length(d) as u64;
                p[d] = b.lo[d] + (k % len) as i64;
                k /= len;
            }
            p
        })
    }
}

impl fmt::Debug for AmrBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Prints as `((lo) (hi) (type))`.
impl fmt::Display for AmrBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.lo, self.hi, self.btype)
    }
}

impl FromStr for AmrBox {
    type Err = AmrError;

    fn from_str(s: &str) -> Result<Self, AmrError> {
        let t = s.trim();
        let inner = t
            .strip_prefix('(')
            .and_then(|u| u.strip_suffix(')'))
            .ok_or_else(|| AmrError::header(format!("expected ((lo) (hi) (type)), got `{s}`")))?;
        let mut parts = Vec::with_capacity(3);
        let mut depth = 0usize;
        let mut start = None;
        for (i, c) in inner.char_indices() {
            match c {
                '(' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        if let Some(st) = start.take() {
                            parts.push(&inner[st..=i]);
                        }
                    }
                }
                _ => {}
            }
        }
        match parts.as_slice() {
            [lo, hi, ty] => Ok(AmrBox::with_type(
                lo.parse()?,
                hi.parse()?,
                ty.parse()?,
            )),
            [lo, hi] => Ok(AmrBox::new(lo.parse()?, hi.parse()?)),
            _ => Err(AmrError::header(format!("malformed box `{s}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(lo: [i64; 3], hi: [i64; 3]) -> AmrBox {
        AmrBox::new(IntVect(lo), IntVect(hi))
    }

    #[test]
    fn extents_and_counts() {
        let b = bx([0, 0, 0], [7, 3, 1]);
        assert!(b.is_ok());
        assert_eq!(b.length(0), 8);
        assert_eq!(b.size(), IntVect([8, 4, 2]));
        assert_eq!(b.num_pts(), 64);
        assert_eq!(b.longside(), (8, 0));
        assert!(!AmrBox::empty().is_ok());
        assert_eq!(AmrBox::empty().num_pts(), 0);
    }

    #[test]
    fn intersection_and_union() {
        let a = bx([0, 0, 0], [7, 7, 7]);
        let b = bx([4, 4, 4], [11, 11, 11]);
        let c = a.intersection(&b).unwrap();
        assert_eq!(c, bx([4, 4, 4], [7, 7, 7]));
        assert!(a.intersection(&bx([8, 0, 0], [9, 7, 7])).is_none());
        assert_eq!(a.min_box(&b), bx([0, 0, 0], [11, 11, 11]));
    }

    #[test]
    fn grow_and_shift() {
        let b = bx([2, 2, 2], [5, 5, 5]);
        assert_eq!(b.grow(1), bx([1, 1, 1], [6, 6, 6]));
        assert_eq!(b.grow_dir(1, 2), bx([2, 0, 2], [5, 7, 5]));
        assert_eq!(b.grow_lo(0, 1), bx([1, 2, 2], [5, 5, 5]));
        assert_eq!(b.grow_hi(2, 3), bx([2, 2, 2], [5, 5, 8]));
        assert_eq!(b.shift(0, -2), bx([0, 2, 2], [3, 5, 5]));
    }

    #[test]
    fn refine_coarsen_cell_centered() {
        let b = bx([1, 1, 1], [2, 2, 2]);
        let r = IntVect::splat(2);
        assert_eq!(b.refine(r), bx([2, 2, 2], [5, 5, 5]));
        assert_eq!(b.refine(r).coarsen(r), b);
        // Coarsening covers every touched coarse cell, including negatives.
        assert_eq!(bx([-3, 0, 0], [1, 1, 1]).coarsen(r), bx([-2, 0, 0], [0, 0, 0]));
    }

    #[test]
    fn refine_node_centered() {
        let b = AmrBox::with_type(IntVect([0, 0, 0]), IntVect([4, 4, 4]), IndexType::node());
        let r = b.refine(IntVect::splat(2));
        assert_eq!(r.hi(), IntVect([8, 8, 8]));
    }

    #[test]
    fn chop_partitions_exactly() {
        let b = bx([0, 0, 0], [7, 7, 7]);
        let (lo, hi) = b.chop(0, 4);
        assert_eq!(lo, bx([0, 0, 0], [3, 7, 7]));
        assert_eq!(hi, bx([4, 0, 0], [7, 7, 7]));
        assert_eq!(lo.num_pts() + hi.num_pts(), b.num_pts());
    }

    #[test]
    fn point_iteration_covers_box() {
        let b = bx([1, 2, 3], [2, 3, 4]);
        let pts: Vec<_> = b.points().collect();
        assert_eq!(pts.len() as u64, b.num_pts());
        assert!(pts.iter().all(|&p| b.contains(p)));
        assert_eq!(pts[0], IntVect([1, 2, 3]));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let b = bx([-1, 0, 2], [6, 3, 9]);
        let s = b.to_string();
        assert_eq!(s, "((-1,0,2) (6,3,9) (0,0,0))");
        assert_eq!(s.parse::<AmrBox>().unwrap(), b);
        let n = AmrBox::with_type(IntVect::zero(), IntVect::splat(4), IndexType::node());
        assert_eq!(n.to_string().parse::<AmrBox>().unwrap(), n);
        assert!("(0,0,0) (1,1,1)".parse::<AmrBox>().is_err());
    }
}
