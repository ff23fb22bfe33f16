//! `BoxList`: set algebra over collections of axis-aligned boxes.
//!
//! Everything the placement algorithm does — complements, accretion,
//! periodic projection, simplification, patch-size capping — is expressed
//! through this type. Lists are plain ordered `Vec`s; callers that need a
//! finalized, hash-keyed layout convert to
//! [`BoxArray`](crate::geom::box_array::BoxArray).

use itertools::Itertools;

use crate::geom::bx::AmrBox;
use crate::geom::index::{IntVect, SPACE_DIM};

/// Ordered collection of boxes.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoxList(Vec<AmrBox>);

/// Subtract `b` from `a`, yielding up to `2*SPACE_DIM` disjoint slabs that
/// cover exactly `a \ b`.
pub fn box_diff(a: &AmrBox, b: &AmrBox) -> Vec<AmrBox> {
    let Some(core) = a.intersection(b) else {
        return if a.is_ok() { vec![*a] } else { Vec::new() };
    };
    let mut out = Vec::new();
    // Peel a slab off each face of `a` outside the overlap, shrinking the
    // working region as we go so the slabs stay disjoint.
    let mut rest = *a;
    for d in 0..SPACE_DIM {
        if rest.small_end(d) < core.small_end(d) {
            let mut slab_hi = rest.hi();
            slab_hi[d] = core.small_end(d) - 1;
            out.push(AmrBox::with_type(rest.lo(), slab_hi, rest.btype()));
            let mut lo = rest.lo();
            lo[d] = core.small_end(d);
            rest = AmrBox::with_type(lo, rest.hi(), rest.btype());
        }
        if rest.big_end(d) > core.big_end(d) {
            let mut slab_lo = rest.lo();
            slab_lo[d] = core.big_end(d) + 1;
            out.push(AmrBox::with_type(slab_lo, rest.hi(), rest.btype()));
            let mut hi = rest.hi();
            hi[d] = core.big_end(d);
            rest = AmrBox::with_type(rest.lo(), hi, rest.btype());
        }
    }
    out
}

impl BoxList {
    #[inline]
    pub fn new() -> Self {
        BoxList(Vec::new())
    }

    #[inline]
    pub fn from_vec(v: Vec<AmrBox>) -> Self {
        BoxList(v)
    }

    /// Single-box list.
    pub fn from_box(b: AmrBox) -> Self {
        BoxList(vec![b])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn push(&mut self, b: AmrBox) {
        self.0.push(b);
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, AmrBox> {
        self.0.iter()
    }

    #[inline]
    pub fn boxes(&self) -> &[AmrBox] {
        &self.0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Append all boxes of `other`.
    pub fn join(&mut self, other: &BoxList) {
        self.0.extend_from_slice(&other.0);
    }

    /// Total index points, counting overlaps multiply.
    pub fn num_pts(&self) -> u64 {
        self.0.iter().map(AmrBox::num_pts).sum()
    }

    /// Smallest box containing every member.
    pub fn minimal_box(&self) -> AmrBox {
        self.0
            .iter()
            .fold(AmrBox::empty(), |acc, b| acc.min_box(b))
    }

    /// Clip every member against `b`, dropping the parts outside.
    pub fn intersect_box(&mut self, b: &AmrBox) {
        self.0 = self
            .0
            .iter()
            .filter_map(|x| x.intersection(b))
            .collect();
    }

    /// Clip every member against the union of `other`; partially covered
    /// boxes are split, not rejected.
    pub fn intersect(&mut self, other: &BoxList) {
        let mut out = Vec::new();
        for a in &self.0 {
            for b in &other.0 {
                if let Some(c) = a.intersection(b) {
                    out.push(c);
                }
            }
        }
        self.0 = out;
    }

    /// The complement of `covered` within `domain`: disjoint boxes covering
    /// every point of `domain` not covered by `covered`.
    pub fn complement_in(domain: &AmrBox, covered: &BoxList) -> BoxList {
        let mut rest = vec![*domain];
        for b in &covered.0 {
            rest = rest.iter().flat_map(|r| box_diff(r, b)).collect();
            if rest.is_empty() {
                break;
            }
        }
        BoxList(rest)
    }

    /// Grow every member by `n` in all directions.
    pub fn accrete(&mut self, n: i64) {
        for b in &mut self.0 {
            *b = b.grow(n);
        }
    }

    /// Grow every member by a per-dimension amount.
    pub fn accrete_vec(&mut self, n: IntVect) {
        for b in &mut self.0 {
            let mut g = *b;
            for d in 0..SPACE_DIM {
                g = g.grow_dir(d, n[d]);
            }
            *b = g;
        }
    }

    pub fn refine(&mut self, ratio: IntVect) {
        for b in &mut self.0 {
            *b = b.refine(ratio);
        }
    }

    pub fn coarsen(&mut self, ratio: IntVect) {
        for b in &mut self.0 {
            *b = b.coarsen(ratio);
        }
    }

    /// Translate every member along `dir`.
    pub fn shift(&mut self, dir: usize, off: i64) {
        for b in &mut self.0 {
            *b = b.shift(dir, off);
        }
    }

    /// True iff no two members overlap.
    pub fn is_disjoint(&self) -> bool {
        for (i, a) in self.0.iter().enumerate() {
            for b in &self.0[i + 1..] {
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }

    /// True iff the union of `self` covers every point of every box in
    /// `other`.
    pub fn contains_all(&self, other: &BoxList) -> bool {
        for b in &other.0 {
            if !b.is_ok() {
                continue;
            }
            let mut rest = vec![*b];
            for a in &self.0 {
                rest = rest.iter().flat_map(|r| box_diff(r, a)).collect();
                if rest.is_empty() {
                    break;
                }
            }
            if !rest.is_empty() {
                return false;
            }
        }
        true
    }

    /// Merge abutting members with identical cross-sections until no more
    /// merges apply. Drops empty members. Quadratic, intended for the modest
    /// lists the placement algorithm handles.
    pub fn simplify(&mut self) {
        self.0.retain(AmrBox::is_ok);
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..self.0.len() {
                for j in (i + 1)..self.0.len() {
                    if let Some(m) = try_merge(&self.0[i], &self.0[j]) {
                        self.0[i] = m;
                        self.0.swap_remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    /// Split members so no side exceeds the per-dimension cap. Chunk
    /// boundaries land at multiples of the cap from each box's low corner,
    /// so caps that are blocking-factor multiples preserve alignment.
    pub fn max_size_vec(&mut self, cap: IntVect) {
        debug_assert!(cap.all_positive());
        for d in 0..SPACE_DIM {
            let mut out = Vec::with_capacity(self.0.len());
            for b in &self.0 {
                let len = b.length(d);
                if len <= cap[d] {
                    out.push(*b);
                    continue;
                }
                let mut rest = *b;
                while rest.length(d) > cap[d] {
                    let (head, tail) = rest.chop(d, rest.small_end(d) + cap[d]);
                    out.push(head);
                    rest = tail;
                }
                out.push(rest);
            }
            self.0 = out;
        }
    }

    /// Uniform-cap variant of [`max_size_vec`](Self::max_size_vec).
    pub fn max_size(&mut self, cap: i64) {
        self.max_size_vec(IntVect::splat(cap));
    }

    /// Deterministic ordering for logs and layout hashing.
    pub fn sort(&mut self) {
        self.0
            .sort_by_key(|b| (b.lo(), b.hi()));
    }

    /// One-line summary such as `3 boxes, 4096 pts` for diagnostics.
    pub fn summary(&self) -> String {
        format!(
            "{} boxes, {} pts [{}]",
            self.len(),
            self.num_pts(),
            self.0.iter().map(|b| b.to_string()).join(" ")
        )
    }
}

impl IntoIterator for BoxList {
    type Item = AmrBox;
    type IntoIter = std::vec::IntoIter<AmrBox>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a BoxList {
    type Item = &'a AmrBox;
    type IntoIter = std::slice::Iter<'a, AmrBox>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<AmrBox> for BoxList {
    fn from_iter<I: IntoIterator<Item = AmrBox>>(iter: I) -> Self {
        BoxList(iter.into_iter().collect())
    }
}

fn try_merge(a: &AmrBox, b: &AmrBox) -> Option<AmrBox> {
    if a.btype() != b.btype() {
        return None;
    }
    if a.contains_box(b) {
        return Some(*a);
    }
    if b.contains_box(a) {
        return Some(*b);
    }
    // Mergeable iff identical in all dimensions but one, where they abut or
    // overlap.
    let mut join_dir = None;
    for d in 0..SPACE_DIM {
        if a.small_end(d) == b.small_end(d) && a.big_end(d) == b.big_end(d) {
            continue;
        }
        if join_dir.is_some() {
            return None;
        }
        join_dir = Some(d);
    }
    let d = join_dir?;
    let (lo, hi) = if a.small_end(d) <= b.small_end(d) {
        (a, b)
    } else {
        (b, a)
    };
    if lo.big_end(d) + 1 >= hi.small_end(d) {
        Some(lo.min_box(hi))
    } else {
        None
    }
}
