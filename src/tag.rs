//! `TagArray`: per-level refine/don't-refine flags.
//!
//! The error estimator marks cells over the level's layout grown by the
//! error-buffer width (plus whatever extra growth is needed to contain the
//! projected footprint of finer levels). The placement algorithm then
//! buffers, coarsens, periodically folds, and collates the marks into the
//! coordinate list handed to the clusterer.
//!
//! Tags are a sparse set over the grown region; membership outside the
//! region is silently ignored, which is exactly the clamping the estimator
//! interface relies on.

use hashbrown::HashSet;

use crate::geom::bx::AmrBox;
use crate::geom::box_array::BoxArray;
use crate::geom::box_list::BoxList;
use crate::geom::geometry::Geometry;
use crate::geom::index::{IntVect, SPACE_DIM};

/// Sentinel flag values consumed by the error-estimator interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TagVal {
    /// Mark: this cell needs refinement.
    Set,
    /// Unmark: this cell must not drive refinement.
    Clear,
}

#[derive(Clone, Debug)]
pub struct TagArray {
    region: BoxList,
    tags: HashSet<IntVect>,
}

impl TagArray {
    /// Tag field over `layout` grown by `ngrow` cells.
    pub fn new(layout: &BoxArray, ngrow: i64) -> Self {
        let mut region = layout.to_list();
        region.accrete(ngrow);
        TagArray {
            region,
            tags: HashSet::new(),
        }
    }

    /// The region tags may occupy.
    #[inline]
    pub fn region(&self) -> &BoxList {
        &self.region
    }

    #[inline]
    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[inline]
    pub fn contains(&self, p: IntVect) -> bool {
        self.tags.contains(&p)
    }

    #[inline]
    fn in_region(&self, p: IntVect) -> bool {
        self.region.iter().any(|b| b.contains(p))
    }

    /// Apply a flag at one cell. Sets outside the region are dropped.
    pub fn tag(&mut self, p: IntVect, v: TagVal) {
        match v {
            TagVal::Set => {
                if self.in_region(p) {
                    self.tags.insert(p);
                }
            }
            TagVal::Clear => {
                self.tags.remove(&p);
            }
        }
    }

    /// Apply a flag over every cell of a box.
    pub fn set_val_box(&mut self, b: &AmrBox, v: TagVal) {
        match v {
            TagVal::Set => {
                for region_box in self.region.boxes() {
                    if let Some(overlap) = region_box.intersection(b) {
                        self.tags.extend(overlap.points());
                    }
                }
            }
            TagVal::Clear => {
                self.tags.retain(|p| !b.contains(*p));
            }
        }
    }

    /// Apply a flag over every cell of a box list.
    pub fn set_val(&mut self, bl: &BoxList, v: TagVal) {
        for b in bl {
            self.set_val_box(b, v);
        }
    }

    /// Grow every mark by `n` cells in all directions (Chebyshev ball),
    /// clamped to the tag region.
    pub fn buffer(&mut self, n: i64) {
        if n <= 0 || self.tags.is_empty() {
            return;
        }
        let seeds: Vec<IntVect> = self.tags.iter().copied().collect();
        for p in seeds {
            let ball = AmrBox::new(p, p).grow(n);
            for q in ball.points() {
                if self.in_region(q) {
                    self.tags.insert(q);
                }
            }
        }
    }

    /// Map tags (and the region) to the coarser index space. Distinct fine
    /// marks collapsing onto one coarse cell merge.
    pub fn coarsen(&mut self, ratio: IntVect) {
        self.tags = self.tags.iter().map(|p| p.coarsen(ratio)).collect();
        self.region.coarsen(ratio);
    }

    /// Fold tags through periodic boundaries: every periodic translate of a
    /// mark that lands inside the domain is marked as well, and marks
    /// outside the domain are re-homed to their in-domain image.
    pub fn map_periodic(&mut self, geom: &Geometry) {
        if !geom.is_any_periodic() {
            return;
        }
        let domain = *geom.domain();
        let mut added: Vec<IntVect> = Vec::new();
        for &p in &self.tags {
            for shift in periodic_shifts(geom) {
                let q = p + shift;
                if domain.contains(q) && self.in_region(q) {
                    added.push(q);
                }
            }
        }
        self.tags.extend(added);
        // Anything left outside the domain has an in-domain image now.
        let dom = domain;
        self.tags.retain(|p| dom.contains(*p));
    }

    /// Sorted, deduplicated coordinates of all marks.
    pub fn collate(&self) -> Vec<IntVect> {
        let mut out: Vec<IntVect> = self.tags.iter().copied().collect();
        #[cfg(feature = "rayon")]
        {
            use rayon::slice::ParallelSliceMut;
            out.par_sort_unstable();
        }
        #[cfg(not(feature = "rayon"))]
        out.sort_unstable();
        out
    }
}

/// Non-zero periodic translates of the domain (up to one period per
/// direction), for folding tags and projecting box lists.
pub(crate) fn periodic_shifts(geom: &Geometry) -> Vec<IntVect> {
    let mut shifts = vec![IntVect::zero()];
    for d in 0..SPACE_DIM {
        if !geom.is_periodic(d) {
            continue;
        }
        let period = geom.period(d);
        let mut next = Vec::with_capacity(shifts.len() * 3);
        for s in &shifts {
            next.push(*s);
            next.push(s.shifted(d, period));
            next.push(s.shifted(d, -period));
        }
        shifts = next;
    }
    shifts.retain(|s| *s != IntVect::zero());
    shifts
}
