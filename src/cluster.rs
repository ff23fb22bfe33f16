//! Clustering of tagged cells into efficient rectangular patches.
//!
//! A [`Cluster`] is a set of tagged coordinates plus its minimal bounding
//! box; its efficiency is the fraction of the box that is actually tagged.
//! [`ClusterList::chop`] repeatedly splits the worst cluster at a histogram
//! cut until every cluster meets the efficiency threshold or cannot be
//! usefully split further. Cuts prefer, in order: a zero-count plane
//! ("hole") nearest the box centre, the steepest signed-second-difference
//! inflection, and finally a plain bisection; candidate axes are tried
//! longest first.

use crate::geom::bx::AmrBox;
use crate::geom::box_list::BoxList;
use crate::geom::index::{IntVect, SPACE_DIM};

/// Cut positions keep at least this many planes on each side so splits
/// don't shave off slivers.
const MIN_CUT_OFFSET: i64 = 2;
/// Second-difference magnitude below this is noise; bisect instead.
const CUT_THRESHOLD: i64 = 2;

#[derive(Clone, Debug)]
pub struct Cluster {
    pts: Vec<IntVect>,
    bx: AmrBox,
}

fn minimal_box(pts: &[IntVect]) -> AmrBox {
    let mut it = pts.iter();
    let Some(&first) = it.next() else {
        return AmrBox::empty();
    };
    let (lo, hi) = it.fold((first, first), |(lo, hi), &p| {
        (lo.min_with(p), hi.max_with(p))
    });
    AmrBox::new(lo, hi)
}

enum CutKind {
    Hole,
    Steep,
    Bisect,
}

/// Pick a cut plane inside `[lo, hi]` from the tag-count histogram.
fn find_cut(hist: &[u32], lo: i64, hi: i64) -> (i64, CutKind) {
    let len = (hi - lo + 1) as usize;
    let mid = len / 2;

    // Centermost empty plane wins outright.
    let mut hole: Option<usize> = None;
    for (i, &h) in hist.iter().enumerate() {
        if h == 0 {
            let better = match hole {
                Some(c) => (i as i64 - mid as i64).abs() < (c as i64 - mid as i64).abs(),
                None => true,
            };
            if better {
                hole = Some(i);
            }
        }
    }
    if let Some(c) = hole {
        return (lo + c as i64, CutKind::Hole);
    }

    // Otherwise the largest sign-changing jump in the second difference.
    let mut d2 = vec![0i64; len];
    for i in 1..len - 1 {
        d2[i] = hist[i + 1] as i64 - 2 * hist[i] as i64 + hist[i - 1] as i64;
    }
    let mut cut = mid;
    let mut max_jump = -1i64;
    for i in (MIN_CUT_OFFSET as usize)..len.saturating_sub(MIN_CUT_OFFSET as usize) {
        let prev = d2[i - 1];
        let cur = d2[i];
        let jump = (prev - cur).abs();
        if prev * cur < 0 && jump > max_jump {
            cut = i;
            max_jump = jump;
        }
    }
    if max_jump <= CUT_THRESHOLD {
        (lo + mid as i64, CutKind::Bisect)
    } else {
        (lo + cut as i64, CutKind::Steep)
    }
}

impl Cluster {
    /// Cluster over the given coordinates; duplicates are assumed already
    /// collapsed (as [`TagArray::collate`](crate::tag::TagArray::collate)
    /// guarantees).
    pub fn new(pts: Vec<IntVect>) -> Self {
        let bx = minimal_box(&pts);
        Cluster { pts, bx }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pts.is_empty()
    }

    #[inline]
    pub fn bounding_box(&self) -> &AmrBox {
        &self.bx
    }

    /// Tagged fraction of the bounding box, in `(0, 1]`.
    pub fn efficiency(&self) -> f64 {
        if self.pts.is_empty() {
            return 0.0;
        }
        self.pts.len() as f64 / self.bx.num_pts() as f64
    }

    /// True when a split could still improve efficiency.
    fn splittable(&self) -> bool {
        self.pts.len() > 1 && self.bx.num_pts() > 1
    }

    /// Split off and return the upper part; `self` keeps the lower part.
    /// Returns `None` for irreducible clusters.
    fn chop(&mut self) -> Option<Cluster> {
        if !self.splittable() {
            return None;
        }
        // Try axes longest-first until a cut partitions the points.
        let mut dims: Vec<usize> = (0..SPACE_DIM).collect();
        dims.sort_by_key(|&d| std::cmp::Reverse(self.bx.length(d)));
        for d in dims {
            let lo = self.bx.small_end(d);
            let hi = self.bx.big_end(d);
            if hi == lo {
                continue;
            }
            let mut hist = vec![0u32; (hi - lo + 1) as usize];
            for p in &self.pts {
                hist[(p[d] - lo) as usize] += 1;
            }
            let (cut, _kind) = find_cut(&hist, lo, hi);
            if cut <= lo || cut > hi {
                continue;
            }
            let (lower, upper): (Vec<IntVect>, Vec<IntVect>) =
                self.pts.iter().partition(|p| p[d] < cut);
            if lower.is_empty() || upper.is_empty() {
                continue;
            }
            self.pts = lower;
            self.bx = minimal_box(&self.pts);
            return Some(Cluster::new(upper));
        }
        None
    }
}

/// Workset of clusters being refined toward an efficiency target.
#[derive(Debug, Default)]
pub struct ClusterList {
    clusters: Vec<Cluster>,
}

impl ClusterList {
    /// Start from a single cluster containing all tagged points. An empty
    /// coordinate list yields an empty cluster list.
    pub fn new(pts: Vec<IntVect>) -> Self {
        let clusters = if pts.is_empty() {
            Vec::new()
        } else {
            vec![Cluster::new(pts)]
        };
        ClusterList { clusters }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Split clusters until each meets `min_eff` or is irreducible. The
    /// lowest-efficiency splittable cluster is always chopped next.
    pub fn chop(&mut self, min_eff: f64) {
        loop {
            let worst = self
                .clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.efficiency() < min_eff && c.splittable())
                .min_by(|(_, a), (_, b)| {
                    a.efficiency()
                        .partial_cmp(&b.efficiency())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            let Some(i) = worst else { break };
            match self.clusters[i].chop() {
                Some(upper) => self.clusters.push(upper),
                // Irreducible under every cut rule; accept it as-is.
                None => break,
            }
        }
    }

    /// Clip clusters against an allowed-placement domain. Clusters that
    /// straddle the domain boundary are split per overlapping domain box
    /// (clipping, not rejection); points outside vanish with their share of
    /// the cluster.
    pub fn intersect(&mut self, domain: &BoxList) {
        let mut out = Vec::with_capacity(self.clusters.len());
        for c in self.clusters.drain(..) {
            if domain.contains_all(&BoxList::from_box(*c.bounding_box())) {
                out.push(c);
                continue;
            }
            for db in domain {
                let inside: Vec<IntVect> =
                    c.pts.iter().copied().filter(|p| db.contains(*p)).collect();
                if !inside.is_empty() {
                    out.push(Cluster::new(inside));
                }
            }
        }
        self.clusters = out;
    }

    /// Minimal bounding boxes of all clusters, in a deterministic order.
    pub fn box_list(&self) -> BoxList {
        let mut bl: BoxList = self
            .clusters
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| *c.bounding_box())
            .collect();
        bl.sort();
        bl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts_of(b: AmrBox) -> Vec<IntVect> {
        b.points().collect()
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let mut cl = ClusterList::new(Vec::new());
        cl.chop(0.7);
        assert!(cl.box_list().is_empty());
    }

    #[test]
    fn solid_block_needs_no_split() {
        let b = AmrBox::new(IntVect::zero(), IntVect::splat(3));
        let mut cl = ClusterList::new(pts_of(b));
        cl.chop(0.7);
        let bl = cl.box_list();
        assert_eq!(bl.len(), 1);
        assert_eq!(bl.boxes()[0], b);
    }

    #[test]
    fn two_distant_blobs_separate_at_a_hole() {
        let a = AmrBox::new(IntVect::zero(), IntVect::splat(1));
        let b = AmrBox::new(IntVect([14, 0, 0]), IntVect([15, 1, 1]));
        let mut pts = pts_of(a);
        pts.extend(pts_of(b));
        let mut cl = ClusterList::new(pts);
        cl.chop(0.7);
        let bl = cl.box_list();
        assert_eq!(bl.len(), 2);
        assert!(bl.iter().all(|bx| bx.num_pts() == 8));
    }

    #[test]
    fn efficiency_threshold_is_met_or_irreducible() {
        // L-shaped tag set: a full bar plus a corner cube.
        let mut pts = pts_of(AmrBox::new(IntVect::zero(), IntVect([15, 1, 1])));
        pts.extend(pts_of(AmrBox::new(IntVect([0, 2, 0]), IntVect([1, 7, 1]))));
        let n_tags = pts.len();
        let mut cl = ClusterList::new(pts);
        cl.chop(0.8);
        for c in &cl.clusters {
            assert!(c.efficiency() >= 0.8 || !c.splittable());
        }
        // Every tag is still covered.
        let bl = cl.box_list();
        let covered: u64 = bl.num_pts();
        assert!(covered >= n_tags as u64);
    }

    #[test]
    fn intersect_clips_straddling_clusters() {
        let b = AmrBox::new(IntVect::zero(), IntVect([7, 3, 3]));
        let mut cl = ClusterList::new(pts_of(b));
        let domain = BoxList::from_vec(vec![
            AmrBox::new(IntVect::zero(), IntVect([3, 3, 3])),
            AmrBox::new(IntVect([6, 0, 0]), IntVect([7, 3, 3])),
        ]);
        cl.intersect(&domain);
        let bl = cl.box_list();
        assert_eq!(bl.len(), 2);
        assert_eq!(bl.num_pts(), 64 + 32);
        for bx in &bl {
            assert!(domain.contains_all(&BoxList::from_box(*bx)));
        }
    }

    #[test]
    fn chop_preserves_every_point() {
        let mut pts = pts_of(AmrBox::new(IntVect::zero(), IntVect([5, 5, 0])));
        pts.extend(pts_of(AmrBox::new(IntVect([20, 20, 0]), IntVect([21, 21, 0]))));
        let total = pts.len();
        let mut cl = ClusterList::new(pts);
        cl.chop(0.9);
        let count: usize = cl.clusters.iter().map(Cluster::len).sum();
        assert_eq!(count, total);
        assert!(cl.box_list().is_disjoint());
    }
}
