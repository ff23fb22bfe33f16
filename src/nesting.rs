//! Proper-nesting domains.
//!
//! A box placed at level `l+1` must, after coarsening to level `l` units,
//! stay `n_proper` cells inside the valid region of level `l` — including
//! across periodic boundaries. This module computes, per level, the region
//! where finer boxes may legally go (`p_n`) and its complement
//! (`p_n_comp`), working in blocking-factor-coarsened units so that
//! clustering output is automatically alignment-friendly.
//!
//! Domains are recomputed from the base level upward whenever the base
//! layout is replaced; they are throwaway workset state, not cached.

use crate::geom::box_array::BoxArray;
use crate::geom::box_list::BoxList;
use crate::geom::bx::AmrBox;
use crate::geom::geometry::Geometry;
use crate::geom::index::{IntVect, SPACE_DIM};
use crate::tag::periodic_shifts;

/// Add the in-domain periodic images of every box in `bl`.
pub fn proj_periodic(bl: &mut BoxList, geom: &Geometry) {
    if !geom.is_any_periodic() {
        return;
    }
    let domain = *geom.domain();
    let orig = bl.clone();
    for shift in periodic_shifts(geom) {
        let mut img: BoxList = orig.iter().map(|b| b.shift_vec(shift)).collect();
        img.intersect_box(&domain);
        bl.join(&img);
    }
}

/// Per-level nesting state for one placement pass over `lbase..=max_crse`.
#[derive(Debug)]
pub struct NestingDomains {
    lbase: usize,
    /// Blocking factor expressed in next-finer-ratio units, per level.
    bf_lev: Vec<IntVect>,
    /// Ratio between successive blocking-factor-coarsened index spaces.
    rr_lev: Vec<IntVect>,
    /// Problem domain coarsened to blocking-factor units, per level.
    pc_domain: Vec<AmrBox>,
    /// Region finer boxes may occupy, in coarsened units.
    p_n: Vec<BoxList>,
    /// Complement of `p_n` grown by the nesting width.
    p_n_comp: Vec<BoxList>,
}

impl NestingDomains {
    /// Build nesting domains for levels `lbase..=max_crse` given the
    /// current layout of level `lbase`.
    ///
    /// `blocking_factor[l]` and `ref_ratio[l]` are indexed by level;
    /// `geom[l]` likewise. `n_proper` is the nesting width in coarsened
    /// units.
    pub fn build(
        lbase: usize,
        max_crse: usize,
        geom: &[Geometry],
        blocking_factor: &[usize],
        ref_ratio: &[IntVect],
        n_proper: i64,
        base_layout: &BoxArray,
    ) -> Self {
        let nlev = max_crse + 1;
        let mut bf_lev = vec![IntVect::unit(); nlev];
        for (i, bf) in bf_lev.iter_mut().enumerate().take(nlev) {
            for d in 0..SPACE_DIM {
                bf[d] = 1.max(blocking_factor[i] as i64 / ref_ratio[i][d]);
            }
        }
        let mut rr_lev = vec![IntVect::unit(); nlev];
        for i in lbase..max_crse {
            for d in 0..SPACE_DIM {
                rr_lev[i][d] = (ref_ratio[i][d] * bf_lev[i][d]) / bf_lev[i + 1][d];
            }
        }
        let mut pc_domain = vec![AmrBox::empty(); nlev];
        for i in lbase..=max_crse {
            pc_domain[i] = geom[i].domain().coarsen(bf_lev[i]);
        }

        let mut p_n = vec![BoxList::new(); nlev];
        let mut p_n_comp = vec![BoxList::new(); nlev];

        let mut bl = base_layout.to_list();
        bl.simplify();
        bl.coarsen(bf_lev[lbase]);
        p_n_comp[lbase] = BoxList::complement_in(&pc_domain[lbase], &bl);
        p_n_comp[lbase].simplify();
        p_n_comp[lbase].accrete(n_proper);
        proj_periodic(
            &mut p_n_comp[lbase],
            &geom[lbase].with_domain(pc_domain[lbase]),
        );
        p_n[lbase] = BoxList::complement_in(&pc_domain[lbase], &p_n_comp[lbase]);
        p_n[lbase].simplify();

        for i in lbase + 1..=max_crse {
            let mut comp = p_n_comp[i - 1].clone();
            comp.refine(rr_lev[i - 1]);
            comp.accrete(n_proper);
            proj_periodic(&mut comp, &geom[i].with_domain(pc_domain[i]));
            p_n[i] = BoxList::complement_in(&pc_domain[i], &comp);
            p_n[i].simplify();
            p_n_comp[i] = comp;
        }

        NestingDomains {
            lbase,
            bf_lev,
            rr_lev,
            pc_domain,
            p_n,
            p_n_comp,
        }
    }

    #[inline]
    pub fn lbase(&self) -> usize {
        self.lbase
    }

    #[inline]
    pub fn blocking_units(&self, lev: usize) -> IntVect {
        self.bf_lev[lev]
    }

    #[inline]
    pub fn coarsened_ratio(&self, lev: usize) -> IntVect {
        self.rr_lev[lev]
    }

    #[inline]
    pub fn coarsened_domain(&self, lev: usize) -> &AmrBox {
        &self.pc_domain[lev]
    }

    /// Region (in coarsened units) where level `lev+1` boxes may be placed.
    #[inline]
    pub fn domain(&self, lev: usize) -> &BoxList {
        &self.p_n[lev]
    }

    /// Complement of the nesting domain, grown by the nesting width.
    #[inline]
    pub fn complement(&self, lev: usize) -> &BoxList {
        &self.p_n_comp[lev]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::index::IntVect;

    fn base_setup(domain_hi: i64) -> (Vec<Geometry>, Vec<usize>, Vec<IntVect>) {
        let domain = AmrBox::new(IntVect::zero(), IntVect::splat(domain_hi));
        let g0 = Geometry::new_index_space(domain);
        let g1 = g0.refine(IntVect::splat(2));
        (vec![g0, g1], vec![8, 8], vec![IntVect::splat(2); 2])
    }

    #[test]
    fn full_base_layout_nests_everywhere() {
        let (geom, bf, rr) = base_setup(63);
        let layout = BoxArray::from_boxes(vec![*geom[0].domain()]);
        let nd = NestingDomains::build(0, 0, &geom, &bf, &rr, 1, &layout);
        // Coarsened domain is 16^3 (bf unit = 8/2 = 4).
        assert_eq!(nd.coarsened_domain(0).size(), IntVect::splat(16));
        // Nothing is uncovered: the complement is empty and placement is
        // legal anywhere, physical boundary included. Nesting constrains
        // interior edges of the valid region, not the domain edge.
        assert!(nd.complement(0).is_empty());
        assert_eq!(nd.domain(0).num_pts(), 16 * 16 * 16);
    }

    #[test]
    fn periodic_direction_keeps_boundary_valid() {
        let domain = AmrBox::new(IntVect::zero(), IntVect::splat(63));
        let g0 = Geometry::new(domain, [0.0; 3], [1.0; 3], [true, true, true]);
        let geom = vec![g0.clone(), g0.refine(IntVect::splat(2))];
        let layout = BoxArray::from_boxes(vec![domain]);
        let nd = NestingDomains::build(
            0,
            0,
            &geom,
            &[8, 8],
            &[IntVect::splat(2); 2],
            1,
            &layout,
        );
        // Fully periodic with a fully covered base: every coarse cell is a
        // legal placement, boundary included.
        assert_eq!(nd.domain(0).num_pts(), 16 * 16 * 16);
    }

    #[test]
    fn partial_base_coverage_carves_complement() {
        let (geom, bf, rr) = base_setup(63);
        // Base level covers only the low half in x.
        let half = AmrBox::new(IntVect::zero(), IntVect([31, 63, 63]));
        let layout = BoxArray::from_boxes(vec![half]);
        let nd = NestingDomains::build(0, 0, &geom, &bf, &rr, 1, &layout);
        let pn = nd.domain(0);
        // Placement must stay one coarsened cell inside the covered half;
        // the uncovered half plus its accreted rim is off limits.
        for b in pn {
            assert!(b.big_end(0) <= 6);
        }
        assert_eq!(pn.num_pts(), 7 * 16 * 16);
    }

    #[test]
    fn proj_periodic_adds_wrapped_images() {
        let domain = AmrBox::new(IntVect::zero(), IntVect::splat(15));
        let geom = Geometry::new(domain, [0.0; 3], [1.0; 3], [true, false, false]);
        let mut bl = BoxList::from_box(AmrBox::new(IntVect([14, 0, 0]), IntVect([17, 3, 3])));
        proj_periodic(&mut bl, &geom);
        // The overhang [16,17] wraps to [0,1].
        let wrapped = AmrBox::new(IntVect::zero(), IntVect([1, 3, 3]));
        assert!(bl.contains_all(&BoxList::from_box(wrapped)));
    }
}
