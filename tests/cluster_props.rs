use block_amr::cluster::ClusterList;
use block_amr::geom::box_list::BoxList;
use block_amr::geom::index::IntVect;
use proptest::prelude::*;

fn collect_boxes(pts: Vec<IntVect>, eff: f64) -> BoxList {
    let mut cl = ClusterList::new(pts);
    cl.chop(eff);
    cl.box_list()
}

proptest! {
    /// For any tagged-cell set and threshold `e`, the produced box set is
    /// disjoint, covers every tag, and each box holds at least an `e`
    /// fraction of tagged cells (a box that cannot be usefully split ends as
    /// a single cell with ratio 1).
    #[test]
    fn chop_meets_threshold_and_covers_all_tags(
        raw in prop::collection::hash_set((0i64..24, 0i64..24, 0i64..24), 1..200),
        eff in 0.1f64..1.0,
    ) {
        let pts: Vec<IntVect> = raw.iter().map(|&(x, y, z)| IntVect([x, y, z])).collect();
        let bl = collect_boxes(pts.clone(), eff);

        prop_assert!(bl.is_disjoint());
        for p in &pts {
            prop_assert!(bl.iter().any(|b| b.contains(*p)), "tag {p:?} uncovered");
        }

        // Boxes are disjoint and cover all tags, so per-box tag counts
        // partition the tag set.
        let mut total_cells = 0u64;
        for b in &bl {
            let inside = pts.iter().filter(|p| b.contains(**p)).count();
            let ratio = inside as f64 / b.num_pts() as f64;
            prop_assert!(ratio >= eff - 1e-12, "box {b} ratio {ratio} < {eff}");
            total_cells += b.num_pts();
        }
        let aggregate = pts.len() as f64 / total_cells as f64;
        prop_assert!(aggregate >= eff - 1e-12, "aggregate {aggregate} < {eff}");
    }

    /// Chopping only ever shrinks coverage: every produced box stays inside
    /// the initial bounding box, and total coverage never grows.
    #[test]
    fn chop_never_grows_coverage(
        raw in prop::collection::hash_set((0i64..16, 0i64..16, 0i64..2), 1..80),
    ) {
        let pts: Vec<IntVect> = raw.iter().map(|&(x, y, z)| IntVect([x, y, z])).collect();
        let before = collect_boxes(pts.clone(), 0.0);
        prop_assert_eq!(before.len(), 1);
        let bound = before.boxes()[0];

        let after = collect_boxes(pts, 0.9);
        prop_assert!(after.num_pts() <= bound.num_pts());
        for b in &after {
            prop_assert!(bound.contains_box(b));
        }
    }
}
