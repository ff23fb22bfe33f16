//! Manual grid placement files.
//!
//! When a grids file is configured, tagging and clustering are bypassed
//! entirely: the file dictates every finer level's layout. Format: first
//! token is the number of finer levels described; then, per level, a box
//! count followed by that many boxes in the native `((lo) (hi) (type))`
//! form, written at the next-coarser level's resolution. Boxes are refined
//! to the target level and validated against the patch-size cap; an
//! oversized box is fatal.

use crate::amr_error::AmrError;
use crate::config::AmrConfig;
use crate::geom::box_list::BoxList;
use crate::geom::bx::AmrBox;
use crate::io::token::Tokens;

/// Parse `text` into layouts for levels `lbase+1..=new_finest`.
///
/// Returns `(new_finest, layouts)` with `layouts` indexed by level; entries
/// at or below `lbase` stay empty. `prev_finest` caps growth to one new
/// level, exactly like the clustering path.
pub fn read_grids_file(
    text: &str,
    lbase: usize,
    prev_finest: usize,
    config: &AmrConfig,
) -> Result<(usize, Vec<BoxList>), AmrError> {
    let max_level = config.max_level_or_zero();
    let mut t = Tokens::new(text, "grid file");

    let in_finest: usize = t.next("level count")?;
    let new_finest = max_level.min(prev_finest + 1).min(in_finest);

    let mut layouts = vec![BoxList::new(); max_level + 1];
    for lev in 1..=new_finest {
        let ngrid: usize = t.next("grid count")?;
        let mut bl = BoxList::new();
        for _ in 0..ngrid {
            let mut bx: AmrBox = t.next_balanced()?.parse()?;
            if lev > lbase {
                bx = bx.refine(config.ref_ratio_at(lev - 1));
                let max = config.max_grid_size_at(lev);
                if bx.longside().0 > max as i64 {
                    return Err(AmrError::GridTooLarge {
                        level: lev,
                        bx,
                        max,
                    });
                }
                bl.push(bx);
            }
        }
        if lev > lbase {
            if !bl.is_disjoint() {
                return Err(AmrError::NonDisjointLayout { level: lev });
            }
            layouts[lev] = bl;
        }
    }
    Ok((new_finest, layouts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::index::IntVect;

    fn config() -> AmrConfig {
        let mut c = AmrConfig::with_max_level(2);
        c.blocking_factor = vec![8];
        c.max_grid_size = vec![32];
        c.regrid_int = vec![2];
        c
    }

    #[test]
    fn parses_levels_and_refines_boxes() {
        let text = "2\n1\n((4,4,4) (11,11,11) (0,0,0))\n1\n((16,16,16) (23,23,23) (0,0,0))\n";
        let (finest, layouts) = read_grids_file(text, 0, 1, &config()).unwrap();
        assert_eq!(finest, 2);
        assert!(layouts[0].is_empty());
        // Level-1 box given at level-0 resolution, refined by 2.
        assert_eq!(
            layouts[1].boxes()[0],
            AmrBox::new(IntVect::splat(8), IntVect::splat(23))
        );
        assert_eq!(
            layouts[2].boxes()[0],
            AmrBox::new(IntVect::splat(32), IntVect::splat(47))
        );
    }

    #[test]
    fn growth_is_capped_to_one_level() {
        let text = "2\n1\n((4,4,4) (11,11,11) (0,0,0))\n1\n((16,16,16) (23,23,23) (0,0,0))\n";
        let (finest, layouts) = read_grids_file(text, 0, 0, &config()).unwrap();
        assert_eq!(finest, 1);
        assert!(layouts[2].is_empty());
    }

    #[test]
    fn oversized_box_is_fatal() {
        // 24 coarse cells refine to 48 > max_grid_size 32.
        let text = "1\n1\n((0,0,0) (23,7,7) (0,0,0))\n";
        let e = read_grids_file(text, 0, 0, &config()).unwrap_err();
        assert!(matches!(e, AmrError::GridTooLarge { level: 1, .. }));
    }

    #[test]
    fn overlapping_boxes_are_fatal() {
        let text = "1\n2\n((0,0,0) (7,7,7) (0,0,0))\n((4,4,4) (11,11,11) (0,0,0))\n";
        let e = read_grids_file(text, 0, 0, &config()).unwrap_err();
        assert_eq!(e, AmrError::NonDisjointLayout { level: 1 });
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let text = "1\n2\n((0,0,0) (7,7,7) (0,0,0))\n";
        assert!(read_grids_file(text, 0, 0, &config()).is_err());
    }
}
