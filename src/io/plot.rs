//! Plot-file header writing.
//!
//! Plot output shares the checkpoint machinery: a zero-padded step
//! directory, a `Header` written by the I/O rank, per-level payload
//! delegated to the level. Only the header schema differs — plot headers
//! lead with the selected plot variables.

use std::collections::BTreeSet;
use std::io::Write;

use crate::amr_error::AmrError;
use crate::geom::geometry::Geometry;
use crate::geom::index::SPACE_DIM;

pub const PLOT_VERSION: &str = "BlockAmrPlot_1.0";

pub fn write_plot_header(
    w: &mut dyn Write,
    plot_vars: &BTreeSet<String>,
    cum_time: f64,
    finest_level: usize,
    geom: &[Geometry],
) -> Result<(), AmrError> {
    let wrap = |e: std::io::Error| AmrError::io("plot header", e);
    writeln!(w, "{PLOT_VERSION}").map_err(wrap)?;
    writeln!(w, "{}", plot_vars.len()).map_err(wrap)?;
    for v in plot_vars {
        writeln!(w, "{v}").map_err(wrap)?;
    }
    writeln!(w, "{SPACE_DIM}").map_err(wrap)?;
    writeln!(w, "{cum_time}").map_err(wrap)?;
    writeln!(w, "{finest_level}").map_err(wrap)?;
    for g in geom.iter().take(finest_level + 1) {
        writeln!(w, "{g}").map_err(wrap)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::bx::AmrBox;
    use crate::geom::index::IntVect;

    #[test]
    fn header_lists_vars_in_order() {
        let mut vars = BTreeSet::new();
        vars.insert("pressure".to_string());
        vars.insert("density".to_string());
        let geom = vec![Geometry::new_index_space(AmrBox::new(
            IntVect::zero(),
            IntVect::splat(31),
        ))];
        let mut buf = Vec::new();
        write_plot_header(&mut buf, &vars, 2.5, 0, &geom).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(PLOT_VERSION));
        assert_eq!(lines.next(), Some("2"));
        assert_eq!(lines.next(), Some("density"));
        assert_eq!(lines.next(), Some("pressure"));
        assert_eq!(lines.next(), Some("3"));
    }
}
