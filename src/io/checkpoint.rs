//! Checkpoint header codec.
//!
//! A checkpoint is a directory `<root><zero-padded-step>/` whose `Header`
//! file starts with a version tag line followed by whitespace-delimited
//! scalars: dimensionality, cumulative time, declared max level, finest
//! level, then per-level geometry, refinement ratios, dt (current and
//! historical minimum), subcycle counts, step and regrid counters. Level
//! field data lives in per-level records appended after the scalars and in
//! files beneath the directory, both delegated to the level.
//!
//! Restart adapts the file to the running configuration: a run configured
//! deeper than the file extrapolates the missing levels downward from the
//! deepest one read; a run configured shallower truncates, parsing and
//! discarding the excess records field-by-field so the stream position
//! stays consistent for the per-level reads that follow.

use std::io::Write;

use crate::amr_error::AmrError;
use crate::geom::geometry::Geometry;
use crate::geom::index::{IntVect, SPACE_DIM};
use crate::io::token::Tokens;

/// First line of every current-format header.
pub const CHECKPOINT_VERSION: &str = "BlockAmrCheckpoint_1.0";

/// Header format, decided once per restart from the first line.
///
/// [`Legacy`](HeaderFormat::Legacy) headers predate the version tag and
/// lack the historical-minimum-dt record; restart defaults it from the
/// current dt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderFormat {
    Legacy,
    V1,
}

/// Scalar state the header carries, sized `0..=max_level` (ratios
/// `0..max_level`).
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderScalars {
    pub cum_time: f64,
    pub max_level: usize,
    pub finest_level: usize,
    pub geom: Vec<Geometry>,
    pub ref_ratio: Vec<IntVect>,
    pub dt_level: Vec<f64>,
    pub dt_min: Vec<f64>,
    pub n_cycle: Vec<usize>,
    pub level_steps: Vec<u64>,
    pub level_count: Vec<usize>,
}

/// Header as adapted to the running configuration.
#[derive(Clone, Debug)]
pub struct RestartHeader {
    pub format: HeaderFormat,
    /// Max level declared by the file, before adaptation.
    pub file_max_level: usize,
    /// Finest level the run will populate (file's, capped by the run).
    pub scalars: HeaderScalars,
}

/// Checkpoint directory name: `<root><zero-padded step>`.
pub fn output_dir_name(root: &str, step: u64, digits: usize) -> String {
    format!("{root}{step:0digits$}")
}

/// Write the versioned scalar block. Caller is the I/O rank; other ranks
/// write to a sink.
pub fn write_scalars(w: &mut dyn Write, s: &HeaderScalars) -> Result<(), AmrError> {
    let wrap = |e: std::io::Error| AmrError::io("checkpoint header", e);
    writeln!(w, "{CHECKPOINT_VERSION}").map_err(wrap)?;
    writeln!(w, "{SPACE_DIM}").map_err(wrap)?;
    writeln!(w, "{}", s.cum_time).map_err(wrap)?;
    writeln!(w, "{}", s.max_level).map_err(wrap)?;
    writeln!(w, "{}", s.finest_level).map_err(wrap)?;
    for g in &s.geom {
        write!(w, "{g} ").map_err(wrap)?;
    }
    writeln!(w).map_err(wrap)?;
    for r in &s.ref_ratio {
        write!(w, "{r} ").map_err(wrap)?;
    }
    writeln!(w).map_err(wrap)?;
    for line in [&s.dt_level, &s.dt_min] {
        for v in line.iter() {
            write!(w, "{v} ").map_err(wrap)?;
        }
        writeln!(w).map_err(wrap)?;
    }
    for v in &s.n_cycle {
        write!(w, "{v} ").map_err(wrap)?;
    }
    writeln!(w).map_err(wrap)?;
    for v in &s.level_steps {
        write!(w, "{v} ").map_err(wrap)?;
    }
    writeln!(w).map_err(wrap)?;
    for v in &s.level_count {
        write!(w, "{v} ").map_err(wrap)?;
    }
    writeln!(w).map_err(wrap)?;
    Ok(())
}

fn read_geometry(t: &mut Tokens<'_>) -> Result<Geometry, AmrError> {
    let mut s = t.next_balanced()?.to_string();
    for _ in 0..3 * SPACE_DIM {
        s.push(' ');
        s.push_str(t.next_token()?);
    }
    s.parse()
}

/// Parse the scalar block of `text`, adapting it to a run configured for
/// `run_max_level` with ratios `run_ref_ratio`. The returned tokenizer
/// position is just past the scalars, ready for per-level records.
pub fn read_scalars<'a>(
    text: &'a str,
    run_max_level: usize,
    sub_cycle: bool,
    run_ref_ratio: &[IntVect],
) -> Result<(RestartHeader, Tokens<'a>), AmrError> {
    let mut t = Tokens::new(text, "checkpoint header");
    let first_line = t.next_line();
    let format = if first_line.trim() == CHECKPOINT_VERSION {
        HeaderFormat::V1
    } else {
        HeaderFormat::Legacy
    };
    let spdim: usize = match format {
        HeaderFormat::V1 => t.next("space dimension")?,
        HeaderFormat::Legacy => first_line
            .trim()
            .parse()
            .map_err(|e| AmrError::header(format!("bad space dimension `{first_line}`: {e}")))?,
    };
    if spdim != SPACE_DIM {
        return Err(AmrError::DimensionMismatch {
            found: spdim,
            expected: SPACE_DIM,
        });
    }

    let cum_time: f64 = t.next("cumulative time")?;
    let file_max_level: usize = t.next("max level")?;
    let file_finest: usize = t.next("finest level")?;

    let keep = run_max_level.min(file_max_level);

    // Each record is read in lockstep up to `keep`, then parse-and-discard
    // up to the file's declared extent to hold the stream position.
    let mut geom = Vec::with_capacity(run_max_level + 1);
    for i in 0..=file_max_level {
        let g = read_geometry(&mut t)?;
        if i <= keep {
            geom.push(g);
        }
    }
    let mut ref_ratio = Vec::with_capacity(run_max_level);
    for i in 0..file_max_level {
        let r: IntVect = t.next("refinement ratio")?;
        if i < keep {
            ref_ratio.push(r);
        }
    }
    let mut read_reals = |what: &str| -> Result<Vec<f64>, AmrError> {
        let mut out = Vec::with_capacity(run_max_level + 1);
        for i in 0..=file_max_level {
            let v: f64 = t.next(what)?;
            if i <= keep {
                out.push(v);
            }
        }
        Ok(out)
    };
    let dt_level = read_reals("dt")?;
    let dt_min = match format {
        HeaderFormat::V1 => read_reals("minimum dt")?,
        HeaderFormat::Legacy => dt_level.clone(),
    };
    let mut read_ints = |what: &str| -> Result<Vec<u64>, AmrError> {
        let mut out = Vec::with_capacity(run_max_level + 1);
        for i in 0..=file_max_level {
            let v: u64 = t.next(what)?;
            if i <= keep {
                out.push(v);
            }
        }
        Ok(out)
    };
    let n_cycle: Vec<usize> = read_ints("subcycle count")?
        .into_iter()
        .map(|v| v as usize)
        .collect();
    let level_steps = read_ints("step counter")?;
    let level_count: Vec<usize> = read_ints("regrid counter")?
        .into_iter()
        .map(|v| v as usize)
        .collect();

    let mut s = HeaderScalars {
        cum_time,
        max_level: run_max_level,
        finest_level: file_finest.min(run_max_level),
        geom,
        ref_ratio,
        dt_level,
        dt_min,
        n_cycle,
        level_steps,
        level_count,
    };

    if run_max_level > file_max_level {
        // Propagate the deepest read level's values down through the
        // configured ratios.
        for i in file_max_level + 1..=run_max_level {
            let rat = run_ref_ratio
                .get(i - 1)
                .or(run_ref_ratio.last())
                .copied()
                .unwrap_or(IntVect::splat(2));
            let max_rat = rat.max_component();
            let mult = if sub_cycle { max_rat as usize } else { 1 };
            s.ref_ratio.push(rat);
            s.geom.push(s.geom[i - 1].refine(rat));
            let dt = s.dt_level[i - 1] / max_rat as f64;
            s.dt_level.push(dt);
            s.dt_min.push(dt);
            s.n_cycle.push(mult);
            s.level_steps.push(mult as u64 * s.level_steps[i - 1]);
            s.level_count.push(0);
        }
        if !sub_cycle {
            let finest_dt = s.dt_level[run_max_level];
            s.dt_level.iter_mut().for_each(|v| *v = finest_dt);
        }
    } else if run_max_level < file_max_level {
        log::warn!(
            "restart: run max_level {run_max_level} is lower than checkpoint's {file_max_level}; \
             discarding deeper levels"
        );
    }

    Ok((
        RestartHeader {
            format,
            file_max_level,
            scalars: s,
        },
        t,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::bx::AmrBox;

    fn scalars(max_level: usize, finest: usize) -> HeaderScalars {
        let g0 = Geometry::new(
            AmrBox::new(IntVect::zero(), IntVect::splat(63)),
            [0.0; 3],
            [1.0; 3],
            [false, true, false],
        );
        let mut geom = vec![g0];
        for i in 1..=max_level {
            geom.push(geom[i - 1].refine(IntVect::splat(2)));
        }
        HeaderScalars {
            cum_time: 0.1234567890123456789,
            max_level,
            finest_level: finest,
            geom,
            ref_ratio: vec![IntVect::splat(2); max_level],
            dt_level: (0..=max_level).map(|i| 0.5_f64.powi(i as i32 + 1)).collect(),
            dt_min: (0..=max_level).map(|i| 0.25_f64.powi(i as i32 + 1)).collect(),
            n_cycle: std::iter::once(1).chain((1..=max_level).map(|_| 2)).collect(),
            level_steps: (0..=max_level as u64).map(|i| 10 * (i + 1)).collect(),
            level_count: (0..=max_level).map(|i| i % 3).collect(),
        }
    }

    fn to_text(s: &HeaderScalars) -> String {
        let mut buf = Vec::new();
        write_scalars(&mut buf, s).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn round_trip_exact() {
        let s = scalars(2, 2);
        let text = to_text(&s);
        let (h, _) = read_scalars(&text, 2, true, &[IntVect::splat(2); 2]).unwrap();
        assert_eq!(h.format, HeaderFormat::V1);
        assert_eq!(h.file_max_level, 2);
        assert_eq!(h.scalars, s);
    }

    #[test]
    fn legacy_header_defaults_dt_min() {
        let s = scalars(1, 1);
        let text = to_text(&s);
        // The old format has no version tag line and no dt_min record.
        let legacy: String = text
            .lines()
            .enumerate()
            .filter(|&(i, _)| i != 0 && i != 8)
            .map(|(_, l)| format!("{l}\n"))
            .collect();
        let (h, _) = read_scalars(&legacy, 1, true, &[IntVect::splat(2)]).unwrap();
        assert_eq!(h.format, HeaderFormat::Legacy);
        assert_eq!(h.scalars.dt_min, h.scalars.dt_level);
        assert_eq!(h.scalars.dt_level, s.dt_level);
        assert_eq!(h.scalars.level_steps, s.level_steps);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let s = scalars(0, 0);
        let text = to_text(&s).replacen("\n3\n", "\n2\n", 1);
        let e = read_scalars(&text, 0, true, &[]).unwrap_err();
        assert_eq!(
            e,
            AmrError::DimensionMismatch {
                found: 2,
                expected: 3
            }
        );
    }

    #[test]
    fn shallower_run_truncates_and_preserves_position() {
        let s = scalars(2, 2);
        let mut text = to_text(&s);
        text.push_str("LEVEL-RECORD-SENTINEL\n");
        let (h, mut t) = read_scalars(&text, 1, true, &[IntVect::splat(2)]).unwrap();
        assert_eq!(h.scalars.finest_level, 1);
        assert_eq!(h.scalars.max_level, 1);
        assert_eq!(h.scalars.dt_level, &s.dt_level[..2]);
        assert_eq!(h.scalars.n_cycle, &s.n_cycle[..2]);
        assert_eq!(h.scalars.geom.len(), 2);
        // The discarded deep-level fields were fully consumed.
        assert_eq!(t.next_token().unwrap(), "LEVEL-RECORD-SENTINEL");
    }

    #[test]
    fn deeper_run_extrapolates_down() {
        let s = scalars(1, 1);
        let text = to_text(&s);
        let (h, _) = read_scalars(&text, 3, true, &[IntVect::splat(2); 3]).unwrap();
        let out = &h.scalars;
        assert_eq!(out.max_level, 3);
        assert_eq!(out.finest_level, 1);
        assert_eq!(out.dt_level.len(), 4);
        assert_eq!(out.dt_level[2], s.dt_level[1] / 2.0);
        assert_eq!(out.dt_level[3], s.dt_level[1] / 4.0);
        assert_eq!(out.n_cycle[2..], [2, 2]);
        assert_eq!(out.level_steps[2], 2 * s.level_steps[1]);
        assert_eq!(out.level_steps[3], 4 * s.level_steps[1]);
        assert_eq!(out.level_count[2..], [0, 0]);
        assert_eq!(
            out.geom[3].domain().size(),
            IntVect::splat(64 * 2 * 2 * 2)
        );
    }

    #[test]
    fn lockstep_without_subcycling_flattens_dt() {
        let s = scalars(1, 1);
        let text = to_text(&s);
        let (h, _) = read_scalars(&text, 2, false, &[IntVect::splat(2); 2]).unwrap();
        let out = &h.scalars;
        assert_eq!(out.n_cycle[2], 1);
        assert!(out.dt_level.iter().all(|&dt| dt == out.dt_level[2]));
    }

    #[test]
    fn dir_name_is_zero_padded() {
        assert_eq!(output_dir_name("chk", 10, 5), "chk00010");
        assert_eq!(output_dir_name("plt", 123456, 5), "plt123456");
    }
}
