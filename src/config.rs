//! Driver configuration: every knob the hierarchy manager consumes.
//!
//! Per-level vectors are clamped to their last entry, so a single value
//! configures all levels. [`AmrConfig::validate`] enforces the full set of
//! fatal configuration checks before any level is built; nothing else in
//! the crate re-validates.

use std::path::PathBuf;

use crate::amr_error::AmrError;
use crate::geom::bx::AmrBox;
use crate::geom::index::{IntVect, SPACE_DIM};

fn at<T: Copy>(v: &[T], lev: usize, default: T) -> T {
    v.get(lev).or(v.last()).copied().unwrap_or(default)
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AmrConfig {
    /// Deepest refinement level allowed. Required; `None` is a fatal
    /// configuration error.
    pub max_level: Option<usize>,
    /// Per-level refinement ratio to the next-finer level.
    pub ref_ratio: Vec<IntVect>,
    /// Minimum patch extent and alignment, per level. Power of two.
    pub blocking_factor: Vec<usize>,
    /// Longest allowed patch side, per level.
    pub max_grid_size: Vec<usize>,
    /// Tag-buffer width around estimator marks, per level.
    pub n_error_buf: Vec<usize>,
    /// Clustering efficiency threshold in `(0, 1]`.
    pub grid_eff: f64,
    /// Proper-nesting width in blocking-factor-coarsened cells.
    pub n_proper: i64,
    /// Steps between regrids, per level. Zero means never.
    pub regrid_int: Vec<usize>,
    /// Advance finer levels `ratio` times per coarse step.
    pub sub_cycle: bool,
    /// Checkpoint every `check_int` coarse steps.
    pub check_int: Option<u64>,
    /// Checkpoint whenever cumulative time crosses a multiple of this.
    pub check_per: Option<f64>,
    /// Plot every `plot_int` coarse steps.
    pub plot_int: Option<u64>,
    /// Plot whenever cumulative time crosses a multiple of this.
    pub plot_per: Option<f64>,
    pub check_file_root: String,
    pub plot_file_root: String,
    /// Zero-padding width of the step number in output directory names.
    pub file_name_digits: usize,
    /// Manual grid placement file; bypasses tagging and clustering.
    pub grids_file: Option<PathBuf>,
    /// Checkpoint directory to resume from; `None` starts fresh.
    pub restart_file: Option<PathBuf>,
    /// Force a top-level regrid on the first step after restart.
    pub regrid_on_restart: bool,
    /// Write a plot file on the first step after restart.
    pub plotfile_on_restart: bool,
    /// Write a checkpoint immediately after a restart-time regrid-only run.
    pub checkpoint_on_restart: bool,
    /// Recompute the dt vector right after a base-level regrid.
    pub compute_new_dt_on_regrid: bool,
    /// Halve the patch cap (bounded) when ranks outnumber patches.
    pub refine_grid_layout: bool,
    /// Run-log path, written by the I/O rank.
    pub run_log: Option<PathBuf>,
}

impl Default for AmrConfig {
    fn default() -> Self {
        AmrConfig {
            max_level: None,
            ref_ratio: vec![IntVect::splat(2)],
            blocking_factor: vec![2],
            max_grid_size: vec![32],
            n_error_buf: vec![1],
            grid_eff: 0.7,
            n_proper: 1,
            regrid_int: vec![0],
            sub_cycle: true,
            check_int: None,
            check_per: None,
            plot_int: None,
            plot_per: None,
            check_file_root: "chk".into(),
            plot_file_root: "plt".into(),
            file_name_digits: 5,
            grids_file: None,
            restart_file: None,
            regrid_on_restart: false,
            plotfile_on_restart: false,
            checkpoint_on_restart: false,
            compute_new_dt_on_regrid: false,
            refine_grid_layout: true,
            run_log: None,
        }
    }
}

impl AmrConfig {
    /// Configuration with the required level count set and defaults
    /// elsewhere.
    pub fn with_max_level(max_level: usize) -> Self {
        AmrConfig {
            max_level: Some(max_level),
            ..Default::default()
        }
    }

    /// Declared max level; call only after [`validate`](Self::validate).
    #[inline]
    pub fn max_level_or_zero(&self) -> usize {
        self.max_level.unwrap_or(0)
    }

    #[inline]
    pub fn ref_ratio_at(&self, lev: usize) -> IntVect {
        at(&self.ref_ratio, lev, IntVect::splat(2))
    }

    /// Largest ratio component between `lev` and `lev + 1`.
    #[inline]
    pub fn max_ref_ratio(&self, lev: usize) -> i64 {
        self.ref_ratio_at(lev).max_component()
    }

    #[inline]
    pub fn blocking_factor_at(&self, lev: usize) -> usize {
        at(&self.blocking_factor, lev, 2)
    }

    #[inline]
    pub fn max_grid_size_at(&self, lev: usize) -> usize {
        at(&self.max_grid_size, lev, 32)
    }

    #[inline]
    pub fn n_error_buf_at(&self, lev: usize) -> usize {
        at(&self.n_error_buf, lev, 1)
    }

    #[inline]
    pub fn regrid_int_at(&self, lev: usize) -> usize {
        at(&self.regrid_int, lev, 0)
    }

    /// Blocking factors for levels `0..=max_level` as a dense vector, the
    /// form the placement algorithm consumes.
    pub fn blocking_factors(&self) -> Vec<usize> {
        (0..=self.max_level_or_zero())
            .map(|l| self.blocking_factor_at(l))
            .collect()
    }

    /// Refinement ratios for levels `0..=max_level` (last entry unused).
    pub fn ref_ratios(&self) -> Vec<IntVect> {
        (0..=self.max_level_or_zero())
            .map(|l| self.ref_ratio_at(l))
            .collect()
    }

    /// Enforce every fatal configuration condition against the base-level
    /// index domain. Returns the first violation found.
    pub fn validate(&self, base_domain: &AmrBox) -> Result<(), AmrError> {
        let Some(max_level) = self.max_level else {
            return Err(AmrError::MaxLevelUnset);
        };
        if !base_domain.is_ok() {
            return Err(AmrError::BadBaseDomain);
        }
        for lev in 0..max_level {
            let bf = self.blocking_factor_at(lev);
            if bf == 0 || !bf.is_power_of_two() {
                return Err(AmrError::BlockingFactorNotPow2 { level: lev, value: bf });
            }
            let r = self.ref_ratio_at(lev);
            for d in 0..SPACE_DIM {
                if !(2..=12).contains(&r[d]) {
                    return Err(AmrError::RefRatioOutOfRange {
                        level: lev,
                        value: r[d],
                    });
                }
            }
        }
        let bf0 = self.blocking_factor_at(0) as i64;
        for d in 0..SPACE_DIM {
            let len = base_domain.length(d);
            if len % 2 != 0 {
                return Err(AmrError::OddBaseDomain { dim: d, len });
            }
            if len % bf0 != 0 {
                return Err(AmrError::DomainNotDivisible {
                    dim: d,
                    len,
                    bf: bf0 as usize,
                });
            }
        }
        for lev in 0..=max_level {
            let mgs = self.max_grid_size_at(lev);
            if mgs % 2 != 0 {
                return Err(AmrError::MaxGridSizeOdd { level: lev, value: mgs });
            }
            let bf = self.blocking_factor_at(lev);
            if mgs % bf != 0 {
                return Err(AmrError::MaxGridSizeNotDivisible {
                    level: lev,
                    value: mgs,
                    bf,
                });
            }
        }
        if max_level > 0 && self.regrid_int_at(0) == 0 {
            return Err(AmrError::RegridIntervalUnset);
        }
        if self.check_int.is_some() && self.check_per.is_some() {
            return Err(AmrError::ConflictingCadence { output: "checkpoint" });
        }
        if self.plot_int.is_some() && self.plot_per.is_some() {
            return Err(AmrError::ConflictingCadence { output: "plot" });
        }
        Ok(())
    }
}
