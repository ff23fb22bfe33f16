//! The per-level collaborator surface.
//!
//! Everything physics-specific — error estimation, data initialization,
//! the actual advance, field storage — lives behind [`AmrLevel`]. The
//! hierarchy driver owns the control flow and the level scalars (dt,
//! subcycle counts, step counters) and calls through this trait at the
//! seams. Level construction is an injected capability ([`LevelFactory`])
//! rather than a registered builder, so a driver is parameterized over a
//! user-supplied level type.

use std::io::Write;
use std::path::Path;

use crate::amr_error::AmrError;
use crate::comm::Communicator;
use crate::distribution::DistributionMapping;
use crate::geom::box_array::BoxArray;
use crate::geom::geometry::Geometry;
use crate::geom::index::IntVect;
use crate::io::token::Tokens;
use crate::tag::TagArray;

/// One resolution tier of the hierarchy, as seen by the driver.
///
/// A level object is immutable in layout once published: regrids replace
/// the whole object instead of mutating it. The three initialization paths
/// are mutually exclusive per rebuild:
///
/// - [`init_data`](Self::init_data) — cold start; the level is already in
///   the hierarchy and may read the coarser levels passed in.
/// - [`init_from_old`](Self::init_from_old) — rebuild of an existing level;
///   the old incarnation stays reachable for interpolation until the call
///   returns.
/// - [`init_from_coarse`](Self::init_from_coarse) — a level that did not
///   exist before; data is synthesized from the parent only.
pub trait AmrLevel: Sized {
    fn level(&self) -> usize;
    fn geometry(&self) -> &Geometry;
    fn box_array(&self) -> &BoxArray;

    /// Ownership map assigned by the driver whenever the layout changes.
    fn set_distribution(&mut self, dm: DistributionMapping);
    fn distribution(&self) -> &DistributionMapping;

    /// Mark cells needing refinement. `tags` covers this level's layout
    /// grown by `n_error_buf + ngrow`; marks outside are clamped away.
    fn error_est(&mut self, tags: &mut TagArray, time: f64, n_error_buf: usize, ngrow: usize);

    /// Physics-specific veto/add pass over the coarsened tags.
    fn manual_tags_placement(&mut self, _tags: &mut TagArray, _bf_lev: &[IntVect]) {}

    fn init_data(&mut self, coarser: &[Self]);
    fn init_from_old(&mut self, old: &Self);
    fn init_from_coarse(&mut self, coarse: &Self);

    /// Fill the initial dt vector for `0..=finest_level`.
    fn compute_initial_dt(
        &self,
        finest_level: usize,
        sub_cycle: bool,
        n_cycle: &[usize],
        ref_ratio: &[IntVect],
        dt_level: &mut [f64],
        stop_time: f64,
    );

    /// Recompute the dt vector between coarse steps (and after regrids when
    /// so configured), honoring the per-level minimum over subcycles.
    #[allow(clippy::too_many_arguments)]
    fn compute_new_dt(
        &self,
        finest_level: usize,
        sub_cycle: bool,
        n_cycle: &[usize],
        ref_ratio: &[IntVect],
        dt_min: &[f64],
        dt_level: &mut [f64],
        stop_time: f64,
        post_regrid: bool,
    );

    /// Advance this level's data by one step. Returns the new stable dt
    /// estimate for this level.
    fn advance(&mut self, time: f64, dt: f64, iteration: usize, ncycle: usize) -> f64;

    /// Stamp the level's notion of current/previous time after init,
    /// restart, or dt reseeding.
    fn set_time_level(&mut self, time: f64, dt_new: f64, dt_old: f64);

    /// Veto regridding this step (e.g. mid-multistep integrators).
    fn ok_to_regrid(&self) -> bool {
        true
    }

    /// Per-level continuation check folded into the driver's
    /// `ok_to_continue`.
    fn ok_to_continue(&self) -> bool {
        true
    }

    fn post_timestep(&mut self, _iteration: usize) {}
    fn post_coarse_timestep(&mut self, _cumtime: f64) {}
    fn post_regrid(&mut self, _lbase: usize, _new_finest: usize) {}
    fn post_init(&mut self, _stop_time: f64) {}
    fn post_restart(&mut self) {}

    /// Release superseded time-state ahead of a rebuild.
    fn remove_old_data(&mut self) {}

    fn count_cells(&self) -> u64 {
        self.box_array().num_pts()
    }

    /// Append this level's metadata to the checkpoint header and persist
    /// its field data beneath `ckdir` (storage engine's business). Runs on
    /// every rank; only the I/O rank's `header` writes reach the file.
    fn checkpoint(
        &mut self,
        ckdir: &Path,
        header: &mut dyn Write,
        comm: &dyn Communicator,
    ) -> Result<(), AmrError>;

    /// Append plot output for this level. Levels with nothing to plot keep
    /// the default.
    fn write_plot_data(
        &mut self,
        _dir: &Path,
        _header: &mut dyn Write,
        _comm: &dyn Communicator,
    ) -> Result<(), AmrError> {
        Ok(())
    }
}

/// Injected level-construction capability.
pub trait LevelFactory {
    type Level: AmrLevel;

    /// Build a level skeleton bound to `grids`. Field data is filled in by
    /// one of the three init paths afterwards.
    fn build(&self, lev: usize, geom: &Geometry, grids: BoxArray, time: f64) -> Self::Level;

    /// Reconstruct a level from its checkpoint record: the counterpart of
    /// [`AmrLevel::checkpoint`], reading the same token stream and
    /// restoring field data from beneath `ckdir`.
    fn restore(
        &self,
        lev: usize,
        geom: &Geometry,
        ckdir: &Path,
        header: &mut Tokens,
    ) -> Result<Self::Level, AmrError>;
}
