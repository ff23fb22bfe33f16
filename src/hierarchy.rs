//! The hierarchy driver.
//!
//! `Amr` owns the level stack and every per-level scalar (dt vectors,
//! subcycle counts, step and regrid counters), decides where finer grids
//! go, rebuilds levels when the layouts change, drives the recursive
//! subcycled advance, and persists the whole thing for restart. Physics
//! stays behind [`AmrLevel`]; placement policy behind [`LoadBalancer`];
//! transport behind [`Communicator`].
//!
//! Control flow is SPMD: every rank runs the same statements, and the only
//! rank-dependent behavior is who performs serial I/O.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::amr_error::AmrError;
use crate::cluster::ClusterList;
use crate::comm::Communicator;
use crate::config::AmrConfig;
use crate::distribution::{DistributionCache, LoadBalancer, RoundRobin};
use crate::geom::box_array::BoxArray;
use crate::geom::box_list::BoxList;
use crate::geom::geometry::Geometry;
use crate::geom::index::{IntVect, SPACE_DIM};
use crate::io::checkpoint::{self, HeaderScalars};
use crate::io::grids_file::read_grids_file;
use crate::io::plot::write_plot_header;
use crate::level::{AmrLevel, LevelFactory};
use crate::nesting::NestingDomains;
use crate::runlog::RunLog;
use crate::tag::{TagArray, TagVal};

/// Rounds of initial-grid iteration in [`Amr::bld_fine_levels`].
const INIT_GRID_ROUNDS: usize = 4;
/// Patch-cap halvings attempted when ranks outnumber patches.
const LAYOUT_REFINE_ROUNDS: u32 = 4;

/// True when `t` crossed a multiple of `per` during the last step of size
/// `dt`.
fn period_crossed(t: f64, dt: f64, per: f64) -> bool {
    per > 0.0 && ((t - dt) / per).floor() != (t / per).floor()
}

pub struct Amr<F: LevelFactory> {
    config: AmrConfig,
    factory: F,
    comm: Arc<dyn Communicator>,
    balancer: Box<dyn LoadBalancer>,
    dist_cache: DistributionCache,
    runlog: RunLog,

    max_level: usize,
    geom: Vec<Geometry>,
    ref_ratio: Vec<IntVect>,
    levels: Vec<F::Level>,
    finest_level: usize,

    cum_time: f64,
    dt_level: Vec<f64>,
    dt_min: Vec<f64>,
    n_cycle: Vec<usize>,
    level_steps: Vec<u64>,
    level_count: Vec<usize>,

    regrid_on_restart: bool,
    plotfile_on_restart: bool,
    restarted_from: Option<PathBuf>,
    last_checkpoint: u64,
    last_plotfile: u64,
    plot_vars: BTreeSet<String>,
}

impl<F: LevelFactory> Amr<F> {
    /// Validate the configuration and set up an empty hierarchy over
    /// `base_geom`. No levels exist until [`init`](Self::init) runs.
    pub fn new(
        config: AmrConfig,
        base_geom: Geometry,
        factory: F,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self, AmrError> {
        config.validate(base_geom.domain())?;
        let max_level = config.max_level_or_zero();
        let nlev = max_level + 1;

        let ref_ratio: Vec<IntVect> = (0..max_level).map(|l| config.ref_ratio_at(l)).collect();
        let mut geom = Vec::with_capacity(nlev);
        geom.push(base_geom);
        for l in 1..nlev {
            geom.push(geom[l - 1].refine(ref_ratio[l - 1]));
        }

        let runlog = match (&config.run_log, comm.is_io_rank()) {
            (Some(path), true) => RunLog::open(path)?,
            _ => RunLog::disabled(),
        };

        Ok(Amr {
            regrid_on_restart: config.regrid_on_restart,
            plotfile_on_restart: config.plotfile_on_restart,
            config,
            factory,
            comm,
            balancer: Box::new(RoundRobin),
            dist_cache: DistributionCache::new(),
            runlog,
            max_level,
            geom,
            ref_ratio,
            levels: Vec::new(),
            finest_level: 0,
            cum_time: 0.0,
            dt_level: vec![0.0; nlev],
            dt_min: vec![0.0; nlev],
            n_cycle: vec![1; nlev],
            level_steps: vec![0; nlev],
            level_count: vec![0; nlev],
            restarted_from: None,
            last_checkpoint: 0,
            last_plotfile: 0,
            plot_vars: BTreeSet::new(),
        })
    }

    /// Replace the default round-robin placement policy.
    pub fn with_balancer(mut self, balancer: Box<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    // --- accessors ---

    #[inline]
    pub fn config(&self) -> &AmrConfig {
        &self.config
    }

    #[inline]
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    #[inline]
    pub fn finest_level(&self) -> usize {
        self.finest_level
    }

    #[inline]
    pub fn cum_time(&self) -> f64 {
        self.cum_time
    }

    #[inline]
    pub fn geometry(&self, lev: usize) -> &Geometry {
        &self.geom[lev]
    }

    #[inline]
    pub fn ref_ratio(&self, lev: usize) -> IntVect {
        self.ref_ratio[lev]
    }

    /// Largest ratio component between `lev` and `lev + 1`.
    #[inline]
    pub fn max_ref_ratio(&self, lev: usize) -> i64 {
        self.ref_ratio[lev].max_component()
    }

    #[inline]
    pub fn dt_level(&self, lev: usize) -> f64 {
        self.dt_level[lev]
    }

    #[inline]
    pub fn dt_min(&self, lev: usize) -> f64 {
        self.dt_min[lev]
    }

    /// Override the historical-minimum dt record.
    pub fn set_dt_min(&mut self, dt_min: &[f64]) {
        self.dt_min[..dt_min.len()].copy_from_slice(dt_min);
    }

    #[inline]
    pub fn n_cycle(&self, lev: usize) -> usize {
        self.n_cycle[lev]
    }

    #[inline]
    pub fn level_steps(&self, lev: usize) -> u64 {
        self.level_steps[lev]
    }

    #[inline]
    pub fn level_count(&self, lev: usize) -> usize {
        self.level_count[lev]
    }

    #[inline]
    pub fn level(&self, lev: usize) -> &F::Level {
        &self.levels[lev]
    }

    #[inline]
    pub fn level_mut(&mut self, lev: usize) -> &mut F::Level {
        &mut self.levels[lev]
    }

    pub fn box_array(&self, lev: usize) -> &BoxArray {
        self.levels[lev].box_array()
    }

    pub fn num_grids(&self, lev: usize) -> usize {
        self.levels[lev].box_array().len()
    }

    pub fn cell_count(&self, lev: usize) -> u64 {
        self.levels[lev].count_cells()
    }

    /// Every level agrees the run may continue.
    pub fn ok_to_continue(&self) -> bool {
        self.levels.iter().all(AmrLevel::ok_to_continue)
    }

    // --- plot-variable selection (instance state, not process-wide) ---

    pub fn add_plot_var(&mut self, name: impl Into<String>) {
        self.plot_vars.insert(name.into());
    }

    pub fn remove_plot_var(&mut self, name: &str) {
        self.plot_vars.remove(name);
    }

    pub fn clear_plot_vars(&mut self) {
        self.plot_vars.clear();
    }

    pub fn contains_plot_var(&self, name: &str) -> bool {
        self.plot_vars.contains(name)
    }

    pub fn set_plot_vars<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plot_vars = names.into_iter().map(Into::into).collect();
    }

    // --- startup ---

    /// Bring the hierarchy up: restart from the configured checkpoint if
    /// one is set, otherwise build fresh levels and write the step-zero
    /// outputs.
    pub fn init(&mut self, strt_time: f64, stop_time: f64) -> Result<(), AmrError> {
        if let Some(restart) = self.config.restart_file.clone() {
            self.restart(&restart)?;
        } else {
            self.initial_init(strt_time, stop_time)?;
            if self.config.check_int.is_some() || self.config.check_per.is_some() {
                self.checkpoint()?;
            }
            if self.config.plot_int.is_some() || self.config.plot_per.is_some() {
                self.write_plot_file()?;
            }
        }
        Ok(())
    }

    fn initial_init(&mut self, strt_time: f64, stop_time: f64) -> Result<(), AmrError> {
        self.finest_level = 0;
        self.cum_time = strt_time;
        self.def_base_level(strt_time)?;

        self.levels[0].compute_initial_dt(
            self.finest_level,
            self.config.sub_cycle,
            &self.n_cycle,
            &self.ref_ratio,
            &mut self.dt_level,
            stop_time,
        );
        let mut dt0 = self.dt_level[0];
        self.dt_min[0] = dt0;
        self.n_cycle[0] = 1;
        for lev in 1..=self.max_level {
            let fact = if self.config.sub_cycle {
                self.max_ref_ratio(lev - 1) as usize
            } else {
                1
            };
            dt0 /= fact as f64;
            self.dt_level[lev] = dt0;
            self.dt_min[lev] = dt0;
            self.n_cycle[lev] = fact;
        }

        if self.max_level > 0 {
            self.bld_fine_levels(strt_time)?;
        }

        for lev in 0..=self.finest_level {
            let dt = self.dt_level[lev];
            self.levels[lev].set_time_level(strt_time, dt, dt);
        }
        for lev in 0..=self.finest_level {
            self.levels[lev].post_regrid(0, self.finest_level);
        }
        for lev in 0..=self.finest_level {
            self.levels[lev].post_init(stop_time);
        }
        for lev in 0..=self.max_level {
            self.level_count[lev] = 0;
            self.level_steps[lev] = 0;
        }

        let summary = self.grid_summary(0, self.finest_level);
        self.runlog.record(&format!("INITIAL GRIDS\n{summary}"));
        Ok(())
    }

    /// The deterministic level-0 layout: coarsen the domain by two, cap
    /// patch sizes at half the configured maximum, refine back. Every
    /// resulting patch has even extents.
    fn base_layout(&self) -> BoxArray {
        let mut bl = BoxList::from_box(self.geom[0].domain().coarsen(IntVect::splat(2)));
        bl.max_size(self.config.max_grid_size_at(0) as i64 / 2);
        bl.refine(IntVect::splat(2));
        bl.sort();
        BoxArray::from_list(bl)
    }

    fn assign_distribution(&self, level: &mut F::Level) {
        let dm = self.dist_cache.get_or_compute(
            level.box_array(),
            self.comm.size(),
            self.balancer.as_ref(),
        );
        level.set_distribution(dm);
    }

    fn def_base_level(&mut self, strt_time: f64) -> Result<(), AmrError> {
        let lev0 = self.base_layout();
        let mut level = self
            .factory
            .build(0, &self.geom[0], lev0, strt_time);
        self.assign_distribution(&mut level);
        // Insert before init: cold-start initialization may read the
        // hierarchy.
        self.levels.clear();
        self.levels.push(level);
        let (below, cur) = self.levels.split_at_mut(0);
        cur[0].init_data(below);
        Ok(())
    }

    fn bld_fine_levels(&mut self, strt_time: f64) -> Result<(), AmrError> {
        self.finest_level = 0;
        loop {
            let (new_finest, new_grids) = self.grid_places(self.finest_level, strt_time)?;
            if new_finest <= self.finest_level {
                break;
            }
            self.finest_level = new_finest;
            let ba = new_grids[new_finest].clone();
            let mut level = self
                .factory
                .build(new_finest, &self.geom[new_finest], ba, strt_time);
            self.assign_distribution(&mut level);
            self.levels.push(level);
            let (below, cur) = self.levels.split_at_mut(new_finest);
            cur[0].init_data(below);
            if self.finest_level >= self.max_level {
                break;
            }
        }
        // Iterate the initial grids until the layouts stop moving: buffered
        // tags react to the data just initialized on the new levels.
        for _ in 0..INIT_GRID_ROUNDS {
            let before: Vec<u64> = (0..=self.finest_level)
                .map(|l| self.levels[l].box_array().layout_hash())
                .collect();
            let prev_finest = self.finest_level;
            self.regrid(0, strt_time, true)?;
            let same = prev_finest == self.finest_level
                && (0..=self.finest_level)
                    .all(|l| self.levels[l].box_array().layout_hash() == before[l]);
            if same {
                break;
            }
        }
        Ok(())
    }

    // --- grid placement ---

    /// Compute new layouts for levels `lbase+1..=new_finest`. Level 0's
    /// layout is recomputed deterministically when `lbase == 0`. Returns
    /// the new finest level (growth capped at one level per call) and the
    /// layouts indexed by level.
    pub fn grid_places(
        &mut self,
        lbase: usize,
        time: f64,
    ) -> Result<(usize, Vec<BoxArray>), AmrError> {
        let mut new_grids = vec![BoxArray::empty(); self.max_level + 1];
        if lbase == 0 {
            new_grids[0] = self.base_layout();
        }
        if self.max_level == 0 {
            return Ok((0, new_grids));
        }
        let max_crse = self.finest_level.min(self.max_level - 1);

        if let Some(path) = self.config.grids_file.clone() {
            let text = fs::read_to_string(&path)
                .map_err(|e| AmrError::io(path.display().to_string(), e))?;
            let (new_finest, lists) =
                read_grids_file(&text, lbase, self.finest_level, &self.config)?;
            for (lev, bl) in lists.into_iter().enumerate() {
                if lev > lbase && !bl.is_empty() {
                    new_grids[lev] = BoxArray::from_list(bl);
                }
            }
            return Ok((new_finest, new_grids));
        }

        let blocking: Vec<usize> = self.config.blocking_factors();
        let nd = NestingDomains::build(
            lbase,
            max_crse,
            &self.geom,
            &blocking,
            &self.ref_ratio,
            self.config.n_proper,
            self.levels[lbase].box_array(),
        );
        let bf_all: Vec<IntVect> = (0..=max_crse).map(|l| nd.blocking_units(l)).collect();

        let mut new_finest = lbase;
        for levc in (lbase..=max_crse).rev() {
            let levf = levc + 1;
            // Grow the tag region far enough to contain the footprint of
            // any levels already placed above the one being created here.
            let mut ngrow: usize = 0;
            if levf < new_finest {
                let mut ba_proj = new_grids[levf + 1].to_list();
                ba_proj.coarsen(self.ref_ratio[levf]);
                ba_proj.accrete(self.config.n_proper);
                ba_proj.coarsen(self.ref_ratio[levc]);

                let mut levc_covered = self.levels[levc].box_array().to_list();
                while !levc_covered.contains_all(&ba_proj) {
                    levc_covered.accrete(1);
                    ngrow += 1;
                }
            }
            let n_error_buf = self.config.n_error_buf_at(levc);
            let mut tags = TagArray::new(
                self.levels[levc].box_array(),
                (n_error_buf + ngrow) as i64,
            );
            self.levels[levc].error_est(&mut tags, time, n_error_buf, ngrow);

            // Force-tag beneath the footprint of finer levels so the level
            // being built nests them. The footprint is reconstructed from
            // the finer layout minus its own error buffering, so buffers
            // are not buffered twice.
            if levf < new_finest {
                let nerr = self.config.n_error_buf_at(levf) as i64;

                let mut bl_tagged = new_grids[levf + 1].to_list();
                bl_tagged.simplify();
                bl_tagged.coarsen(self.ref_ratio[levf]);
                // Pre-grow boxes touching the domain edge so the shrink
                // below cannot pull grids off the boundary.
                let fine_domain = *self.geom[levf].domain();
                let bl_grown: BoxList = bl_tagged
                    .iter()
                    .map(|b| {
                        let mut g = *b;
                        for dir in 0..SPACE_DIM {
                            if g.small_end(dir) == fine_domain.small_end(dir) {
                                g = g.grow_lo(dir, nerr);
                            }
                            if g.big_end(dir) == fine_domain.big_end(dir) {
                                g = g.grow_hi(dir, nerr);
                            }
                        }
                        g
                    })
                    .collect();
                let mbox_f = bl_grown.minimal_box().grow(1);
                let mut bl_fcomp = BoxList::complement_in(&mbox_f, &bl_grown);
                bl_fcomp.simplify();
                let mut shrink = IntVect::zero();
                for d in 0..SPACE_DIM {
                    shrink[d] = nerr / self.ref_ratio[levf][d];
                }
                bl_fcomp.accrete_vec(shrink);
                let mut bl_f = BoxList::complement_in(&mbox_f, &bl_fcomp);
                bl_f.accrete(self.config.n_proper);
                // Cover any shortfall between this level's buffering and
                // the finer level's.
                let mut extra = IntVect::zero();
                for d in 0..SPACE_DIM {
                    let here = n_error_buf as i64 * self.ref_ratio[levc][d];
                    if nerr > here {
                        extra[d] = nerr - here;
                    }
                }
                bl_f.accrete_vec(extra);
                bl_f.coarsen(self.ref_ratio[levc]);
                tags.set_val(&bl_f, TagVal::Set);
            }

            tags.buffer((n_error_buf + ngrow) as i64);
            let bf = nd.blocking_units(levc);
            if bf.max_component() > 1 {
                tags.coarsen(bf);
            }
            self.levels[levc].manual_tags_placement(&mut tags, &bf_all);
            tags.map_periodic(&self.geom[levc].with_domain(*nd.coarsened_domain(levc)));
            tags.set_val(nd.complement(levc), TagVal::Clear);

            let pts = tags.collate();
            drop(tags);
            if pts.is_empty() {
                continue;
            }
            new_finest = new_finest.max(levf);

            let mut clusters = ClusterList::new(pts);
            clusters.chop(self.config.grid_eff);
            clusters.intersect(nd.domain(levc));
            let mut new_bx = clusters.box_list();
            new_bx.refine(bf);
            new_bx.simplify();
            if !new_bx.is_disjoint() {
                return Err(AmrError::NonDisjointLayout { level: levf });
            }
            let mut cap = IntVect::zero();
            for d in 0..SPACE_DIM {
                cap[d] = self.config.max_grid_size_at(levf) as i64 / self.ref_ratio[levc][d];
            }
            new_bx.max_size_vec(cap);
            new_bx.refine(self.ref_ratio[levc]);
            new_bx.sort();
            debug_assert!(new_bx.is_disjoint());
            new_grids[levf] = BoxArray::from_list(new_bx);
        }

        self.refine_grid_layout(lbase, new_finest, &mut new_grids);
        Ok((new_finest, new_grids))
    }

    /// Chop layouts into smaller patches when ranks outnumber patches, so
    /// every rank owns work. Bounded: the cap halves at most
    /// [`LAYOUT_REFINE_ROUNDS`] times.
    fn refine_grid_layout(&self, lbase: usize, new_finest: usize, grids: &mut [BoxArray]) {
        let nranks = self.comm.size();
        if nranks <= 1 || !self.config.refine_grid_layout {
            return;
        }
        for round in 0..LAYOUT_REFINE_ROUNDS {
            for lev in lbase..=new_finest {
                let base_cap = self.config.max_grid_size_at(lev) >> round;
                let mut chunk = IntVect::splat(base_cap as i64);
                for d in 0..SPACE_DIM {
                    chunk[d] /= 2;
                    let aligned = chunk[d] > 0
                        && chunk[d] % self.config.blocking_factor_at(lev) as i64 == 0;
                    if grids[lev].len() < nranks && !grids[lev].is_empty() && aligned {
                        grids[lev] = grids[lev].max_size_vec(chunk);
                    }
                }
            }
        }
    }

    // --- regridding ---

    /// Recompute layouts for levels above `lbase` and rebuild the level
    /// stack to match. `initial` marks the startup iteration, where levels
    /// are cold-initialized instead of interpolated.
    pub fn regrid(&mut self, lbase: usize, time: f64, initial: bool) -> Result<(), AmrError> {
        self.runlog
            .record(&format!("REGRID: at level lbase = {lbase}"));

        if self.finest_level == self.max_level {
            self.levels[self.finest_level].remove_old_data();
        }

        let (new_finest, new_grids) = self.grid_places(lbase, time)?;
        debug_assert!(new_finest <= self.finest_level + 1);

        let regrid_level_zero =
            lbase == 0 && new_grids[0] != *self.levels[0].box_array();
        let start = if regrid_level_zero { 0 } else { lbase + 1 };

        for lev in start..=self.finest_level {
            self.levels[lev].remove_old_data();
        }
        // Levels above the new finest are gone; dropping them releases
        // their distributed data ownership.
        self.levels.truncate(new_finest + 1);
        self.finest_level = new_finest;

        if lbase == 0 {
            // Every cached ownership map and communication pattern is keyed
            // by a layout that may now be stale.
            if regrid_level_zero {
                self.dist_cache.flush();
            } else {
                let dm0 = self.levels[0].distribution().clone();
                self.dist_cache.flush();
                self.dist_cache.seed(self.levels[0].box_array(), dm0);
            }
        }

        for lev in start..=new_finest {
            let ba = new_grids[lev].clone();
            let mut level = self
                .factory
                .build(lev, &self.geom[lev], ba, self.cum_time);
            self.assign_distribution(&mut level);

            if initial {
                // Startup iteration: insert first, then cold-init; the init
                // may read neighbors through the hierarchy.
                if lev < self.levels.len() {
                    self.levels[lev] = level;
                } else {
                    self.levels.push(level);
                }
                let (below, cur) = self.levels.split_at_mut(lev);
                cur[0].init_data(below);
            } else if lev < self.levels.len() {
                // Rebuild in place: the old level stays reachable while the
                // new one interpolates from it.
                level.init_from_old(&self.levels[lev]);
                self.levels[lev] = level;
            } else {
                // Newly created level: the parent is all there is.
                level.init_from_coarse(&self.levels[lev - 1]);
                self.levels.push(level);
            }
        }

        for lev in 0..=new_finest {
            self.levels[lev].post_regrid(lbase, new_finest);
        }

        let summary = self.grid_summary(start, self.finest_level);
        self.runlog.record(&format!(
            "TIME = {time} : REGRID with lbase = {lbase}\n{summary}"
        ));
        Ok(())
    }

    /// Regrid every level without advancing; restart workflows use this to
    /// apply new gridding parameters to an old checkpoint.
    pub fn regrid_only(&mut self, time: f64) -> Result<(), AmrError> {
        debug_assert!(self.regrid_on_restart);
        if self.max_level > 0 {
            let lev_top = self.finest_level.min(self.max_level - 1);
            for lbase in 0..=lev_top {
                self.regrid(lbase, time, false)?;
            }
        }
        if self.plotfile_on_restart {
            self.write_plot_file()?;
        }
        if self.config.checkpoint_on_restart {
            self.checkpoint()?;
        }
        Ok(())
    }

    // --- time stepping ---

    /// One coarse step: recompute dt, recursively advance the whole
    /// hierarchy, then handle output cadence.
    pub fn coarse_time_step(&mut self, stop_time: f64) -> Result<(), AmrError> {
        if self.level_steps[0] > 0 {
            self.levels[0].compute_new_dt(
                self.finest_level,
                self.config.sub_cycle,
                &self.n_cycle,
                &self.ref_ratio,
                &self.dt_min,
                &mut self.dt_level,
                stop_time,
                false,
            );
        }
        self.time_step(0, self.cum_time, 1, 1, stop_time)?;
        self.cum_time += self.dt_level[0];
        self.levels[0].post_coarse_timestep(self.cum_time);

        self.runlog.record(&format!(
            "STEP = {} TIME = {} DT = {}",
            self.level_steps[0], self.cum_time, self.dt_level[0]
        ));

        let do_check = match (self.config.check_int, self.config.check_per) {
            (Some(n), _) => n > 0 && self.level_steps[0] % n == 0,
            (None, Some(per)) => period_crossed(self.cum_time, self.dt_level[0], per),
            (None, None) => false,
        };
        if do_check {
            self.checkpoint()?;
        }
        let do_plot = match (self.config.plot_int, self.config.plot_per) {
            (Some(n), _) => n > 0 && self.level_steps[0] % n == 0,
            (None, Some(per)) => period_crossed(self.cum_time, self.dt_level[0], per),
            (None, None) => false,
        };
        if do_plot {
            self.write_plot_file()?;
        }
        Ok(())
    }

    fn time_step(
        &mut self,
        level: usize,
        time: f64,
        iteration: usize,
        niter: usize,
        stop_time: f64,
    ) -> Result<(), AmrError> {
        if self.finest_level == 0 && self.regrid_on_restart {
            // One-shot top-level-only regrid after restart: rebuild level 0
            // on the recomputed even-extent layout.
            self.regrid_on_restart = false;
            let lev0 = self.base_layout();
            let mut level0 =
                self.factory
                    .build(0, &self.geom[0], lev0, self.cum_time);
            self.assign_distribution(&mut level0);
            level0.init_from_old(&self.levels[0]);
            self.levels[0] = level0;
            let summary = self.grid_summary(0, 0);
            self.runlog.record(&summary);
        } else if self.max_level > 0 {
            let mut lev_top = self.finest_level.min(self.max_level - 1);
            let mut i = level;
            while i <= lev_top {
                let old_finest = self.finest_level;
                let interval = self.config.regrid_int_at(i);
                if interval > 0
                    && self.level_count[i] >= interval
                    && self.levels[i].ok_to_regrid()
                {
                    self.regrid(i, time, false)?;

                    if self.config.compute_new_dt_on_regrid && i == 0 {
                        self.levels[0].compute_new_dt(
                            self.finest_level,
                            self.config.sub_cycle,
                            &self.n_cycle,
                            &self.ref_ratio,
                            &self.dt_min,
                            &mut self.dt_level,
                            stop_time,
                            true,
                        );
                    }
                    for k in i..=self.finest_level {
                        self.level_count[k] = 0;
                    }
                    if old_finest < self.finest_level {
                        // New levels have no valid dt or subcycle count
                        // yet; seed them from their parents.
                        for k in old_finest + 1..=self.finest_level {
                            let fact = if self.config.sub_cycle {
                                self.max_ref_ratio(k - 1) as usize
                            } else {
                                1
                            };
                            self.dt_level[k] = self.dt_level[k - 1] / fact as f64;
                            self.n_cycle[k] = fact;
                        }
                    }
                }
                if old_finest > self.finest_level {
                    lev_top = self.finest_level.min(self.max_level - 1);
                }
                i += 1;
            }
        }

        if self.plotfile_on_restart && self.restarted_from.is_some() {
            self.plotfile_on_restart = false;
            self.write_plot_file()?;
        }

        let dt = self.dt_level[level];
        log::debug!("ADVANCE grids at level {level} with dt = {dt}");
        let dt_new = self.levels[level].advance(time, dt, iteration, niter);
        self.dt_min[level] = if iteration == 1 {
            dt_new
        } else {
            self.dt_min[level].min(dt_new)
        };
        self.level_steps[level] += 1;
        self.level_count[level] += 1;
        log::debug!(
            "Advanced {} cells at level {level}",
            self.levels[level].count_cells()
        );

        if level < self.finest_level {
            let lev_fine = level + 1;
            if self.config.sub_cycle {
                let ncycle = self.n_cycle[lev_fine];
                let dt_fine = self.dt_level[lev_fine];
                for i in 1..=ncycle {
                    self.time_step(
                        lev_fine,
                        time + (i - 1) as f64 * dt_fine,
                        i,
                        ncycle,
                        stop_time,
                    )?;
                }
            } else {
                self.time_step(lev_fine, time, 1, 1, stop_time)?;
            }
        }

        self.levels[level].post_timestep(iteration);
        Ok(())
    }

    // --- checkpoint / restart ---

    fn header_scalars(&self) -> HeaderScalars {
        HeaderScalars {
            cum_time: self.cum_time,
            max_level: self.max_level,
            finest_level: self.finest_level,
            geom: self.geom.clone(),
            ref_ratio: self.ref_ratio.clone(),
            dt_level: self.dt_level.clone(),
            dt_min: self.dt_min.clone(),
            n_cycle: self.n_cycle.clone(),
            level_steps: self.level_steps.clone(),
            level_count: self.level_count.clone(),
        }
    }

    /// Write a checkpoint directory for the current state. The I/O rank
    /// creates the directory and writes the header; every rank participates
    /// in the per-level field writes.
    pub fn checkpoint(&mut self) -> Result<(), AmrError> {
        let name = checkpoint::output_dir_name(
            &self.config.check_file_root,
            self.level_steps[0],
            self.config.file_name_digits,
        );
        let ckdir = PathBuf::from(&name);
        self.runlog.record(&format!("CHECKPOINT: file = {name}"));

        if self.comm.is_io_rank() {
            fs::create_dir_all(&ckdir).map_err(|e| AmrError::io(name.clone(), e))?;
        }
        self.comm.barrier();

        let header_path = ckdir.join("Header");
        let mut w: Box<dyn Write> = if self.comm.is_io_rank() {
            let f = fs::File::create(&header_path)
                .map_err(|e| AmrError::io(header_path.display().to_string(), e))?;
            Box::new(BufWriter::new(f))
        } else {
            Box::new(io::sink())
        };

        checkpoint::write_scalars(&mut w, &self.header_scalars())?;
        for lev in 0..=self.finest_level {
            let comm = Arc::clone(&self.comm);
            self.levels[lev].checkpoint(&ckdir, &mut w, comm.as_ref())?;
        }
        w.flush()
            .map_err(|e| AmrError::io(header_path.display().to_string(), e))?;
        drop(w);
        self.comm.barrier();

        self.last_checkpoint = self.level_steps[0];
        Ok(())
    }

    /// Restore the hierarchy from a checkpoint directory, adapting it to
    /// this run's configured max level.
    pub fn restart(&mut self, ckdir: &Path) -> Result<(), AmrError> {
        self.runlog
            .record(&format!("RESTART from file = {}", ckdir.display()));

        let header_path = ckdir.join("Header");
        let mut buf = if self.comm.is_io_rank() {
            fs::read(&header_path)
                .map_err(|e| AmrError::io(header_path.display().to_string(), e))?
        } else {
            Vec::new()
        };
        self.comm.broadcast_bytes(0, &mut buf);
        let text = String::from_utf8(buf)
            .map_err(|_| AmrError::header("header is not valid UTF-8"))?;

        let (header, mut tokens) = checkpoint::read_scalars(
            &text,
            self.max_level,
            self.config.sub_cycle,
            &self.ref_ratio,
        )?;
        let s = header.scalars;
        self.cum_time = s.cum_time;
        self.finest_level = s.finest_level;
        self.geom = s.geom;
        self.ref_ratio = s.ref_ratio;
        self.dt_level = s.dt_level;
        self.dt_min = s.dt_min;
        self.n_cycle = s.n_cycle;
        self.level_steps = s.level_steps;
        self.level_count = s.level_count;

        if self.config.regrid_on_restart && self.max_level > 0 {
            self.level_count[0] = self.config.regrid_int_at(0);
        }
        self.config.validate(self.geom[0].domain())?;

        self.levels.clear();
        for lev in 0..=self.finest_level {
            let mut level = self
                .factory
                .restore(lev, &self.geom[lev], ckdir, &mut tokens)?;
            self.assign_distribution(&mut level);
            self.levels.push(level);
        }
        for lev in 0..=self.finest_level {
            self.levels[lev].post_restart();
        }
        self.restarted_from = Some(ckdir.to_path_buf());
        self.last_checkpoint = self.level_steps[0];
        Ok(())
    }

    // --- plot output ---

    /// Write a plot directory for the current state.
    pub fn write_plot_file(&mut self) -> Result<(), AmrError> {
        let name = checkpoint::output_dir_name(
            &self.config.plot_file_root,
            self.level_steps[0],
            self.config.file_name_digits,
        );
        let dir = PathBuf::from(&name);
        self.runlog.record(&format!("PLOTFILE: file = {name}"));

        if self.comm.is_io_rank() {
            fs::create_dir_all(&dir).map_err(|e| AmrError::io(name.clone(), e))?;
        }
        self.comm.barrier();

        let header_path = dir.join("Header");
        let mut w: Box<dyn Write> = if self.comm.is_io_rank() {
            let f = fs::File::create(&header_path)
                .map_err(|e| AmrError::io(header_path.display().to_string(), e))?;
            Box::new(BufWriter::new(f))
        } else {
            Box::new(io::sink())
        };
        write_plot_header(
            &mut w,
            &self.plot_vars,
            self.cum_time,
            self.finest_level,
            &self.geom,
        )?;
        for lev in 0..=self.finest_level {
            let comm = Arc::clone(&self.comm);
            self.levels[lev].write_plot_data(&dir, &mut w, comm.as_ref())?;
        }
        w.flush()
            .map_err(|e| AmrError::io(header_path.display().to_string(), e))?;
        drop(w);
        self.comm.barrier();

        self.last_plotfile = self.level_steps[0];
        Ok(())
    }

    /// Flush unwritten output before teardown: a final checkpoint and plot
    /// file if output is configured and the last step wasn't captured.
    pub fn finalize(&mut self) -> Result<(), AmrError> {
        let check_configured =
            self.config.check_int.is_some() || self.config.check_per.is_some();
        if check_configured && self.level_steps[0] > self.last_checkpoint {
            self.checkpoint()?;
        }
        let plot_configured =
            self.config.plot_int.is_some() || self.config.plot_per.is_some();
        if plot_configured && self.level_steps[0] > self.last_plotfile {
            self.write_plot_file()?;
        }
        self.runlog.flush()
    }

    // --- diagnostics ---

    /// Per-level grid counts, cell counts, and domain coverage, one line
    /// per level plus one per patch.
    pub fn grid_summary(&self, min_lev: usize, max_lev: usize) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        for lev in min_lev..=max_lev.min(self.finest_level) {
            let ba = self.levels[lev].box_array();
            let ncells = self.levels[lev].count_cells();
            let ntot = self.geom[lev].domain().num_pts();
            let frac = 100.0 * ncells as f64 / ntot as f64;
            let _ = writeln!(
                out,
                "  Level {lev}   {} grids  {ncells} cells  {frac:.4} % of domain",
                ba.len()
            );
            let dm = self.levels[lev].distribution();
            for (k, b) in ba.iter().enumerate() {
                let owner = if k < dm.len() { dm.owner(k) } else { 0 };
                let _ = writeln!(out, " {lev}: {b} :: {owner}");
            }
        }
        out
    }
}
