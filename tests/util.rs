#![allow(dead_code)]
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use block_amr::amr_error::AmrError;
use block_amr::comm::Communicator;
use block_amr::io::token::Tokens;
use block_amr::prelude::*;

/// One advance call as recorded by [`BlobLevel`].
#[derive(Clone, Debug, PartialEq)]
pub struct AdvanceRec {
    pub level: usize,
    pub time: f64,
    pub dt: f64,
    pub iteration: usize,
    pub ncycle: usize,
}

pub type AdvanceLog = Arc<Mutex<Vec<AdvanceRec>>>;
/// `(level, path)` where path is one of "cold", "from_old", "from_coarse".
pub type InitLog = Arc<Mutex<Vec<(usize, &'static str)>>>;

/// Test physics: tags fixed regions (specified at base-level resolution) and
/// records every advance and init-path call for assertions.
pub struct BlobLevel {
    level: usize,
    geom: Geometry,
    grids: BoxArray,
    dm: DistributionMapping,
    time: f64,
    /// Cumulative refinement from level 0 to this level.
    scale: IntVect,
    tag_boxes: Arc<Mutex<Vec<AmrBox>>>,
    dt0: f64,
    advances: AdvanceLog,
    inits: InitLog,
}

impl AmrLevel for BlobLevel {
    fn level(&self) -> usize {
        self.level
    }

    fn geometry(&self) -> &Geometry {
        &self.geom
    }

    fn box_array(&self) -> &BoxArray {
        &self.grids
    }

    fn set_distribution(&mut self, dm: DistributionMapping) {
        self.dm = dm;
    }

    fn distribution(&self) -> &DistributionMapping {
        &self.dm
    }

    fn error_est(&mut self, tags: &mut TagArray, _time: f64, _n_error_buf: usize, _ngrow: usize) {
        for b in self.tag_boxes.lock().unwrap().iter() {
            tags.set_val_box(&b.refine(self.scale), TagVal::Set);
        }
    }

    fn init_data(&mut self, _coarser: &[Self]) {
        self.inits.lock().unwrap().push((self.level, "cold"));
    }

    fn init_from_old(&mut self, old: &Self) {
        assert_eq!(old.level, self.level);
        self.inits.lock().unwrap().push((self.level, "from_old"));
    }

    fn init_from_coarse(&mut self, coarse: &Self) {
        assert_eq!(coarse.level + 1, self.level);
        self.inits.lock().unwrap().push((self.level, "from_coarse"));
    }

    fn compute_initial_dt(
        &self,
        finest_level: usize,
        sub_cycle: bool,
        _n_cycle: &[usize],
        ref_ratio: &[IntVect],
        dt_level: &mut [f64],
        _stop_time: f64,
    ) {
        dt_level[0] = self.dt0;
        for l in 1..=finest_level {
            let fact = if sub_cycle {
                ref_ratio[l - 1].max_component() as f64
            } else {
                1.0
            };
            dt_level[l] = dt_level[l - 1] / fact;
        }
    }

    fn compute_new_dt(
        &self,
        _finest_level: usize,
        _sub_cycle: bool,
        _n_cycle: &[usize],
        _ref_ratio: &[IntVect],
        _dt_min: &[f64],
        _dt_level: &mut [f64],
        _stop_time: f64,
        _post_regrid: bool,
    ) {
        // Fixed-dt physics: the initial vector stays valid.
    }

    fn advance(&mut self, time: f64, dt: f64, iteration: usize, ncycle: usize) -> f64 {
        self.advances.lock().unwrap().push(AdvanceRec {
            level: self.level,
            time,
            dt,
            iteration,
            ncycle,
        });
        self.time = time + dt;
        dt
    }

    fn set_time_level(&mut self, time: f64, _dt_new: f64, _dt_old: f64) {
        self.time = time;
    }

    fn checkpoint(
        &mut self,
        _ckdir: &Path,
        header: &mut dyn Write,
        _comm: &dyn Communicator,
    ) -> Result<(), AmrError> {
        let wrap = |e: std::io::Error| AmrError::io("level record", e);
        writeln!(header, "{} {} {}", self.level, self.time, self.grids.len()).map_err(wrap)?;
        for b in self.grids.iter() {
            writeln!(header, "{b}").map_err(wrap)?;
        }
        Ok(())
    }
}

/// Shared-state factory producing [`BlobLevel`]s. The tag region is behind a
/// mutex so tests can move it between regrids.
pub struct BlobFactory {
    pub tag_boxes: Arc<Mutex<Vec<AmrBox>>>,
    pub ref_ratio: Vec<IntVect>,
    pub dt0: f64,
    pub advances: AdvanceLog,
    pub inits: InitLog,
}

impl BlobFactory {
    /// Factory tagging `tag_boxes` (base-level resolution), ratio 2 per level.
    pub fn new(tag_boxes: Vec<AmrBox>) -> Self {
        BlobFactory {
            tag_boxes: Arc::new(Mutex::new(tag_boxes)),
            ref_ratio: vec![IntVect::splat(2); 8],
            dt0: 0.5,
            advances: Arc::new(Mutex::new(Vec::new())),
            inits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn scale(&self, lev: usize) -> IntVect {
        let mut s = IntVect::unit();
        for r in self.ref_ratio.iter().take(lev) {
            for d in 0..SPACE_DIM {
                s[d] *= r[d];
            }
        }
        s
    }
}

impl LevelFactory for BlobFactory {
    type Level = BlobLevel;

    fn build(&self, lev: usize, geom: &Geometry, grids: BoxArray, time: f64) -> BlobLevel {
        BlobLevel {
            level: lev,
            geom: geom.clone(),
            grids,
            dm: DistributionMapping::new(Vec::new()),
            time,
            scale: self.scale(lev),
            tag_boxes: Arc::clone(&self.tag_boxes),
            dt0: self.dt0,
            advances: Arc::clone(&self.advances),
            inits: Arc::clone(&self.inits),
        }
    }

    fn restore(
        &self,
        lev: usize,
        geom: &Geometry,
        _ckdir: &Path,
        header: &mut Tokens,
    ) -> Result<BlobLevel, AmrError> {
        let lev_read: usize = header.next("level index")?;
        if lev_read != lev {
            return Err(AmrError::header(format!(
                "level record {lev_read} where {lev} expected"
            )));
        }
        let time: f64 = header.next("level time")?;
        let ngrids: usize = header.next("grid count")?;
        let mut boxes = Vec::with_capacity(ngrids);
        for _ in 0..ngrids {
            boxes.push(header.next_balanced()?.parse()?);
        }
        Ok(self.build(lev, geom, BoxArray::from_boxes(boxes), time))
    }
}

/// Serial communicator that claims `size` ranks; placement tests use it to
/// exercise the rank-count-driven layout splitting without spawning threads.
#[derive(Clone, Debug)]
pub struct WideComm(pub usize);

impl Communicator for WideComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        self.0
    }
    fn barrier(&self) {}
    fn broadcast_bytes(&self, _root: usize, _buf: &mut Vec<u8>) {}
    fn reduce_max_f64(&self, v: f64) -> f64 {
        v
    }
    fn reduce_min_f64(&self, v: f64) -> f64 {
        v
    }
    fn reduce_max_u64(&self, v: u64) -> u64 {
        v
    }
    fn reduce_sum_u64(&self, v: u64) -> u64 {
        v
    }
}

/// 64^3 cell-centered base domain over the unit cube, no periodicity.
pub fn base_geom_64() -> Geometry {
    Geometry::new(
        AmrBox::new(IntVect::zero(), IntVect::splat(63)),
        [0.0; 3],
        [1.0; 3],
        [false; 3],
    )
}

/// Standard test configuration: blocking factor 8, max grid size 32,
/// efficiency 0.7, with all output routed under `tmp`.
pub fn test_config(max_level: usize, tmp: &Path) -> AmrConfig {
    let mut c = AmrConfig::with_max_level(max_level);
    c.blocking_factor = vec![8];
    c.max_grid_size = vec![32];
    c.n_error_buf = vec![1];
    c.grid_eff = 0.7;
    c.n_proper = 1;
    c.regrid_int = vec![2];
    c.check_file_root = tmp.join("chk").display().to_string();
    c.plot_file_root = tmp.join("plt").display().to_string();
    c
}

pub fn bx(lo: [i64; 3], hi: [i64; 3]) -> AmrBox {
    AmrBox::new(IntVect(lo), IntVect(hi))
}
