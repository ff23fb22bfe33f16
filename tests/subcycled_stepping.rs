mod util;

use std::sync::Arc;

use block_amr::comm::NoComm;
use block_amr::prelude::*;
use util::{base_geom_64, bx, test_config, AdvanceRec, BlobFactory};

fn stepping_amr(
    sub_cycle: bool,
    regrid_int: usize,
    tmp: &std::path::Path,
) -> (Amr<BlobFactory>, util::AdvanceLog) {
    let factory = BlobFactory::new(vec![bx([28, 28, 28], [35, 35, 35])]);
    let advances = Arc::clone(&factory.advances);
    let mut config = test_config(1, tmp);
    config.sub_cycle = sub_cycle;
    config.regrid_int = vec![regrid_int];
    let mut amr = Amr::new(config, base_geom_64(), factory, Arc::new(NoComm)).unwrap();
    amr.init(0.0, 100.0).unwrap();
    advances.lock().unwrap().clear();
    (amr, advances)
}

/// With ratio 2 and subcycling on, the fine level advances exactly twice per
/// coarse advance, at offsets `{0, dt_fine}` summing to the coarse dt.
#[test]
fn subcycling_advances_fine_level_ratio_times() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut amr, advances) = stepping_amr(true, 100, tmp.path());
    assert_eq!(amr.finest_level(), 1);
    assert_eq!(amr.n_cycle(1), 2);

    amr.coarse_time_step(100.0).unwrap();

    let log = advances.lock().unwrap();
    let dt0 = amr.dt_level(0);
    let dt1 = amr.dt_level(1);
    assert_eq!(dt1, dt0 / 2.0);
    assert_eq!(
        *log,
        vec![
            AdvanceRec { level: 0, time: 0.0, dt: dt0, iteration: 1, ncycle: 1 },
            AdvanceRec { level: 1, time: 0.0, dt: dt1, iteration: 1, ncycle: 2 },
            AdvanceRec { level: 1, time: dt1, dt: dt1, iteration: 2, ncycle: 2 },
        ]
    );
    // The two fine steps tile the coarse step exactly.
    assert_eq!(dt1 + dt1, dt0);
    assert_eq!(amr.level_steps(0), 1);
    assert_eq!(amr.level_steps(1), 2);
    assert_eq!(amr.cum_time(), dt0);
}

/// Subcycling off: one fine advance per coarse advance, same time, same dt.
#[test]
fn lockstep_advances_fine_level_once() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut amr, advances) = stepping_amr(false, 100, tmp.path());
    assert_eq!(amr.n_cycle(1), 1);

    amr.coarse_time_step(100.0).unwrap();

    let log = advances.lock().unwrap();
    let dt0 = amr.dt_level(0);
    assert_eq!(amr.dt_level(1), dt0);
    assert_eq!(
        *log,
        vec![
            AdvanceRec { level: 0, time: 0.0, dt: dt0, iteration: 1, ncycle: 1 },
            AdvanceRec { level: 1, time: 0.0, dt: dt0, iteration: 1, ncycle: 1 },
        ]
    );
}

/// The regrid countdown fires on the configured interval and resets for the
/// regridded level and everything finer.
#[test]
fn regrid_interval_drives_the_countdown() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut amr, _advances) = stepping_amr(true, 2, tmp.path());

    amr.coarse_time_step(100.0).unwrap();
    assert_eq!(amr.level_count(0), 1);
    amr.coarse_time_step(100.0).unwrap();
    assert_eq!(amr.level_count(0), 2);

    // The third coarse step reaches the interval, regrids at the top of the
    // step (resetting the countdown), then counts itself.
    amr.coarse_time_step(100.0).unwrap();
    assert_eq!(amr.level_count(0), 1);
    assert_eq!(amr.level_count(1), 2);
    assert_eq!(amr.finest_level(), 1);
}

/// dt_min tracks the minimum stable dt over a level's subcycle iterations
/// and seeds the next coarse step's dt computation.
#[test]
fn dt_min_is_minimum_over_subcycles() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut amr, _advances) = stepping_amr(true, 100, tmp.path());
    amr.coarse_time_step(100.0).unwrap();
    // The mock returns its dt as the stable estimate, so the recorded
    // minimum equals the level dt.
    assert_eq!(amr.dt_min(0), amr.dt_level(0));
    assert_eq!(amr.dt_min(1), amr.dt_level(1));
}

/// Multi-step run bookkeeping: cumulative time advances by the coarse dt per
/// step, fine steps stay at ratio times the coarse count, and every level
/// still reports continuation.
#[test]
fn multi_step_bookkeeping_stays_consistent() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut amr, advances) = stepping_amr(true, 100, tmp.path());
    let dt0 = amr.dt_level(0);
    for _ in 0..4 {
        amr.coarse_time_step(100.0).unwrap();
    }
    assert_eq!(amr.level_steps(0), 4);
    assert_eq!(amr.level_steps(1), 8);
    assert!((amr.cum_time() - 4.0 * dt0).abs() < 1e-14);
    assert!(amr.ok_to_continue());

    // Fine-level advance times tile each coarse interval in order.
    let log = advances.lock().unwrap();
    let fine_times: Vec<f64> = log
        .iter()
        .filter(|r| r.level == 1)
        .map(|r| r.time)
        .collect();
    let dt1 = dt0 / 2.0;
    let expect: Vec<f64> = (0..8).map(|i| i as f64 * dt1).collect();
    for (got, want) in fine_times.iter().zip(&expect) {
        assert!((got - want).abs() < 1e-12, "fine time {got} != {want}");
    }
}
