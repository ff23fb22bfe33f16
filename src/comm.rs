//! Thin façade over the process-collective primitives the hierarchy needs.
//!
//! The control flow in this crate is SPMD: every rank executes the same
//! statements in lockstep, and the only cross-rank traffic is barriers,
//! broadcasts, and small reductions around I/O and diagnostics. Real
//! transports (MPI) live outside the crate; what ships here is the serial
//! [`NoComm`] and an intra-process [`ThreadComm`] whose ranks are threads
//! sharing a mailbox — enough to exercise every collective path in tests.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Barrier};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Collective communication interface (minimal by design).
///
/// Reductions have allreduce semantics: every rank receives the result.
/// Calls are synchronization points; all ranks must reach them in the same
/// order.
pub trait Communicator: Send + Sync + 'static {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank arrives.
    fn barrier(&self);

    /// Replace `buf` on every rank with root's bytes.
    fn broadcast_bytes(&self, root: usize, buf: &mut Vec<u8>);

    fn reduce_max_f64(&self, v: f64) -> f64;
    fn reduce_min_f64(&self, v: f64) -> f64;
    fn reduce_max_u64(&self, v: u64) -> u64;
    fn reduce_sum_u64(&self, v: u64) -> u64;

    /// The single rank that performs serial I/O (directory creation,
    /// header writes, run-log output).
    fn is_io_rank(&self) -> bool {
        self.rank() == 0
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
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

// --- ThreadComm: intra-process ranks sharing a mailbox ---

type Key = (u64, u64, usize); // (group, op generation, source rank)

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);
static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

struct Group {
    id: u64,
    size: usize,
    barrier: Barrier,
}

/// One rank of an intra-process communicator group. Ranks run on separate
/// threads; the SPMD lockstep discipline means each rank's private op
/// counter stays in step with its peers.
pub struct ThreadComm {
    rank: usize,
    ops: AtomicU64,
    group: Arc<Group>,
}

impl ThreadComm {
    /// Create a group of `size` ranks; hand one to each worker thread.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0);
        let group = Arc::new(Group {
            id: NEXT_GROUP.fetch_add(1, Relaxed),
            size,
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                ops: AtomicU64::new(0),
                group: Arc::clone(&group),
            })
            .collect()
    }

    fn next_gen(&self) -> u64 {
        self.ops.fetch_add(1, Relaxed)
    }

    /// Post this rank's payload, wait for all, and fold every rank's bytes.
    fn all_gather_fold<T>(&self, payload: &[u8], mut fold: impl FnMut(usize, &[u8]) -> T) -> Vec<T> {
        let gen = self.next_gen();
        let gid = self.group.id;
        MAILBOX.insert((gid, gen, self.rank), Bytes::copy_from_slice(payload));
        self.group.barrier.wait();
        let out = (0..self.group.size)
            .map(|r| {
                let v = MAILBOX
                    .get(&(gid, gen, r))
                    .expect("lockstep violated: missing mailbox slot");
                fold(r, &v)
            })
            .collect();
        self.group.barrier.wait();
        MAILBOX.remove(&(gid, gen, self.rank));
        out
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn barrier(&self) {
        self.next_gen();
        self.group.barrier.wait();
    }

    fn broadcast_bytes(&self, root: usize, buf: &mut Vec<u8>) {
        let gen = self.next_gen();
        let gid = self.group.id;
        if self.rank == root {
            MAILBOX.insert((gid, gen, root), Bytes::copy_from_slice(buf));
        }
        self.group.barrier.wait();
        {
            let v = MAILBOX
                .get(&(gid, gen, root))
                .expect("lockstep violated: missing broadcast slot");
            buf.clear();
            buf.extend_from_slice(&v);
        }
        self.group.barrier.wait();
        if self.rank == root {
            MAILBOX.remove(&(gid, gen, root));
        }
    }

    fn reduce_max_f64(&self, v: f64) -> f64 {
        self.all_gather_fold(&v.to_le_bytes(), |_, b| {
            f64::from_le_bytes(b.try_into().expect("f64 payload"))
        })
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max)
    }

    fn reduce_min_f64(&self, v: f64) -> f64 {
        self.all_gather_fold(&v.to_le_bytes(), |_, b| {
            f64::from_le_bytes(b.try_into().expect("f64 payload"))
        })
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    fn reduce_max_u64(&self, v: u64) -> u64 {
        self.all_gather_fold(&v.to_le_bytes(), |_, b| {
            u64::from_le_bytes(b.try_into().expect("u64 payload"))
        })
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    fn reduce_sum_u64(&self, v: u64) -> u64 {
        self.all_gather_fold(&v.to_le_bytes(), |_, b| {
            u64::from_le_bytes(b.try_into().expect("u64 payload"))
        })
        .into_iter()
        .sum()
    }
}
