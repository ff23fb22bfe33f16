//! AmrError: Unified error type for block-amr public APIs
//!
//! This error type is used throughout the block-amr library to provide robust,
//! non-panicking error handling for all public APIs. Every fatal condition a
//! driver can hit — bad configuration, a non-disjoint layout, a malformed
//! checkpoint stream — is a typed variant here; batch drivers abort on the
//! returned error, the library itself never exits the process.

use crate::geom::bx::AmrBox;
use thiserror::Error;

/// Unified error type for block-amr operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmrError {
    /// `max_level` was never set (or is negative in a deserialized config).
    #[error("configuration error: max_level not set")]
    MaxLevelUnset,
    /// Blocking factors must be powers of two so tag coarsening is exact.
    #[error("configuration error: blocking_factor {value} at level {level} is not a power of 2")]
    BlockingFactorNotPow2 { level: usize, value: usize },
    /// Refinement ratios are constrained to `[2, 12]` per dimension.
    #[error("configuration error: refinement ratio {value} at level {level} outside [2,12]")]
    RefRatioOutOfRange { level: usize, value: i64 },
    /// The base domain extent must be a multiple of the base blocking factor.
    #[error("configuration error: domain length {len} (dim {dim}) not divisible by blocking_factor {bf}")]
    DomainNotDivisible { dim: usize, len: i64, bf: usize },
    /// The base domain must have an even cell count in every direction.
    #[error("configuration error: base domain has odd length {len} in dim {dim}")]
    OddBaseDomain { dim: usize, len: i64 },
    /// `max_grid_size` must be even (level-0 layouts are built at half resolution).
    #[error("configuration error: max_grid_size {value} at level {level} is not even")]
    MaxGridSizeOdd { level: usize, value: usize },
    /// `max_grid_size` must be a multiple of the blocking factor at its level.
    #[error("configuration error: max_grid_size {value} at level {level} not divisible by blocking_factor {bf}")]
    MaxGridSizeNotDivisible { level: usize, value: usize, bf: usize },
    /// A regrid interval is required whenever finer levels are allowed.
    #[error("configuration error: regrid interval not set while max_level > 0")]
    RegridIntervalUnset,
    /// Interval- and period-based cadence for the same output type conflict.
    #[error("configuration error: both step-interval and time-period cadence set for {output} output")]
    ConflictingCadence { output: &'static str },
    /// The level-0 index domain is empty or was never set.
    #[error("configuration error: level 0 domain bad or not set")]
    BadBaseDomain,
    /// A manually specified grid exceeds the patch-size cap. Fatal, not clipped.
    #[error("grid {bx} too large at level {level} (max long side {max})")]
    GridTooLarge {
        level: usize,
        bx: AmrBox,
        max: usize,
    },
    /// The clusterer produced overlapping patches. Always indicates a bug.
    #[error("non-disjoint box layout at level {level}")]
    NonDisjointLayout { level: usize },
    /// Checkpoint was written for a different spatial dimensionality.
    #[error("checkpoint dimension mismatch: file has {found}, build is {expected}")]
    DimensionMismatch { found: usize, expected: usize },
    /// Unexpected or unparsable token in a header or grid-file stream.
    #[error("malformed {source_kind} stream: {detail}")]
    HeaderParse {
        source_kind: &'static str,
        detail: String,
    },
    /// Filesystem failure, carried as text so the error stays `Clone + Eq`.
    #[error("I/O failure on {path}: {detail}")]
    Io { path: String, detail: String },
}

impl AmrError {
    /// Wrap an [`std::io::Error`] with the path that produced it.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        AmrError::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }

    /// Build a parse error for the checkpoint header stream.
    pub fn header(detail: impl Into<String>) -> Self {
        AmrError::HeaderParse {
            source_kind: "checkpoint header",
            detail: detail.into(),
        }
    }

    /// Build a parse error for a manual grid file.
    pub fn grids_file(detail: impl Into<String>) -> Self {
        AmrError::HeaderParse {
            source_kind: "grid file",
            detail: detail.into(),
        }
    }
}
