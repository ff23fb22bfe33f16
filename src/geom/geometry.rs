//! `Geometry`: per-level description of the index-space domain, its
//! periodicity, and the physical extents it spans.
//!
//! Geometries are immutable once built. Finer levels derive theirs from the
//! base geometry by [`refine`](Geometry::refine); the physical extents never
//! change, only the index resolution.

use std::fmt;
use std::str::FromStr;

use crate::amr_error::AmrError;
use crate::geom::bx::AmrBox;
use crate::geom::index::{IntVect, SPACE_DIM};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Geometry {
    domain: AmrBox,
    prob_lo: [f64; SPACE_DIM],
    prob_hi: [f64; SPACE_DIM],
    periodic: [bool; SPACE_DIM],
}

impl Geometry {
    pub fn new(
        domain: AmrBox,
        prob_lo: [f64; SPACE_DIM],
        prob_hi: [f64; SPACE_DIM],
        periodic: [bool; SPACE_DIM],
    ) -> Self {
        Geometry {
            domain,
            prob_lo,
            prob_hi,
            periodic,
        }
    }

    /// Unit physical extents, no periodicity; convenient for tests and
    /// index-space-only callers.
    pub fn new_index_space(domain: AmrBox) -> Self {
        Geometry {
            domain,
            prob_lo: [0.0; SPACE_DIM],
            prob_hi: [1.0; SPACE_DIM],
            periodic: [false; SPACE_DIM],
        }
    }

    #[inline]
    pub fn domain(&self) -> &AmrBox {
        &self.domain
    }

    #[inline]
    pub fn prob_lo(&self) -> &[f64; SPACE_DIM] {
        &self.prob_lo
    }

    #[inline]
    pub fn prob_hi(&self) -> &[f64; SPACE_DIM] {
        &self.prob_hi
    }

    #[inline]
    pub fn is_periodic(&self, dir: usize) -> bool {
        self.periodic[dir]
    }

    #[inline]
    pub fn is_any_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }

    /// Domain extent along `dir`, the period for periodic shifts.
    #[inline]
    pub fn period(&self, dir: usize) -> i64 {
        self.domain.length(dir)
    }

    /// The same physical region at `ratio`-finer index resolution.
    pub fn refine(&self, ratio: IntVect) -> Geometry {
        Geometry {
            domain: self.domain.refine(ratio),
            ..self.clone()
        }
    }

    /// Same physical region, coarsened index resolution.
    pub fn coarsen(&self, ratio: IntVect) -> Geometry {
        Geometry {
            domain: self.domain.coarsen(ratio),
            ..self.clone()
        }
    }

    /// Geometry over a replacement index domain, carrying periodicity and
    /// physical extents through. Used for blocking-factor-coarsened domains
    /// during placement.
    pub fn with_domain(&self, domain: AmrBox) -> Geometry {
        Geometry {
            domain,
            ..self.clone()
        }
    }

    /// Mesh spacing per dimension.
    pub fn cell_size(&self) -> [f64; SPACE_DIM] {
        let mut dx = [0.0; SPACE_DIM];
        for d in 0..SPACE_DIM {
            dx[d] = (self.prob_hi[d] - self.prob_lo[d]) / self.domain.length(d) as f64;
        }
        dx
    }
}

/// One-line whitespace-delimited form used in checkpoint headers:
/// `((lo) (hi) (t)) plo.. phi.. per..`.
impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.domain)?;
        for v in &self.prob_lo {
            write!(f, " {:.15e}", v)?;
        }
        for v in &self.prob_hi {
            write!(f, " {:.15e}", v)?;
        }
        for p in &self.periodic {
            write!(f, " {}", *p as u8)?;
        }
        Ok(())
    }
}

impl FromStr for Geometry {
    type Err = AmrError;

    fn from_str(s: &str) -> Result<Self, AmrError> {
        let s = s.trim();
        let close = s
            .rfind(')')
            .ok_or_else(|| AmrError::header(format!("geometry missing domain box: `{s}`")))?;
        let domain: AmrBox = s[..=close].parse()?;
        let mut rest = s[close + 1..].split_whitespace();
        let mut scal = |what: &str| -> Result<f64, AmrError> {
            rest.next()
                .ok_or_else(|| AmrError::header(format!("geometry missing {what}")))?
                .parse::<f64>()
                .map_err(|e| AmrError::header(format!("bad geometry {what}: {e}")))
        };
        let mut prob_lo = [0.0; SPACE_DIM];
        let mut prob_hi = [0.0; SPACE_DIM];
        for d in 0..SPACE_DIM {
            prob_lo[d] = scal("prob_lo")?;
        }
        for d in 0..SPACE_DIM {
            prob_hi[d] = scal("prob_hi")?;
        }
        let mut periodic = [false; SPACE_DIM];
        for d in 0..SPACE_DIM {
            periodic[d] = scal("periodicity")? != 0.0;
        }
        Ok(Geometry {
            domain,
            prob_lo,
            prob_hi,
            periodic,
        })
    }
}
