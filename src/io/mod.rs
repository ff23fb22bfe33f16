//! Text codecs: checkpoint headers, manual grid files, plot headers.

pub mod checkpoint;
pub mod grids_file;
pub mod plot;
pub mod token;
