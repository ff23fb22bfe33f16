//! Index-space geometry: integer vectors, boxes, box collections, finalized
//! layouts, and per-level domain descriptors.

pub mod box_array;
pub mod box_list;
pub mod bx;
pub mod geometry;
pub mod index;

pub use box_array::BoxArray;
pub use box_list::{box_diff, BoxList};
pub use bx::{AmrBox, IndexType};
pub use geometry::Geometry;
pub use index::{IntVect, SPACE_DIM};
