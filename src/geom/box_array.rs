//! `BoxArray`: a finalized, immutable patch layout.
//!
//! A level's published layout never mutates in place; a regrid replaces the
//! whole array. The structural [`layout_hash`](BoxArray::layout_hash) keys
//! derived-data caches (ownership maps, communication patterns) so they can
//! be reused across rebuilds that reproduce an identical layout and
//! invalidated explicitly otherwise.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::geom::bx::AmrBox;
use crate::geom::box_list::BoxList;
use crate::geom::index::IntVect;

/// Immutable, cheaply clonable sequence of patches.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BoxArray {
    boxes: Arc<Vec<AmrBox>>,
}

impl BoxArray {
    /// Finalize a list into a layout. Ordering is preserved; callers that
    /// need determinism sort the list first.
    pub fn from_list(bl: BoxList) -> Self {
        BoxArray {
            boxes: Arc::new(bl.into_iter().collect()),
        }
    }

    pub fn from_boxes(v: Vec<AmrBox>) -> Self {
        BoxArray {
            boxes: Arc::new(v),
        }
    }

    /// The empty layout.
    pub fn empty() -> Self {
        BoxArray {
            boxes: Arc::new(Vec::new()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> &AmrBox {
        &self.boxes[i]
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, AmrBox> {
        self.boxes.iter()
    }

    /// Total cells across all patches.
    pub fn num_pts(&self) -> u64 {
        self.boxes.iter().map(AmrBox::num_pts).sum()
    }

    /// Copy out as a mutable list.
    pub fn to_list(&self) -> BoxList {
        BoxList::from_vec(self.boxes.as_ref().clone())
    }

    /// Structural hash over corners and centering, stable across clones.
    /// Two layouts hash equal iff their box sequences are identical.
    pub fn layout_hash(&self) -> u64 {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        for b in self.boxes.iter() {
            b.lo().hash(&mut h);
            b.hi().hash(&mut h);
            b.btype().hash(&mut h);
        }
        self.boxes.len().hash(&mut h);
        h.finish()
    }

    /// True iff the union of this layout covers every box of `other`.
    pub fn contains_all(&self, other: &BoxList) -> bool {
        self.to_list().contains_all(other)
    }

    /// True iff no two patches overlap.
    pub fn is_disjoint(&self) -> bool {
        self.to_list().is_disjoint()
    }

    pub fn coarsen(&self, ratio: IntVect) -> BoxArray {
        let mut bl = self.to_list();
        bl.coarsen(ratio);
        BoxArray::from_list(bl)
    }

    pub fn refine(&self, ratio: IntVect) -> BoxArray {
        let mut bl = self.to_list();
        bl.refine(ratio);
        BoxArray::from_list(bl)
    }

    pub fn grow(&self, n: i64) -> BoxArray {
        let mut bl = self.to_list();
        bl.accrete(n);
        BoxArray::from_list(bl)
    }

    pub fn max_size(&self, cap: i64) -> BoxArray {
        let mut bl = self.to_list();
        bl.max_size(cap);
        BoxArray::from_list(bl)
    }

    pub fn max_size_vec(&self, cap: IntVect) -> BoxArray {
        let mut bl = self.to_list();
        bl.max_size_vec(cap);
        BoxArray::from_list(bl)
    }
}

impl PartialEq for BoxArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.boxes, &other.boxes) || self.boxes == other.boxes
    }
}

impl Eq for BoxArray {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::index::IntVect;

    fn bx(lo: [i64; 3], hi: [i64; 3]) -> AmrBox {
        AmrBox::new(IntVect(lo), IntVect(hi))
    }

    #[test]
    fn layout_hash_tracks_structure() {
        let a = BoxArray::from_boxes(vec![bx([0, 0, 0], [7, 7, 7])]);
        let b = BoxArray::from_boxes(vec![bx([0, 0, 0], [7, 7, 7])]);
        let c = BoxArray::from_boxes(vec![bx([0, 0, 0], [6, 7, 7])]);
        assert_eq!(a.layout_hash(), b.layout_hash());
        assert_ne!(a.layout_hash(), c.layout_hash());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn clone_shares_storage() {
        let a = BoxArray::from_boxes(vec![bx([0, 0, 0], [3, 3, 3])]);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.num_pts(), 64);
    }

    #[test]
    fn bulk_transforms() {
        let a = BoxArray::from_boxes(vec![bx([0, 0, 0], [3, 3, 3]), bx([8, 8, 8], [11, 11, 11])]);
        let fine = a.refine(IntVect::splat(2));
        assert_eq!(fine.get(0).hi(), IntVect([7, 7, 7]));
        assert_eq!(fine.coarsen(IntVect::splat(2)), a);
        let split = a.max_size(2);
        assert_eq!(split.num_pts(), a.num_pts());
        assert_eq!(split.len(), 16);
    }
}
