//! Index-range calculators for the boundary exchange. Each function maps an
//! offset along one axis (and for multi-level relations, the sub-position
//! of the finer block) to the inclusive range of cells packed or unpacked
//! on that axis. The box versions combine the three axes for a neighbor
//! relation. Both sides of an exchange must agree on the extent of the
//! region, so the calculators come in matching load/set pairs:
//!
//! | sender              | receiver             |
//! |---------------------|----------------------|
//! | `load_same`         | `set_same`           |
//! | `load_same` (coarse)| `set_from_finer`     |
//! | `load_to_finer`     | `set_from_coarser`   |

use crate::index_space::{Axis, IndexBox, IndexDomain, IndexRange, IndexShape};
use crate::neighbor::{LevelRelation, LogicalLocation, NeighborBlock, NeighborIndexes};




/// Ghost cells beyond the boundary at offset `ox`; the interior if `ox` is
/// zero.
pub fn set_same(ox: i32, b: IndexRange, ng: usize) -> IndexRange {
    let ng = ng as i64;

    match ox {
        0 => b,
        o if o > 0 => IndexRange::new(b.e + 1, b.e + ng),
        _ => IndexRange::new(b.s - ng, b.s - 1),
    }
}

/// Interior cells adjacent to the boundary at offset `ox`; the interior if
/// `ox` is zero.
pub fn load_same(ox: i32, b: IndexRange, ng: usize) -> IndexRange {
    let ng = ng as i64;

    match ox {
        0 => b,
        o if o > 0 => IndexRange::new(b.e - ng + 1, b.e),
        _ => IndexRange::new(b.s, b.s + ng - 1),
    }
}

/// Receive region in the coarse buffer of a block whose neighbor is
/// coarser. `b` is the coarse interior. Along an axis with zero offset the
/// coarser neighbor spans twice the block's extent, so the region is
/// widened by `cng` cells away from the parent's boundary: upward if the
/// block is the lower child (`lx` even), downward otherwise.
pub fn set_from_coarser(ox: i32, b: IndexRange, cng: usize, lx: i64, active: bool) -> IndexRange {
    let cng = cng as i64;

    match ox {
        0 if !active => b,
        0 if lx & 1 == 0 => IndexRange::new(b.s, b.e + cng),
        0 => IndexRange::new(b.s - cng, b.e),
        o if o > 0 => IndexRange::new(b.e + 1, b.e + cng),
        _ => IndexRange::new(b.s - cng, b.s - 1),
    }
}

/// Receive region of a block whose neighbor is finer. Along an axis with
/// zero offset the neighbor covers half the interior, the upper half if its
/// fine index `fi` is 1.
pub fn set_from_finer(ox: i32, b: IndexRange, ng: usize, fi: usize, active: bool) -> IndexRange {
    let ng = ng as i64;
    let half = b.len() as i64 / 2;

    match ox {
        0 if !active => b,
        0 if fi == 1 => IndexRange::new(b.s + half, b.e),
        0 => IndexRange::new(b.s, b.e - half),
        o if o > 0 => IndexRange::new(b.e + 1, b.e + ng),
        _ => IndexRange::new(b.s - ng, b.s - 1),
    }
}

/// Send region of a block whose neighbor is finer: the data the neighbor
/// needs to fill its coarse buffer, `cng` cells deep, and along an axis with
/// zero offset the half the neighbor covers plus `cng` cells beyond it.
pub fn load_to_finer(ox: i32, b: IndexRange, cng: usize, fi: usize, active: bool) -> IndexRange {
    let cn = cng as i64 - 1;
    let half = b.len() as i64 / 2;
    let reach = half - cng as i64;

    match ox {
        0 if !active => b,
        0 if fi == 1 => IndexRange::new(b.s + reach, b.e),
        0 => IndexRange::new(b.s, b.e - reach),
        o if o > 0 => IndexRange::new(b.e - cn, b.e),
        _ => IndexRange::new(b.s, b.s + cn),
    }
}




/// Where a buffer is packed from or unpacked into: the block's own cell
/// array, or its coarse buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Fine,
    Coarse,
}

/// The region of one side of an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub target: Target,
    pub cells: IndexBox,
}

fn make_box<F>(f: F) -> IndexBox
where
    F: Fn(Axis) -> IndexRange,
{
    IndexBox::new(f(Axis::K), f(Axis::J), f(Axis::I))
}

/// Return the region a block packs for its neighbor `nb`. For a coarser
/// neighbor the region lies in the coarse buffer and must be restricted
/// from the cell data before packing.
pub fn load_region(shape: &IndexShape, cshape: &IndexShape, nb: &NeighborBlock, my_level: i32) -> Region {
    let ni = &nb.ni;
    let interior = |s: &IndexShape, axis| s.bounds(axis, IndexDomain::Interior);

    match nb.relation(my_level) {
        LevelRelation::Same => Region {
            target: Target::Fine,
            cells: make_box(|a| load_same(ni.offset(a), interior(shape, a), shape.nghost(a))),
        },
        LevelRelation::Coarser => Region {
            target: Target::Coarse,
            cells: make_box(|a| load_same(ni.offset(a), interior(cshape, a), shape.nghost(a))),
        },
        LevelRelation::Finer => Region {
            target: Target::Fine,
            cells: make_box(|a| {
                load_to_finer(ni.offset(a), interior(shape, a), cshape.nghost(a), ni.fine_index(a), shape.is_active(a))
            }),
        },
    }
}

/// Return the region a block unpacks the message from neighbor `nb` into.
pub fn set_region(shape: &IndexShape, cshape: &IndexShape, nb: &NeighborBlock, loc: &LogicalLocation) -> Region {
    let ni = &nb.ni;
    let interior = |s: &IndexShape, axis| s.bounds(axis, IndexDomain::Interior);

    match nb.relation(loc.level) {
        LevelRelation::Same => Region {
            target: Target::Fine,
            cells: make_box(|a| set_same(ni.offset(a), interior(shape, a), shape.nghost(a))),
        },
        LevelRelation::Coarser => Region {
            target: Target::Coarse,
            cells: make_box(|a| {
                set_from_coarser(ni.offset(a), interior(cshape, a), cshape.nghost(a), loc.lx[a.index()], shape.is_active(a))
            }),
        },
        LevelRelation::Finer => Region {
            target: Target::Fine,
            cells: make_box(|a| {
                set_from_finer(ni.offset(a), interior(shape, a), shape.nghost(a), ni.fine_index(a), shape.is_active(a))
            }),
        },
    }
}




/// Region of the coarse buffer restricted from already-filled cells before
/// prolongating the ghost zone at offset `ox`. `n` is the offset of the
/// same-level block (or the block itself, for zero) the cells come from:
/// along an axis with `n` zero only the interior layer next to the `ox`
/// boundary is needed, and along an axis with `n` nonzero the first
/// `ng / 2` coarse ghost layers.
pub fn restricted_region(cshape: &IndexShape, ng: usize, ox: [i32; 3], n: [i32; 3]) -> IndexBox {
    let layers = (ng / 2) as i64;

    make_box(|a| {
        let b = cshape.bounds(a, IndexDomain::Interior);
        let o = ox[a.index()];

        match n[a.index()] {
            0 if o > 0 => IndexRange::new(b.e, b.e),
            0 if o < 0 => IndexRange::new(b.s, b.s),
            0 => b,
            m if m > 0 => IndexRange::new(b.e + 1, b.e + layers),
            _ => IndexRange::new(b.s - layers, b.s - 1),
        }
    })
}

/// Coarse cells whose children cover the ghost zone at offset `ox` of a
/// block with a coarser neighbor there. Along an axis with zero offset the
/// range reaches one coarse ghost layer (half the ghost width) past the
/// interior, on the side away from the parent's boundary, so that the
/// edges and corners the coarser neighbor also covers are filled.
pub fn prolongation_region(shape: &IndexShape, cshape: &IndexShape, ni: &NeighborIndexes, loc: &LogicalLocation) -> IndexBox {
    make_box(|a| {
        let b = cshape.bounds(a, IndexDomain::Interior);
        let layers = (shape.nghost(a) / 2) as i64;

        match ni.offset(a) {
            0 if !shape.is_active(a) => b,
            0 if loc.lx[a.index()] & 1 == 0 => IndexRange::new(b.s, b.e + layers),
            0 => IndexRange::new(b.s - layers, b.e),
            o if o > 0 => IndexRange::new(b.e + 1, b.e + layers),
            _ => IndexRange::new(b.s - layers, b.s - 1),
        }
    })
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn interior() -> IndexRange {
        IndexRange::new(2, 9)
    }

    #[test]
    fn same_level_regions_mirror_each_other() {
        assert_eq!(load_same(1, interior(), 2), IndexRange::new(8, 9));
        assert_eq!(set_same(-1, interior(), 2), IndexRange::new(0, 1));
        assert_eq!(load_same(-1, interior(), 2), IndexRange::new(2, 3));
        assert_eq!(set_same(1, interior(), 2), IndexRange::new(10, 11));
        assert_eq!(set_same(0, interior(), 2), interior());
    }

    #[test]
    fn fine_to_coarse_regions_have_equal_extent() {
        let coarse = IndexRange::new(2, 5);

        for ox in -1..=1 {
            for fi in 0..2 {
                let sent = load_same(ox, coarse, 2);
                let placed = set_from_finer(-ox, interior(), 2, fi, true);
                assert_eq!(sent.len(), placed.len());
            }
        }
        assert_eq!(set_from_finer(0, interior(), 2, 1, true), IndexRange::new(6, 9));
        assert_eq!(set_from_finer(0, interior(), 2, 0, true), IndexRange::new(2, 5));
    }

    #[test]
    fn coarse_to_fine_regions_have_equal_extent() {
        let cng = 2;
        let coarse = IndexRange::new(2, 5);

        for ox in -1..=1 {
            for lx in 0..2 {
                let sent = load_to_finer(ox, interior(), cng, lx as usize, true);
                let placed = set_from_coarser(-ox, coarse, cng, lx, true);
                assert_eq!(sent.len(), placed.len());
            }
        }
    }

    #[test]
    fn coarse_to_fine_regions_are_aligned() {
        // The lower child along a free axis receives the lower half of the
        // coarse block plus two cells above it.
        assert_eq!(load_to_finer(0, interior(), 2, 0, true), IndexRange::new(2, 7));
        assert_eq!(set_from_coarser(0, IndexRange::new(2, 5), 2, 4, true), IndexRange::new(2, 7));
        assert_eq!(load_to_finer(0, interior(), 2, 1, true), IndexRange::new(4, 9));
        assert_eq!(set_from_coarser(0, IndexRange::new(2, 5), 2, 5, true), IndexRange::new(0, 5));
    }

    #[test]
    fn inactive_axes_span_their_single_cell() {
        let one = IndexRange::new(0, 0);
        assert_eq!(set_from_coarser(0, one, 2, 1, false), one);
        assert_eq!(load_to_finer(0, one, 2, 1, false), one);
        assert_eq!(set_from_finer(0, one, 2, 1, false), one);
    }
}
