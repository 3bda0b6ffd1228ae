use serde::{Deserialize, Serialize};
use crate::index_space::Axis;




/**
 * Position of a block in the refinement hierarchy: its level, and its
 * integer coordinates among the blocks of that level. A block at level `l`
 * with coordinates `lx` has children at level `l + 1` with coordinates
 * `2 lx` and `2 lx + 1` on each active axis.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalLocation {
    pub level: i32,
    pub lx: [i64; 3],
}




// ============================================================================
impl LogicalLocation {


    pub fn new(level: i32, lx: [i64; 3]) -> Self {
        Self { level, lx }
    }


    /**
     * Return the location of the parent block. Inactive axes, which always
     * have coordinate zero, are unaffected.
     */
    pub fn parent(&self) -> Self {
        Self {
            level: self.level - 1,
            lx: [self.lx[0] >> 1, self.lx[1] >> 1, self.lx[2] >> 1],
        }
    }


    /**
     * Return the child with the given sub-position (0 or 1) on each axis.
     * Pass 0 on inactive axes.
     */
    pub fn child(&self, sub: [i64; 3]) -> Self {
        Self {
            level: self.level + 1,
            lx: [2 * self.lx[0] + sub[0], 2 * self.lx[1] + sub[1], 2 * self.lx[2] + sub[2]],
        }
    }


    /**
     * Return the children covering an index space of `ndim` active axes.
     */
    pub fn children(&self, active: [bool; 3]) -> Vec<Self> {
        let range = |n: usize| if active[n] { 0..2 } else { 0..1 };
        let mut children = Vec::new();

        for c in range(2) {
            for b in range(1) {
                for a in range(0) {
                    children.push(self.child([a, b, c]))
                }
            }
        }
        children
    }


    /**
     * Return the parity (0 or 1) of the coordinate on the given axis, which
     * tells which half of its parent the block occupies.
     */
    pub fn parity(&self, axis: Axis) -> usize {
        (self.lx[axis.index()] & 1) as usize
    }
}




/**
 * How two adjacent blocks touch.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NeighborConnect {
    Face,
    Edge,
    Corner,
}




/**
 * The six faces of a block. The discriminant is the conventional face id:
 * `inner_x1 = 0` through `outer_x3 = 5`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryFace {
    InnerX1 = 0,
    OuterX1 = 1,
    InnerX2 = 2,
    OuterX2 = 3,
    InnerX3 = 4,
    OuterX3 = 5,
}




// ============================================================================
impl BoundaryFace {


    /**
     * Return the face crossed by a face-type offset, or `None` for edge and
     * corner offsets.
     */
    pub fn from_offset(ox: [i32; 3]) -> Option<Self> {
        match ox {
            [-1, 0, 0] => Some(Self::InnerX1),
            [1, 0, 0] => Some(Self::OuterX1),
            [0, -1, 0] => Some(Self::InnerX2),
            [0, 1, 0] => Some(Self::OuterX2),
            [0, 0, -1] => Some(Self::InnerX3),
            [0, 0, 1] => Some(Self::OuterX3),
            _ => None,
        }
    }


    pub fn axis(self) -> Axis {
        match self {
            Self::InnerX1 | Self::OuterX1 => Axis::I,
            Self::InnerX2 | Self::OuterX2 => Axis::J,
            Self::InnerX3 | Self::OuterX3 => Axis::K,
        }
    }


    /**
     * Return 1 for an outer face and 0 for an inner one.
     */
    pub fn side(self) -> usize {
        self as usize & 1
    }
}




/**
 * Relative position of a neighbor: its offset `ox` in `{-1, 0, 1}` on each
 * axis, and, when several finer neighbors share the same offset, which of
 * them this is. `fi1` is the neighbor's parity along the first axis with a
 * zero offset (in `i, j, k` order) and `fi2` along the second.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NeighborIndexes {
    pub ox: [i32; 3],
    pub fi1: usize,
    pub fi2: usize,
    pub connect: NeighborConnect,
}




// ============================================================================
impl NeighborIndexes {


    pub fn new(ox: [i32; 3], fi1: usize, fi2: usize) -> Self {
        let connect = match ox.iter().filter(|o| **o != 0).count() {
            1 => NeighborConnect::Face,
            2 => NeighborConnect::Edge,
            _ => NeighborConnect::Corner,
        };
        Self { ox, fi1, fi2, connect }
    }


    pub fn offset(&self, axis: Axis) -> i32 {
        self.ox[axis.index()]
    }


    /**
     * Return the fine sub-index that applies to an axis along which the
     * offset is zero: `fi1` for the first such axis and `fi2` for the
     * second. Axes with a nonzero offset get 0.
     */
    pub fn fine_index(&self, axis: Axis) -> usize {
        if self.offset(axis) != 0 {
            return 0;
        }
        let rank = Axis::ALL
            .iter()
            .take_while(|a| **a != axis)
            .filter(|a| self.offset(**a) == 0)
            .count();

        match rank {
            0 => self.fi1,
            _ => self.fi2,
        }
    }


    /**
     * Return the buffer id of this relation. Every `(ox, fi1, fi2)`
     * combination gets its own slot, so the receiver of a message can
     * compute it from its own view of the pair.
     */
    pub fn buffer_id(&self) -> usize {
        buffer_id(self.ox, self.fi1, self.fi2)
    }
}




/**
 * Return the sub-indexes `(fi1, fi2)` that tell a block at `loc` apart from
 * its siblings sharing the offset `ox` of a coarser block: its parities
 * along the axes with zero offset, in `i, j, k` order.
 */
pub fn fine_indexes(ox: [i32; 3], loc: &LogicalLocation) -> (usize, usize) {
    let mut free = Axis::ALL
        .iter()
        .filter(|a| ox[a.index()] == 0)
        .map(|a| loc.parity(*a));

    let fi1 = free.next().unwrap_or(0);
    let fi2 = free.next().unwrap_or(0);
    (fi1, fi2)
}




/**
 * Number of distinct buffer ids: 27 offsets times 4 fine sub-positions.
 */
pub const MAX_NEIGHBOR_BUFFERS: usize = 108;

pub fn buffer_id(ox: [i32; 3], fi1: usize, fi2: usize) -> usize {
    let o = ((ox[2] + 1) * 9 + (ox[1] + 1) * 3 + (ox[0] + 1)) as usize;
    o * 4 + fi1 * 2 + fi2
}




/**
 * Refinement level of a neighbor relative to the block that lists it.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelRelation {
    Same,
    Coarser,
    Finer,
}




/**
 * Everything a block needs to know about one adjacent block in order to
 * exchange boundary data with it. `bufid` is the slot of this relation in
 * the local block's buffers; `targetid` is the slot of the reverse relation
 * in the neighbor's buffers, where local copies are written.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborBlock {
    pub rank: usize,
    pub level: i32,
    pub gid: usize,
    pub lid: usize,
    pub loc: LogicalLocation,
    pub ni: NeighborIndexes,
    pub bufid: usize,
    pub targetid: usize,
    pub fid: Option<BoundaryFace>,
}

impl NeighborBlock {
    pub fn relation(&self, my_level: i32) -> LevelRelation {
        if self.level == my_level {
            LevelRelation::Same
        } else if self.level < my_level {
            LevelRelation::Coarser
        } else {
            LevelRelation::Finer
        }
    }
}




/**
 * Levels of the blocks surrounding a block, indexed by offset. `None` marks
 * a physical (non-periodic) domain boundary.
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborLevels {
    levels: [[[Option<i32>; 3]; 3]; 3],
}

impl NeighborLevels {
    pub fn get(&self, ox: [i32; 3]) -> Option<i32> {
        self.levels[(ox[2] + 1) as usize][(ox[1] + 1) as usize][(ox[0] + 1) as usize]
    }

    pub fn set(&mut self, ox: [i32; 3], level: Option<i32>) {
        self.levels[(ox[2] + 1) as usize][(ox[1] + 1) as usize][(ox[0] + 1) as usize] = level
    }
}
