use serde::{Deserialize, Serialize};




/**
 * Identifier for a Cartesian axis. `I` is the fastest-varying index in
 * memory, `K` the slowest.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    I,
    J,
    K,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::I, Axis::J, Axis::K];

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }
}




/**
 * An inclusive range of indexes `s..=e` on one axis. The range is empty if
 * `e < s`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub s: i64,
    pub e: i64,
}




impl IndexRange {


    pub fn new(s: i64, e: i64) -> Self {
        Self { s, e }
    }


    /**
     * Return the number of indexes in this range.
     */
    pub fn len(&self) -> usize {
        if self.e < self.s {
            0
        } else {
            (self.e - self.s + 1) as usize
        }
    }


    pub fn is_empty(&self) -> bool {
        self.e < self.s
    }


    pub fn contains(&self, index: i64) -> bool {
        index >= self.s && index <= self.e
    }


    pub fn iter(&self) -> impl Iterator<Item = i64> {
        self.s..=self.e
    }
}




/**
 * Which part of a block's index space is meant: the owned interior cells, or
 * the interior plus the ghost zones.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexDomain {
    Interior,
    Entire,
}




/**
 * Describes the index space of a block: the number of interior cells on
 * each axis, and the ghost zone width on each axis. Axes with a single cell
 * (beyond the first) are inactive and carry no ghost zones, so a 1-D or 2-D
 * block uses the same three-index machinery as a 3-D one.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShape {
    nx: [usize; 3],
    ng: [usize; 3],
}




// ============================================================================
impl IndexShape {


    pub fn new(nx: [usize; 3], nghost: usize) -> Self {
        let mut ng = [0; 3];

        for axis in Axis::ALL.iter() {
            let n = axis.index();
            if n == 0 || nx[n] > 1 {
                ng[n] = nghost;
            }
        }
        Self { nx, ng }
    }


    /**
     * Return whether the given axis is active, meaning it has more than one
     * cell. The `I` axis is always active.
     */
    pub fn is_active(&self, axis: Axis) -> bool {
        axis == Axis::I || self.nx[axis.index()] > 1
    }


    /**
     * Return the number of active axes (1, 2, or 3).
     */
    pub fn ndim(&self) -> usize {
        Axis::ALL.iter().filter(|a| self.is_active(**a)).count()
    }


    pub fn nx(&self, axis: Axis) -> usize {
        self.nx[axis.index()]
    }


    pub fn nghost(&self, axis: Axis) -> usize {
        self.ng[axis.index()]
    }


    /**
     * Return the inclusive index bounds on an axis for the given domain.
     * Interior indexes start after the ghost zone.
     */
    pub fn bounds(&self, axis: Axis, domain: IndexDomain) -> IndexRange {
        let n = axis.index();
        let (nx, ng) = (self.nx[n] as i64, self.ng[n] as i64);

        match domain {
            IndexDomain::Interior => IndexRange::new(ng, ng + nx - 1),
            IndexDomain::Entire => IndexRange::new(0, nx + 2 * ng - 1),
        }
    }


    pub fn ncells(&self, axis: Axis, domain: IndexDomain) -> usize {
        self.bounds(axis, domain).len()
    }


    /**
     * Return the interior as a box.
     */
    pub fn interior(&self) -> IndexBox {
        IndexBox::new(
            self.bounds(Axis::K, IndexDomain::Interior),
            self.bounds(Axis::J, IndexDomain::Interior),
            self.bounds(Axis::I, IndexDomain::Interior))
    }


    /**
     * Return the interior and the ghost zones as a box.
     */
    pub fn entire(&self) -> IndexBox {
        IndexBox::new(
            self.bounds(Axis::K, IndexDomain::Entire),
            self.bounds(Axis::J, IndexDomain::Entire),
            self.bounds(Axis::I, IndexDomain::Entire))
    }


    /**
     * Return the array extents `[nk, nj, ni]` of the entire domain.
     */
    pub fn entire_dims(&self) -> [usize; 3] {
        [
            self.ncells(Axis::K, IndexDomain::Entire),
            self.ncells(Axis::J, IndexDomain::Entire),
            self.ncells(Axis::I, IndexDomain::Entire),
        ]
    }


    /**
     * Return the shape of the coarse buffer that shadows a block with this
     * shape: half the cells on active axes, and the given coarse ghost
     * width.
     */
    pub fn coarsened(&self, cnghost: usize) -> Self {
        let mut nx = self.nx;

        for axis in Axis::ALL.iter() {
            if self.is_active(*axis) {
                nx[axis.index()] /= 2;
            }
        }
        Self::new(nx, cnghost)
    }
}




/**
 * A rectangular box of indexes, inclusive on every axis, stored in memory
 * order `(k, j, i)`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexBox {
    pub k: IndexRange,
    pub j: IndexRange,
    pub i: IndexRange,
}




// ============================================================================
impl IndexBox {


    pub fn new(k: IndexRange, j: IndexRange, i: IndexRange) -> Self {
        Self { k, j, i }
    }


    /**
     * Return the number of cells in the box.
     */
    pub fn len(&self) -> usize {
        self.k.len() * self.j.len() * self.i.len()
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    pub fn contains(&self, index: (i64, i64, i64)) -> bool {
        self.k.contains(index.0) && self.j.contains(index.1) && self.i.contains(index.2)
    }


    /**
     * Return the linear offset of the given component and index, in a flat
     * buffer holding `nv` components of this box. The `i` index varies
     * fastest, then `j`, then `k`, then the component. Both sides of a
     * boundary exchange address their buffers with this offset.
     */
    pub fn linear_offset(&self, v: usize, k: i64, j: i64, i: i64) -> usize {
        let ni = self.i.len();
        let nj = self.j.len();
        let nk = self.k.len();
        let i = (i - self.i.s) as usize;
        let j = (j - self.j.s) as usize;
        let k = (k - self.k.s) as usize;
        i + ni * (j + nj * (k + nk * v))
    }


    /**
     * Return an iterator over `(v, k, j, i)` tuples for `nv` components, in
     * the order of increasing linear offset.
     */
    pub fn iter(&self, nv: usize) -> impl Iterator<Item = (usize, i64, i64, i64)> + '_ {
        (0..nv).flat_map(move |v| {
            self.k.iter().flat_map(move |k| {
                self.j.iter().flat_map(move |j| self.i.iter().map(move |i| (v, k, j, i)))
            })
        })
    }
}
