use serde::{Deserialize, Serialize};
use crate::index_space::{Axis, IndexDomain, IndexShape};




/**
 * Uniform Cartesian geometry of one block: the physical extent of its
 * interior and the cell spacing on each axis. Inactive axes span the whole
 * domain with one cell.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformCartesian {
    extent: [[f64; 2]; 3],
    dx: [f64; 3],
    start: [i64; 3],
}




// ============================================================================
impl UniformCartesian {


    pub fn new(extent: [[f64; 2]; 3], shape: &IndexShape) -> Self {
        let mut dx = [0.0; 3];
        let mut start = [0; 3];

        for axis in Axis::ALL.iter() {
            let n = axis.index();
            dx[n] = (extent[n][1] - extent[n][0]) / shape.nx(*axis) as f64;
            start[n] = shape.bounds(*axis, IndexDomain::Interior).s;
        }
        Self { extent, dx, start }
    }


    pub fn dx(&self, axis: Axis) -> f64 {
        self.dx[axis.index()]
    }


    /**
     * Return the `[lower, upper]` physical bounds of the interior on each
     * axis.
     */
    pub fn extent(&self) -> [[f64; 2]; 3] {
        self.extent
    }


    /**
     * Return the coordinate of the center of the cell with the given index
     * along an axis. Ghost indexes give centers outside the extent.
     */
    pub fn cell_center(&self, axis: Axis, index: i64) -> f64 {
        let n = axis.index();
        self.extent[n][0] + ((index - self.start[n]) as f64 + 0.5) * self.dx[n]
    }


    /**
     * Return the volume of a cell. On inactive axes the full domain width
     * counts as the cell width.
     */
    pub fn cell_volume(&self) -> f64 {
        self.dx.iter().product()
    }


    /**
     * Determine whether a point lies in the (half-open) interior extent.
     */
    pub fn contains(&self, x: [f64; 3]) -> bool {
        (0..3).all(|n| x[n] >= self.extent[n][0] && x[n] < self.extent[n][1])
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn cell_centers_are_offset_by_ghosts() {
        let shape = IndexShape::new([4, 1, 1], 2);
        let coords = UniformCartesian::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]], &shape);
        assert_eq!(coords.dx(Axis::I), 0.25);
        assert_eq!(coords.cell_center(Axis::I, 2), 0.125);
        assert_eq!(coords.cell_center(Axis::I, 0), -0.375);
        assert!(coords.contains([0.99, 0.5, 0.5]));
        assert!(!coords.contains([1.0, 0.5, 0.5]));
    }
}
