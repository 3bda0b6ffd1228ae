use serde::{Deserialize, Serialize};
use crate::index_space::IndexRange;




/**
 * A dense four-index array of `f64`, indexed by `(v, k, j, i)` where `v` is
 * the field component. The `i` index is contiguous in memory, so a "row" is
 * the run of `i` values at fixed `(v, k, j)`. Indexes are signed because
 * block index spaces are, but they must lie inside the array extents.
 */
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParArray4 {
    dims: [usize; 4],
    data: Vec<f64>,
}




// ============================================================================
impl ParArray4 {


    /**
     * Create a zero-filled array with `nv` components and `[nk, nj, ni]`
     * cells.
     */
    pub fn new(nv: usize, dims: [usize; 3]) -> Self {
        let [nk, nj, ni] = dims;
        Self {
            dims: [nv, nk, nj, ni],
            data: vec![0.0; nv * nk * nj * ni],
        }
    }


    /**
     * Create an array with values defined from a closure of `(v, k, j, i)`.
     */
    pub fn from_function<F>(nv: usize, dims: [usize; 3], f: F) -> Self
    where
        F: Fn(usize, i64, i64, i64) -> f64,
    {
        let mut array = Self::new(nv, dims);
        let [_, nk, nj, ni] = array.dims;

        for v in 0..nv {
            for k in 0..nk as i64 {
                for j in 0..nj as i64 {
                    for i in 0..ni as i64 {
                        let n = array.offset(v, k, j, i);
                        array.data[n] = f(v, k, j, i);
                    }
                }
            }
        }
        array
    }


    /**
     * Return the extents `[nv, nk, nj, ni]`.
     */
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }


    pub fn num_components(&self) -> usize {
        self.dims[0]
    }


    /**
     * Return the length of one contiguous row of `i` values.
     */
    pub fn row_len(&self) -> usize {
        self.dims[3]
    }


    /**
     * Return the `(v, k, j)` triple of the row with the given index.
     */
    pub fn row_index(&self, row: usize) -> (usize, i64, i64) {
        Self::locate_row(self.dims, row)
    }


    /**
     * Return the `(v, k, j)` triple of a row in an array with the given
     * extents. Kernels writing into an array use this in place of
     * `row_index`, since the array is mutably borrowed.
     */
    pub fn locate_row(dims: [usize; 4], row: usize) -> (usize, i64, i64) {
        let [_, nk, nj, _] = dims;
        let j = row % nj;
        let k = (row / nj) % nk;
        let v = row / (nj * nk);
        (v, k as i64, j as i64)
    }


    /**
     * Return the rows of components `0..nv` at the `k` and `j` indexes of
     * the given ranges, each with its `(v, k, j)` triple, in memory order.
     * The ranges must lie inside the array extents.
     */
    pub fn rows_mut(&mut self, nv: usize, k: IndexRange, j: IndexRange) -> Vec<((usize, i64, i64), &mut [f64])> {
        let [_, nk, nj, ni] = self.dims;

        if nv == 0 || ni == 0 || k.is_empty() || j.is_empty() {
            return Vec::new();
        }
        debug_assert!(k.s >= 0 && j.s >= 0, "negative array index");

        let span = ni * j.len();
        let mut rows = Vec::with_capacity(nv * k.len() * j.len());
        let mut rest: &mut [f64] = &mut self.data;
        let mut consumed = 0;

        for v in 0..nv {
            for kk in k.iter() {
                let start = ni * (j.s as usize + nj * (kk as usize + nk * v));
                let (_, tail) = std::mem::take(&mut rest).split_at_mut(start - consumed);
                let (run, tail) = tail.split_at_mut(span);
                rest = tail;
                consumed = start + span;

                for (n, row) in run.chunks_mut(ni).enumerate() {
                    rows.push(((v, kk, j.s + n as i64), row));
                }
            }
        }
        rows
    }


    pub fn offset(&self, v: usize, k: i64, j: i64, i: i64) -> usize {
        let [_, nk, nj, ni] = self.dims;
        debug_assert!(k >= 0 && j >= 0 && i >= 0, "negative array index");
        i as usize + ni * (j as usize + nj * (k as usize + nk * v))
    }


    pub fn get(&self, v: usize, k: i64, j: i64, i: i64) -> f64 {
        self.data[self.offset(v, k, j, i)]
    }


    pub fn set(&mut self, v: usize, k: i64, j: i64, i: i64, value: f64) {
        let n = self.offset(v, k, j, i);
        self.data[n] = value;
    }


    pub fn fill(&mut self, value: f64) {
        for x in self.data.iter_mut() {
            *x = value;
        }
    }


    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }


    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}
