use log::trace;
use rayon::prelude::*;




/**
 * The execution space for data-parallel kernels (buffer packing, unpacking,
 * restriction, and prolongation). Kernels are expressed as a body run on
 * each contiguous row of an output slice, which lets them write without
 * aliasing. When the output has at least `min_parallel_rows` rows the rows
 * are distributed over the Rayon thread pool; smaller kernels run serially
 * on the calling thread, where the fork-join overhead would dominate.
 *
 * Kernels launched here have completed when the launch returns, so `fence`
 * has nothing to wait for. It is kept so that call sites state the ordering
 * they depend on.
 */
#[derive(Clone, Debug)]
pub struct ExecSpace {
    min_parallel_rows: usize,
}




// ============================================================================
impl ExecSpace {


    pub fn new(min_parallel_rows: usize) -> Self {
        Self { min_parallel_rows }
    }


    /**
     * An execution space that never uses the thread pool.
     */
    pub fn serial() -> Self {
        Self { min_parallel_rows: usize::MAX }
    }


    /**
     * Run `body(row, slice)` for every row of `data`, where a row is
     * `row_len` consecutive elements. The length of `data` must be a
     * multiple of `row_len`.
     */
    pub fn for_each_row<F>(&self, label: &str, data: &mut [f64], row_len: usize, body: F)
    where
        F: Fn(usize, &mut [f64]) + Send + Sync,
    {
        if row_len == 0 || data.is_empty() {
            return;
        }
        debug_assert_eq!(data.len() % row_len, 0, "{}: ragged rows", label);

        let num_rows = data.len() / row_len;

        if num_rows >= self.min_parallel_rows {
            trace!("{}: {} rows in parallel", label, num_rows);
            data.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, slice)| body(row, slice));
        } else {
            data.chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, slice)| body(row, slice));
        }
    }


    /**
     * Run `body(key, slice)` for each of the given rows, as picked out by
     * [`crate::array::ParArray4::rows_mut`]. The same threshold as in
     * `for_each_row` decides whether the rows go to the thread pool.
     */
    pub fn for_each_selected_row<K, F>(&self, label: &str, rows: Vec<(K, &mut [f64])>, body: F)
    where
        K: Send,
        F: Fn(K, &mut [f64]) + Send + Sync,
    {
        if rows.len() >= self.min_parallel_rows {
            trace!("{}: {} selected rows in parallel", label, rows.len());
            rows.into_par_iter().for_each(|(key, slice)| body(key, slice));
        } else {
            rows.into_iter().for_each(|(key, slice)| body(key, slice));
        }
    }


    /**
     * Block until all kernels launched in this space have completed.
     */
    pub fn fence(&self) {}
}

impl Default for ExecSpace {
    fn default() -> Self {
        Self::new(64)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::ExecSpace;

    #[test]
    fn serial_and_parallel_kernels_agree() {
        let mut a = vec![0.0; 400];
        let mut b = vec![0.0; 400];
        ExecSpace::serial().for_each_row("a", &mut a, 10, |row, s| s.iter_mut().enumerate().for_each(|(i, x)| *x = (row * 10 + i) as f64));
        ExecSpace::new(1).for_each_row("b", &mut b, 10, |row, s| s.iter_mut().enumerate().for_each(|(i, x)| *x = (row * 10 + i) as f64));
        assert_eq!(a, b);
        assert_eq!(a[123], 123.0);
    }

    #[test]
    fn selected_rows_run_serially_or_in_parallel() {
        let mut a = vec![0.0; 40];
        let mut b = vec![0.0; 40];
        fn pick(data: &mut [f64]) -> Vec<(usize, &mut [f64])> {
            data.chunks_mut(10).enumerate().filter(|(n, _)| n % 2 == 1).collect()
        }

        ExecSpace::serial().for_each_selected_row("a", pick(&mut a), |n, s| s.iter_mut().for_each(|x| *x = n as f64));
        ExecSpace::new(1).for_each_selected_row("b", pick(&mut b), |n, s| s.iter_mut().for_each(|x| *x = n as f64));
        assert_eq!(a, b);
        assert_eq!(a[15], 1.0);
        assert_eq!(a[25], 0.0);
        assert_eq!(a[39], 3.0);
    }
}
