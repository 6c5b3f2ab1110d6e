//! Row-parallel helpers for interleaved image buffers.

use rayon::prelude::*;

/// Multiplier for number of chunks relative to CPU threads.
/// Extra chunks keep threads busy when rows have uneven cost.
const CHUNKS_PER_THREAD: usize = 3;

/// Rows per chunk so the image splits into roughly `threads * CHUNKS_PER_THREAD` pieces.
#[inline]
pub fn rows_per_chunk(height: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (height / num_chunks).max(1)
}

/// Calls `f(y, row)` for every row of `data` in parallel.
///
/// `row_len` is the number of elements per row (width × channels). A trailing
/// partial row is not possible: `data.len()` must be a multiple of `row_len`.
pub fn for_each_row_mut<T, F>(data: &mut [T], row_len: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if data.is_empty() || row_len == 0 {
        return;
    }
    debug_assert_eq!(data.len() % row_len, 0);

    let height = data.len() / row_len;
    let chunk_rows = rows_per_chunk(height);

    data.par_chunks_mut(row_len * chunk_rows)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let first_row = chunk_idx * chunk_rows;
            for (local_y, row) in chunk.chunks_exact_mut(row_len).enumerate() {
                f(first_row + local_y, row);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_row_mut_visits_every_row_once() {
        let width = 7;
        let height = 13;
        let mut data = vec![0usize; width * height];

        for_each_row_mut(&mut data, width, |y, row| {
            for (x, v) in row.iter_mut().enumerate() {
                *v += y * width + x + 1;
            }
        });

        for (i, &v) in data.iter().enumerate() {
            assert_eq!(v, i + 1);
        }
    }

    #[test]
    fn test_for_each_row_mut_empty() {
        let mut data: Vec<f32> = Vec::new();
        for_each_row_mut(&mut data, 4, |_, _| panic!("no rows expected"));
    }
}
