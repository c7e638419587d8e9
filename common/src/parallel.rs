//! Row-chunked parallel helpers for image buffers.

use rayon::prelude::*;

use crate::buffer2::Buffer2;

/// Multiplier for number of chunks relative to CPU threads.
/// Using 2x threads provides load balancing when some chunks finish faster.
const CHUNKS_PER_THREAD: usize = 2;

/// Rows per chunk so that `height` splits into roughly `threads * 2` chunks.
/// Minimum of 1 row per chunk.
#[inline]
pub fn rows_per_chunk(height: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (height / num_chunks).max(1)
}

/// Run `f(y, row)` over every row of `buffer` in parallel, in row chunks.
pub fn par_rows_mut<T, F>(buffer: &mut Buffer2<T>, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    let width = buffer.width();
    if width == 0 || buffer.height() == 0 {
        return;
    }
    let rows = rows_per_chunk(buffer.height());

    buffer
        .pixels_mut()
        .par_chunks_mut(width * rows)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let y_start = chunk_idx * rows;
            for (local_y, row) in chunk.chunks_mut(width).enumerate() {
                f(y_start + local_y, row);
            }
        });
}

/// Like [`par_rows_mut`] over two same-sized buffers written in lockstep.
pub fn par_rows_mut2<A, B, F>(a: &mut Buffer2<A>, b: &mut Buffer2<B>, f: F)
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut [A], &mut [B]) + Sync + Send,
{
    assert_eq!(
        (a.width(), a.height()),
        (b.width(), b.height()),
        "buffers must have the same dimensions"
    );
    let width = a.width();
    if width == 0 || a.height() == 0 {
        return;
    }
    let rows = rows_per_chunk(a.height());

    a.pixels_mut()
        .par_chunks_mut(width * rows)
        .zip(b.pixels_mut().par_chunks_mut(width * rows))
        .enumerate()
        .for_each(|(chunk_idx, (chunk_a, chunk_b))| {
            let y_start = chunk_idx * rows;
            for (local_y, (row_a, row_b)) in chunk_a
                .chunks_mut(width)
                .zip(chunk_b.chunks_mut(width))
                .enumerate()
            {
                f(y_start + local_y, row_a, row_b);
            }
        });
}
