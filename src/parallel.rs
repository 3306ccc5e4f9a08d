//! Fork-join loop splitting.
//!
//! Every entry point partitions an index range (or a buffer) into contiguous,
//! non-overlapping blocks, runs one worker per block on [`rayon::scope`] and
//! blocks the caller until every worker has returned. There is no
//! cancellation: a spawned worker always runs to completion.
//!
//! # Worker count
//!
//! A call with `threads = 0` uses the process-wide limit set through
//! [`set_thread_limit`], which itself defaults to the hardware concurrency
//! reported by rayon. The effective count is always clamped to
//! `min(threads, hardware, n)` so that no worker receives an empty range.
//!
//! # Sequential fallback
//!
//! The `dynamic_*` variants estimate the work as `cost * n`. Below
//! [`PARALLEL_THRESHOLD`] the loop runs on the calling thread, since the spawn
//! overhead would dominate.
//!
//! # Example
//!
//! ```rust
//! use briny_mlp::parallel::parallel_for_chunks;
//!
//! let mut rows = vec![0.0f32; 4 * 3];
//! parallel_for_chunks(&mut rows, 3, |r, row| row.fill(r as f32), 0);
//! assert_eq!(&rows[9..], &[3.0, 3.0, 3.0]);
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};

/// Work estimate (`cost * n`) below which the dynamic variants stay sequential.
pub const PARALLEL_THRESHOLD: usize = 1 << 15;

/// Process-wide worker cap, `0` meaning "hardware concurrency".
///
/// Relaxed ordering is enough: the limit is a tuning knob, not a
/// synchronization point.
static THREAD_LIMIT: AtomicUsize = AtomicUsize::new(0);

/// Caps the number of workers used when a call passes `threads = 0`.
///
/// Passing `0` restores the default (hardware concurrency).
pub fn set_thread_limit(threads: usize) {
    THREAD_LIMIT.store(threads, Ordering::Relaxed);
}

/// Returns the current process-wide worker cap (`0` = hardware concurrency).
#[must_use]
pub fn thread_limit() -> usize {
    THREAD_LIMIT.load(Ordering::Relaxed)
}

/// Number of workers a loop over `n` items would use.
///
/// A non-zero `threads` is taken as requested. `threads = 0` falls back to
/// the limit set through [`set_thread_limit`], and to the hardware
/// concurrency when that limit is also `0`. The result is clamped to
/// `1..=min(hardware, n)`, so it is never zero even for `n = 0`.
#[must_use]
pub fn worker_count(n: usize, threads: usize) -> usize {
    let hardware = rayon::current_num_threads().max(1);
    let requested = match threads {
        0 => match thread_limit() {
            0 => hardware,
            limit => limit,
        },
        t => t,
    };
    requested.max(1).min(hardware).min(n.max(1))
}

/// Decides whether `n` iterations of `cost` units each are worth spawning for.
///
/// `force = Some(true)` always parallelizes, `Some(false)` never does.
#[must_use]
pub fn should_parallelize(cost: usize, n: usize, force: Option<bool>) -> bool {
    match force {
        Some(forced) => forced,
        None => cost.saturating_mul(n) >= PARALLEL_THRESHOLD,
    }
}

/// Runs `f(i)` for every `i` in `0..n`, split across contiguous worker ranges.
///
/// Workers share nothing but `f`; no ordering between indices is guaranteed.
pub fn parallel_for<F>(n: usize, f: F, threads: usize)
where
    F: Fn(usize) + Sync,
{
    if n == 0 {
        return;
    }
    let workers = worker_count(n, threads);
    if workers == 1 {
        (0..n).for_each(&f);
        return;
    }

    let per_worker = n.div_ceil(workers);
    let f = &f;
    rayon::scope(|s| {
        for start in (0..n).step_by(per_worker) {
            let end = (start + per_worker).min(n);
            s.spawn(move |_| (start..end).for_each(f));
        }
    });
}

/// Like [`parallel_for`], but runs sequentially when `cost * n` is small.
pub fn dynamic_parallel_for<F>(cost: usize, n: usize, f: F, force: Option<bool>, threads: usize)
where
    F: Fn(usize) + Sync,
{
    if should_parallelize(cost, n, force) {
        parallel_for(n, f, threads);
    } else {
        (0..n).for_each(f);
    }
}

/// Splits `data` into `chunk_len`-sized chunks and calls `f(index, chunk)` on each.
///
/// Workers receive disjoint blocks of consecutive chunks, so each one writes
/// only to its own region of the shared buffer. The final chunk is shorter
/// when `chunk_len` does not divide `data.len()`.
pub fn parallel_for_chunks<T, F>(data: &mut [T], chunk_len: usize, f: F, threads: usize)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if data.is_empty() || chunk_len == 0 {
        return;
    }
    let chunks = data.len().div_ceil(chunk_len);
    let workers = worker_count(chunks, threads);
    if workers == 1 {
        data.chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, chunk)| f(i, chunk));
        return;
    }

    let per_worker = chunks.div_ceil(workers);
    let f = &f;
    rayon::scope(|s| {
        for (w, block) in data.chunks_mut(per_worker * chunk_len).enumerate() {
            s.spawn(move |_| {
                let first = w * per_worker;
                for (j, chunk) in block.chunks_mut(chunk_len).enumerate() {
                    f(first + j, chunk);
                }
            });
        }
    });
}

/// Like [`parallel_for_chunks`], where `cost` is the estimated work per chunk.
pub fn dynamic_parallel_for_chunks<T, F>(
    cost: usize,
    data: &mut [T],
    chunk_len: usize,
    f: F,
    force: Option<bool>,
    threads: usize,
) where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if chunk_len == 0 {
        return;
    }
    let chunks = data.len().div_ceil(chunk_len);
    if should_parallelize(cost, chunks, force) {
        parallel_for_chunks(data, chunk_len, f, threads);
    } else {
        data.chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, chunk)| f(i, chunk));
    }
}
