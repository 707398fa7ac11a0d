// src/runtime/batching.rs
//! Task batchers
//!
//! When a task set is too large to enumerate every iteration, a batcher
//! picks which task indices go into the next scheduler run:
//!
//! - [`SequentialBatcher`]: consecutive batches, wrapping around
//! - [`RandomBatcher`]: uniform sample without replacement
//! - [`ShuffledBatcher`]: consecutive batches over a per-epoch shuffle
//! - [`UnsolvedBatcher`]: cycles through tasks that were never solved
//!
//! A batch size of `None` means every task.

use crate::utils::errors::{EngineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Chooses the tasks of one iteration
pub trait TaskBatcher {
    /// Indices into the task list for `iteration`.
    ///
    /// `solved[i]` tells whether task `i` has ever been solved.
    fn batch(
        &mut self,
        solved: &[bool],
        batch_size: Option<usize>,
        iteration: usize,
    ) -> Result<Vec<usize>>;
}

fn resolve_batch_size(task_count: usize, batch_size: Option<usize>) -> Result<usize> {
    match batch_size {
        None => Ok(task_count),
        Some(size) if size > task_count => Err(EngineError::InvalidConfig(format!(
            "task batch size {} is greater than the number of tasks ({})",
            size, task_count
        ))),
        Some(size) => Ok(size),
    }
}

/// Position `iteration * size` in an endless sequence of `count`-long rounds,
/// as `(round, offset)`
fn position(iteration: usize, size: usize, count: usize) -> (u64, usize) {
    let absolute = iteration as u128 * size as u128;
    let count = count as u128;
    ((absolute / count) as u64, (absolute % count) as usize)
}

/// Take `size` entries of `first ++ second` starting at `start`
fn window(first: &[usize], second: &[usize], start: usize, size: usize) -> Vec<usize> {
    first
        .iter()
        .chain(second.iter())
        .skip(start)
        .take(size)
        .copied()
        .collect()
}

/// Consecutive batches in input order
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBatcher;

impl TaskBatcher for SequentialBatcher {
    fn batch(
        &mut self,
        solved: &[bool],
        batch_size: Option<usize>,
        iteration: usize,
    ) -> Result<Vec<usize>> {
        let count = solved.len();
        let size = resolve_batch_size(count, batch_size)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let indices: Vec<usize> = (0..count).collect();
        let (_, start) = position(iteration, size, count);
        Ok(window(&indices, &indices, start, size))
    }
}

/// Uniform random sample
#[derive(Debug, Clone)]
pub struct RandomBatcher {
    rng: StdRng,
}

impl RandomBatcher {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBatcher for RandomBatcher {
    fn batch(
        &mut self,
        solved: &[bool],
        batch_size: Option<usize>,
        _iteration: usize,
    ) -> Result<Vec<usize>> {
        let count = solved.len();
        let size = resolve_batch_size(count, batch_size)?;
        Ok(rand::seq::index::sample(&mut self.rng, count, size).into_vec())
    }
}

/// Consecutive batches over a shuffle that changes once per epoch.
///
/// The shuffle of epoch `e` is seeded with `base_seed + e`, so runs are
/// reproducible (the seed wraps on overflow). A batch straddling two epochs continues into the next
/// epoch's shuffle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShuffledBatcher {
    pub base_seed: u64,
}

impl ShuffledBatcher {
    fn shuffled(&self, count: usize, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..count).collect();
        let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch));
        indices.shuffle(&mut rng);
        indices
    }
}

impl TaskBatcher for ShuffledBatcher {
    fn batch(
        &mut self,
        solved: &[bool],
        batch_size: Option<usize>,
        iteration: usize,
    ) -> Result<Vec<usize>> {
        let count = solved.len();
        let size = resolve_batch_size(count, batch_size)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let (epoch, start) = position(iteration, size, count);
        let current = self.shuffled(count, epoch);
        let next = self.shuffled(count, epoch.wrapping_add(1));
        Ok(window(&current, &next, start, size))
    }
}

/// Cycles through the tasks that were unsolved when the cycle began
#[derive(Debug, Clone, Default)]
pub struct UnsolvedBatcher {
    pending: Option<Vec<usize>>,
    start: usize,
}

impl TaskBatcher for UnsolvedBatcher {
    fn batch(
        &mut self,
        solved: &[bool],
        batch_size: Option<usize>,
        _iteration: usize,
    ) -> Result<Vec<usize>> {
        let pending = self.pending.get_or_insert_with(|| {
            let mut unsolved: Vec<usize> = solved
                .iter()
                .enumerate()
                .filter(|(_, solved)| !**solved)
                .map(|(index, _)| index)
                .collect();
            unsolved.shuffle(&mut StdRng::seed_from_u64(0));
            debug!("Starting a cycle over {} unsolved tasks", unsolved.len());
            unsolved
        });

        let size = batch_size.unwrap_or(pending.len());
        let end = (self.start + size).min(pending.len());
        let batch = pending[self.start.min(end)..end].to_vec();

        if end >= pending.len() {
            self.pending = None;
            self.start = 0;
        } else {
            self.start = end;
        }

        Ok(batch)
    }
}
