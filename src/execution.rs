use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use log::info;
use crate::error::{EngineError, Result};
use crate::Float;

/// Parallel back-end for the node loops, chosen once at configuration time.
///
/// All variants run the same per-node bodies; they differ only in how the
/// loop over nodes is executed. `Accelerator` routes whole phases to the GPU
/// backend instead of host closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plain sequential loops
    #[default]
    Sequential,
    /// Fork-join loops on a dedicated thread pool
    ThreadPool,
    /// Parallel-iterator application over the node sequence
    ParallelFor,
    /// Offload to a GPU compute device
    Accelerator,
}

/// Host-side loop executor built from an [`ExecutionMode`].
///
/// Policies are written against the two primitives below and never against a
/// concrete back-end. Safety of the parallel variants rests on the geometry
/// invariant that node lists carry no duplicate coordinates, so distinct
/// iterations touch disjoint cells.
pub enum Executor {
    Sequential,
    ThreadPool(rayon::ThreadPool),
    ParallelFor,
}

impl Executor {
    /// Build the executor for `mode`. `threads` sizes the dedicated pool and
    /// is ignored by the other modes. In accelerator mode the residual host
    /// work (initializer target evaluation) runs sequentially.
    pub fn new(mode: ExecutionMode, threads: Option<usize>) -> Result<Self> {
        match mode {
            ExecutionMode::Sequential | ExecutionMode::Accelerator => Ok(Self::Sequential),
            ExecutionMode::ParallelFor => Ok(Self::ParallelFor),
            ExecutionMode::ThreadPool => {
                let mut builder = rayon::ThreadPoolBuilder::new();
                if let Some(n) = threads {
                    builder = builder.num_threads(n);
                }
                let pool = builder
                    .build()
                    .map_err(|e| EngineError::InvalidConstruction(format!("thread pool: {e}")))?;
                info!("Built dedicated thread pool with {} threads", pool.current_num_threads());
                Ok(Self::ThreadPool(pool))
            }
        }
    }

    /// Apply `body` to every node descriptor, collecting the per-node results
    /// in list order. The caller scatters the results afterward, so the
    /// parallel variants never write shared state.
    pub fn map_nodes<T, U, F>(&self, nodes: &[T], body: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        match self {
            Self::Sequential => nodes.iter().map(&body).collect(),
            Self::ThreadPool(pool) => pool.install(|| nodes.par_iter().map(&body).collect()),
            Self::ParallelFor => nodes.par_iter().map(&body).collect(),
        }
    }

    /// Apply `body` to each node's own chunk of a node-major tensor. Chunks
    /// are disjoint by construction, which is what makes the parallel
    /// variants race-free.
    pub fn for_each_node<F>(&self, data: &mut [Float], width: usize, body: F)
    where
        F: Fn(usize, &mut [Float]) + Sync + Send,
    {
        match self {
            Self::Sequential => data
                .chunks_mut(width)
                .enumerate()
                .for_each(|(n, chunk)| body(n, chunk)),
            Self::ThreadPool(pool) => pool.install(|| {
                data.par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(n, chunk)| body(n, chunk))
            }),
            Self::ParallelFor => data
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(n, chunk)| body(n, chunk)),
        }
    }

    /// Per-node loop over the two macroscopic tensors together.
    pub fn for_each_moment<F>(&self, density: &mut [Float], velocity: &mut [Float], body: F)
    where
        F: Fn(usize, &mut Float, &mut [Float]) + Sync + Send,
    {
        match self {
            Self::Sequential => density
                .iter_mut()
                .zip(velocity.chunks_mut(2))
                .enumerate()
                .for_each(|(n, (rho, u))| body(n, rho, u)),
            Self::ThreadPool(pool) => pool.install(|| {
                density
                    .par_iter_mut()
                    .zip(velocity.par_chunks_mut(2))
                    .enumerate()
                    .for_each(|(n, (rho, u))| body(n, rho, u))
            }),
            Self::ParallelFor => density
                .par_iter_mut()
                .zip(velocity.par_chunks_mut(2))
                .enumerate()
                .for_each(|(n, (rho, u))| body(n, rho, u)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_nodes_matches_across_modes() {
        let nodes: Vec<usize> = (0..100).collect();
        let body = |n: &usize| (*n as Float).sqrt();

        let seq = Executor::new(ExecutionMode::Sequential, None).unwrap();
        let pool = Executor::new(ExecutionMode::ThreadPool, Some(4)).unwrap();
        let par = Executor::new(ExecutionMode::ParallelFor, None).unwrap();

        let a = seq.map_nodes(&nodes, body);
        let b = pool.map_nodes(&nodes, body);
        let c = par.map_nodes(&nodes, body);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn for_each_node_writes_disjoint_chunks() {
        let mut data = vec![0.0 as Float; 9 * 16];
        let par = Executor::new(ExecutionMode::ParallelFor, None).unwrap();
        par.for_each_node(&mut data, 9, |n, chunk| {
            for (i, v) in chunk.iter_mut().enumerate() {
                *v = (n * 9 + i) as Float;
            }
        });
        for (i, v) in data.iter().enumerate() {
            assert_eq!(*v, i as Float);
        }
    }
}
