//! Runs one engine replica per rank on tokio's blocking pool.

use std::{num::NonZeroUsize, sync::Arc};

use log::{info, warn};
use tokio::task::{self, JoinHandle};

use crate::{
    comm::{Comm, LocalComm},
    engine::Engine,
    error::{EngineErr, Result},
};

/// Where a replica ended up once its engine finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaReport {
    pub rank: usize,
    pub epochs: usize,
    pub iters: usize,
}

/// Builds and launches `world_size` engines, one per rank, and waits for all of them.
///
/// # Args
/// * `world_size` - Amount of replicas to run.
/// * `build` - Builds the engine of a replica given its comm.
///
/// # Returns
/// Every replica's report ordered by rank.
///
/// # Errors
/// The failure of the lowest failing rank, building or training, or `Replica` if it panicked.
pub async fn launch_replicas<F>(world_size: NonZeroUsize, build: F) -> Result<Vec<ReplicaReport>>
where
    F: Fn(LocalComm) -> Result<Engine> + Send + Sync + 'static,
{
    let build = Arc::new(build);

    let handles: Vec<(usize, JoinHandle<Result<ReplicaReport>>)> = (0..world_size.get())
        .filter_map(|rank| LocalComm::new(rank, world_size))
        .map(|comm| {
            let build = Arc::clone(&build);
            let handle = task::spawn_blocking(move || run_replica(comm, build.as_ref()));
            (comm.rank(), handle)
        })
        .collect();

    info!(world_size = world_size.get(); "spawned replicas");

    let mut reports = Vec::with_capacity(handles.len());
    for (rank, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report?),
            Err(e) => {
                warn!(rank = rank; "replica task failed: {e}");
                return Err(EngineErr::Replica {
                    rank,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(reports)
}

fn run_replica<F>(comm: LocalComm, build: &F) -> Result<ReplicaReport>
where
    F: Fn(LocalComm) -> Result<Engine>,
{
    let mut engine = build(comm)?;
    engine.launch()?;

    Ok(ReplicaReport {
        rank: comm.rank(),
        epochs: engine.epoch(),
        iters: engine.iter(),
    })
}
