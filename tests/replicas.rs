mod common;

use std::{num::NonZeroUsize, sync::Arc};

use tokio_util::sync::CancellationToken;

use common::{entries, log, loader, CountingWriter};
use training_engine::{
    comm::master_only,
    data::{InMemoryLoader, ShardSpec},
    engine::TRAIN,
    hooks::{CheckpointHook, EventWriterHook, OptimizerHook},
    launch_replicas,
    model::Linear,
    optimization::GradientDescent,
    Comm, EngineBuilder, EngineErr, LocalComm, StageConfig,
};

const SAMPLES: usize = 16;

fn sharded_loader(comm: &LocalComm) -> InMemoryLoader {
    let inputs = ndarray::Array2::from_shape_fn((SAMPLES, 1), |(i, _)| i as f32 / SAMPLES as f32);
    let targets = inputs.mapv(|x| 2.0 * x + 1.0);
    let batch_size = NonZeroUsize::new(2).unwrap();

    InMemoryLoader::new(inputs, targets, ShardSpec::from_comm(comm), batch_size).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_open_once_across_four_replicas() {
    let (opened, writes) = (log(), log());
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().to_path_buf();

    let (build_opened, build_writes) = (Arc::clone(&opened), Arc::clone(&writes));
    let build = move |comm: LocalComm| {
        let writer = CountingWriter::new(&build_opened, &build_writes);

        EngineBuilder::new(
            Box::new(Linear::new((1, 1), 0.0)),
            Box::new(GradientDescent::new(0.1)),
        )
        .comm(Box::new(comm))
        .stage(StageConfig::new(2))
        .work_dir(&work_dir)
        .data_loader(TRAIN, Box::new(sharded_loader(&comm)))
        .hook(OptimizerHook::default())
        .hook(CheckpointHook::new(1))
        .hook(EventWriterHook::new(1, vec![Box::new(writer)]))
        .build()
    };

    let reports = launch_replicas(NonZeroUsize::new(4).unwrap(), build)
        .await
        .unwrap();

    let ranks: Vec<_> = reports.iter().map(|report| report.rank).collect();
    assert_eq!(ranks, [0, 1, 2, 3]);

    // 16 samples over 4 ranks in batches of 2.
    assert!(reports.iter().all(|report| report.iters == 4 && report.epochs == 2));

    assert_eq!(entries(&opened), [0]);
    assert_eq!(entries(&writes).len(), 4);

    let checkpoints = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(checkpoints, 2);
}

#[tokio::test]
async fn build_failures_surface_from_the_launcher() {
    let build = |_: LocalComm| {
        EngineBuilder::new(
            Box::new(Linear::new((1, 1), 0.0)),
            Box::new(GradientDescent::new(0.1)),
        )
        .data_loader(TRAIN, loader(2, 1))
        .build()
    };

    let err = launch_replicas(NonZeroUsize::new(2).unwrap(), build)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineErr::InvalidConfig(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_replicas_stop_before_training() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let token = cancel.clone();
    let build = move |comm: LocalComm| {
        EngineBuilder::new(
            Box::new(Linear::new((1, 1), 0.0)),
            Box::new(GradientDescent::new(0.1)),
        )
        .comm(Box::new(comm))
        .stage(StageConfig::new(3))
        .data_loader(TRAIN, Box::new(sharded_loader(&comm)))
        .cancel_token(token.clone())
        .build()
    };

    let err = launch_replicas(NonZeroUsize::new(2).unwrap(), build)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineErr::Cancelled { iter: 0 }));
}

#[test]
fn master_only_runs_on_rank_zero() {
    let world = NonZeroUsize::new(4).unwrap();
    let ran: Vec<_> = (0..4)
        .filter_map(|rank| LocalComm::new(rank, world))
        .filter_map(|comm| master_only(&comm, || comm.rank()))
        .collect();

    assert_eq!(ran, [0]);
}
