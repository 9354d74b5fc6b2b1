use std::{env, num::NonZeroUsize};

use anyhow::Context;
use log::info;
use ndarray::Array2;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use training_engine::{
    data::{InMemoryLoader, ShardSpec},
    engine::{TRAIN, VAL},
    model::Linear,
    Comm, Engine, EngineBuilder, EngineConfig, EngineErr, LocalComm, ReplicaReport,
};

const DEFAULT_SAMPLES: usize = 1024;
const DEFAULT_BATCH_SIZE: usize = 32;

const DEMO_CONFIG: &str = r#"{
    "work_dir": "work_dirs/demo",
    "optimizer": {"type": "gradient_descent", "lr": 0.05},
    "stages": [
        {"epochs": 3, "warmup": {"policy": "linear", "steps": 10, "ratio": 0.1},
         "validation": {"interval": 1}},
        {"epochs": 2, "lr": 0.01, "lr_schedule": {"policy": "cosine", "min_lr": 0.001},
         "validation": {"interval": 1}}
    ],
    "hooks": [
        {"type": "TimerHook"},
        {"type": "LrUpdaterHook"},
        {"type": "OptimizerHook"},
        {"type": "CheckpointHook"},
        {"type": "EventWriterHook", "interval": 10,
         "writers": [{"type": "CommandLineWriter"}, {"type": "JsonWriter"},
                     {"type": "DashboardWriter", "graph_data_loader": "train"}]}
    ]
}"#;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// `y = 2x + 1` with `x` evenly spread over `[-1, 1]`.
fn dataset(samples: usize) -> (Array2<f32>, Array2<f32>) {
    let step = 2.0 / samples.max(1) as f32;
    let inputs = Array2::from_shape_fn((samples, 1), |(i, _)| -1.0 + step * i as f32);
    let targets = inputs.mapv(|x| 2.0 * x + 1.0);
    (inputs, targets)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => EngineConfig::from_json(DEMO_CONFIG)?,
    };

    let workers = NonZeroUsize::new(env_or("WORKERS", 1)?).context("WORKERS must be positive")?;
    let samples = env_or("SAMPLES", DEFAULT_SAMPLES)?;
    let batch_size = NonZeroUsize::new(env_or("BATCH_SIZE", DEFAULT_BATCH_SIZE)?)
        .context("BATCH_SIZE must be positive")?;
    let resume = env::var("RESUME").ok();

    info!(workers = workers.get(), samples = samples; "starting run");

    let cancel = CancellationToken::new();
    let replica_cancel = cancel.clone();

    let build = move |comm: LocalComm| -> training_engine::Result<Engine> {
        let (inputs, targets) = dataset(samples);
        let shard = ShardSpec::from_comm(&comm);
        let train = InMemoryLoader::new(inputs.clone(), targets.clone(), shard, batch_size)?
            .shuffled(comm.rank() as u64);
        let val = InMemoryLoader::new(inputs, targets, ShardSpec::full(), batch_size)?;

        let model = Box::new(Linear::new((1, 1), 0.0));
        let mut builder = EngineBuilder::from_config(config.clone(), model)?
            .comm(Box::new(comm))
            .data_loader(TRAIN, Box::new(train))
            .data_loader(VAL, Box::new(val))
            .cancel_token(replica_cancel.clone());

        if let Some(path) = &resume {
            builder = builder.resume(path);
        }

        builder.build()
    };

    let run = training_engine::launch_replicas(workers, build);
    tokio::pin!(run);

    let reports = tokio::select! {
        ret = &mut run => ret?,
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, stopping replicas");
            cancel.cancel();

            // Blocking replicas can't be dropped, wait for them to stop at their next step.
            match run.await {
                Ok(reports) => reports,
                Err(EngineErr::Cancelled { iter }) => {
                    info!(iter = iter; "run stopped");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    log_reports(&reports);
    Ok(())
}

fn log_reports(reports: &[ReplicaReport]) {
    for report in reports {
        info!(
            rank = report.rank,
            epochs = report.epochs,
            iters = report.iters;
            "replica done"
        );
    }
}
