#![allow(dead_code)]

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use ndarray::Array2;

use training_engine::{
    data::{DataLoader, InMemoryLoader, ShardSpec},
    engine::{TRAIN, VAL},
    model::Linear,
    optimization::GradientDescent,
    writers::{DashboardBackend, DashboardEvent, Writer},
    Engine, EngineBuilder, Hook, Result, StageConfig,
};

pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

/// `samples` rows of `y = 2x + 1` over `[0, 1)`.
pub fn loader(samples: usize, batch_size: usize) -> Box<dyn DataLoader> {
    let inputs = Array2::from_shape_fn((samples, 1), |(i, _)| i as f32 / samples as f32);
    let targets = inputs.mapv(|x| 2.0 * x + 1.0);
    let batch_size = NonZeroUsize::new(batch_size).unwrap();

    Box::new(InMemoryLoader::new(inputs, targets, ShardSpec::full(), batch_size).unwrap())
}

/// An engine over `samples` samples, one per batch, without stages.
pub fn bare(samples: usize) -> EngineBuilder {
    EngineBuilder::new(
        Box::new(Linear::new((1, 1), 0.0)),
        Box::new(GradientDescent::new(0.1)),
    )
    .data_loader(TRAIN, loader(samples, 1))
}

/// A single stage engine over `samples` samples, one per batch.
pub fn builder(samples: usize, epochs: usize) -> EngineBuilder {
    bare(samples).stage(StageConfig::new(epochs))
}

pub fn with_val(builder: EngineBuilder, samples: usize) -> EngineBuilder {
    builder.data_loader(VAL, loader(samples, 1))
}

/// Logs `<name>:<event>` for every callback.
pub struct Recorder {
    name: String,
    log: Log<String>,
}

impl Recorder {
    pub fn new(name: &str, log: &Log<String>) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }

    fn push(&self, event: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{event}", self.name));
        Ok(())
    }
}

impl Hook for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_launch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_launch")
    }

    fn after_launch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_launch")
    }

    fn before_stage(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_stage")
    }

    fn after_stage(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_stage")
    }

    fn before_train_epoch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_train_epoch")
    }

    fn after_train_epoch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_train_epoch")
    }

    fn before_val_epoch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_val_epoch")
    }

    fn after_val_epoch(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_val_epoch")
    }

    fn before_train_step(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_train_step")
    }

    fn after_train_step(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_train_step")
    }

    fn before_val_step(&mut self, _: &mut Engine) -> Result<()> {
        self.push("before_val_step")
    }

    fn after_val_step(&mut self, _: &mut Engine) -> Result<()> {
        self.push("after_val_step")
    }
}

/// Runs a closure after every training step.
pub struct Probe<F> {
    name: &'static str,
    f: F,
}

impl<F> Probe<F>
where
    F: FnMut(&mut Engine) -> Result<()> + Send,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Hook for Probe<F>
where
    F: FnMut(&mut Engine) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn after_train_step(&mut self, engine: &mut Engine) -> Result<()> {
        (self.f)(engine)
    }
}

/// Logs the 1-based step of the epoch on every write, and the loss series length.
pub struct CountingWriter {
    pub opened: Log<usize>,
    pub writes: Log<(usize, usize)>,
}

impl CountingWriter {
    pub fn new(opened: &Log<usize>, writes: &Log<(usize, usize)>) -> Self {
        Self {
            opened: Arc::clone(opened),
            writes: Arc::clone(writes),
        }
    }
}

impl Writer for CountingWriter {
    fn open(&mut self, engine: &mut Engine) -> Result<()> {
        self.opened.lock().unwrap().push(engine.comm().rank());
        Ok(())
    }

    fn write(&mut self, engine: &Engine, _window: usize) -> Result<()> {
        let loss_len = engine.buffer().len("loss");
        self.writes
            .lock()
            .unwrap()
            .push((engine.iter_in_epoch() + 1, loss_len));
        Ok(())
    }
}

/// Keeps every dashboard event in memory.
pub struct MemoryBackend {
    events: Log<DashboardEvent>,
}

impl MemoryBackend {
    pub fn new(events: &Log<DashboardEvent>) -> Self {
        Self {
            events: Arc::clone(events),
        }
    }
}

impl DashboardBackend for MemoryBackend {
    fn emit(&mut self, event: DashboardEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
