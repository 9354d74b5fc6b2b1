use std::{collections::BTreeMap, fs, path::PathBuf};

use log::warn;
use tokio_util::sync::CancellationToken;

use super::{Checkpoint, Engine, Mode, TRAIN};
use crate::{
    buffer::Buffer,
    comm::{Comm, LocalComm},
    config::{validate_stages, EngineConfig, StageConfig},
    data::DataLoader,
    error::{EngineErr, Result},
    hooks::{HookRegistry, HookSource},
    model::Model,
    optimization::{Optimizer, OptimizerRegistry},
    writers::WriterRegistry,
};

/// Assembles an `Engine` step by step.
pub struct EngineBuilder {
    model: Box<dyn Model>,
    optimizer: Box<dyn Optimizer>,
    data_loaders: BTreeMap<String, Box<dyn DataLoader>>,
    stages: Vec<StageConfig>,
    hooks: Vec<HookSource>,
    hook_registry: Option<HookRegistry>,
    writer_registry: Option<WriterRegistry>,
    comm: Box<dyn Comm>,
    work_dir: Option<PathBuf>,
    buffer_size: Option<usize>,
    resume: Option<PathBuf>,
    cancel: CancellationToken,
}

impl EngineBuilder {
    /// Creates a new `EngineBuilder` for a single process run without stages or hooks.
    pub fn new(model: Box<dyn Model>, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            model,
            optimizer,
            data_loaders: BTreeMap::new(),
            stages: Vec::new(),
            hooks: Vec::new(),
            hook_registry: None,
            writer_registry: None,
            comm: Box::new(LocalComm::single()),
            work_dir: None,
            buffer_size: None,
            resume: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a new `EngineBuilder` out of a config, building its optimizer through the
    /// builtin optimizer registry.
    ///
    /// # Errors
    /// `InvalidConfig` if the config is out of range, or whatever building the optimizer fails
    /// with.
    pub fn from_config(config: EngineConfig, model: Box<dyn Model>) -> Result<Self> {
        config.validate()?;

        let optimizer = OptimizerRegistry::with_builtins()
            .build(&config.optimizer, &model.params().len())?;

        let mut builder = Self::new(model, optimizer)
            .stages(config.stages)
            .buffer_size(config.buffer_size)
            .hooks(config.hooks);

        builder.work_dir = config.work_dir;
        Ok(builder)
    }

    pub fn data_loader(mut self, name: impl Into<String>, loader: Box<dyn DataLoader>) -> Self {
        self.data_loaders.insert(name.into(), loader);
        self
    }

    pub fn stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = StageConfig>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Appends a hook to register, in order, once the engine is built.
    pub fn hook(mut self, hook: impl Into<HookSource>) -> Self {
        self.hooks.push(hook.into());
        self
    }

    pub fn hooks<I, S>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<HookSource>,
    {
        self.hooks.extend(hooks.into_iter().map(Into::into));
        self
    }

    /// Replaces the builtin hook registry used to build hook records.
    pub fn hook_registry(mut self, registry: HookRegistry) -> Self {
        self.hook_registry = Some(registry);
        self
    }

    /// Replaces the builtin writer registry handed to hooks that build writers.
    pub fn writer_registry(mut self, registry: WriterRegistry) -> Self {
        self.writer_registry = Some(registry);
        self
    }

    pub fn comm(mut self, comm: Box<dyn Comm>) -> Self {
        self.comm = comm;
        self
    }

    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Stops the engine before its next step once `token` is cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resumes from the checkpoint at `path` once built.
    pub fn resume(mut self, path: impl Into<PathBuf>) -> Self {
        self.resume = Some(path.into());
        self
    }

    /// Builds the engine, restores the checkpoint if any and registers every hook in order.
    ///
    /// # Errors
    /// `InvalidConfig` for invalid stages, `MissingDataLoader` without a `train` loader, or the
    /// first failure restoring the checkpoint or registering a hook.
    pub fn build(self) -> Result<Engine> {
        validate_stages(&self.stages)?;

        if !self.data_loaders.contains_key(TRAIN) {
            return Err(EngineErr::MissingDataLoader(TRAIN.to_string()));
        }

        if let Some(work_dir) = &self.work_dir {
            fs::create_dir_all(work_dir)?;
        }

        let mut engine = Engine {
            model: self.model,
            optimizer: self.optimizer,
            data_loaders: self.data_loaders,
            hooks: Vec::new(),
            hook_registry: self.hook_registry.unwrap_or_else(HookRegistry::with_builtins),
            writer_registry: self
                .writer_registry
                .unwrap_or_else(WriterRegistry::with_builtins),
            buffer: self.buffer_size.map(Buffer::new).unwrap_or_default(),
            comm: self.comm,
            stages: self.stages,
            work_dir: self.work_dir,
            mode: Mode::Train,
            stage: 0,
            epoch: 0,
            iter: 0,
            iter_in_epoch: 0,
            start_iter: 0,
            dispatching: false,
            cancel: self.cancel,
        };

        if let Some(path) = &self.resume {
            engine.restore(Checkpoint::load(path)?)?;
        }

        if engine.stage >= engine.stages.len() {
            warn!(stage = engine.stage; "every stage already ran, launching will do nothing");
        }

        engine.register_hooks(self.hooks)?;
        Ok(engine)
    }
}
