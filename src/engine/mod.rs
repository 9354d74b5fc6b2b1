mod builder;
mod checkpoint;

use std::{collections::BTreeMap, mem, path::Path, path::PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use builder::EngineBuilder;
pub use checkpoint::Checkpoint;

use crate::{
    buffer::Buffer,
    comm::Comm,
    config::StageConfig,
    data::DataLoader,
    error::{EngineErr, Result},
    hooks::{Event, Hook, HookRegistry, HookSource},
    model::{Batch, Model},
    optimization::Optimizer,
    registry::build_object,
    writers::WriterRegistry,
};

/// Name of the loader iterated by training epochs.
pub const TRAIN: &str = "train";

/// Name of the loader iterated by validation epochs.
pub const VAL: &str = "val";

/// Whether the engine is currently training or validating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Val,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }

    /// The name of the loader this mode iterates.
    pub fn loader(&self) -> &'static str {
        match self {
            Self::Train => TRAIN,
            Self::Val => VAL,
        }
    }
}

/// Drives a model through stages, epochs and steps, calling every registered hook at each
/// lifecycle point.
///
/// Hooks get `&mut Engine` so they can read the counters, write into the buffer, step the
/// optimizer or tweak learning rates.
pub struct Engine {
    model: Box<dyn Model>,
    optimizer: Box<dyn Optimizer>,
    data_loaders: BTreeMap<String, Box<dyn DataLoader>>,
    hooks: Vec<Box<dyn Hook>>,
    hook_registry: HookRegistry,
    writer_registry: WriterRegistry,
    buffer: Buffer,
    comm: Box<dyn Comm>,
    stages: Vec<StageConfig>,
    work_dir: Option<PathBuf>,
    mode: Mode,
    stage: usize,
    epoch: usize,
    iter: usize,
    iter_in_epoch: usize,
    start_iter: usize,
    dispatching: bool,
    cancel: CancellationToken,
}

impl Engine {
    /// The current stage's index, the amount of completed stages between stages.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Amount of completed training epochs across all stages.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Amount of completed training steps across all stages.
    pub fn iter(&self) -> usize {
        self.iter
    }

    /// Amount of completed training steps in the current epoch.
    pub fn iter_in_epoch(&self) -> usize {
        self.iter_in_epoch
    }

    /// The `iter` the engine was launched or resumed at.
    pub fn start_iter(&self) -> usize {
        self.start_iter
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    /// The running stage's config, `None` once every stage is done.
    pub fn current_stage(&self) -> Option<&StageConfig> {
        self.stages.get(self.stage)
    }

    pub fn max_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn max_epochs(&self) -> usize {
        self.stages.iter().map(|stage| stage.epochs).sum()
    }

    /// Amount of batches in a training epoch.
    pub fn epoch_len(&self) -> usize {
        self.data_loaders.get(TRAIN).map_or(0, |loader| loader.len())
    }

    pub fn max_iters(&self) -> usize {
        self.max_epochs() * self.epoch_len()
    }

    /// Amount of completed training epochs in the current stage.
    pub fn epoch_in_stage(&self) -> usize {
        let before: usize = self.stages[..self.stage.min(self.stages.len())]
            .iter()
            .map(|stage| stage.epochs)
            .sum();

        self.epoch.saturating_sub(before)
    }

    /// Amount of completed training steps in the current stage.
    pub fn iter_in_stage(&self) -> usize {
        self.epoch_in_stage() * self.epoch_len() + self.iter_in_epoch
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn optimizer_mut(&mut self) -> &mut dyn Optimizer {
        self.optimizer.as_mut()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn comm(&self) -> &dyn Comm {
        self.comm.as_ref()
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn data_loader(&self, name: &str) -> Option<&dyn DataLoader> {
        self.data_loaders.get(name).map(|loader| loader.as_ref())
    }

    pub fn data_loader_mut(&mut self, name: &str) -> Option<&mut (dyn DataLoader + 'static)> {
        self.data_loaders.get_mut(name).map(|loader| loader.as_mut())
    }

    /// Names of the registered hooks, in dispatch order.
    pub fn hooks(&self) -> impl Iterator<Item = &str> + '_ {
        self.hooks.iter().map(|hook| hook.name())
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.iter().any(|hook| hook.name() == name)
    }

    /// Registers a hook, built from its record if needed, and calls its `on_register`.
    ///
    /// # Args
    /// * `hook` - The hook or the record to build it from.
    /// * `before` - Name of an already registered hook to insert in front of, appended when
    ///   `None`.
    ///
    /// # Errors
    /// `DuplicateHook` if a hook with the same name exists, `HookNotFound` if `before` doesn't
    /// name a registered hook, or whatever building or `on_register` fails with. The hook list
    /// is left untouched on error.
    pub fn register_hook(&mut self, hook: impl Into<HookSource>, before: Option<&str>) -> Result<()> {
        if self.dispatching {
            return Err(EngineErr::InvalidConfig(
                "hooks can't be registered while an event is being dispatched".into(),
            ));
        }

        let mut hook = build_object(hook.into(), &self.hook_registry, &self.writer_registry)?;
        let name = hook.name().to_string();

        if self.has_hook(&name) {
            return Err(EngineErr::DuplicateHook(name));
        }

        let idx = match before {
            Some(other) => self
                .hooks
                .iter()
                .position(|hook| hook.name() == other)
                .ok_or_else(|| EngineErr::HookNotFound(other.to_string()))?,
            None => self.hooks.len(),
        };

        hook.on_register(self)?;
        self.hooks.insert(idx, hook);

        debug!(hook = name.as_str(), position = idx; "registered hook");
        Ok(())
    }

    /// Registers every hook in order, stopping at the first failure.
    pub fn register_hooks<I, S>(&mut self, hooks: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<HookSource>,
    {
        hooks
            .into_iter()
            .try_for_each(|hook| self.register_hook(hook, None))
    }

    /// Calls `event` on every hook in registration order.
    fn fire(&mut self, event: Event) -> Result<()> {
        let mut hooks = mem::take(&mut self.hooks);
        self.dispatching = true;

        let res = hooks
            .iter_mut()
            .try_for_each(|hook| event.dispatch(hook.as_mut(), self));

        self.dispatching = false;
        self.hooks = hooks;
        res
    }

    /// Records every output of a forward pass, weighted by the batch size.
    fn record_output(&mut self, batch: &Batch) -> Result<()> {
        let output = self.model.forward(batch)?;
        let weight = batch.len() as f64;

        for (key, record) in output {
            self.buffer.record_weighted(&key, record, weight);
        }

        Ok(())
    }

    /// Runs a training step over `batch`.
    pub fn train_step(&mut self, batch: &Batch) -> Result<()> {
        self.fire(Event::BeforeTrainStep)?;
        self.record_output(batch)?;
        self.fire(Event::AfterTrainStep)?;

        self.iter += 1;
        self.iter_in_epoch += 1;
        Ok(())
    }

    /// Runs a validation step over `batch`. Doesn't advance any counter.
    pub fn val_step(&mut self, batch: &Batch) -> Result<()> {
        self.fire(Event::BeforeValStep)?;
        self.record_output(batch)?;
        self.fire(Event::AfterValStep)
    }

    fn prepare_loader(&mut self, name: &str) -> Result<()> {
        let epoch = self.epoch;
        let loader = self
            .data_loaders
            .get_mut(name)
            .ok_or_else(|| EngineErr::MissingDataLoader(name.to_string()))?;

        loader.set_epoch(epoch);
        loader.reset();
        Ok(())
    }

    fn next_batch(&mut self, name: &str) -> Option<Batch> {
        self.data_loaders.get_mut(name)?.next_batch()
    }

    /// Fails with `Cancelled` once the engine's token is cancelled.
    fn ensure_running(&self) -> Result<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }

        warn!(iter = self.iter, mode = self.mode.as_str(); "run cancelled");
        Err(EngineErr::Cancelled { iter: self.iter })
    }

    /// The token that stops this engine before its next step once cancelled.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs a full pass over the `train` loader.
    ///
    /// # Errors
    /// `MissingDataLoader` if there's no `train` loader, `Cancelled` if the token is cancelled
    /// before a step, or whatever a step fails with.
    pub fn train_epoch(&mut self) -> Result<()> {
        self.model.train();
        self.mode = Mode::Train;
        self.iter_in_epoch = 0;
        self.prepare_loader(TRAIN)?;

        self.fire(Event::BeforeTrainEpoch)?;
        while let Some(batch) = self.next_batch(TRAIN) {
            self.ensure_running()?;
            self.train_step(&batch)?;
        }
        self.fire(Event::AfterTrainEpoch)?;

        self.epoch += 1;
        Ok(())
    }

    /// Runs a full pass over the `val` loader. Doesn't advance any counter.
    ///
    /// # Errors
    /// `MissingDataLoader` if there's no `val` loader, or whatever a step fails with.
    pub fn val_epoch(&mut self) -> Result<()> {
        self.model.eval();
        self.mode = Mode::Val;
        self.prepare_loader(VAL)?;

        self.fire(Event::BeforeValEpoch)?;
        while let Some(batch) = self.next_batch(VAL) {
            self.ensure_running()?;
            self.val_step(&batch)?;
        }
        self.fire(Event::AfterValEpoch)
    }

    /// Runs the current stage's remaining epochs, validating every `validation.interval`
    /// epochs when there's a `val` loader.
    ///
    /// # Errors
    /// `InvalidConfig` if every stage already ran.
    pub fn train_stage(&mut self) -> Result<()> {
        let stage = self.current_stage().cloned().ok_or_else(|| {
            EngineErr::InvalidConfig(format!("all {} stages already ran", self.stages.len()))
        })?;

        info!(stage = self.stage, epochs = stage.epochs; "starting stage");
        self.fire(Event::BeforeStage)?;

        while self.epoch_in_stage() < stage.epochs {
            self.train_epoch()?;

            let validate = stage
                .validation
                .as_ref()
                .is_some_and(|val| self.epoch_in_stage() % val.interval == 0);

            if validate && self.data_loaders.contains_key(VAL) {
                self.val_epoch()?;
            }
        }

        self.fire(Event::AfterStage)?;
        self.stage += 1;
        Ok(())
    }

    /// Runs every remaining stage. A resumed engine picks up where its checkpoint left off.
    pub fn launch(&mut self) -> Result<()> {
        self.start_iter = self.iter;

        info!(
            rank = self.comm.rank(),
            world_size = self.comm.world_size(),
            stages = self.stages.len(),
            start_iter = self.start_iter;
            "launching engine"
        );

        self.fire(Event::BeforeLaunch)?;
        while self.stage < self.stages.len() {
            self.train_stage()?;
        }
        self.fire(Event::AfterLaunch)?;

        info!(iters = self.iter, epochs = self.epoch; "engine finished");
        Ok(())
    }

    /// Updates the model's parameters with its last gradients.
    ///
    /// # Args
    /// * `max_norm` - Rescales the gradient to this L2 norm when it's larger.
    ///
    /// # Returns
    /// The gradient's L2 norm before clipping.
    pub fn step_optimizer(&mut self, max_norm: Option<f32>) -> Result<f32> {
        let (params, grads) = self.model.params_and_grads();
        let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();

        match max_norm {
            Some(max) if norm > max && norm > 0.0 => {
                let scale = max / norm;
                let clipped: Vec<f32> = grads.iter().map(|g| g * scale).collect();
                self.optimizer.update_params(&clipped, params)?;
            }
            _ => self.optimizer.update_params(grads, params)?,
        }

        Ok(norm)
    }

    /// Captures the state needed to resume training once the running epoch completes.
    pub fn checkpoint(&self, with_optimizer: bool) -> Checkpoint {
        let epoch = self.epoch + 1;
        let stage_done = self
            .current_stage()
            .is_some_and(|stage| self.epoch_in_stage() + 1 >= stage.epochs);

        Checkpoint {
            stage: self.stage + usize::from(stage_done),
            epoch,
            iter: self.iter,
            params: self.model.params().to_vec(),
            optimizer: with_optimizer.then(|| self.optimizer.param_groups().to_vec()),
            optimizer_state: if with_optimizer {
                self.optimizer.state().to_vec()
            } else {
                Vec::new()
            },
        }
    }

    /// Loads `checkpoint`'s counters, parameters and optimizer groups and state.
    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.model.load_params(&checkpoint.params)?;

        if let Some(groups) = checkpoint.optimizer {
            let current = self.optimizer.param_groups_mut();
            if groups.len() != current.len() {
                return Err(EngineErr::SizeMismatch {
                    what: "optimizer param groups",
                    got: groups.len(),
                    expected: current.len(),
                });
            }
            current.clone_from_slice(&groups);
            self.optimizer.load_state(&checkpoint.optimizer_state)?;
        }

        self.stage = checkpoint.stage;
        self.epoch = checkpoint.epoch;
        self.iter = checkpoint.iter;
        self.start_iter = checkpoint.iter;
        self.iter_in_epoch = 0;

        info!(stage = self.stage, epoch = self.epoch, iter = self.iter; "resumed from checkpoint");
        Ok(())
    }
}
