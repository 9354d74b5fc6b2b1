use super::Hook;
use crate::{engine::Engine, error::Result};

/// A lifecycle point the engine dispatches to its hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    BeforeLaunch,
    AfterLaunch,
    BeforeStage,
    AfterStage,
    BeforeTrainEpoch,
    AfterTrainEpoch,
    BeforeValEpoch,
    AfterValEpoch,
    BeforeTrainStep,
    AfterTrainStep,
    BeforeValStep,
    AfterValStep,
}

impl Event {
    pub const ALL: [Event; 12] = [
        Self::BeforeLaunch,
        Self::AfterLaunch,
        Self::BeforeStage,
        Self::AfterStage,
        Self::BeforeTrainEpoch,
        Self::AfterTrainEpoch,
        Self::BeforeValEpoch,
        Self::AfterValEpoch,
        Self::BeforeTrainStep,
        Self::AfterTrainStep,
        Self::BeforeValStep,
        Self::AfterValStep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeLaunch => "before_launch",
            Self::AfterLaunch => "after_launch",
            Self::BeforeStage => "before_stage",
            Self::AfterStage => "after_stage",
            Self::BeforeTrainEpoch => "before_train_epoch",
            Self::AfterTrainEpoch => "after_train_epoch",
            Self::BeforeValEpoch => "before_val_epoch",
            Self::AfterValEpoch => "after_val_epoch",
            Self::BeforeTrainStep => "before_train_step",
            Self::AfterTrainStep => "after_train_step",
            Self::BeforeValStep => "before_val_step",
            Self::AfterValStep => "after_val_step",
        }
    }

    /// Calls the callback matching this event on `hook`.
    pub fn dispatch(self, hook: &mut dyn Hook, engine: &mut Engine) -> Result<()> {
        match self {
            Self::BeforeLaunch => hook.before_launch(engine),
            Self::AfterLaunch => hook.after_launch(engine),
            Self::BeforeStage => hook.before_stage(engine),
            Self::AfterStage => hook.after_stage(engine),
            Self::BeforeTrainEpoch => hook.before_train_epoch(engine),
            Self::AfterTrainEpoch => hook.after_train_epoch(engine),
            Self::BeforeValEpoch => hook.before_val_epoch(engine),
            Self::AfterValEpoch => hook.after_val_epoch(engine),
            Self::BeforeTrainStep => hook.before_train_step(engine),
            Self::AfterTrainStep => hook.after_train_step(engine),
            Self::BeforeValStep => hook.before_val_step(engine),
            Self::AfterValStep => hook.after_val_step(engine),
        }
    }
}
