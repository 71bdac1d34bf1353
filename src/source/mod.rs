//! Unified step-increment stream over the native pedometer and the software
//! peak detector.

pub mod adapter;
pub mod history;
pub mod native;
pub mod software;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{SourceKind, StepIncrement};

pub use adapter::PlatformStepAdapter;
pub use native::{NativeIncrementTracker, NativeStepSource};
pub use software::SoftwareStepSource;

pub type IncrementSink = mpsc::UnboundedSender<StepIncrement>;
pub type IncrementStream = mpsc::UnboundedReceiver<StepIncrement>;

/// Which sources run when a native counter is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourcePolicy {
    /// Software detector always runs; native increments are added on top.
    /// Steps are not deduplicated across the two sources.
    #[default]
    Combined,
    /// Only the native counter runs when available, software otherwise.
    PreferNativeOnly,
}

/// One strategy for producing step increments, selected at session start.
pub trait StepSource: Send {
    fn kind(&self) -> SourceKind;

    fn start(&mut self, initial_steps: u32, sink: IncrementSink) -> Result<()>;

    /// Idempotent.
    fn stop(&mut self);

    fn reset(&mut self, count: u32);

    fn is_active(&self) -> bool;
}
