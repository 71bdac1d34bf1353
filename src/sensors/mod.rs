//! Platform sensor surfaces consumed by the step sources.
//!
//! Sensor streams are explicit subscriptions: the producer side pushes through
//! a [`SubscriptionSender`], the consumer reads from a [`Subscription`], and a
//! cloneable [`SubscriptionHandle`] removes the subscription from anywhere.

pub mod scripted;
mod subscription;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::models::AccelerationSample;

pub use scripted::{synthetic_walk, ScriptedAccelerometer, ScriptedPedometer};
pub use subscription::{subscription_channel, Subscription, SubscriptionHandle, SubscriptionSender};

/// Raw 3-axis accelerometer.
pub trait Accelerometer: Send + Sync {
    fn set_update_interval(&self, interval: Duration);

    /// Fails when the platform refuses access (e.g. permission denied).
    fn subscribe(&self) -> Result<Subscription<AccelerationSample>>;
}

/// Native step counter exposed by the host OS.
#[async_trait]
pub trait Pedometer: Send + Sync {
    async fn is_available(&self) -> Result<bool>;

    async fn get_step_count(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<u32>;

    /// Streams cumulative step counts since the watch began.
    fn watch_step_count(&self) -> Result<Subscription<u32>>;
}
