pub mod controller;
pub mod state;

pub use controller::{StepUpdate, TrackingController, TrackingStarted};
pub use state::{TrackingState, TrackingStatus};
