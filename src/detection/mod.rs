pub mod config;
pub mod detector;
pub mod peak;

pub use config::DetectorConfig;
pub use detector::{StepCallbacks, StepDetector};
pub use peak::PeakDetector;
