pub mod alarm;
pub mod detection;
pub mod pipeline;
pub mod watcher;

pub use crate::domain::model::{Detection, Frame, ScanOutcome, ScanRecord};
pub use crate::domain::ports::{Button, Camera, Indicator, ScanPipeline, Storage};
pub use crate::utils::error::Result;
