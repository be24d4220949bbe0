mod controller;
mod loop_worker;
mod source;

pub use controller::SensingController;
pub use loop_worker::{SensingUpdate, SAMPLE_INTERVAL};
pub use source::{Detection, FocusReading, FocusSignalSource, Posture, SimulatedDetector};
