pub mod arch;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod optimization;
pub mod problem;
pub mod training;

pub use error::{MlErr, Result};
