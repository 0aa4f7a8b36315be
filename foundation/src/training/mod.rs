mod budget;
mod fine_tuner;

pub use budget::Budget;
pub use fine_tuner::{FineTuner, Objective, TuneStats};
