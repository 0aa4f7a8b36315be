//! A walkthrough of the tabular predictor on toy datasets or a user CSV.

pub mod config;
pub mod toy;
pub mod walkthrough;
