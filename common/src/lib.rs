pub mod aggregate;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod keysize;
pub mod measure;
pub mod plot;
pub mod record;
pub mod style;
pub mod units;
