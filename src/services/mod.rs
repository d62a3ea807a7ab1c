pub mod baseline;
pub mod data_processor;
pub mod detector;
pub mod insights;
pub mod stats;
pub mod synthesizer;
