pub mod dashboard;
pub mod export;
pub mod file_processor;
pub mod normalizer;
pub mod sheet;
