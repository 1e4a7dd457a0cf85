pub mod config;
pub mod execution;
pub mod pipeline;
pub mod report;
pub mod selection;
