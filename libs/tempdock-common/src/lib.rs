pub mod config;
pub mod interval;
pub mod types;
