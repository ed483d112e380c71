pub mod config;
pub mod error;
pub mod spec;
pub mod string;
