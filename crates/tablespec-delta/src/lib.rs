pub mod error;
pub mod handle;
pub mod merge;
pub mod options;
pub mod stream;
pub mod upsert;
