mod merge;
mod resolver;
mod store;

pub use merge::merge_batches;
pub use resolver::MemoryResolver;
pub use store::MemoryTableStore;
