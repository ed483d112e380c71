mod resolver;
mod store;

pub use resolver::*;
pub use store::*;
