mod check;
mod staging;
mod statement;

pub use check::*;
pub use staging::*;
pub use statement::*;
