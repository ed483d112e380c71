mod data_type;
mod data_type_arrow;
mod data_type_sql;

pub use data_type::*;
pub use data_type_sql::{parse_data_type, parse_schema};
