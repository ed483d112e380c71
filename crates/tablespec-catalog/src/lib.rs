pub mod database_spec;
pub mod diff;
pub mod error;
pub mod name;
pub mod normalize;
pub mod provider;
pub mod statement;
pub mod table_spec;
pub mod temp_view;
pub mod utils;
