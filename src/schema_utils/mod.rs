pub mod schema;
pub mod sql_import;
