pub mod catalog;
pub mod executor;
pub mod schema;
pub mod sqlite;
