pub mod conversation;
pub mod customer;
pub mod drink;
pub mod error;
pub mod llm_config;
pub mod query;
pub mod retrieval;
