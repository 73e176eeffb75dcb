pub mod completion;
pub mod conversation_service;
pub mod drink_extractor;
pub mod embedding_service;
pub mod orchestrator;
pub mod prompts;
pub mod query_classifier;
pub mod response_composer;
pub mod retrieval_service;
pub mod sql_generator;
pub mod sql_guard;
pub mod vector_index;
