pub mod use_cases;

pub use use_cases::conversation_service::ConversationStore;
pub use use_cases::orchestrator::{Answer, OrchestratorDeps, Outcome, QueryOrchestrator};
