pub mod llm_service;
pub mod model_client;
pub mod request_store;
pub mod sanitizer;

pub use llm_service::LlmService;
pub use model_client::ModelClient;
pub use request_store::RequestStore;
pub use sanitizer::{parse_questions, sanitize};
