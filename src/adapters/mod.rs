// Adapters layer: concrete implementations for external systems (LLM API, storage).

pub mod openai;
pub mod storage;

pub use openai::OpenAiClient;
pub use storage::LocalStorage;
