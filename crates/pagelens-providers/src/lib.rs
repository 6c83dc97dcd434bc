pub mod client;
pub mod gemini;
pub mod openai;
pub mod providers;

pub use client::{ChatBackend, ProviderClient};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use providers::{ChatPrompt, LlmProvider, TextStream};
