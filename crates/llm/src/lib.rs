//! Answer generation: LLM providers, grounded prompts, and the RAG chain.

pub mod chain;
pub mod classify;
pub mod generator;
pub mod prompt;
pub mod provider;
pub mod providers;

pub use chain::{ChainResponse, Faithfulness, QueryRequest, RagChain, Verdict, NO_CONTEXT_ANSWER};
pub use classify::{classify, ErrorKind};
pub use generator::{create_generator, GeneratedAnswer, GenerationFailure, Generator};
pub use prompt::PromptBuilder;
pub use provider::{LlmError, LlmProvider, Message, Role};
pub use providers::{create_provider, GeneratorProvider};
