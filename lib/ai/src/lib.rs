//! Reply generation for the palaver relay.
//!
//! Two providers produce replies:
//!
//! - **Primary**: a remote OpenAI-compatible chat model
//! - **Fallback**: a scripted persona that never fails
//!
//! [`ResponseOrchestrator`] chooses between them and owns the shared
//! health state.

pub mod backend;
pub mod error;
pub mod llm_call;
pub mod openai;
pub mod orchestrator;
pub mod persona;
pub mod provider;

pub use backend::{LlmBackend, LlmBackendConfig, LlmMessage, LlmProvider, LlmRequest, LlmResponse};
pub use error::{FailureClass, LlmError, PersonaError};
pub use llm_call::{LlmCallResult, LlmInvocationId};
pub use openai::OpenAiBackend;
pub use orchestrator::{
    OrchestratorConfig, ProviderHealth, ProviderState, Reply, ReplySource, ResponseOrchestrator,
};
pub use persona::{Persona, Topic};
pub use provider::{FallbackProvider, PrimaryProvider, PrimarySettings, ResponseProvider};
