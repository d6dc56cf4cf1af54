//! Completion backends for Tollgate.
//!
//! Every backend implements [`tollgate_core::Backend`]. The registry builds
//! the ordered remote-then-local list from configuration.

mod http;

pub mod anthropic;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use registry::{BackendRegistry, build_from_config, default_base_url, default_models};
