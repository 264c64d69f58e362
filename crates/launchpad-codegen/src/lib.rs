//! launchpad-codegen — produces app files.
//!
//! Two sources: [`scaffold`] returns the fixed starting files of a template,
//! and a [`CodeGenerator`] streams model output as [`GenerationEvent`]s,
//! ending in `Complete` with every file extracted from the response.

pub mod anthropic;
pub mod error;
pub mod extract;
pub mod generator;
pub mod prompt;
pub mod scaffold;
pub mod sse;

pub use anthropic::AnthropicGenerator;
pub use error::{GenerationError, GenerationResult};
pub use extract::FileExtractor;
pub use generator::{CodeGenerator, GenerationEvent, GenerationRequest};
pub use scaffold::scaffold;
