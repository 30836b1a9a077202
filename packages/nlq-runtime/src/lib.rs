//! Request pipeline: translation, execution, answer composition and the
//! orchestrator that sequences them.

pub mod composer;
pub mod envelope;
pub mod executor;
pub mod orchestrator;
pub mod retry;
pub mod translator;

#[cfg(test)]
pub(crate) mod testing;

pub use composer::{AnswerComposer, Composition, CompositionMethod};
pub use envelope::ResponseEnvelope;
pub use executor::QueryExecutor;
pub use orchestrator::{Orchestrator, RequestError, RequestOutcome, RequestState};
pub use translator::{Confidence, QueryTranslator, TranslationResult};
