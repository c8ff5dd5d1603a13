//! Message pipeline.
//!
//! 1. `normalizer::normalize()`: raw webhook message → `CanonicalMessage`
//! 2. store + publish (see `store` and `bus`)
//! 3. `Dispatcher::dispatch()`: fan out to every registered `Processor`

pub mod dispatcher;
pub mod normalizer;
pub mod types;

pub use dispatcher::Dispatcher;
pub use normalizer::{extract_links, find_links, normalize};
pub use types::{CanonicalMessage, MessageType, RawMessage, Sender};
