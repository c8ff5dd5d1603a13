//! Processor registry and fan-out dispatch.
//!
//! Every canonical message goes to every registered processor, one at a
//! time, in registration order. A processor that declines, errors, or panics
//! is logged and skipped past; its siblings always run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::SmtpConfig;
use crate::error::ProcessorError;
use crate::pipeline::types::CanonicalMessage;
use crate::processors::{EmailNotificationProcessor, LoggingProcessor, Processor};

/// Outcome of one processor invocation.
#[derive(Debug)]
pub enum Invocation {
    /// `process` returned `true`.
    Handled,
    /// `process` returned `false`; the processor already logged why.
    Declined,
    /// `process` returned an error or panicked.
    Faulted(ProcessorError),
}

/// Ordered registry of processors plus the broadcast loop.
pub struct Dispatcher {
    processors: RwLock<Vec<Arc<dyn Processor>>>,
}

impl Dispatcher {
    /// Create a dispatcher with no processors.
    pub fn new() -> Self {
        Self::with_processors(Vec::new())
    }

    /// Create a dispatcher with the given processors, in order.
    pub fn with_processors(processors: Vec<Arc<dyn Processor>>) -> Self {
        info!(
            count = processors.len(),
            processors = %join_names(&processors),
            "Dispatcher initialized"
        );
        Self {
            processors: RwLock::new(processors),
        }
    }

    /// Create a dispatcher with the default set: email notification, then logging.
    pub fn with_defaults(smtp: SmtpConfig) -> Self {
        let processors: Vec<Arc<dyn Processor>> = vec![
            Arc::new(EmailNotificationProcessor::smtp(smtp)),
            Arc::new(LoggingProcessor::new()),
        ];
        Self::with_processors(processors)
    }

    /// Append a processor. Names are not required to be unique.
    pub async fn register(&self, processor: Arc<dyn Processor>) {
        let name = processor.name().to_string();
        self.processors.write().await.push(processor);
        info!(processor = %name, "Registered processor");
    }

    /// Remove the first processor named `name`. Returns whether one was found.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut processors = self.processors.write().await;
        match processors.iter().position(|p| p.name() == name) {
            Some(index) => {
                processors.remove(index);
                info!(processor = %name, "Removed processor");
                true
            }
            None => {
                debug!(processor = %name, "Processor not found");
                false
            }
        }
    }

    /// Names of the registered processors, in order.
    pub async fn names(&self) -> Vec<String> {
        self.processors
            .read()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Number of registered processors.
    pub async fn len(&self) -> usize {
        self.processors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.processors.read().await.is_empty()
    }

    /// Hand `message` to every processor registered at call time.
    ///
    /// Never fails: declines and faults are logged per processor and the
    /// loop moves on to the next one.
    pub async fn dispatch(&self, message: &CanonicalMessage) {
        let snapshot: Vec<Arc<dyn Processor>> = self.processors.read().await.clone();
        debug!(
            message_id = %message.message_id,
            processors = snapshot.len(),
            "Dispatching message"
        );

        for processor in &snapshot {
            match invoke(processor.as_ref(), message).await {
                Invocation::Handled => {
                    debug!(processor = %processor.name(), message_id = %message.message_id, "Processed");
                }
                Invocation::Declined => {
                    warn!(
                        processor = %processor.name(),
                        message_id = %message.message_id,
                        "Processing returned failure"
                    );
                }
                Invocation::Faulted(e) => {
                    error!(
                        processor = %processor.name(),
                        message_id = %message.message_id,
                        error = %e,
                        "Error during processing"
                    );
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one processor, converting errors and panics into [`Invocation::Faulted`].
pub async fn invoke(processor: &dyn Processor, message: &CanonicalMessage) -> Invocation {
    match AssertUnwindSafe(processor.process(message))
        .catch_unwind()
        .await
    {
        Ok(Ok(true)) => Invocation::Handled,
        Ok(Ok(false)) => Invocation::Declined,
        Ok(Err(e)) => Invocation::Faulted(e),
        Err(panic) => Invocation::Faulted(ProcessorError::Panicked {
            name: processor.name().to_string(),
            reason: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn join_names(processors: &[Arc<dyn Processor>]) -> String {
    processors
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(", ")
}
