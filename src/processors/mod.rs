//! Pluggable message processors.
//!
//! A processor is an independent observer of each canonical message. The
//! [`Dispatcher`](crate::pipeline::dispatcher::Dispatcher) hands every
//! message to every registered processor; none of them sees another's output.

pub mod home_automation;
pub mod logging;
pub mod notification;

use async_trait::async_trait;

use crate::error::ProcessorError;
use crate::pipeline::types::CanonicalMessage;

pub use home_automation::HomeAutomationProcessor;
pub use logging::LoggingProcessor;
pub use notification::{EmailNotificationProcessor, NotificationTransport, SmtpNotifier};

/// A unit of message-triggered side effects.
///
/// `process` returns:
/// - `Ok(true)` when the message was handled (or there was nothing to do),
/// - `Ok(false)` for a recoverable failure the processor has already logged,
/// - `Err(_)` for a fault, which the dispatcher logs and isolates.
///
/// Implementations may do arbitrary I/O and must cope with `None` fields.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used for logging and for removal from the registry.
    ///
    /// Defaults to the implementing type's name without its module path.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Handle one message.
    async fn process(&self, message: &CanonicalMessage) -> Result<bool, ProcessorError>;
}

/// `wa_relay::processors::logging::LoggingProcessor` → `LoggingProcessor`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
