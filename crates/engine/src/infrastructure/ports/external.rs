//! External service ports: bus, interpreter, template store, auth, clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use wayfinder_shared::CommandResult;

use super::error::{AuthError, BusError, InterpreterError, TemplateError};

// =============================================================================
// Pub/Sub Bus
// =============================================================================

/// Why a subscription stopped yielding payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionClosed {
    /// The subscriber fell behind and missed `0` or more payloads; the
    /// connection must be torn down rather than silently dropping deltas.
    Lagged(u64),
    /// The bus side was dropped.
    Closed,
}

/// A live subscription to one subject. FIFO per subject, at-most-once.
pub struct BusSubscription {
    receiver: broadcast::Receiver<String>,
}

impl BusSubscription {
    pub fn new(receiver: broadcast::Receiver<String>) -> Self {
        Self { receiver }
    }

    /// The next payload published on the subject.
    pub async fn next(&mut self) -> Result<String, SubscriptionClosed> {
        match self.receiver.recv().await {
            Ok(payload) => Ok(payload),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                Err(SubscriptionClosed::Lagged(missed))
            }
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionClosed::Closed),
        }
    }
}

/// The pub/sub bus carrying serialized delta messages.
///
/// Publication is best-effort: a failed publish never rolls back the state
/// write that produced it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusPort: Send + Sync {
    async fn publish(&self, subject: &str, payload: String) -> Result<(), BusError>;
    fn subscribe(&self, subject: &str) -> BusSubscription;
}

// =============================================================================
// Slow-Path Interpreter
// =============================================================================

/// The external interpreter handling actions no fast handler claims.
///
/// Inside the core it is just another handler; transport and latency are
/// details of the adapter. Calls may take tens of seconds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterpreterPort: Send + Sync {
    async fn interpret(
        &self,
        user_id: &str,
        experience: &str,
        command: &Value,
    ) -> Result<CommandResult, InterpreterError>;
}

// =============================================================================
// Template Store (read-only knowledge base)
// =============================================================================

/// A template as parsed from the knowledge base: frontmatter fields plus
/// named body sections, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTemplate {
    pub frontmatter: Map<String, Value>,
    pub sections: Vec<(String, String)>,
}

/// Read-only access to the knowledge-base file tree. The core never writes
/// to this store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn read_template(
        &self,
        experience: &str,
        entity_type: &str,
        template_id: &str,
    ) -> Result<RawTemplate, TemplateError>;
}

// =============================================================================
// Auth
// =============================================================================

/// A verified identity, cached for the connection lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

/// Bearer-token verification at connect time.
#[cfg_attr(test, mockall::automock)]
pub trait AuthPort: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

// =============================================================================
// Clock
// =============================================================================

/// Wall clock, injected so tests can control version stamps.
#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
