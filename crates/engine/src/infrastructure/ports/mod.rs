//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Document storage (could swap the filesystem store for a KV store)
//! - The pub/sub bus (could swap the in-process bus for NATS)
//! - The slow-path interpreter (external service behind HTTP)
//! - The template store (read-only knowledge base)
//! - Auth token verification
//! - Clock (for testing)

mod error;
mod external;
mod store;

pub use error::{AuthError, BusError, InterpreterError, StoreError, TemplateError};
pub use external::{
    AuthPort, BusPort, BusSubscription, ClockPort, Identity, InterpreterPort, RawTemplate,
    SubscriptionClosed, TemplateSource,
};
pub use store::{DocRef, DocumentStore};

#[cfg(test)]
pub use external::{
    MockAuthPort, MockBusPort, MockClockPort, MockInterpreterPort, MockTemplateSource,
};
#[cfg(test)]
pub use store::MockDocumentStore;
