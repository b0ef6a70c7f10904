//! Use cases: the subsystems behind the WebSocket surface.

pub mod aoi;
pub mod deltas;
pub mod dispatch;
pub mod handlers;
pub mod state;
pub mod templates;

pub use aoi::AoiBuilder;
pub use deltas::{DeltaBuilder, DocKind};
pub use dispatch::{CommandContext, CommandDispatcher, FastHandler};
pub use state::{ResetOutcome, StateError, StateManager, UpdateOutcome};
pub use templates::TemplateResolver;
