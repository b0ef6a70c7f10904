//! Fast handlers: deterministic per-action logic.
//!
//! Each handler bootstraps the player view if absent and reads/writes state
//! exclusively through the state manager.

mod admin;
mod items;
mod movement;

pub use admin::AdminRouter;
pub use items::{CollectItem, DropItem, Inventory};
pub use movement::Go;
