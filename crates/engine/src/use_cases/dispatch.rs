//! Command dispatching.
//!
//! A registry of fast handlers keyed by action name, an admin sub-router
//! for `@`-prefixed actions, and the external interpreter as the fallback
//! for everything else. Whatever the route, the caller gets a uniform
//! [`CommandResult`]; handler failures are values, never exceptions
//! crossing this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use wayfinder_shared::CommandResult;

use crate::infrastructure::ports::{InterpreterError, InterpreterPort};

use super::handlers::AdminRouter;

/// Everything a handler needs about one command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user_id: String,
    pub experience: String,
    /// The full command object, `action` included.
    pub data: Value,
}

impl CommandContext {
    /// A required string field of the command.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// A deterministic in-process handler. Fast handlers complete without
/// external network I/O (state manager and pub/sub aside) and must be
/// idempotent on validation errors.
#[async_trait]
pub trait FastHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> CommandResult;
}

pub struct CommandDispatcher {
    handlers: HashMap<String, Arc<dyn FastHandler>>,
    admin: Arc<AdminRouter>,
    interpreter: Option<Arc<dyn InterpreterPort>>,
}

impl CommandDispatcher {
    pub fn new(
        admin: Arc<AdminRouter>,
        interpreter: Option<Arc<dyn InterpreterPort>>,
    ) -> Self {
        Self {
            handlers: HashMap::new(),
            admin,
            interpreter,
        }
    }

    /// Register a fast handler. The registry is built once at startup and
    /// read-only afterwards.
    pub fn register(&mut self, action: &str, handler: Arc<dyn FastHandler>) {
        self.handlers.insert(action.to_string(), handler);
    }

    pub fn registered_actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.keys().cloned().collect();
        actions.sort();
        actions
    }

    /// Route one command and produce its result.
    pub async fn process_command(
        &self,
        user_id: &str,
        experience: &str,
        command_data: Value,
    ) -> CommandResult {
        let Some(action) = command_data.get("action").and_then(Value::as_str) else {
            return CommandResult::fail("missing_action", "Command has no action");
        };
        let action = action.to_string();
        let ctx = CommandContext {
            user_id: user_id.to_string(),
            experience: experience.to_string(),
            data: command_data,
        };

        // Admin actions never reach the interpreter.
        if action.starts_with('@') {
            tracing::debug!(user_id = %ctx.user_id, action = %action, "Admin command");
            return self.admin.handle(&ctx).await;
        }

        if let Some(handler) = self.handlers.get(&action) {
            tracing::debug!(user_id = %ctx.user_id, action = %action, "Fast-path command");
            return handler.handle(&ctx).await;
        }

        match &self.interpreter {
            Some(interpreter) => {
                tracing::debug!(user_id = %ctx.user_id, action = %action, "Slow-path command");
                match interpreter
                    .interpret(&ctx.user_id, &ctx.experience, &ctx.data)
                    .await
                {
                    // The interpreter's result passes through unchanged,
                    // failures included.
                    Ok(result) => result,
                    Err(e) => interpreter_failure(&action, e),
                }
            }
            None => CommandResult::fail(
                "not_implemented",
                format!("No handler for action: {action}"),
            ),
        }
    }
}

fn interpreter_failure(action: &str, error: InterpreterError) -> CommandResult {
    tracing::error!(action = %action, error = %error, "Interpreter call failed");
    CommandResult::fail("processing_error", "The world is slow to respond. Try again.")
}
