//! HTTP adapter for the external slow-path interpreter.
//!
//! The interpreter owns natural-language commands end to end; the core only
//! ships it the command envelope and passes its `CommandResult` through
//! unchanged, including its failures.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use wayfinder_shared::CommandResult;

use super::ports::{InterpreterError, InterpreterPort};

pub struct HttpInterpreter {
    client: reqwest::Client,
    url: String,
}

impl HttpInterpreter {
    pub fn new(url: String, timeout: Duration) -> Result<Self, InterpreterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InterpreterError::Unavailable(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl InterpreterPort for HttpInterpreter {
    async fn interpret(
        &self,
        user_id: &str,
        experience: &str,
        command: &Value,
    ) -> Result<CommandResult, InterpreterError> {
        let envelope = serde_json::json!({
            "user_id": user_id,
            "experience": experience,
            "command": command,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    InterpreterError::Unavailable(e.to_string())
                } else {
                    InterpreterError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InterpreterError::RequestFailed(format!(
                "interpreter returned {status}"
            )));
        }

        response
            .json::<CommandResult>()
            .await
            .map_err(|e| InterpreterError::InvalidResponse(e.to_string()))
    }
}
