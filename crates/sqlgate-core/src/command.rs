//! Command description for a single execution

use crate::{ParameterSet, Result, SqlgateError};
use std::time::Duration;

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Extended timeout for long-running bulk procedures
pub const BULK_COMMAND_TIMEOUT: Duration = Duration::from_secs(500);

/// How the command text is interpreted by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Ad-hoc SQL text with positional placeholders
    Text,
    /// Stored procedure addressed by name
    StoredProcedure,
}

/// One executable command: text, interpretation, parameters, timeout
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    command_type: CommandType,
    parameters: ParameterSet,
    timeout: Duration,
}

impl Command {
    /// Create a command, rejecting empty or whitespace-only text
    pub fn new(text: impl Into<String>, command_type: CommandType) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SqlgateError::Usage(
                "command text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            text,
            command_type,
            parameters: ParameterSet::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Shorthand for a stored-procedure command
    pub fn stored_procedure(name: impl Into<String>) -> Result<Self> {
        Self::new(name, CommandType::StoredProcedure)
    }

    /// Shorthand for an ad-hoc SQL command
    pub fn text(sql: impl Into<String>) -> Result<Self> {
        Self::new(sql, CommandType::Text)
    }

    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_text(&self) -> &str {
        &self.text
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
