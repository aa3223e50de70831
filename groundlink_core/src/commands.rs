use serde::{Deserialize, Serialize};

use crate::constants::command_constants::*;
use crate::error::CommandError;

/// A command ready to be written to the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCommand {
    /// The trimmed command text, without prefix or terminator.
    pub text: String,
    /// The full wire frame.
    pub frame: String,
}

impl OutboundCommand {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.frame.as_bytes().to_vec()
    }
}

/// Builds outbound command frames in the `<prefix><command><terminator>` format.
///
/// The command text itself is passed through untouched; interpreting it is up to the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEncoder {
    prefix: String,
    terminator: String,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_PREFIX, DEFAULT_COMMAND_TERMINATOR)
    }
}

impl CommandEncoder {
    pub fn new(prefix: impl Into<String>, terminator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            terminator: terminator.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Encodes user input into a wire frame.
    ///
    /// # Arguments
    ///
    /// - `user_text` (`&str`) - The command as typed. Surrounding whitespace is removed.
    ///
    /// # Returns
    ///
    /// - `Result<OutboundCommand, CommandError>` - `Err(CommandError::Empty)` when nothing is
    ///   left after trimming, in which case nothing should be sent.
    pub fn encode(&self, user_text: &str) -> Result<OutboundCommand, CommandError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }
        // An inner line break would reach the payload as two separate lines.
        if text.contains(['\r', '\n']) {
            return Err(CommandError::EmbeddedLineBreak);
        }

        let mut frame =
            String::with_capacity(self.prefix.len() + text.len() + self.terminator.len());
        frame.push_str(&self.prefix);
        frame.push_str(text);
        frame.push_str(&self.terminator);

        Ok(OutboundCommand {
            text: text.to_owned(),
            frame,
        })
    }
}
