//! Command directives embedded in assistant replies.
//!
//! The system prompt teaches the model that a reply starting with `/` is a
//! shell command. Any reply that genuinely starts with a slash is treated the
//! same way; there is no escape.

/// Leading character that marks a reply as a command.
pub const SENTINEL: char = '/';

/// A shell command requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    command: &'a str,
}

impl<'a> Directive<'a> {
    /// Parses an assistant reply into a directive.
    ///
    /// Returns `None` for replies without the sentinel, for empty replies and
    /// for a sentinel with nothing after it.
    pub fn parse(reply: &'a str) -> Option<Self> {
        let command = reply.strip_prefix(SENTINEL)?.trim();
        if command.is_empty() {
            return None;
        }
        Some(Self { command })
    }

    /// The literal command line, sentinel stripped.
    pub fn command(&self) -> &'a str {
        self.command
    }
}
