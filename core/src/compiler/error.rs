use thiserror::Error;
use tracing::warn;

use crate::lexer::{Token, TokenState};

/// Compile-time failure from the lexer or the parser.
///
/// Carries the position and state of the offending token the way the
/// diagnostics log expects them: head/tail line, head/tail offset, state
/// name, token text, message. After a failure the bytecode buffer may hold a
/// partial emission; callers roll back or discard it.
#[derive(Clone, Debug, Error)]
#[error("{head_line}-{tail_line}:{head_offset}-{tail_offset}:{state:?}:{text}: {message}")]
pub struct CompileError {
    pub message: String,
    pub state: TokenState,
    pub text: String,
    pub head_line: u32,
    pub tail_line: u32,
    pub head_offset: u32,
    pub tail_offset: u32,
}

impl CompileError {
    pub(crate) fn at(source: &str, token: &Token, message: impl Into<String>) -> CompileError {
        let error = CompileError {
            message: message.into(),
            state: token.state,
            text: token.text(source).to_string(),
            head_line: token.head_line,
            tail_line: token.tail_line,
            head_offset: token.head_offset,
            tail_offset: token.tail_offset,
        };
        warn!("{error}");
        error
    }

    /// Zero-based source line of the failure.
    pub fn line(&self) -> u32 {
        self.head_line
    }
}
