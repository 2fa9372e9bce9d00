use thiserror::Error;

use crate::codegen::CodeGenError;
use crate::diagnostic::{Diagnostic, Phase};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("{phase} failed with {} error(s)", .diagnostics.iter().filter(|d| d.is_error()).count())]
    Diagnostics {
        phase: Phase,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("code generation failed: {0}")]
    CodeGen(#[from] CodeGenError),
}

impl CoreError {
    /// Diagnostics carried by the error, if it came from a failed pass.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CoreError::Diagnostics { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
