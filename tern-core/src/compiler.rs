//! Compiler driver: runs the passes in order over one unit.

use std::fmt::Write as _;
use std::path::Path;

use crate::ast::Program;
use crate::codegen::generate;
use crate::context::CompilationContext;
use crate::diagnostic::{Diagnostic, Phase};
use crate::error::CoreError;
use crate::lexer::{Token, lex};
use crate::parser::parse;
use crate::regalloc::AllocStrategy;
use crate::sema::{AnalyzedProgram, analyze};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub strategy: AllocStrategy,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CompilationArtifact {
    pub assembly: String,
    /// Warnings collected along the way; a successful unit never carries
    /// errors.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile one source buffer to assembly text.
///
/// `file` is only used to label diagnostics and the `.file` directive.
/// Each pass must finish without errors for the next one to run; the
/// first failing pass is reported as `CoreError::Diagnostics`.
pub fn compile(
    source: &str,
    file: &str,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    let mut ctx = CompilationContext::new(file);
    let program = front_end(source, &mut ctx)?;

    let mut analyzed = match analyze(program) {
        Ok(analyzed) => analyzed,
        Err(errors) => {
            for err in &errors {
                ctx.report(err.to_diagnostic());
            }
            return Err(failed(&mut ctx, Phase::Semantic));
        }
    };
    for warning in std::mem::take(&mut analyzed.warnings) {
        ctx.report(warning);
    }

    let assembly = back_end(&mut analyzed, &mut ctx, options.strategy)?;
    tracing::debug!(file, strategy = %options.strategy, "compiled unit");
    Ok(CompilationArtifact {
        assembly,
        diagnostics: ctx.take_diagnostics(),
    })
}

/// Read and compile a source file.
pub fn compile_file(
    path: &Path,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    let source = std::fs::read_to_string(path)?;
    compile(&source, &path.display().to_string(), options)
}

/// Token stream of a source buffer, one token per line.
pub fn dump_tokens(source: &str, file: &str) -> Result<String, CoreError> {
    let mut ctx = CompilationContext::new(file);
    let tokens = lex_unit(source, &mut ctx)?;
    let mut out = String::new();
    for token in &tokens {
        let _ = writeln!(
            out,
            "{}:{} {:?} {:?}",
            token.line(),
            token.column(),
            token.kind,
            token.lexeme
        );
    }
    Ok(out)
}

/// Parsed syntax tree of a source buffer, before analysis.
pub fn dump_ast(source: &str, file: &str) -> Result<String, CoreError> {
    let mut ctx = CompilationContext::new(file);
    let program = front_end(source, &mut ctx)?;
    Ok(program.to_string())
}

fn lex_unit<'src>(
    source: &'src str,
    ctx: &mut CompilationContext,
) -> Result<Vec<Token<'src>>, CoreError> {
    let lexed = lex(source);
    for err in &lexed.errors {
        ctx.report(err.to_diagnostic());
    }
    if ctx.has_errors() {
        return Err(failed(ctx, Phase::Lex));
    }
    Ok(lexed.tokens)
}

fn front_end(source: &str, ctx: &mut CompilationContext) -> Result<Program, CoreError> {
    let tokens = lex_unit(source, ctx)?;
    let parsed = parse(&tokens);
    for err in &parsed.errors {
        ctx.report(err.to_diagnostic());
    }
    if ctx.has_errors() {
        return Err(failed(ctx, Phase::Parse));
    }
    Ok(parsed.program)
}

/// Code generation failures are invariant breaches and abort the unit; no
/// assembly is produced.
fn back_end(
    analyzed: &mut AnalyzedProgram,
    ctx: &mut CompilationContext,
    strategy: AllocStrategy,
) -> Result<String, CoreError> {
    generate(analyzed, ctx, strategy).map_err(|err| {
        tracing::error!(phase = %Phase::CodeGen, file = ctx.file(), %err, "pass failed");
        CoreError::CodeGen(err)
    })
}

fn failed(ctx: &mut CompilationContext, phase: Phase) -> CoreError {
    let diagnostics = ctx.take_diagnostics();
    tracing::debug!(%phase, errors = diagnostics.len(), "pass failed");
    CoreError::Diagnostics { phase, diagnostics }
}
