//! Runs a compiled program against a data context.
//!
//! Fragment source is handed to an [`Evaluator`]; the executor itself only
//! owns instruction order, escaping, and turning evaluator failures into
//! [`RenderError`]s with the best line it can find.

use thiserror::Error;

use crate::compiler::{CompiledProgram, Instruction};
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::escape::escape_into;
use crate::parser::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// The fragment is not valid script
    Syntax,
    /// The fragment threw while running
    Runtime,
}

/// A failure reported by an [`Evaluator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// Message in `Name: text` form, e.g. `TypeError: x is not a function`
    pub message: String,
    /// Template line of the failing code, if the evaluator knows it
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Instruction that was running, if the evaluator knows it
    pub instruction: Option<usize>,
    /// Script call stack at the point of failure
    pub stack: Option<String>,
}

impl EvalError {
    fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
            instruction: None,
            stack: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Syntax, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Runtime, message)
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn in_instruction(mut self, instruction: usize) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Evaluates the script embedded in a template.
///
/// Implementations must be sandboxed: templates come from users and must not
/// reach anything beyond the render context.
pub trait Evaluator: Send + Sync {
    /// Evaluate a single `<%= %>`/`<%- %>` body and return its string form,
    /// unescaped.
    fn evaluate_expression(
        &self,
        fragment: &Fragment,
        context: &RenderContext,
    ) -> Result<String, EvalError>;

    /// Run the whole program as one script body, writing into `out`.
    /// Used whenever the program contains scriptlets, since a block opened
    /// in one scriptlet may enclose the instructions that follow it.
    fn evaluate_program(
        &self,
        program: &CompiledProgram,
        context: &RenderContext,
        out: &mut OutputBuffer,
    ) -> Result<(), EvalError>;
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn evaluate_expression(
        &self,
        fragment: &Fragment,
        context: &RenderContext,
    ) -> Result<String, EvalError> {
        (**self).evaluate_expression(fragment, context)
    }

    fn evaluate_program(
        &self,
        program: &CompiledProgram,
        context: &RenderContext,
        out: &mut OutputBuffer,
    ) -> Result<(), EvalError> {
        (**self).evaluate_program(program, context, out)
    }
}

/// Append-only render output.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    html: String,
}

impl OutputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            html: String::with_capacity(capacity),
        }
    }

    pub fn push_literal(&mut self, text: &str) {
        self.html.push_str(text);
    }

    pub fn push_value(&mut self, text: &str, escape: bool) {
        if escape {
            escape_into(text, &mut self.html);
        } else {
            self.html.push_str(text);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_string(self) -> String {
        self.html
    }
}

/// Drives an [`Evaluator`] over a [`CompiledProgram`].
pub struct Executor<'e, E: Evaluator + ?Sized> {
    evaluator: &'e E,
}

impl<'e, E: Evaluator + ?Sized> Executor<'e, E> {
    pub fn new(evaluator: &'e E) -> Self {
        Self { evaluator }
    }

    /// Render `program`. On failure nothing of the partial output escapes.
    pub fn execute(
        &self,
        program: &CompiledProgram,
        context: &RenderContext,
    ) -> Result<String, RenderError> {
        let mut out = OutputBuffer::with_capacity(program.literal_len() + 64);

        let result = if program.has_code() {
            self.evaluator.evaluate_program(program, context, &mut out)
        } else {
            self.run_instructions(program, context, &mut out)
        };

        match result {
            Ok(()) => Ok(out.into_string()),
            Err(err) => {
                let fallback = err
                    .instruction
                    .and_then(|index| program.source_map().line_of(index))
                    .or_else(|| program.source_map().last_line());
                tracing::debug!(
                    message = %err.message,
                    line = ?err.line,
                    instruction = ?err.instruction,
                    "evaluation failed"
                );
                Err(RenderError::from_eval(err, fallback))
            }
        }
    }

    fn run_instructions(
        &self,
        program: &CompiledProgram,
        context: &RenderContext,
        out: &mut OutputBuffer,
    ) -> Result<(), EvalError> {
        for (index, instruction) in program.instructions().iter().enumerate() {
            match instruction {
                Instruction::EmitLiteral(text) => out.push_literal(text),
                Instruction::EmitExpression { fragment, escape } => {
                    let text = self
                        .evaluator
                        .evaluate_expression(program.fragment(*fragment), context)
                        .map_err(|err| err.in_instruction(index))?;
                    out.push_value(&text, *escape);
                }
                Instruction::ExecuteCode(_) => {
                    return Err(EvalError::runtime(
                        "scriptlets require whole-program evaluation",
                    )
                    .in_instruction(index));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::compile, error::ErrorKind, lexer::tokenize, parser::parse};

    /// Echoes the trimmed fragment source, or fails on `boom`.
    struct Echo;

    impl Evaluator for Echo {
        fn evaluate_expression(
            &self,
            fragment: &Fragment,
            _context: &RenderContext,
        ) -> Result<String, EvalError> {
            match fragment.source.trim() {
                "boom" => Err(EvalError::runtime("Error: boom")),
                other => Ok(other.to_string()),
            }
        }

        fn evaluate_program(
            &self,
            _program: &CompiledProgram,
            _context: &RenderContext,
            out: &mut OutputBuffer,
        ) -> Result<(), EvalError> {
            out.push_literal("partial");
            Err(EvalError::runtime("Error: late"))
        }
    }

    fn program(source: &str) -> CompiledProgram {
        compile(parse(tokenize(source)).unwrap())
    }

    #[test]
    fn escapes_only_escaped_output() {
        let html = Executor::new(&Echo)
            .execute(&program("<%= <b> %>|<%- <b> %>"), &RenderContext::default())
            .unwrap();
        assert_eq!(html, "&lt;b&gt;|<b>");
    }

    #[test]
    fn failing_expression_maps_to_its_instruction_line() {
        let err = Executor::new(&Echo)
            .execute(
                &program("one\ntwo\n<%= boom %>\nfour"),
                &RenderContext::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.line, Some(3));
        assert!(err.line_is_estimate);
    }

    #[test]
    fn failed_program_returns_no_partial_output() {
        let err = Executor::new(&Echo)
            .execute(&program("a\n<% x %>\nb"), &RenderContext::default())
            .unwrap_err();
        assert_eq!(err.message, "Error: late");
        // the trailing text node starts right after `%>` on line 2
        assert_eq!(err.line, Some(2));
        assert!(err.line_is_estimate);
    }
}
