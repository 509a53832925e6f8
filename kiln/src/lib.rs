//! An embedded-scripting HTML template engine.
//!
//! Templates mix literal text with `<% %>` tags:
//!
//! | tag | meaning |
//! |---|---|
//! | `<%= expr %>` | evaluate and HTML-escape |
//! | `<%- expr %>` | evaluate, emit as is |
//! | `<% code %>` | run statements; blocks may span later tags |
//! | `<%# note %>` | comment, emits nothing |
//!
//! `-%>` drops the line break after a tag, `<%_`/`_%>` slurp the
//! surrounding spaces and tabs, and `<%%`/`%%>` produce literal delimiters.
//!
//! The pipeline is [`lexer`] → [`parser`] → [`compiler`] → [`executor`].
//! Script fragments stay opaque until execution, where an [`Evaluator`]
//! runs them; [`ScriptEvaluator`] is the bundled, sandboxed one.
//!
//! ```
//! let engine = kiln::Engine::new();
//! let html = engine
//!     .render("Hello, <%= name %>!", r#"{"name": "World"}"#)
//!     .unwrap();
//! assert_eq!(html, "Hello, World!");
//! ```

pub mod cache;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod error;
pub mod escape;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod script;

pub use cache::ProgramCache;
pub use compiler::{CompiledProgram, Instruction, SourceMap, compile};
pub use context::RenderContext;
pub use engine::{Engine, EngineConfig, ErrorBody, RenderRequest, RenderResponse};
pub use error::{ErrorKind, RenderDiagnostic, RenderError};
pub use escape::escape_html;
pub use executor::{EvalError, EvalErrorKind, Evaluator, Executor, OutputBuffer};
pub use parser::{Fragment, ParseError};
pub use script::{Limits, ScriptEvaluator};
