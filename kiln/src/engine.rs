//! The render boundary: request validation, data parsing, compilation and
//! execution behind one call that never panics.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ProgramCache;
use crate::compiler::{CompiledProgram, compile};
use crate::context::RenderContext;
use crate::error::{ErrorKind, RenderError};
use crate::executor::{Evaluator, Executor};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::script::{Limits, ScriptEvaluator};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Limits handed to the built-in evaluator
    pub limits: Limits,
    /// Number of compiled programs kept; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            cache_capacity: 64,
        }
    }
}

/// Renders templates. Cheap to share behind an `Arc`; independent renders
/// do not contend on anything but the program cache.
#[derive(Debug)]
pub struct Engine<E = ScriptEvaluator> {
    evaluator: E,
    cache: ProgramCache,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            evaluator: ScriptEvaluator::new(config.limits),
            cache: ProgramCache::new(config.cache_capacity),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Evaluator> Engine<E> {
    /// An engine driving a custom evaluator.
    pub fn with_evaluator(evaluator: E, cache_capacity: usize) -> Self {
        Self {
            evaluator,
            cache: ProgramCache::new(cache_capacity),
        }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn cache(&self) -> &ProgramCache {
        &self.cache
    }

    /// Lex, parse and compile `template`, reusing a cached program when the
    /// same text was compiled before.
    pub fn compile(&self, template: &str) -> Result<Arc<CompiledProgram>, RenderError> {
        self.cache.get_or_try_insert(template, || {
            let nodes = parse(tokenize(template))
                .map_err(|err| RenderError::unclosed_tag(&err).with_snippet(template))?;
            let program = compile(nodes);
            tracing::trace!(
                instructions = program.instructions().len(),
                fragments = program.fragments().len(),
                "compiled template"
            );
            Ok(program)
        })
    }

    /// Render `template` against the JSON document `data`.
    pub fn render(&self, template: &str, data: &str) -> Result<String, RenderError> {
        guarded(|| {
            let context =
                RenderContext::from_json(data).map_err(|err| RenderError::invalid_data(&err))?;
            self.render_inner(template, &context)
        })
    }

    /// Render `template` against an already parsed context.
    pub fn render_context(
        &self,
        template: &str,
        context: &RenderContext,
    ) -> Result<String, RenderError> {
        guarded(|| self.render_inner(template, context))
    }

    pub fn render_request(&self, request: &RenderRequest) -> Result<String, RenderError> {
        self.render(&request.template, &request.data)
    }

    /// Validate an arbitrary request body and render it.
    pub fn handle(&self, body: &serde_json::Value) -> RenderResponse {
        let result =
            RenderRequest::from_body(body).and_then(|request| self.render_request(&request));
        match &result {
            Ok(html) => tracing::debug!(len = html.len(), "rendered"),
            Err(err) if err.kind == ErrorKind::Internal => {
                tracing::warn!(cause = ?err.cause, "render failed internally")
            }
            Err(err) => tracing::debug!(kind = %err.kind, message = %err.message, "render failed"),
        }
        RenderResponse::from(result)
    }

    fn render_inner(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        let program = self.compile(template)?;
        Executor::new(&self.evaluator)
            .execute(&program, context)
            .map_err(|err| err.with_snippet(template))
    }
}

/// Run `render`, turning a panic into an `Internal` error.
fn guarded(render: impl FnOnce() -> Result<String, RenderError>) -> Result<String, RenderError> {
    match catch_unwind(AssertUnwindSafe(render)) {
        Ok(result) => result,
        Err(payload) => {
            let cause = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic while rendering".to_string());
            Err(RenderError::internal(cause))
        }
    }
}

/// A validated render request. `data` is JSON text, not a JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub template: String,
    pub data: String,
}

impl RenderRequest {
    pub fn new(template: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            data: data.into(),
        }
    }

    /// Check the shape of a request body.
    pub fn from_body(body: &serde_json::Value) -> Result<Self, RenderError> {
        let Some(object) = body.as_object() else {
            return Err(RenderError::validation("Request body must be a JSON object"));
        };
        let Some(template) = object.get("template").and_then(|v| v.as_str()) else {
            return Err(RenderError::validation("Template must be a string"));
        };
        let Some(data) = object.get("data").and_then(|v| v.as_str()) else {
            return Err(RenderError::validation("Data must be a string"));
        };
        Ok(Self::new(template, data))
    }
}

/// The failure half of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Source context around the failing line, `>>` marking it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl From<&RenderError> for ErrorBody {
    fn from(err: &RenderError) -> Self {
        Self {
            error: err.message.clone(),
            details: err.details(),
            kind: Some(err.kind),
            line: err.line,
            raw: err.raw.clone(),
        }
    }
}

/// What the render boundary answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderResponse {
    Rendered { rendered: String },
    Failed(ErrorBody),
}

impl RenderResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            RenderResponse::Rendered { .. } => 200,
            RenderResponse::Failed(ErrorBody {
                kind: Some(ErrorKind::Internal),
                ..
            }) => 500,
            RenderResponse::Failed(_) => 400,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RenderResponse::Rendered { .. })
    }
}

impl From<Result<String, RenderError>> for RenderResponse {
    fn from(result: Result<String, RenderError>) -> Self {
        match result {
            Ok(rendered) => RenderResponse::Rendered { rendered },
            Err(err) => RenderResponse::Failed(ErrorBody::from(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompiledProgram;
    use crate::executor::{EvalError, OutputBuffer};
    use crate::parser::Fragment;
    use serde_json::json;

    struct Panicky;

    impl Evaluator for Panicky {
        fn evaluate_expression(
            &self,
            _fragment: &Fragment,
            _context: &RenderContext,
        ) -> Result<String, EvalError> {
            panic!("evaluator bug")
        }

        fn evaluate_program(
            &self,
            _program: &CompiledProgram,
            _context: &RenderContext,
            _out: &mut OutputBuffer,
        ) -> Result<(), EvalError> {
            panic!("evaluator bug")
        }
    }

    #[test]
    fn validation_comes_before_everything_else() {
        let engine = Engine::new();
        let cases = [
            (json!([]), "Request body must be a JSON object"),
            (json!({"template": 1, "data": "{"}), "Template must be a string"),
            (json!({"template": "<%= ", "data": {}}), "Data must be a string"),
        ];
        for (body, message) in cases {
            let response = engine.handle(&body);
            assert_eq!(response.status_code(), 400);
            let RenderResponse::Failed(error) = response else {
                panic!("expected a failure for {body}");
            };
            assert_eq!(error.error, message);
            assert_eq!(error.kind, Some(ErrorKind::Validation));
            assert_eq!(error.details, None);
        }
    }

    #[test]
    fn bad_data_is_reported_before_a_bad_template() {
        let err = Engine::new().render("<%= unclosed", "{oops").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.message, "Invalid JSON data");
        assert!(err.details().unwrap().contains("line 1 column 2"));
    }

    #[test]
    fn unclosed_tags_are_compile_errors_on_their_line() {
        let err = Engine::new().render("a\nb <%= name\nc", "{}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Compile);
        assert_eq!(err.message, "Could not find matching close tag for \"<%=\"");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.details().as_deref(), Some("Error on line 2"));
        assert!(err.raw.unwrap().contains(">> 2| b <%= name"));
    }

    #[test]
    fn success_serializes_to_the_rendered_shape() {
        let response = Engine::new().handle(&json!({
            "template": "Hello, <%= name %>!",
            "data": r#"{"name": "World"}"#,
        }));
        assert_eq!(response.status_code(), 200);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"rendered": "Hello, World!"})
        );
    }

    #[test]
    fn failures_serialize_without_absent_fields() {
        let response = Engine::new().handle(&json!({"template": "x", "data": "nope"}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"], "Invalid JSON data");
        assert_eq!(value["kind"], "parse");
        assert!(value.get("line").is_none());
        assert!(value.get("raw").is_none());

        let round_trip: RenderResponse = serde_json::from_value(value).unwrap();
        assert_eq!(round_trip, response);
    }

    #[test]
    fn runtime_errors_carry_line_and_snippet() {
        let response = Engine::new().handle(&json!({
            "template": "<p>\n<%= user.name %>\n</p>",
            "data": "{}",
        }));
        let RenderResponse::Failed(error) = response else {
            panic!("expected failure");
        };
        assert_eq!(error.error, "ReferenceError: user is not defined");
        assert_eq!(error.kind, Some(ErrorKind::Runtime));
        assert_eq!(error.line, Some(2));
        assert_eq!(error.details.as_deref(), Some("Error on line 2"));
        let raw = error.raw.unwrap();
        assert!(raw.starts_with("template:2\n"), "{raw}");
        assert!(raw.contains(" >> 2| <%= user.name %>"), "{raw}");
        assert!(raw.ends_with("ReferenceError: user is not defined"), "{raw}");
    }

    #[test]
    fn panics_become_internal_errors() {
        let engine = Engine::with_evaluator(Panicky, 0);
        let err = engine.render("<%= x %>", "{}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.cause.as_deref(), Some("evaluator bug"));

        let response = RenderResponse::from(Err(err));
        assert_eq!(response.status_code(), 500);
    }

    #[test]
    fn compiled_programs_are_cached_by_text() {
        let engine = Engine::new();
        let first = engine.compile("<%= a %>").unwrap();
        let second = engine.compile("<%= a %>").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let uncached = Engine::with_config(EngineConfig {
            cache_capacity: 0,
            ..EngineConfig::default()
        });
        let first = uncached.compile("<%= a %>").unwrap();
        let second = uncached.compile("<%= a %>").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
