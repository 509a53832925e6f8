//! The built-in script evaluator.
//!
//! Templates embed a JavaScript-like language: `var`/`let`/`const`, functions
//! and arrows, destructuring, the usual statements and operators, template
//! literals, and a library of the common `Array`, `String`, `Number`, `Math`,
//! `JSON` and `Object` built-ins. There are no modules, classes, regular
//! expressions, promises, timers or host objects: the render data is the
//! only thing a template can reach.
//!
//! A template with scriptlets runs as one program. Literal text and output
//! tags become statements of that program, so a block opened in one
//! scriptlet can enclose the text after it:
//!
//! ```text
//! <% for (const item of items) { %><li><%= item %></li><% } %>
//! ```

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

pub use lexer::is_reserved_word;

use crate::compiler::{CompiledProgram, Instruction};
use crate::context::RenderContext;
use crate::executor::{EvalError, Evaluator, OutputBuffer};
use crate::parser::Fragment;

use interp::Interp;
use lexer::{Loc, Tok, Token};
use value::Value;

/// Resource limits for a single render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Deepest chain of script function calls
    pub max_call_depth: usize,
    /// Deepest syntactic nesting of expressions and blocks
    pub max_nesting: usize,
    /// Statements and calls a render may execute
    pub max_steps: u64,
    /// Longest string (in bytes), array, or render output
    pub max_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_nesting: 64,
            max_steps: 1_000_000,
            max_length: 16 * 1024 * 1024,
        }
    }
}

/// Evaluates templates with the bundled interpreter.
#[derive(Debug, Clone, Default)]
pub struct ScriptEvaluator {
    limits: Limits,
}

impl ScriptEvaluator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate_expression(
        &self,
        fragment: &Fragment,
        context: &RenderContext,
    ) -> Result<String, EvalError> {
        // plain data paths skip the interpreter
        if let Some(json) = context.lookup(fragment.source.trim()) {
            return Ok(Value::from_json(json).to_output_string().to_string());
        }
        let tokens = lexer::tokenize(&fragment.source, Loc::new(fragment.line, fragment.column))?;
        let Some(expr) = parser::parse_expression(tokens, self.limits.max_nesting)? else {
            return Ok(String::new());
        };
        let mut interp = Interp::new(context, &self.limits);
        let value = interp.eval_expression(&expr)?;
        Ok(value.to_output_string().to_string())
    }

    fn evaluate_program(
        &self,
        program: &CompiledProgram,
        context: &RenderContext,
        out: &mut OutputBuffer,
    ) -> Result<(), EvalError> {
        let tokens = program_tokens(program)?;
        let body = parser::parse_program(tokens, self.limits.max_nesting)?;
        tracing::trace!(statements = body.len(), "parsed template program");
        Interp::new(context, &self.limits)
            .with_output(program, out)
            .run_program(&body)
    }
}

/// Splice every instruction of `program` into one token stream: literal
/// text and output tags become synthetic tokens around the lexed code.
fn program_tokens(program: &CompiledProgram) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    for (index, instruction) in program.instructions().iter().enumerate() {
        let line = program.source_map().line_of(index).unwrap_or(1);
        let loc = Loc::new(line, 1);
        match instruction {
            Instruction::EmitLiteral(_) => {
                tokens.push(Token::synthetic(Tok::EmitLiteral(index), loc))
            }
            Instruction::EmitExpression { fragment, escape } => {
                let fragment = program.fragment(*fragment);
                tokens.push(Token::synthetic(
                    Tok::EmitOpen {
                        escape: *escape,
                        instruction: index,
                    },
                    loc,
                ));
                tokens.extend(fragment_tokens(fragment, index)?);
                tokens.push(Token::synthetic(Tok::EmitClose, loc));
            }
            Instruction::ExecuteCode(fragment) => {
                let mut code = fragment_tokens(program.fragment(*fragment), index)?;
                // a tag boundary counts as a line break for semicolon insertion
                if let Some(first) = code.first_mut() {
                    first.newline_before = true;
                }
                tokens.extend(code);
            }
        }
    }
    Ok(tokens)
}

fn fragment_tokens(fragment: &Fragment, instruction: usize) -> Result<Vec<Token>, EvalError> {
    let mut tokens = lexer::tokenize(&fragment.source, Loc::new(fragment.line, fragment.column))
        .map_err(|err| err.in_instruction(instruction))?;
    // the lexer terminates every stream; only the whole program gets one
    if matches!(tokens.last().map(|token| &token.tok), Some(Tok::Eof)) {
        tokens.pop();
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::compile, lexer::tokenize, parser::parse};

    fn render_with(
        limits: Limits,
        template: &str,
        data: serde_json::Value,
    ) -> Result<String, EvalError> {
        let program = compile(parse(tokenize(template)).unwrap());
        let context = RenderContext::new(data);
        let evaluator = ScriptEvaluator::new(limits);
        let mut out = OutputBuffer::default();
        if program.has_code() {
            evaluator.evaluate_program(&program, &context, &mut out)?;
            Ok(out.into_string())
        } else {
            let mut html = String::new();
            for instruction in program.instructions() {
                match instruction {
                    Instruction::EmitLiteral(text) => html.push_str(text),
                    Instruction::EmitExpression { fragment, .. } => html.push_str(
                        &evaluator.evaluate_expression(program.fragment(*fragment), &context)?,
                    ),
                    Instruction::ExecuteCode(_) => unreachable!(),
                }
            }
            Ok(html)
        }
    }

    fn render(template: &str, data: serde_json::Value) -> Result<String, EvalError> {
        render_with(Limits::default(), template, data)
    }

    #[test]
    fn blocks_span_tags() {
        let html = render(
            "<ul><% for (const item of items) { %><li><%= item %></li><% } %></ul>",
            serde_json::json!({"items": ["a", "<b>"]}),
        )
        .unwrap();
        assert_eq!(html, "<ul><li>a</li><li>&lt;b&gt;</li></ul>");
    }

    #[test]
    fn scriptlet_without_braces_takes_the_next_instruction_as_body() {
        let html = render(
            "<% if (show) %>yes<% ; %>|",
            serde_json::json!({"show": false}),
        )
        .unwrap();
        assert_eq!(html, "|");
    }

    #[test]
    fn expressions_cover_the_common_library() {
        let html = render(
            r#"<%= items.filter(i => i.price > 10).map(i => i.name.toUpperCase()).join(", ") %>|<%= (1234.5).toFixed(2) %>|<%= JSON.stringify({a: [1, 2]}) %>"#,
            serde_json::json!({"items": [{"name": "pen", "price": 2}, {"name": "book", "price": 12.5}]}),
        )
        .unwrap();
        assert_eq!(html, "BOOK|1234.50|{&quot;a&quot;:[1,2]}");
    }

    #[test]
    fn functions_destructuring_and_closures() {
        let html = render(
            indoc::indoc! {r#"
                <%
                  function total({ items = [] }, tax = 0) {
                    return items.reduce((sum, { price, qty = 1 }) => sum + price * qty, 0) * (1 + tax);
                  }
                  const counters = [];
                  for (let i = 0; i < 3; i++) counters.push(() => i);
                -%>
                <%= total(order, 0.5) %> <%= counters.map(f => f()).join("") %>"#},
            serde_json::json!({"order": {"items": [{"price": 2, "qty": 3}, {"price": 4}]}}),
        )
        .unwrap();
        assert_eq!(html, "15 012");
    }

    #[test]
    fn unknown_names_are_reference_errors_with_lines() {
        let err = render("line one\n<%= missing %>", serde_json::json!({})).unwrap_err();
        assert_eq!(err.message, "ReferenceError: missing is not defined");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(5));
    }

    #[test]
    fn typeof_tolerates_unknown_names_and_locals_holds_the_data() {
        let html = render(
            "<%= typeof missing %> <%= locals.title %> <% if (typeof title !== 'undefined') { %>ok<% } %>",
            serde_json::json!({"title": "T"}),
        )
        .unwrap();
        assert_eq!(html, "undefined T ok");
    }

    #[test]
    fn runtime_errors_carry_a_stack() {
        let err = render(
            "<%\nfunction inner() { return null.x; }\nfunction outer() { return inner(); }\n%><%= outer() %>",
            serde_json::json!({}),
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "TypeError: Cannot read properties of null (reading 'x')"
        );
        assert_eq!(err.line, Some(2));
        let stack = err.stack.unwrap();
        assert!(stack.contains("at inner (template:2:"), "{stack}");
        assert!(stack.contains("at outer (template:3:"), "{stack}");
        assert!(stack.contains("at template (template:4:"), "{stack}");
    }

    #[test]
    fn try_catch_sees_thrown_errors() {
        let html = render(
            "<% try { JSON.parse('{'); } catch (e) { %><%= e.name %><% } finally { %>!<% } %>",
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(html, "SyntaxError!");
    }

    #[test]
    fn runaway_loops_hit_the_step_budget() {
        let limits = Limits {
            max_steps: 10_000,
            ..Limits::default()
        };
        let err = render_with(limits, "<% while (true) {} %>", serde_json::json!({})).unwrap_err();
        assert_eq!(err.message, "RangeError: Script exceeded its step budget");
    }

    #[test]
    fn step_budget_cannot_be_caught() {
        let limits = Limits {
            max_steps: 10_000,
            ..Limits::default()
        };
        let err = render_with(
            limits,
            "<% try { while (true) {} } catch (e) {} %>after",
            serde_json::json!({}),
        )
        .unwrap_err();
        assert!(err.message.starts_with("RangeError"));
    }

    #[test]
    fn deep_recursion_is_a_range_error() {
        let limits = Limits {
            max_call_depth: 16,
            ..Limits::default()
        };
        let err = render_with(
            limits,
            "<% function f(n) { return f(n + 1); } f(0); %>",
            serde_json::json!({}),
        )
        .unwrap_err();
        assert_eq!(err.message, "RangeError: Maximum call stack size exceeded");
    }

    #[test]
    fn string_growth_is_bounded() {
        let limits = Limits {
            max_length: 1024,
            ..Limits::default()
        };
        let err = render_with(
            limits,
            "<% let s = 'x'; while (true) s += s; %>",
            serde_json::json!({}),
        )
        .unwrap_err();
        assert_eq!(err.message, "RangeError: Invalid string length");
    }

    #[test]
    fn assignment_to_an_undeclared_name_updates_data_keys() {
        let html = render(
            "<% count = count + 1; fresh = 'new'; %><%= count %> <%= fresh %> <%= locals.count %>",
            serde_json::json!({"count": 1}),
        )
        .unwrap();
        assert_eq!(html, "2 new 2");
    }

    #[test]
    fn syntax_errors_point_into_the_fragment() {
        let err = render("ok\n<% let = ; %>", serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, crate::executor::EvalErrorKind::Syntax);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn self_referencing_values_are_released() {
        let html = render(
            "<% const a = {}; a.self = a; const f = () => f; a.f = f; %>done",
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(html, "done");
    }
}
