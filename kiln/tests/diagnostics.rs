use indoc::indoc;
use kiln::{Engine, ErrorKind, Limits};

const INVOICE: &str = indoc! {r#"
    <table>
    <% lines.forEach(function (line) { %>
      <tr>
        <td><%= line.product.name %></td>
        <td><%= line.qty * line.price %></td>
      </tr>
    <% }) %>
    </table>
"#};

#[kiln_testhelpers::test]
fn runtime_error_snippet() {
    let err = Engine::new()
        .render(INVOICE, r#"{"lines": [{"qty": 1, "price": 2}]}"#)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert_eq!(err.line, Some(4));
    assert!(!err.line_is_estimate);
    insta::assert_snapshot!(err.raw.unwrap(), @r"
    template:4
        1| <table>
        2| <% lines.forEach(function (line) { %>
        3|   <tr>
     >> 4|     <td><%= line.product.name %></td>
        5|     <td><%= line.qty * line.price %></td>
        6|   </tr>
        7| <% }) %>

    TypeError: Cannot read properties of undefined (reading 'name')
    ");
}

#[kiln_testhelpers::test]
fn stack_trace_names_the_callback() {
    let err = Engine::new()
        .render(INVOICE, r#"{"lines": [{"qty": 1, "price": 2}]}"#)
        .unwrap_err();
    let stack = err.cause.unwrap();
    assert!(
        stack.starts_with("TypeError: Cannot read properties of undefined (reading 'name')"),
        "{stack}"
    );
    assert!(stack.contains("at template (template:2:"), "{stack}");
}

#[kiln_testhelpers::test]
fn thrown_errors_keep_their_message() {
    let err = Engine::new()
        .render(
            "<%\n  if (!user) throw new Error('user required');\n%>",
            r#"{"user": null}"#,
        )
        .unwrap_err();
    assert_eq!(err.message, "Error: user required");
    assert_eq!(err.line, Some(2));
    assert_eq!(err.details().as_deref(), Some("Error on line 2"));
}

#[kiln_testhelpers::test]
fn thrown_non_errors_are_reported_as_uncaught() {
    let err = Engine::new().render("<% throw 'nope' %>", "{}").unwrap_err();
    assert_eq!(err.message, "Uncaught nope");
}

#[kiln_testhelpers::test]
fn limits_are_configurable() {
    let engine = Engine::with_config(kiln::EngineConfig {
        limits: Limits {
            max_steps: 1_000,
            ..Limits::default()
        },
        cache_capacity: 0,
    });
    let err = engine
        .render("<% for (;;) {} %>", "{}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert_eq!(err.message, "RangeError: Script exceeded its step budget");
}

#[kiln_testhelpers::test]
fn deeply_nested_expressions_do_not_overflow() {
    let template = format!("<%= {}1{} %>", "(".repeat(10_000), ")".repeat(10_000));
    let err = Engine::new().render(&template, "{}").unwrap_err();
    assert!(err.message.starts_with("RangeError"), "{}", err.message);
}

#[kiln_testhelpers::test]
fn diagnostics_point_at_the_failing_code() {
    let source = "<p>\n  <%= missing %>\n</p>";
    let err = Engine::new().render(source, "{}").unwrap_err();
    let diagnostic = err.to_diagnostic("page.ejs", source);
    let span = diagnostic.span.unwrap();
    assert_eq!(&source[span.offset()..span.offset() + span.len()], "missing %>");
    assert_eq!(diagnostic.to_string(), "runtime error: ReferenceError: missing is not defined");
}
