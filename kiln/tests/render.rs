use kiln::{Engine, ErrorKind, RenderResponse};
use serde_json::json;

fn render(template: &str, data: &str) -> String {
    Engine::new()
        .render(template, data)
        .unwrap_or_else(|err| panic!("render failed: {err:?}"))
}

#[kiln_testhelpers::test]
fn text_without_tags_is_unchanged() {
    let template = "<html>\n  <body>100% plain & simple</body>\n</html>\n";
    for data in ["{}", "[]", "null", r#"{"body": "ignored"}"#] {
        assert_eq!(render(template, data), template);
    }
}

#[kiln_testhelpers::test]
fn escaped_and_raw_output() {
    let data = r##"{"x": "<a href=\"#\">Tom & 'Jerry'</a>"}"##;
    assert_eq!(
        render("<%= x %>", data),
        "&lt;a href=&quot;#&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
    );
    assert_eq!(render("<%- x %>", data), "<a href=\"#\">Tom & 'Jerry'</a>");
    assert_eq!(render(r#"<%= "<b>" %>"#, "{}"), "&lt;b&gt;");
    assert_eq!(render(r#"<%- "<b>" %>"#, "{}"), "<b>");
}

#[kiln_testhelpers::test]
fn hello_world() {
    assert_eq!(
        render("Hello, <%= name %>!", r#"{"name":"World"}"#),
        "Hello, World!"
    );
}

#[kiln_testhelpers::test]
fn loops_emit_their_block_once_per_item() {
    assert_eq!(render("<% for (let i=0;i<3;i++){ %>x<% } %>", "{}"), "xxx");

    let template = "<% items.forEach(function(item, i) { %>[<%= i %>:<%= item %>]<% }); %>";
    assert_eq!(render(template, r#"{"items": ["a", "b", "c"]}"#), "[0:a][1:b][2:c]");
    assert_eq!(render(template, r#"{"items": []}"#), "");
}

#[kiln_testhelpers::test]
fn conditionals_emit_one_branch() {
    let template = "<% if (n > 1) { %>many<% } else if (n === 1) { %>one<% } else { %>none<% } %>";
    assert_eq!(render(template, r#"{"n": 5}"#), "many");
    assert_eq!(render(template, r#"{"n": 1}"#), "one");
    assert_eq!(render(template, r#"{"n": 0}"#), "none");
}

#[kiln_testhelpers::test]
fn trim_modes() {
    let template = "<ul>\n<%_ for (const i of [1, 2]) { _%>\n  <li><%= i %></li>\n<%_ } _%>\n</ul>";
    assert_eq!(render(template, "{}"), "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>");

    assert_eq!(render("<% if (true) { -%>\nyes\n<% } -%>\n", "{}"), "yes\n");
    assert_eq!(render("<%% literal %%>", "{}"), "<% literal %>");
    assert_eq!(render("a<%# ignored %>b", "{}"), "ab");
}

#[kiln_testhelpers::test]
fn nested_data_paths() {
    let data = r#"{"user": {"name": "Ada", "tags": ["x", "y"], "meta": {"og:title": "T"}}}"#;
    assert_eq!(
        render(r#"<%= user.name %>/<%= user.tags[1] %>/<%= user.meta["og:title"] %>"#, data),
        "Ada/y/T"
    );
    assert_eq!(render("<%= user.missing %>", data), "undefined");
}

#[kiln_testhelpers::test]
fn non_object_data_is_reachable_through_locals() {
    assert_eq!(render("<%= locals.length %>", "[1, 2, 3]"), "3");
    assert_eq!(render("<%= locals %>", "42"), "42");
}

#[kiln_testhelpers::test]
fn duplicate_keys_keep_the_last_value() {
    assert_eq!(render("<%= a %>", r#"{"a": 1, "a": 2}"#), "2");
}

#[kiln_testhelpers::test]
fn unterminated_tags_report_the_opening_line() {
    let err = Engine::new()
        .render("one\ntwo\n  <% if (x) {\nfour", "{}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Compile);
    assert_eq!(err.line, Some(3));
    assert_eq!(err.message, "Could not find matching close tag for \"<%\"");
}

#[kiln_testhelpers::test]
fn script_syntax_errors_are_compile_errors() {
    let err = Engine::new()
        .render("ok\n\n<%= 1 + %>", "{}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Compile);
    assert_eq!(err.line, Some(3));
}

#[kiln_testhelpers::test]
fn failed_renders_return_no_partial_output() {
    let response = Engine::new().handle(&json!({
        "template": "<h1>title</h1>\n<% items.forEach(i => { %><%= i.name.first %><% }) %>",
        "data": r#"{"items": [{"name": {"first": "a"}}, {}]}"#,
    }));
    let RenderResponse::Failed(error) = response else {
        panic!("expected failure, got {response:?}");
    };
    assert_eq!(
        error.error,
        "TypeError: Cannot read properties of undefined (reading 'first')"
    );
    assert_eq!(error.line, Some(2));
}

#[kiln_testhelpers::test]
fn renders_are_independent_across_threads() {
    let engine = std::sync::Arc::new(Engine::new());
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let template =
                    "<% let total = 0; for (let i = 0; i < n; i++) total += i; %><%= total %>";
                engine
                    .render(template, &format!(r#"{{"n": {n}}}"#))
                    .unwrap()
            })
        })
        .collect();
    for (n, handle) in handles.into_iter().enumerate() {
        let expected: usize = (0..n).sum();
        assert_eq!(handle.join().unwrap(), expected.to_string());
    }
}
