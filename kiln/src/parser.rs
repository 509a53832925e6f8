//! Template parser
//!
//! Maps the token stream onto a flat, document-ordered list of nodes. Control
//! flow lives inside scriptlet source, so there is no nesting to track here;
//! the only structural check is that every opening delimiter is closed.

use std::borrow::Cow;

use thiserror::Error;

use crate::lexer::{Pos, TagKind, Token, TrimMode};

/// A piece of embedded script source, positioned in template coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The verbatim tag body
    pub source: String,
    /// Line of the first character of the body
    pub line: u32,
    /// Column of the first character of the body
    pub column: u32,
}

impl Fragment {
    pub fn new(source: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text(String),
    Output { fragment: Fragment, escape: bool },
    Script(Fragment),
    Comment,
}

/// One node of the template AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Where the node starts; for tags, the `<` of the opening delimiter
    pub pos: Pos,
}

impl Node {
    pub fn line(&self) -> u32 {
        self.pos.line
    }
}

/// A tag was opened and never closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not find matching close tag for \"{delimiter}\"")]
pub struct ParseError {
    /// The opening delimiter, e.g. `<%=`
    pub delimiter: &'static str,
    /// Line of the opening delimiter
    pub line: u32,
    /// Column of the opening delimiter
    pub column: u32,
}

/// Turn tokens into nodes, applying whitespace trimming to adjacent text.
pub fn parse(tokens: Vec<Token<'_>>) -> Result<Vec<Node>, ParseError> {
    let mut nodes: Vec<Node> = Vec::with_capacity(tokens.len() / 2 + 1);
    let mut pending_trim = TrimMode::None;
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Literal(text, pos) => {
                let text = trim_leading(text, pending_trim);
                pending_trim = TrimMode::None;
                nodes.push(Node {
                    kind: NodeKind::Text(text.into_owned()),
                    pos,
                });
            }
            Token::TagOpen { kind, slurp, pos } => {
                if slurp {
                    slurp_trailing(&mut nodes);
                }

                let unclosed = ParseError {
                    delimiter: kind.delimiter(slurp),
                    line: pos.line,
                    column: pos.column,
                };

                let body = match tokens.next_if(|t| matches!(t, Token::Literal(..))) {
                    Some(Token::Literal(text, body_pos)) => {
                        Fragment::new(text.into_owned(), body_pos.line, body_pos.column)
                    }
                    _ => Fragment::new("", pos.line, pos.column),
                };

                match tokens.next() {
                    Some(Token::TagClose(trim, _)) => pending_trim = trim,
                    _ => return Err(unclosed),
                }

                let kind = match kind {
                    TagKind::Escaped => NodeKind::Output {
                        fragment: body,
                        escape: true,
                    },
                    TagKind::Raw => NodeKind::Output {
                        fragment: body,
                        escape: false,
                    },
                    TagKind::Scriptlet => NodeKind::Script(body),
                    TagKind::Comment => NodeKind::Comment,
                };
                nodes.push(Node { kind, pos });
            }
            // The lexer only produces a close right after a tag body.
            Token::TagClose(_, pos) => {
                nodes.push(Node {
                    kind: NodeKind::Text("%>".to_string()),
                    pos,
                });
            }
        }
    }

    tracing::trace!(nodes = nodes.len(), "parsed template");
    Ok(nodes)
}

fn trim_leading(text: Cow<'_, str>, trim: TrimMode) -> Cow<'_, str> {
    let kept = match trim {
        TrimMode::None => return text,
        TrimMode::Newline => strip_line_break(&text).len(),
        TrimMode::Slurp => strip_line_break(text.trim_start_matches([' ', '\t'])).len(),
    };
    let dropped = text.len() - kept;
    if dropped == 0 {
        return text;
    }
    Cow::Owned(text[dropped..].to_string())
}

fn strip_line_break(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .or_else(|| text.strip_prefix('\r'))
        .unwrap_or(text)
}

/// `<%_` removes spaces and tabs immediately before the tag.
fn slurp_trailing(nodes: &mut [Node]) {
    if let Some(Node {
        kind: NodeKind::Text(text),
        ..
    }) = nodes.last_mut()
    {
        let kept = text.trim_end_matches([' ', '\t']).len();
        text.truncate(kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn nodes(source: &str) -> Vec<NodeKind> {
        parse(tokenize(source))
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect()
    }

    fn text(s: &str) -> NodeKind {
        NodeKind::Text(s.to_string())
    }

    #[test]
    fn one_node_per_tag_in_document_order() {
        let parsed = parse(tokenize("a<%= b %>c<%- d %><% e %><%# f %>")).unwrap();
        let summary: Vec<_> = parsed
            .iter()
            .map(|n| match &n.kind {
                NodeKind::Text(t) => format!("text:{t}"),
                NodeKind::Output { fragment, escape } => {
                    format!("out:{}:{escape}", fragment.source.trim())
                }
                NodeKind::Script(f) => format!("script:{}", f.source.trim()),
                NodeKind::Comment => "comment".to_string(),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                "text:a",
                "out:b:true",
                "text:c",
                "out:d:false",
                "script:e",
                "comment"
            ]
        );
    }

    #[test]
    fn dash_close_drops_one_line_break() {
        assert_eq!(
            nodes("<% x -%>\n\nend"),
            vec![
                NodeKind::Script(Fragment::new(" x ", 1, 3)),
                text("\nend")
            ]
        );
        assert_eq!(nodes("<% x -%>\r\nend")[1], text("end"));
    }

    #[test]
    fn trim_applies_to_the_text_right_after_its_own_tag() {
        let parsed = nodes("<% a -%><% b %>\nx");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[2], text("\nx"));
    }

    #[test]
    fn underscore_delimiters_slurp_spaces_and_tabs() {
        let parsed = nodes("  \t<%_ x _%> \t\nnext");
        assert_eq!(parsed[0], text(""));
        assert_eq!(parsed[2], text("next"));
    }

    #[test]
    fn slurp_only_reaches_the_current_line() {
        let parsed = nodes("a\n  <%_ x %>");
        assert_eq!(parsed[0], text("a\n"));
    }

    #[test]
    fn fragments_point_at_the_tag_body() {
        let parsed = parse(tokenize("line one\n  <%= user.name %>")).unwrap();
        let NodeKind::Output { fragment, .. } = &parsed[1].kind else {
            panic!("expected output node");
        };
        assert_eq!(parsed[1].line(), 2);
        assert_eq!((fragment.line, fragment.column), (2, 6));
    }

    #[test]
    fn unterminated_tag_reports_its_opening_line() {
        let err = parse(tokenize("ok\n\n<p><%= name </p>\nmore")).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 4);
        assert_eq!(
            err.to_string(),
            "Could not find matching close tag for \"<%=\""
        );
    }

    #[test]
    fn empty_tag_body_is_allowed() {
        assert_eq!(
            nodes("<%=%>"),
            vec![NodeKind::Output {
                fragment: Fragment::new("", 1, 4),
                escape: true
            }]
        );
    }
}
