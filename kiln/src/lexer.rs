//! Template lexer
//!
//! Splits raw template text into literal runs and tag delimiters in a single
//! left-to-right pass. Tag bodies are captured verbatim up to the first close
//! delimiter; nothing inside a body is interpreted here.
//!
//! The lexer never fails. An unterminated tag shows up as a `TagOpen` followed
//! by a final `Literal` holding the rest of the input, and the parser turns
//! that into an error pointing at the opening delimiter.

use std::borrow::Cow;

/// A position in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    /// Byte offset from the start of the template
    pub offset: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column, counted in characters
    pub column: u32,
}

impl Pos {
    /// The first character of a template.
    pub const START: Pos = Pos {
        offset: 0,
        line: 1,
        column: 1,
    };
}

impl Default for Pos {
    fn default() -> Self {
        Self::START
    }
}

/// What an opening delimiter asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<%= expr %>`: evaluate, HTML-escape, emit
    Escaped,
    /// `<%- expr %>`: evaluate, emit verbatim
    Raw,
    /// `<% code %>`: run for side effects
    Scriptlet,
    /// `<%# ... %>`: ignored
    Comment,
}

impl TagKind {
    /// The opening delimiter as written in the template.
    pub fn delimiter(self, slurp: bool) -> &'static str {
        match (self, slurp) {
            (TagKind::Escaped, _) => "<%=",
            (TagKind::Raw, _) => "<%-",
            (TagKind::Comment, _) => "<%#",
            (TagKind::Scriptlet, true) => "<%_",
            (TagKind::Scriptlet, false) => "<%",
        }
    }
}

/// Whitespace handling requested by a closing delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    /// `%>`
    None,
    /// `-%>`: drop the single line break right after the tag
    Newline,
    /// `_%>`: drop spaces and tabs after the tag, then one line break
    Slurp,
}

/// A lexical token of the template language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'src> {
    /// Literal text, or the verbatim body of a tag
    Literal(Cow<'src, str>, Pos),
    /// An opening delimiter. `slurp` is set for `<%_`.
    TagOpen {
        kind: TagKind,
        slurp: bool,
        pos: Pos,
    },
    /// A closing delimiter
    TagClose(TrimMode, Pos),
}

impl Token<'_> {
    /// Where the token starts.
    pub fn pos(&self) -> Pos {
        match self {
            Token::Literal(_, pos) | Token::TagClose(_, pos) => *pos,
            Token::TagOpen { pos, .. } => *pos,
        }
    }
}

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).run()
}

struct Lexer<'src> {
    source: &'src str,
    cursor: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token<'src>>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            cursor: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            offset: self.cursor,
            line: self.line,
            column: self.column,
        }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.cursor..]
    }

    /// Move the cursor forward by `len` bytes, keeping line/column in sync.
    fn advance(&mut self, len: usize) {
        let consumed = &self.source[self.cursor..self.cursor + len];
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.cursor += len;
    }

    fn run(mut self) -> Vec<Token<'src>> {
        while self.cursor < self.source.len() {
            self.scan_text();
            if self.cursor >= self.source.len() {
                break;
            }
            if !self.scan_tag() {
                break;
            }
        }
        self.tokens
    }

    /// Emit the literal run up to the next real opening delimiter.
    fn scan_text(&mut self) {
        let rest = self.rest();
        let end = find_open(rest).unwrap_or(rest.len());
        if end == 0 {
            return;
        }

        let raw = &rest[..end];
        let text = if raw.contains("<%%") || raw.contains("%%>") {
            Cow::Owned(raw.replace("<%%", OPEN).replace("%%>", CLOSE))
        } else {
            Cow::Borrowed(raw)
        };
        let pos = self.pos();
        self.advance(end);
        self.tokens.push(Token::Literal(text, pos));
    }

    /// Emit one tag starting at the cursor. Returns false once the input
    /// has been exhausted by an unterminated tag.
    fn scan_tag(&mut self) -> bool {
        let open_pos = self.pos();
        let (kind, slurp, width) = match self.rest().as_bytes().get(OPEN.len()) {
            Some(b'=') => (TagKind::Escaped, false, 3),
            Some(b'-') => (TagKind::Raw, false, 3),
            Some(b'#') => (TagKind::Comment, false, 3),
            Some(b'_') => (TagKind::Scriptlet, true, 3),
            _ => (TagKind::Scriptlet, false, 2),
        };
        self.advance(width);
        self.tokens.push(Token::TagOpen {
            kind,
            slurp,
            pos: open_pos,
        });

        let body_pos = self.pos();
        let rest = self.rest();
        let Some(close_at) = rest.find(CLOSE) else {
            self.advance(rest.len());
            self.tokens.push(Token::Literal(Cow::Borrowed(rest), body_pos));
            return false;
        };

        let (body_len, trim) = match rest[..close_at].as_bytes().last() {
            Some(b'-') => (close_at - 1, TrimMode::Newline),
            Some(b'_') => (close_at - 1, TrimMode::Slurp),
            _ => (close_at, TrimMode::None),
        };
        self.advance(body_len);
        self.tokens
            .push(Token::Literal(Cow::Borrowed(&rest[..body_len]), body_pos));

        let close_pos = self.pos();
        self.advance(close_at + CLOSE.len() - body_len);
        self.tokens.push(Token::TagClose(trim, close_pos));
        true
    }
}

/// Byte index of the next `<%` that is not the `<%%` escape.
fn find_open(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = text[from..].find(OPEN) {
        let at = from + found;
        if text.as_bytes().get(at + OPEN.len()) == Some(&b'%') {
            from = at + OPEN.len() + 1;
            continue;
        }
        return Some(at);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal<'a>(token: &'a Token<'_>) -> &'a str {
        match token {
            Token::Literal(text, _) => text,
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_one_literal() {
        let tokens = tokenize("<p>hello</p>");
        assert_eq!(tokens.len(), 1);
        assert_eq!(literal(&tokens[0]), "<p>hello</p>");
    }

    #[test]
    fn recognizes_every_open_delimiter() {
        let tokens = tokenize("<%= a %><%- b %><% c %><%# d %><%_ e %>");
        let kinds: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::TagOpen { kind, slurp, .. } => Some((*kind, *slurp)),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (TagKind::Escaped, false),
                (TagKind::Raw, false),
                (TagKind::Scriptlet, false),
                (TagKind::Comment, false),
                (TagKind::Scriptlet, true),
            ]
        );
    }

    #[test]
    fn trim_modifiers_ride_on_the_close_token() {
        let tokens = tokenize("<% a -%><% b _%><% c %>");
        let trims: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::TagClose(trim, _) => Some(*trim),
                _ => None,
            })
            .collect();
        assert_eq!(
            trims,
            vec![TrimMode::Newline, TrimMode::Slurp, TrimMode::None]
        );
        assert_eq!(literal(&tokens[1]), " a ");
    }

    #[test]
    fn body_is_captured_verbatim_up_to_first_close() {
        let tokens = tokenize("<%= a < b && c > d ? '<i>' : x %>!");
        assert_eq!(literal(&tokens[1]), " a < b && c > d ? '<i>' : x ");
        assert_eq!(literal(&tokens[3]), "!");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("ab\ncd <%= x %>\n  <% y %>");
        let Token::TagOpen { pos, .. } = tokens[1] else {
            panic!("expected tag open");
        };
        assert_eq!((pos.line, pos.column, pos.offset), (2, 4, 6));

        let body = tokens[2].pos();
        assert_eq!((body.line, body.column), (2, 7));

        let Token::TagOpen { pos, .. } = tokens[5] else {
            panic!("expected tag open");
        };
        assert_eq!((pos.line, pos.column), (3, 3));
    }

    #[test]
    fn unterminated_tag_leaves_remainder_as_literal() {
        let tokens = tokenize("ok <%= name \n more");
        assert_eq!(tokens.len(), 3);
        assert!(matches!(
            tokens[1],
            Token::TagOpen {
                kind: TagKind::Escaped,
                ..
            }
        ));
        assert_eq!(literal(&tokens[2]), " name \n more");
    }

    #[test]
    fn percent_escapes_produce_literal_delimiters() {
        let tokens = tokenize("a <%% b %%> c");
        assert_eq!(tokens.len(), 1);
        assert_eq!(literal(&tokens[0]), "a <% b %> c");
    }

    #[test]
    fn multibyte_text_keeps_character_columns() {
        let tokens = tokenize("✓ ok <%= x %>");
        let Token::TagOpen { pos, .. } = tokens[1] else {
            panic!("expected tag open");
        };
        assert_eq!(pos.column, 6);
        assert_eq!(pos.offset, "✓ ok ".len());
    }
}
