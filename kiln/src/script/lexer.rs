//! Script tokenizer.
//!
//! Works on one fragment at a time, starting from the fragment's position in
//! the template so every token carries template coordinates.

use std::rc::Rc;

use crate::executor::EvalError;

/// A template line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "let",
    "new",
    "null",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

/// Whether `word` can never be used as a binding name.
pub fn is_reserved_word(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn keyword(word: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|k| *k == word)
}

// Longest first, so the first prefix match wins.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(Rc<str>),
    Expr(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(Rc<str>),
    Keyword(&'static str),
    Number(f64),
    Str(Rc<str>),
    Template(Vec<TemplatePart>),
    Punct(&'static str),
    /// Literal text of the given instruction
    EmitLiteral(usize),
    /// Start of an output tag body
    EmitOpen { escape: bool, instruction: usize },
    /// End of an output tag body
    EmitClose,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub loc: Loc,
    /// A line break (or a tag boundary) separates this token from the
    /// previous one; drives automatic semicolon insertion
    pub newline_before: bool,
}

impl Token {
    pub fn synthetic(tok: Tok, loc: Loc) -> Self {
        Self {
            tok,
            loc,
            newline_before: true,
        }
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(self.tok, Tok::Punct(p) if p == punct)
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self.tok, Tok::Keyword(k) if k == word)
    }

    pub fn describe(&self) -> String {
        match &self.tok {
            Tok::Ident(name) => format!("identifier '{name}'"),
            Tok::Keyword(k) => format!("token '{k}'"),
            Tok::Number(n) => format!("number {n}"),
            Tok::Str(_) => "string".to_string(),
            Tok::Template(_) => "template string".to_string(),
            Tok::Punct(p) => format!("token '{p}'"),
            Tok::EmitLiteral(_) => "template text".to_string(),
            Tok::EmitOpen { .. } => "token '<%='".to_string(),
            Tok::EmitClose => "token '%>'".to_string(),
            Tok::Eof => "end of input".to_string(),
        }
    }
}

/// Tokenize `source`, whose first character sits at `start` in the template.
pub fn tokenize(source: &str, start: Loc) -> Result<Vec<Token>, EvalError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        at: 0,
        line: start.line,
        column: start.column,
        newline: false,
    };
    lexer.tokens(false)
}

struct Lexer {
    chars: Vec<char>,
    at: usize,
    line: u32,
    column: u32,
    newline: bool,
}

impl Lexer {
    fn loc(&self) -> Loc {
        Loc::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.at + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.at += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn error(&self, message: impl std::fmt::Display, loc: Loc) -> EvalError {
        EvalError::syntax(format!("SyntaxError: {message}")).at(loc.line, loc.column)
    }

    /// Lex to end of input, or (inside `${ }`) to the unmatched `}`.
    fn tokens(&mut self, in_template: bool) -> Result<Vec<Token>, EvalError> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut depth = 0usize;

        loop {
            self.skip_trivia()?;
            let loc = self.loc();
            let Some(c) = self.peek() else {
                if in_template {
                    return Err(self.error("Unterminated template literal", loc));
                }
                return Ok(tokens);
            };

            if in_template && c == '}' && depth == 0 {
                self.bump();
                return Ok(tokens);
            }

            let tok = if c.is_alphabetic() || c == '_' || c == '$' {
                let word = self.word();
                match keyword(&word) {
                    Some(k) => Tok::Keyword(k),
                    None => Tok::Ident(word.into()),
                }
            } else if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                Tok::Number(self.number(loc)?)
            } else if c == '"' || c == '\'' {
                Tok::Str(self.string(c, loc)?.into())
            } else if c == '`' {
                Tok::Template(self.template(loc)?)
            } else if c == '/' && regex_allowed(tokens.last()) {
                return Err(self.error("Regular expression literals are not supported", loc));
            } else {
                let punct = self.punct(loc)?;
                match punct {
                    "{" => depth += 1,
                    "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
                Tok::Punct(punct)
            };

            tokens.push(Token {
                tok,
                loc,
                newline_before: std::mem::take(&mut self.newline),
            });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), EvalError> {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' || c == '\u{2028}' || c == '\u{2029}' {
                self.newline = true;
                self.bump();
            } else if c.is_whitespace() {
                self.bump();
            } else if self.starts_with("//") {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else if self.starts_with("/*") {
                let loc = self.loc();
                self.bump();
                self.bump();
                loop {
                    if self.starts_with("*/") {
                        self.bump();
                        self.bump();
                        break;
                    }
                    match self.bump() {
                        Some('\n') => self.newline = true,
                        Some(_) => {}
                        None => return Err(self.error("Unterminated comment", loc)),
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self, loc: Loc) -> Result<f64, EvalError> {
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_digit(radix) || *c == '_') {
                    if c != '_' {
                        digits.push(c);
                    }
                    self.bump();
                }
                return u64::from_str_radix(&digits, radix)
                    .map(|n| n as f64)
                    .map_err(|_| self.error("Invalid or unexpected token", loc));
            }
        }

        let mut text = String::new();
        self.decimal_digits(&mut text);
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            self.decimal_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1);
            let has_digits = match sign {
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if has_digits {
                text.push('e');
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
                self.decimal_digits(&mut text);
            }
        }
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$') {
            return Err(self.error("Invalid or unexpected token", loc));
        }
        text.parse::<f64>()
            .map_err(|_| self.error("Invalid or unexpected token", loc))
    }

    fn decimal_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
            if c != '_' {
                text.push(c);
            }
            self.bump();
        }
    }

    fn escape(&mut self, loc: Loc) -> Result<Option<char>, EvalError> {
        let Some(c) = self.bump() else {
            return Err(self.error("Invalid or unexpected token", loc));
        };
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => '\0',
            // line continuation
            '\n' => return Ok(None),
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
                return Ok(None);
            }
            'x' => self.hex_digits(2, loc)?,
            'u' => {
                if self.peek() == Some('{') {
                    self.bump();
                    let mut hex = String::new();
                    while let Some(d) = self.peek().filter(|d| d.is_ascii_hexdigit()) {
                        hex.push(d);
                        self.bump();
                    }
                    if self.bump() != Some('}') {
                        return Err(self.error("Invalid Unicode escape sequence", loc));
                    }
                    u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error("Undefined Unicode code-point", loc))?
                } else {
                    self.hex_digits(4, loc)?
                }
            }
            other => other,
        };
        Ok(Some(decoded))
    }

    fn hex_digits(&mut self, count: usize, loc: Loc) -> Result<char, EvalError> {
        let mut hex = String::new();
        for _ in 0..count {
            match self.bump() {
                Some(d) if d.is_ascii_hexdigit() => hex.push(d),
                _ => return Err(self.error("Invalid hexadecimal escape sequence", loc)),
            }
        }
        // Lone surrogates have no `char`; they decode to U+FFFD.
        Ok(u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn string(&mut self, quote: char, loc: Loc) -> Result<String, EvalError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("Invalid or unexpected token", loc)),
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(text);
                }
                Some('\\') => {
                    self.bump();
                    if let Some(c) = self.escape(loc)? {
                        text.push(c);
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn template(&mut self, loc: Loc) -> Result<Vec<TemplatePart>, EvalError> {
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("Unterminated template literal", loc)),
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    if let Some(c) = self.escape(loc)? {
                        text.push(c);
                    }
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text).into()));
                    }
                    let saved = std::mem::take(&mut self.newline);
                    let inner = self.tokens(true)?;
                    self.newline = saved;
                    parts.push(TemplatePart::Expr(inner));
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text.into()));
        }
        Ok(parts)
    }

    fn punct(&mut self, loc: Loc) -> Result<&'static str, EvalError> {
        let Some(found) = PUNCTUATORS.iter().copied().find(|p| self.starts_with(p)) else {
            let c = self.peek().unwrap_or(' ');
            return Err(self.error(format!("Invalid or unexpected token '{c}'"), loc));
        };
        // `a?.5:b` is a conditional, not optional chaining
        let found = if found == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
            "?"
        } else {
            found
        };
        for _ in 0..found.chars().count() {
            self.bump();
        }
        Ok(found)
    }
}

/// A `/` starts a regular expression wherever an operand is expected.
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous.map(|t| &t.tok) {
        None => true,
        Some(Tok::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
        Some(Tok::Keyword(k)) => !matches!(*k, "this" | "true" | "false" | "null" | "super"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        tokenize(source, Loc::new(1, 1))
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn words_numbers_and_punctuation() {
        assert_eq!(
            toks("let x = a?.b ?? 0x1F + .5e1;"),
            vec![
                Tok::Keyword("let"),
                Tok::Ident("x".into()),
                Tok::Punct("="),
                Tok::Ident("a".into()),
                Tok::Punct("?."),
                Tok::Ident("b".into()),
                Tok::Punct("??"),
                Tok::Number(31.0),
                Tok::Punct("+"),
                Tok::Number(5.0),
                Tok::Punct(";"),
            ]
        );
    }

    #[test]
    fn string_escapes_decode() {
        assert_eq!(
            toks(r#"'it\'s' "A\x42\u{1F600}\n""#),
            vec![Tok::Str("it's".into()), Tok::Str("AB😀\n".into())]
        );
    }

    #[test]
    fn template_literals_nest_expressions() {
        let tokens = toks("`a ${ {b: 1}.b } c`");
        let [Tok::Template(parts)] = tokens.as_slice() else {
            panic!("expected one template token, got {tokens:?}");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Text("a ".into()));
        assert_eq!(parts[2], TemplatePart::Text(" c".into()));
    }

    #[test]
    fn tokens_carry_template_coordinates() {
        let tokens = tokenize("a +\n  b", Loc::new(7, 10)).unwrap();
        assert_eq!(tokens[0].loc, Loc::new(7, 10));
        assert_eq!(tokens[2].loc, Loc::new(8, 3));
        assert!(tokens[2].newline_before);
        assert!(!tokens[1].newline_before);
    }

    #[test]
    fn comments_are_skipped_and_count_as_line_breaks() {
        let tokens = tokenize("a /* x\n */ b // tail", Loc::new(1, 1)).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn regex_literals_are_rejected() {
        let err = tokenize("s.replace(/a/g, 'b')", Loc::new(3, 4)).unwrap_err();
        assert_eq!(err.line, Some(3));
        assert!(err.message.starts_with("SyntaxError"));
        // division is still division
        assert!(tokenize("a / b / 2", Loc::new(1, 1)).is_ok());
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("'abc", Loc::new(2, 5)).unwrap_err();
        assert_eq!((err.line, err.column), (Some(2), Some(5)));
    }
}
