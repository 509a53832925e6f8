//! Recursive-descent parser for the script subset.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{Loc, TemplatePart, Tok, Token};
use super::value::number_to_string;
use crate::executor::EvalError;

type Result<T> = std::result::Result<T, EvalError>;

/// Parse a statement list, e.g. a whole template program.
pub fn parse_program(tokens: Vec<Token>, max_nesting: usize) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(tokens, max_nesting);
    let mut body = Vec::new();
    while !matches!(parser.peek().tok, Tok::Eof) {
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parse a single expression that must span all of `tokens`. Returns `None`
/// when there are no tokens at all.
pub fn parse_expression(tokens: Vec<Token>, max_nesting: usize) -> Result<Option<Expr>> {
    let mut parser = Parser::new(tokens, max_nesting);
    if matches!(parser.peek().tok, Tok::Eof) {
        return Ok(None);
    }
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok(Some(expr))
}

struct Parser {
    tokens: Vec<Token>,
    at: usize,
    depth: usize,
    max_depth: usize,
    /// Inside a `for (…)` head, where `in` ends the left-hand side
    no_in: bool,
}

impl Parser {
    fn new(mut tokens: Vec<Token>, max_depth: usize) -> Self {
        if !matches!(tokens.last().map(|t| &t.tok), Some(Tok::Eof)) {
            let loc = tokens.last().map(|t| t.loc).unwrap_or_default();
            tokens.push(Token::synthetic(Tok::Eof, loc));
        }
        Self {
            tokens,
            at: 0,
            depth: 0,
            max_depth,
            no_in: false,
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.at.min(last)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.at + offset).min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.at < self.tokens.len() - 1 {
            self.at += 1;
        }
        token
    }

    fn loc(&self) -> Loc {
        self.peek().loc
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_punct(punct)
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_keyword(word)
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(&self.peek().tok, Tok::Ident(n) if &**n == name)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.next();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> EvalError {
        let token = self.peek();
        let message = match &token.tok {
            Tok::Eof => "SyntaxError: Unexpected end of input".to_string(),
            Tok::Number(_) => "SyntaxError: Unexpected number".to_string(),
            Tok::Str(_) => "SyntaxError: Unexpected string".to_string(),
            _ => format!("SyntaxError: Unexpected {}", token.describe()),
        };
        EvalError::syntax(message).at(token.loc.line, token.loc.column)
    }

    fn error_at(&self, loc: Loc, message: &str) -> EvalError {
        EvalError::syntax(format!("SyntaxError: {message}")).at(loc.line, loc.column)
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek().tok {
            Tok::Eof => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.max_depth {
            let loc = self.loc();
            return Err(EvalError::runtime("RangeError: Maximum nesting depth exceeded")
                .at(loc.line, loc.column));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Automatic semicolon insertion.
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        let inserted = token.newline_before
            || token.is_punct("}")
            || matches!(
                token.tok,
                Tok::Eof | Tok::EmitLiteral(_) | Tok::EmitOpen { .. } | Tok::EmitClose
            );
        if inserted {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn identifier(&mut self) -> Result<Rc<str>> {
        match &self.peek().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.next();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Property names may be keywords.
    fn property_name(&mut self) -> Result<Rc<str>> {
        match &self.peek().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.next();
                Ok(name)
            }
            Tok::Keyword(word) => {
                let name: Rc<str> = (*word).into();
                self.next();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    // statements

    fn statement(&mut self) -> Result<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        let kind = match self.peek().tok.clone() {
            Tok::Punct("{") => StmtKind::Block(self.block()?),
            Tok::Punct(";") => {
                self.next();
                StmtKind::Empty
            }
            Tok::Keyword(kind @ ("var" | "let" | "const")) => {
                self.next();
                let decl = self.declarations(decl_kind(kind))?;
                self.consume_semicolon()?;
                decl
            }
            Tok::Keyword("function") => {
                self.next();
                let def = self.function_rest(true, loc)?;
                StmtKind::FunctionDecl(def)
            }
            Tok::Keyword("if") => {
                self.next();
                let test = self.paren_expression()?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat_keyword("else") {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                StmtKind::If {
                    test,
                    then,
                    otherwise,
                }
            }
            Tok::Keyword("for") => {
                self.next();
                self.for_statement()?
            }
            Tok::Keyword("while") => {
                self.next();
                let test = self.paren_expression()?;
                let body = Box::new(self.statement()?);
                StmtKind::While { test, body }
            }
            Tok::Keyword("do") => {
                self.next();
                let body = Box::new(self.statement()?);
                if !self.eat_keyword("while") {
                    return Err(self.unexpected());
                }
                let test = self.paren_expression()?;
                self.eat_punct(";");
                StmtKind::DoWhile { body, test }
            }
            Tok::Keyword("switch") => {
                self.next();
                self.switch_statement()?
            }
            Tok::Keyword("break") => {
                self.next();
                self.consume_semicolon()?;
                StmtKind::Break
            }
            Tok::Keyword("continue") => {
                self.next();
                self.consume_semicolon()?;
                StmtKind::Continue
            }
            Tok::Keyword("return") => {
                self.next();
                let token = self.peek();
                let bare = token.newline_before
                    || token.is_punct(";")
                    || token.is_punct("}")
                    || matches!(
                        token.tok,
                        Tok::Eof | Tok::EmitLiteral(_) | Tok::EmitOpen { .. } | Tok::EmitClose
                    );
                let value = if bare { None } else { Some(self.expression()?) };
                self.consume_semicolon()?;
                StmtKind::Return(value)
            }
            Tok::Keyword("throw") => {
                self.next();
                let value = self.expression()?;
                self.consume_semicolon()?;
                StmtKind::Throw(value)
            }
            Tok::Keyword("try") => {
                self.next();
                self.try_statement()?
            }
            Tok::EmitLiteral(instruction) => {
                self.next();
                StmtKind::EmitLiteral(instruction)
            }
            Tok::EmitOpen { escape, .. } => {
                self.next();
                let value = if matches!(self.peek().tok, Tok::EmitClose) {
                    None
                } else {
                    Some(self.expression()?)
                };
                if !matches!(self.peek().tok, Tok::EmitClose) {
                    return Err(self.unexpected());
                }
                self.next();
                StmtKind::EmitValue { value, escape }
            }
            Tok::Keyword(word @ ("class" | "import" | "export" | "with" | "yield" | "super")) => {
                return Err(self.error_at(loc, &format!("'{word}' is not supported in templates")));
            }
            _ => {
                let expr = self.expression()?;
                self.consume_semicolon()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, loc })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.at_punct("}") {
            if matches!(self.peek().tok, Tok::Eof) {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.next();
        Ok(body)
    }

    fn paren_expression(&mut self) -> Result<Expr> {
        self.expect_punct("(")?;
        let expr = self.expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn declarations(&mut self, kind: DeclKind) -> Result<StmtKind> {
        let mut declarators = Vec::new();
        loop {
            let loc = self.loc();
            let pattern = self.pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            let needs_init = kind == DeclKind::Const || !matches!(pattern, Pattern::Ident(_));
            if init.is_none() && needs_init && !self.no_in {
                return Err(self.error_at(loc, "Missing initializer in declaration"));
            }
            declarators.push(Declarator { pattern, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(StmtKind::VarDecl(kind, declarators))
    }

    fn for_statement(&mut self) -> Result<StmtKind> {
        self.expect_punct("(")?;
        let head_loc = self.loc();
        let saved = std::mem::replace(&mut self.no_in, true);

        let init = match self.peek().tok.clone() {
            Tok::Punct(";") => None,
            Tok::Keyword(word @ ("var" | "let" | "const")) => {
                self.next();
                let kind = decl_kind(word);
                let pattern = self.pattern()?;
                if self.at_for_each() {
                    return self.for_each(ForBinding::Decl(kind, pattern), saved);
                }
                let mut declarators = Vec::new();
                let mut pattern = Some(pattern);
                loop {
                    let pattern = match pattern.take() {
                        Some(pattern) => pattern,
                        None => self.pattern()?,
                    };
                    let init = if self.eat_punct("=") {
                        Some(self.assignment()?)
                    } else {
                        None
                    };
                    declarators.push(Declarator { pattern, init });
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                Some(StmtKind::VarDecl(kind, declarators))
            }
            _ => {
                let expr = self.expression()?;
                if self.at_for_each() {
                    if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
                        return Err(self.error_at(expr.loc, "Invalid left-hand side in for-loop"));
                    }
                    return self.for_each(ForBinding::Target(expr), saved);
                }
                Some(StmtKind::Expr(expr))
            }
        };
        self.no_in = saved;

        let init = init.map(|kind| {
            Box::new(Stmt {
                kind,
                loc: head_loc,
            })
        });
        self.expect_punct(";")?;
        let test = if self.at_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn at_for_each(&self) -> bool {
        self.at_ident("of") || self.at_keyword("in")
    }

    /// The rest of a `for (x of …)` / `for (x in …)` head.
    fn for_each(&mut self, binding: ForBinding, saved_no_in: bool) -> Result<StmtKind> {
        let of = self.next().tok != Tok::Keyword("in");
        self.no_in = saved_no_in;
        let source = if of {
            self.assignment()?
        } else {
            self.expression()?
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(if of {
            StmtKind::ForOf {
                binding,
                iterable: source,
                body,
            }
        } else {
            StmtKind::ForIn {
                binding,
                object: source,
                body,
            }
        })
    }

    fn switch_statement(&mut self) -> Result<StmtKind> {
        let discriminant = self.paren_expression()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.expression()?)
            } else if self.eat_keyword("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !(self.at_keyword("case") || self.at_keyword("default") || self.at_punct("}")) {
                if matches!(self.peek().tok, Tok::Eof) {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    fn try_statement(&mut self) -> Result<StmtKind> {
        let block = self.block()?;
        let mut param = None;
        let handler = if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                param = Some(self.pattern()?);
                self.expect_punct(")")?;
            }
            Some(self.block()?)
        } else {
            None
        };
        let finalizer = if self.eat_keyword("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_at(self.loc(), "Missing catch or finally after try"));
        }
        Ok(StmtKind::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    // patterns

    fn pattern(&mut self) -> Result<Pattern> {
        if self.eat_punct("{") {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    rest = Some(self.identifier()?);
                    self.eat_punct(",");
                    continue;
                }
                let shorthand = matches!(self.peek().tok, Tok::Ident(_));
                let key = self.property_key()?;
                let item = if self.eat_punct(":") {
                    self.pattern_item()?
                } else {
                    let PropertyKey::Static(name) = &key else {
                        return Err(self.unexpected());
                    };
                    if !shorthand {
                        return Err(self.unexpected());
                    }
                    let default = if self.eat_punct("=") {
                        Some(self.assignment()?)
                    } else {
                        None
                    };
                    PatternItem {
                        pattern: Pattern::Ident(name.clone()),
                        default,
                    }
                };
                props.push(ObjectPatternProp { key, item });
                if !self.at_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object { props, rest });
        }

        if self.eat_punct("[") {
            let mut items = Vec::new();
            let mut rest = None;
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    items.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.pattern()?));
                } else {
                    items.push(Some(self.pattern_item()?));
                }
                if !self.at_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array { items, rest });
        }

        Ok(Pattern::Ident(self.identifier()?))
    }

    fn pattern_item(&mut self) -> Result<PatternItem> {
        let pattern = self.pattern()?;
        let default = if self.eat_punct("=") {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(PatternItem { pattern, default })
    }

    fn property_key(&mut self) -> Result<PropertyKey> {
        let key = match self.peek().tok.clone() {
            Tok::Str(text) => {
                self.next();
                PropertyKey::Static(text)
            }
            Tok::Number(n) => {
                self.next();
                PropertyKey::Static(number_to_string(n).into())
            }
            Tok::Punct("[") => {
                self.next();
                let saved = std::mem::replace(&mut self.no_in, false);
                let expr = self.assignment()?;
                self.no_in = saved;
                self.expect_punct("]")?;
                PropertyKey::Computed(expr)
            }
            _ => PropertyKey::Static(self.property_name()?),
        };
        Ok(key)
    }

    // functions

    /// After `function`: optional name, parameters, body.
    fn function_rest(&mut self, require_name: bool, loc: Loc) -> Result<Rc<FunctionDef>> {
        let name = if matches!(self.peek().tok, Tok::Ident(_)) {
            Some(self.identifier()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        let (params, rest) = self.parameters()?;
        let body = FunctionBody::Block(self.function_body()?);
        Ok(Rc::new(FunctionDef {
            name,
            params,
            rest,
            body,
            arrow: false,
            loc,
        }))
    }

    fn parameters(&mut self) -> Result<(Vec<PatternItem>, Option<Pattern>)> {
        self.expect_punct("(")?;
        let saved = std::mem::replace(&mut self.no_in, false);
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.pattern()?);
                self.expect_punct(")")?;
                break;
            }
            params.push(self.pattern_item()?);
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        self.no_in = saved;
        Ok((params, rest))
    }

    fn function_body(&mut self) -> Result<Vec<Stmt>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let body = self.block();
        self.no_in = saved;
        body
    }

    fn arrow_function(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let (params, rest) = if matches!(self.peek().tok, Tok::Ident(_)) {
            let name = self.identifier()?;
            (
                vec![PatternItem {
                    pattern: Pattern::Ident(name),
                    default: None,
                }],
                None,
            )
        } else {
            self.parameters()?
        };
        self.expect_punct("=>")?;
        let body = if self.at_punct("{") {
            FunctionBody::Block(self.function_body()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr {
            kind: ExprKind::Function(Rc::new(FunctionDef {
                name: None,
                params,
                rest,
                body,
                arrow: true,
                loc,
            })),
            loc,
        })
    }

    /// Whether the `(` at the cursor opens an arrow parameter list.
    fn at_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            let token = self.peek_at(offset);
            match token.tok {
                Tok::Punct("(" | "[" | "{") => depth += 1,
                Tok::Punct(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.peek_at(offset + 1).is_punct("=>");
                    }
                }
                Tok::Eof | Tok::EmitLiteral(_) | Tok::EmitOpen { .. } | Tok::EmitClose => {
                    return false;
                }
                _ => {}
            }
            offset += 1;
        }
    }

    // expressions

    fn expression(&mut self) -> Result<Expr> {
        let first = self.assignment()?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let loc = first.loc;
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(items),
            loc,
        })
    }

    fn assignment(&mut self) -> Result<Expr> {
        self.nested(Self::assignment_inner)
    }

    fn assignment_inner(&mut self) -> Result<Expr> {
        let arrow = match self.peek().tok {
            Tok::Ident(_) => self.peek_at(1).is_punct("=>"),
            Tok::Punct("(") => self.at_arrow_params(),
            _ => false,
        };
        if arrow {
            return self.arrow_function();
        }

        let target = self.conditional()?;
        let op = match self.peek().tok {
            Tok::Punct(p) => assign_op(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
            return Err(self.error_at(target.loc, "Invalid left-hand side in assignment"));
        }
        self.next();
        let value = self.assignment()?;
        let loc = target.loc;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            loc,
        })
    }

    fn conditional(&mut self) -> Result<Expr> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let saved = std::mem::replace(&mut self.no_in, false);
        let then = self.assignment()?;
        self.no_in = saved;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        let loc = test.loc;
        Ok(Expr {
            kind: ExprKind::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            loc,
        })
    }

    fn binary_op(&self) -> Option<(Operator, u8)> {
        let token = self.peek();
        let op = match token.tok {
            Tok::Punct(p) => p,
            Tok::Keyword("instanceof") => return Some((Operator::Binary(BinaryOp::InstanceOf), 8)),
            Tok::Keyword("in") if !self.no_in => return Some((Operator::Binary(BinaryOp::In), 8)),
            _ => return None,
        };
        let found = match op {
            "??" => (Operator::Logical(LogicalOp::Nullish), 1),
            "||" => (Operator::Logical(LogicalOp::Or), 2),
            "&&" => (Operator::Logical(LogicalOp::And), 3),
            "|" => (Operator::Binary(BinaryOp::BitOr), 4),
            "^" => (Operator::Binary(BinaryOp::BitXor), 5),
            "&" => (Operator::Binary(BinaryOp::BitAnd), 6),
            "==" => (Operator::Binary(BinaryOp::Eq), 7),
            "!=" => (Operator::Binary(BinaryOp::NotEq), 7),
            "===" => (Operator::Binary(BinaryOp::StrictEq), 7),
            "!==" => (Operator::Binary(BinaryOp::StrictNotEq), 7),
            "<" => (Operator::Binary(BinaryOp::Lt), 8),
            "<=" => (Operator::Binary(BinaryOp::LtEq), 8),
            ">" => (Operator::Binary(BinaryOp::Gt), 8),
            ">=" => (Operator::Binary(BinaryOp::GtEq), 8),
            "<<" => (Operator::Binary(BinaryOp::Shl), 9),
            ">>" => (Operator::Binary(BinaryOp::Shr), 9),
            ">>>" => (Operator::Binary(BinaryOp::UShr), 9),
            "+" => (Operator::Binary(BinaryOp::Add), 10),
            "-" => (Operator::Binary(BinaryOp::Sub), 10),
            "*" => (Operator::Binary(BinaryOp::Mul), 11),
            "/" => (Operator::Binary(BinaryOp::Div), 11),
            "%" => (Operator::Binary(BinaryOp::Rem), 11),
            "**" => (Operator::Binary(BinaryOp::Exp), 12),
            _ => return None,
        };
        Some(found)
    }

    /// Precedence climbing over the binary and logical operators.
    fn binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some((op, precedence)) = self.binary_op() {
            if precedence < min_precedence {
                break;
            }
            self.next();
            let right_precedence = if matches!(op, Operator::Binary(BinaryOp::Exp)) {
                precedence
            } else {
                precedence + 1
            };
            let right = self.nested(|p| p.binary(right_precedence))?;
            let loc = left.loc;
            let kind = match op {
                Operator::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Logical(op) => ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expr { kind, loc };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let op = match self.peek().tok {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Minus),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Punct("~") => Some(UnaryOp::BitNot),
            Tok::Keyword("typeof") => Some(UnaryOp::TypeOf),
            Tok::Keyword("void") => Some(UnaryOp::Void),
            Tok::Keyword("delete") => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let arg = self.nested(Self::unary)?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    arg: Box::new(arg),
                },
                loc,
            });
        }

        if self.at_punct("++") || self.at_punct("--") {
            let increment = self.next().is_punct("++");
            let target = self.nested(Self::unary)?;
            check_update_target(&target).map_err(|m| self.error_at(target.loc, m))?;
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                },
                loc,
            });
        }

        let expr = self.call_member()?;
        let token = self.peek();
        if (token.is_punct("++") || token.is_punct("--")) && !token.newline_before {
            check_update_target(&expr).map_err(|m| self.error_at(expr.loc, m))?;
            let increment = self.next().is_punct("++");
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: false,
                    target: Box::new(expr),
                },
                loc,
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Argument>> {
        self.expect_punct("(")?;
        let saved = std::mem::replace(&mut self.no_in, false);
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Argument::Spread(self.assignment()?));
            } else {
                args.push(Argument::Plain(self.assignment()?));
            }
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        self.no_in = saved;
        Ok(args)
    }

    fn computed_member(&mut self) -> Result<Box<Expr>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let expr = self.expression()?;
        self.no_in = saved;
        self.expect_punct("]")?;
        Ok(Box::new(expr))
    }

    fn call_member(&mut self) -> Result<Expr> {
        let mut expr = if self.at_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut chained = false;

        loop {
            let loc = self.loc();
            let kind = if self.eat_punct(".") {
                ExprKind::Member {
                    object: Box::new(expr),
                    property: MemberKey::Static(self.property_name()?),
                    optional: false,
                }
            } else if self.eat_punct("?.") {
                chained = true;
                if self.at_punct("(") {
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: true,
                    }
                } else if self.eat_punct("[") {
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: MemberKey::Computed(self.computed_member()?),
                        optional: true,
                    }
                } else {
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: MemberKey::Static(self.property_name()?),
                        optional: true,
                    }
                }
            } else if self.eat_punct("[") {
                ExprKind::Member {
                    object: Box::new(expr),
                    property: MemberKey::Computed(self.computed_member()?),
                    optional: false,
                }
            } else if self.at_punct("(") {
                ExprKind::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                    optional: false,
                }
            } else {
                break;
            };
            expr = Expr { kind, loc };
        }

        if chained {
            let loc = expr.loc;
            expr = Expr {
                kind: ExprKind::OptionalChain(Box::new(expr)),
                loc,
            };
        }
        Ok(expr)
    }

    fn new_expression(&mut self) -> Result<Expr> {
        let loc = self.loc();
        self.next();
        let mut callee = if self.at_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            let member_loc = self.loc();
            let property = if self.eat_punct(".") {
                MemberKey::Static(self.property_name()?)
            } else if self.eat_punct("[") {
                MemberKey::Computed(self.computed_member()?)
            } else {
                break;
            };
            callee = Expr {
                kind: ExprKind::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                },
                loc: member_loc,
            };
        }
        let args = if self.at_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            loc,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        let loc = token.loc;
        let kind = match token.tok {
            Tok::Number(n) => {
                self.next();
                ExprKind::Number(n)
            }
            Tok::Str(text) => {
                self.next();
                ExprKind::Str(text)
            }
            Tok::Template(parts) => {
                self.next();
                ExprKind::Template(self.template(parts, loc)?)
            }
            Tok::Ident(name) => {
                self.next();
                ExprKind::Ident(name)
            }
            Tok::Keyword("this") => {
                self.next();
                ExprKind::This
            }
            Tok::Keyword("true") => {
                self.next();
                ExprKind::Bool(true)
            }
            Tok::Keyword("false") => {
                self.next();
                ExprKind::Bool(false)
            }
            Tok::Keyword("null") => {
                self.next();
                ExprKind::Null
            }
            Tok::Keyword("function") => {
                self.next();
                ExprKind::Function(self.function_rest(false, loc)?)
            }
            Tok::Punct("(") => {
                self.next();
                let saved = std::mem::replace(&mut self.no_in, false);
                let inner = self.expression()?;
                self.no_in = saved;
                self.expect_punct(")")?;
                return Ok(inner);
            }
            Tok::Punct("[") => {
                self.next();
                ExprKind::Array(self.array_items()?)
            }
            Tok::Punct("{") => {
                self.next();
                ExprKind::Object(self.object_properties()?)
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Expr { kind, loc })
    }

    fn template(&mut self, parts: Vec<TemplatePart>, loc: Loc) -> Result<Vec<TemplatePiece>> {
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => pieces.push(TemplatePiece::Text(text)),
                TemplatePart::Expr(tokens) => {
                    let mut inner = Parser::new(tokens, self.max_depth);
                    inner.depth = self.depth;
                    if matches!(inner.peek().tok, Tok::Eof) {
                        return Err(self.error_at(loc, "Unexpected token '}'"));
                    }
                    let expr = inner.expression()?;
                    inner.expect_eof()?;
                    pieces.push(TemplatePiece::Expr(expr));
                }
            }
        }
        Ok(pieces)
    }

    fn array_items(&mut self) -> Result<Vec<ArrayItem>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let mut items = Vec::new();
        while !self.eat_punct("]") {
            if self.eat_punct(",") {
                items.push(ArrayItem::Hole);
                continue;
            }
            if self.eat_punct("...") {
                items.push(ArrayItem::Spread(self.assignment()?));
            } else {
                items.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.at_punct("]") {
                self.expect_punct(",")?;
            }
        }
        self.no_in = saved;
        Ok(items)
    }

    fn object_properties(&mut self) -> Result<Vec<Property>> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(Property::Spread(self.assignment()?));
            } else {
                let loc = self.loc();
                let shorthand = match &self.peek().tok {
                    Tok::Ident(name) => Some(name.clone()),
                    _ => None,
                };
                let key = self.property_key()?;
                let value = if self.eat_punct(":") {
                    self.assignment()?
                } else if self.at_punct("(") {
                    let (params, rest) = self.parameters()?;
                    let body = FunctionBody::Block(self.function_body()?);
                    let name = match &key {
                        PropertyKey::Static(name) => Some(name.clone()),
                        PropertyKey::Computed(_) => None,
                    };
                    Expr {
                        kind: ExprKind::Function(Rc::new(FunctionDef {
                            name,
                            params,
                            rest,
                            body,
                            arrow: false,
                            loc,
                        })),
                        loc,
                    }
                } else if let Some(name) = shorthand {
                    Expr {
                        kind: ExprKind::Ident(name),
                        loc,
                    }
                } else {
                    return Err(self.unexpected());
                };
                props.push(Property::Entry { key, value });
            }
            if !self.at_punct("}") {
                self.expect_punct(",")?;
            }
        }
        self.no_in = saved;
        Ok(props)
    }
}

#[derive(Clone, Copy)]
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn decl_kind(word: &str) -> DeclKind {
    match word {
        "let" => DeclKind::Let,
        "const" => DeclKind::Const,
        _ => DeclKind::Var,
    }
}

fn assign_op(punct: &str) -> Option<AssignOp> {
    let op = match punct {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Compound(BinaryOp::Add),
        "-=" => AssignOp::Compound(BinaryOp::Sub),
        "*=" => AssignOp::Compound(BinaryOp::Mul),
        "/=" => AssignOp::Compound(BinaryOp::Div),
        "%=" => AssignOp::Compound(BinaryOp::Rem),
        "**=" => AssignOp::Compound(BinaryOp::Exp),
        "<<=" => AssignOp::Compound(BinaryOp::Shl),
        ">>=" => AssignOp::Compound(BinaryOp::Shr),
        ">>>=" => AssignOp::Compound(BinaryOp::UShr),
        "&=" => AssignOp::Compound(BinaryOp::BitAnd),
        "|=" => AssignOp::Compound(BinaryOp::BitOr),
        "^=" => AssignOp::Compound(BinaryOp::BitXor),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    };
    Some(op)
}

fn check_update_target(target: &Expr) -> std::result::Result<(), &'static str> {
    match target.kind {
        ExprKind::Ident(_) | ExprKind::Member { .. } => Ok(()),
        _ => Err("Invalid left-hand side expression in postfix operation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn program(source: &str) -> Result<Vec<Stmt>> {
        parse_program(tokenize(source, Loc::new(1, 1))?, 64)
    }

    fn expression(source: &str) -> Expr {
        parse_expression(tokenize(source, Loc::new(1, 1)).unwrap(), 64)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn precedence_binds_tighter_operators_first() {
        let expr = expression("a || b && c + d * e ** f ** g");
        let ExprKind::Logical {
            op: LogicalOp::Or,
            right,
            ..
        } = expr.kind
        else {
            panic!("expected || at the root");
        };
        let ExprKind::Logical {
            op: LogicalOp::And,
            right,
            ..
        } = right.kind
        else {
            panic!("expected && under ||");
        };
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn arrows_and_functions() {
        assert!(matches!(expression("x => x * 2").kind, ExprKind::Function(ref f) if f.arrow));
        assert!(matches!(
            expression("(a, {b}) => a").kind,
            ExprKind::Function(ref f) if f.params.len() == 2
        ));
        assert!(matches!(expression("(a, b)").kind, ExprKind::Sequence(_)));
        assert!(matches!(
            expression("function (p) { return p; }").kind,
            ExprKind::Function(ref f) if !f.arrow
        ));
    }

    #[test]
    fn optional_chains_are_wrapped_once() {
        let expr = expression("a?.b.c()");
        let ExprKind::OptionalChain(inner) = expr.kind else {
            panic!("expected optional chain");
        };
        assert!(matches!(inner.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn asi_at_line_breaks_and_braces() {
        let body = program("let a = 1\nlet b = 2\nif (a) { b++ }").unwrap();
        assert_eq!(body.len(), 3);
        assert!(program("let a = 1 let b = 2").is_err());
    }

    #[test]
    fn for_heads() {
        let body = program(
            "for (let i = 0, n = 3; i < n; i++) {}\nfor (const [k, v] of entries) {}\nfor (key in obj) {}",
        )
        .unwrap();
        assert!(matches!(body[0].kind, StmtKind::For { .. }));
        assert!(matches!(
            body[1].kind,
            StmtKind::ForOf {
                binding: ForBinding::Decl(DeclKind::Const, Pattern::Array { .. }),
                ..
            }
        ));
        assert!(matches!(
            body[2].kind,
            StmtKind::ForIn {
                binding: ForBinding::Target(_),
                ..
            }
        ));
    }

    #[test]
    fn syntax_errors_point_at_the_offending_token() {
        let err = program("let x = ;").unwrap_err();
        assert_eq!(err.message, "SyntaxError: Unexpected token ';'");
        assert_eq!((err.line, err.column), (Some(1), Some(9)));

        let err = program("foo(").unwrap_err();
        assert_eq!(err.message, "SyntaxError: Unexpected end of input");

        let err = program("const x").unwrap_err();
        assert_eq!(err.message, "SyntaxError: Missing initializer in declaration");
    }

    #[test]
    fn deep_nesting_hits_the_limit() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = program(&source).unwrap_err();
        assert!(err.message.starts_with("RangeError"));
    }
}
