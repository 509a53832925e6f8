//! Lowers template nodes into an executable program.
//!
//! Expression and code fragments are not parsed here. They are carried along
//! as opaque source and only handed to an [`Evaluator`](crate::Evaluator) at
//! execution time, which is why compilation cannot fail.

use crate::parser::{Fragment, Node, NodeKind};

/// Index into [`CompiledProgram::fragments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentRef(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Append text verbatim
    EmitLiteral(String),
    /// Evaluate an expression and append its string form
    EmitExpression { fragment: FragmentRef, escape: bool },
    /// Run a statement sequence for its side effects
    ExecuteCode(FragmentRef),
}

/// What produced a source-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Instruction,
    /// Comments emit nothing but still occupy template lines
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    /// Index of the instruction this entry belongs to. Comment entries use
    /// the index of the instruction that follows them.
    pub instruction: usize,
    /// 1-based template line
    pub line: u32,
    pub origin: Origin,
}

/// Maps instruction indices back to template lines.
///
/// Entries are appended in document order, so both `instruction` and `line`
/// are non-decreasing along the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    fn record(&mut self, instruction: usize, line: u32, origin: Origin) {
        debug_assert!(
            self.entries
                .last()
                .is_none_or(|last| last.instruction <= instruction && last.line <= line),
            "source map entries must be recorded in document order"
        );
        self.entries.push(SourceMapEntry {
            instruction,
            line,
            origin,
        });
    }

    pub fn entries(&self) -> &[SourceMapEntry] {
        &self.entries
    }

    /// Line of the nearest entry at or before `instruction`.
    pub fn line_of(&self, instruction: usize) -> Option<u32> {
        let after = self
            .entries
            .partition_point(|entry| entry.instruction <= instruction);
        after
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|entry| entry.line)
    }

    /// Line of the last entry, i.e. the last thing the template contains.
    pub fn last_line(&self) -> Option<u32> {
        self.entries.last().map(|entry| entry.line)
    }

    pub fn is_monotonic(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].instruction <= w[1].instruction && w[0].line <= w[1].line)
    }
}

/// The executable form of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledProgram {
    instructions: Vec<Instruction>,
    fragments: Vec<Fragment>,
    source_map: SourceMap,
}

impl CompiledProgram {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment(&self, fragment: FragmentRef) -> &Fragment {
        &self.fragments[fragment.0]
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    /// Literal text of instruction `index`, if it is an `EmitLiteral`.
    pub fn literal(&self, index: usize) -> Option<&str> {
        match self.instructions.get(index) {
            Some(Instruction::EmitLiteral(text)) => Some(text),
            _ => None,
        }
    }

    /// Whether any scriptlet code has to run.
    pub fn has_code(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::ExecuteCode(_)))
    }

    /// Upper bound on literal output, used to size the output buffer.
    pub fn literal_len(&self) -> usize {
        self.instructions
            .iter()
            .map(|i| match i {
                Instruction::EmitLiteral(text) => text.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Lower `nodes` into a program.
pub fn compile(nodes: Vec<Node>) -> CompiledProgram {
    let mut program = CompiledProgram::default();

    for node in nodes {
        let line = node.line();
        let next = program.instructions.len();
        let instruction = match node.kind {
            NodeKind::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                Instruction::EmitLiteral(text)
            }
            NodeKind::Output { fragment, escape } => Instruction::EmitExpression {
                fragment: push_fragment(&mut program.fragments, fragment),
                escape,
            },
            NodeKind::Script(fragment) => {
                Instruction::ExecuteCode(push_fragment(&mut program.fragments, fragment))
            }
            NodeKind::Comment => {
                program.source_map.record(next, line, Origin::Comment);
                continue;
            }
        };
        program.source_map.record(next, line, Origin::Instruction);
        program.instructions.push(instruction);
    }

    tracing::trace!(
        instructions = program.instructions.len(),
        fragments = program.fragments.len(),
        "compiled template"
    );
    program
}

fn push_fragment(fragments: &mut Vec<Fragment>, fragment: Fragment) -> FragmentRef {
    fragments.push(fragment);
    FragmentRef(fragments.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::tokenize, parser::parse};

    fn compile_str(source: &str) -> CompiledProgram {
        compile(parse(tokenize(source)).unwrap())
    }

    #[test]
    fn one_instruction_per_node() {
        let program = compile_str("Hi <%= name %>!<% x() %><%- raw %>");
        let shapes: Vec<_> = program
            .instructions()
            .iter()
            .map(|i| match i {
                Instruction::EmitLiteral(t) => format!("lit({t})"),
                Instruction::EmitExpression { fragment, escape } => {
                    format!("expr({},{escape})", program.fragment(*fragment).source.trim())
                }
                Instruction::ExecuteCode(f) => {
                    format!("code({})", program.fragment(*f).source.trim())
                }
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                "lit(Hi )",
                "expr(name,true)",
                "lit(!)",
                "code(x())",
                "expr(raw,false)"
            ]
        );
        assert!(program.has_code());
    }

    #[test]
    fn comments_emit_nothing_but_keep_their_line() {
        let program = compile_str("a\n<%# note\nspanning %>\n<%= b %>");
        assert!(
            program
                .instructions()
                .iter()
                .all(|i| !matches!(i, Instruction::EmitLiteral(t) if t.contains("note")))
        );
        let comment = program
            .source_map()
            .entries()
            .iter()
            .find(|e| e.origin == Origin::Comment)
            .unwrap();
        assert_eq!(comment.line, 2);
        assert_eq!(comment.instruction, 1);
    }

    #[test]
    fn source_map_is_monotonic_and_resolves_lines() {
        let program = compile_str("one\n<% if (a) { %>\ntwo <%= b %>\n<% } %>\n");
        assert!(program.source_map().is_monotonic());

        let expr_index = program
            .instructions()
            .iter()
            .position(|i| matches!(i, Instruction::EmitExpression { .. }))
            .unwrap();
        assert_eq!(program.source_map().line_of(expr_index), Some(3));
        assert_eq!(program.source_map().last_line(), Some(4));
    }

    #[test]
    fn empty_template_compiles_to_nothing() {
        let program = compile_str("");
        assert!(program.instructions().is_empty());
        assert_eq!(program.source_map().last_line(), None);
        assert!(!program.has_code());
    }
}
