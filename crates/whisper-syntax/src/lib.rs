//! The parsing collaborator `spec.md` §1 calls out of scope for the
//! execution core: a tokenizer and a recursive-descent parser that
//! together turn source text into a `whisper_core::PackedSyntaxTree`.
//! Depends on `whisper-core` for the syntax tree and its builder; the
//! core never depends back on this crate.

mod lexer;
mod parser;

use std::rc::Rc;

use whisper_core::{Builder, PackedSyntaxTree};

pub use parser::ParseError;

/// `spec.md` §6's `build_packed_syntax_tree(source_bytes) -> (data, constants)`,
/// realized as a single constructor returning the finished tree: parses
/// `source` and hands back a ready-to-interpret `@File` root.
pub fn build_packed_syntax_tree(source: &str) -> Result<Rc<PackedSyntaxTree>, ParseError> {
    let root = parser::parse_program(source)?;
    Ok(Rc::new(Builder::new().build(root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_tree_for_a_complete_program() {
        let tree = build_packed_syntax_tree("def f(x) { return x + 1; } var a = f(41);").unwrap();
        assert_eq!(tree.root().child_count(), 2);
    }

    #[test]
    fn surfaces_parse_errors_with_a_line_number() {
        let err = build_packed_syntax_tree("var x = ;").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
