//! SQL front end
//!
//! This module contains the SQL components:
//! - Tokens and the lexer
//! - AST definitions
//! - Recursive-descent parser
//! - Statement completeness helpers used by interactive front ends

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::Statement;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;

use crate::error::Result;

/// Parse a single SQL statement
pub fn parse(sql: &str) -> Result<Statement> {
    Parser::new(sql)?.parse()
}

/// Whether `input` ends with a statement terminator.
///
/// Only a semicolon outside single-quoted strings counts, and only trailing
/// whitespace may follow it.
pub fn is_complete(input: &str) -> bool {
    let mut in_string = false;
    let mut terminated = false;

    for ch in input.chars() {
        if in_string {
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_string = true;
                terminated = false;
            }
            ';' => terminated = true,
            c if c.is_whitespace() => {}
            _ => terminated = false,
        }
    }

    terminated && !in_string
}

/// Split a script into statements on semicolons outside single-quoted
/// strings. Empty pieces are dropped; a trailing statement without `;` is
/// kept.
pub fn split_statements(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for ch in input.chars() {
        match ch {
            '\'' => {
                // '' inside a string toggles twice, so escapes need no lookahead
                in_string = !in_string;
                current.push(ch);
            }
            ';' if !in_string => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_complete() {
        assert!(is_complete("SELECT * FROM t;"));
        assert!(is_complete("SELECT * FROM t;  \n"));
        assert!(!is_complete("SELECT * FROM t"));
        assert!(!is_complete("INSERT INTO t VALUES ('a;"));
        assert!(is_complete("INSERT INTO t VALUES ('a;b');"));
        assert!(is_complete("INSERT INTO t VALUES ('it''s');"));
        assert!(!is_complete(""));
    }

    #[test]
    fn test_split_statements() {
        let parts = split_statements(
            "CREATE TABLE t (a TEXT); INSERT INTO t VALUES ('x;y');\n\nSELECT * FROM t",
        );
        assert_eq!(
            parts,
            vec![
                "CREATE TABLE t (a TEXT)".to_string(),
                "INSERT INTO t VALUES ('x;y')".to_string(),
                "SELECT * FROM t".to_string(),
            ]
        );
        assert!(split_statements(" ; ;").is_empty());
    }

    #[test]
    fn test_parse_helper() {
        assert_eq!(parse("COMMIT;").unwrap(), Statement::Commit);
        assert!(parse("SELEC 1").is_err());
    }
}
