//! The JQL→OPQL compiler, spec.md §4.5. A Jira-like dialect with its own
//! lexer and parser, lowered to OPQL **text** via string assembly and then
//! re-parsed through `opql_parser` — the same path any other OPQL text
//! takes, so JQL input never bypasses normalization or planning.

mod compile;
mod lexer;
mod parser;

pub use compile::JqlAliasTable;
pub use parser::{JqlCmp, JqlExpr, JqlField, JqlOrder, JqlQualifier, JqlQuery, JqlValue};

use std::fmt;

use crate::error::OpqlError;

/// Mirrors `opql_parser::ParseError`'s shape with a JQL provenance tag
/// (spec.md §7): lexing and parsing a foreign dialect can fail the same
/// ways OPQL's own grammar can, but callers need to know which grammar
/// rejected the text.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    UnexpectedChar { ch: char, offset: usize },
    UnterminatedString { offset: usize },
    UnexpectedToken { offset: usize, expected: &'static str, found: String },
}

impl CompileError {
    pub fn offset(&self) -> usize {
        match self {
            CompileError::UnexpectedChar { offset, .. }
            | CompileError::UnterminatedString { offset, .. }
            | CompileError::UnexpectedToken { offset, .. } => *offset,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnexpectedChar { ch, offset } => write!(f, "JQL: unexpected character {ch:?} at offset {offset}"),
            CompileError::UnterminatedString { offset } => write!(f, "JQL: unterminated string starting at offset {offset}"),
            CompileError::UnexpectedToken { offset, expected, found } => {
                write!(f, "JQL: at offset {offset}: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Lexes and parses `source` as JQL, then emits it as OPQL source text
/// without reparsing — the textual form `queryToOpql`/builder tooling can
/// display directly.
pub fn compile_jql_text(source: &str) -> Result<String, CompileError> {
    compile_jql_text_with(source, &JqlAliasTable::standard())
}

pub fn compile_jql_text_with(source: &str, aliases: &JqlAliasTable) -> Result<String, CompileError> {
    let tokens = lexer::lex(source)?;
    let query = parser::parse(&tokens)?;
    Ok(compile::compile(&query, aliases))
}

/// Compiles JQL all the way to a parsed `Stmt`, re-parsing the emitted OPQL
/// text through `opql_parser::parse_opql` as spec.md §4.5 requires.
pub fn compile_jql(source: &str) -> Result<opql_ast::Stmt, OpqlError> {
    let opql_text = compile_jql_text(source)?;
    Ok(opql_parser::parse_opql(&opql_text)?)
}

const OPQL_VERBS: &[&str] = &["FIND", "COUNT", "AGGREGATE", "UPDATE", "EXPLAIN"];

/// Jira-like field names common enough that their presence is itself a
/// signal, even absent any other JQL-specific syntax.
const JQL_FIELD_NAMES: &[&str] = &["summary", "assignee", "reporter", "duedate", "priority"];

/// Heuristic: answers YES when `text` doesn't open with an OPQL statement
/// verb and contains a marker characteristic of JQL (spec.md §4.5).
pub fn is_likely_jql(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let upper = trimmed.to_uppercase();
    if OPQL_VERBS.iter().any(|v| upper.starts_with(v)) {
        return false;
    }

    let markers = ["ORDER BY", "WAS ", "WAS\t", "CHANGED", "CF["];
    if markers.iter().any(|m| upper.contains(m)) {
        return true;
    }
    JQL_FIELD_NAMES.iter().any(|f| upper.contains(&f.to_uppercase()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_equality_lowers_to_opql_where() {
        let text = compile_jql_text("status = Done").unwrap();
        assert_eq!(text, "FIND ITEMS FROM work_items WHERE status = 'Done'");
    }

    #[test]
    fn jql_lowering_matches_native_parse_of_equivalent_opql() {
        let compiled = compile_jql("status = Done").unwrap();
        let native = opql_parser::parse_opql("FIND * FROM t WHERE status = 'Done'").unwrap();
        assert_eq!(compiled.where_.map(|e| e.kind), native.where_.map(|e| e.kind));
    }

    #[test]
    fn scenario_s3_project_and_status_order_by_created() {
        let text = compile_jql_text("project = \"OPS\" AND status != Done ORDER BY created DESC").unwrap();
        assert_eq!(
            text,
            "FIND ITEMS FROM work_items WHERE (project_key = 'OPS' AND status != 'Done') ORDER BY created_at DESC"
        );
    }

    #[test]
    fn custom_field_maps_to_custom_dot_path() {
        let text = compile_jql_text("cf[12345] = 'x'").unwrap();
        assert!(text.contains("custom.cf_12345 = 'x'"));
    }

    #[test]
    fn text_match_becomes_contains_call() {
        let text = compile_jql_text("summary ~ 'roadmap'").unwrap();
        assert_eq!(text, "FIND ITEMS FROM work_items WHERE contains(title, 'roadmap')");
    }

    #[test]
    fn negated_match_is_negated_contains() {
        let text = compile_jql_text("summary !~ 'roadmap'").unwrap();
        assert_eq!(text, "FIND ITEMS FROM work_items WHERE NOT contains(title, 'roadmap')");
    }

    #[test]
    fn was_not_in_inverts_to_native_not_in_with_qualifiers_lowered() {
        let text =
            compile_jql_text("status WAS NOT IN ('Done', 'Closed') BY currentUser() BEFORE '2024-01-01'").unwrap();
        assert_eq!(
            text,
            "FIND ITEMS FROM work_items WHERE status WAS NOT IN ('Done', 'Closed') AND changed_by(status, current_user()) AND changed_before(status, '2024-01-01')"
        );
    }

    #[test]
    fn bare_changed_with_no_qualifiers_stays_native() {
        let text = compile_jql_text("status CHANGED").unwrap();
        assert_eq!(text, "FIND ITEMS FROM work_items WHERE status CHANGED");
    }

    #[test]
    fn changed_with_qualifiers_lowers_to_conjunct_functions() {
        let text = compile_jql_text("status CHANGED BY currentUser()").unwrap();
        assert_eq!(text, "FIND ITEMS FROM work_items WHERE changed_by(status, current_user())");
    }

    #[test]
    fn is_empty_and_is_not_null() {
        assert_eq!(compile_jql_text("resolution IS EMPTY").unwrap(), "FIND ITEMS FROM work_items WHERE resolution IS EMPTY");
        assert_eq!(compile_jql_text("resolution IS NOT NULL").unwrap(), "FIND ITEMS FROM work_items WHERE resolution IS NOT NULL");
    }

    #[test]
    fn likely_jql_detects_jira_style_input() {
        assert!(is_likely_jql("project = OPS ORDER BY created DESC"));
        assert!(is_likely_jql("summary ~ 'roadmap'"));
        assert!(!is_likely_jql("FIND * FROM t WHERE a = 1"));
    }

    #[test]
    fn unterminated_string_reports_compile_error() {
        let err = compile_jql_text("status = 'open").unwrap_err();
        assert!(matches!(err, CompileError::UnterminatedString { .. }));
    }
}
