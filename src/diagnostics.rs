//! Validation and diagnostics

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::action::ActionCache;
use crate::parser::{Document, Segment, SyntaxError};

pub const SOURCE: &str = "github-workflow-ls";

/// Generate diagnostics for the given document.
///
/// A document that failed to parse only reports its syntax error. Otherwise
/// job dependencies and `with:` inputs are checked, downloading action
/// metadata through `actions` as needed.
pub async fn validate_document(document: &Document, actions: &ActionCache) -> Vec<Diagnostic> {
    if let Some(error) = &document.syntax_error {
        return vec![syntax_error(error)];
    }

    let mut diagnostics = job_needs(document);
    diagnostics.extend(unknown_inputs(document, actions).await);
    diagnostics
}

fn syntax_error(error: &SyntaxError) -> Diagnostic {
    let start = error.position.unwrap_or_default();
    let end = Position::new(start.line, start.character + 1);

    Diagnostic {
        range: Range::new(start, end),
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some(SOURCE.to_string()),
        message: error.message.clone(),
        ..Diagnostic::default()
    }
}

fn warning(range: Range, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::WARNING),
        source: Some(SOURCE.to_string()),
        message,
        ..Diagnostic::default()
    }
}

fn key(name: &str) -> Segment {
    Segment::Key(name.to_string())
}

/// `needs:` entries that name a missing job or the job itself
fn job_needs(document: &Document) -> Vec<Diagnostic> {
    let jobs = document.child_keys(&[key("jobs")]);
    let mut diagnostics = Vec::new();

    for job in &jobs {
        let path = [key("jobs"), key(job), key("needs")];
        let Some(node) = document.lookup(&path) else {
            continue;
        };

        let last_line = document
            .children(&path)
            .last()
            .map_or(node.range.start.line, |item| item.range.start.line);
        let lines = document
            .lines
            .get(..=last_line as usize)
            .unwrap_or(&document.lines);
        let mut cursor = node.range.end;

        for name in document.list_values(&path) {
            let message = if name == *job {
                format!("Job '{}' cannot need itself", job)
            } else if !jobs.contains(&name.as_str()) {
                format!("Job '{}' needs unknown job '{}'", job, name)
            } else {
                locate(lines, &name, &mut cursor);
                continue;
            };
            let range = locate(lines, &name, &mut cursor).unwrap_or(node.range);
            diagnostics.push(warning(range, message));
        }
    }

    diagnostics
}

/// Find `text` at or after `cursor`, moving the cursor past the match
fn locate(lines: &[String], text: &str, cursor: &mut Position) -> Option<Range> {
    for (line_idx, line) in lines.iter().enumerate().skip(cursor.line as usize) {
        let from = if line_idx == cursor.line as usize {
            byte_offset(line, cursor.character as usize)
        } else {
            0
        };
        let Some(found) = line[from..].find(text) else {
            continue;
        };

        let line_no = line_idx as u32;
        let start = line[..from + found].chars().count() as u32;
        let end = start + text.chars().count() as u32;
        *cursor = Position::new(line_no, end);
        return Some(Range::new(Position::new(line_no, start), Position::new(line_no, end)));
    }
    None
}

fn byte_offset(line: &str, column: usize) -> usize {
    line.char_indices().nth(column).map_or(line.len(), |(i, _)| i)
}

/// Jobs and steps that call an action or reusable workflow
fn callers(document: &Document) -> Vec<&[Segment]> {
    document
        .nodes
        .iter()
        .map(|node| node.path.as_slice())
        .filter(|path| match path {
            [Segment::Key(jobs), Segment::Key(_)] => jobs == "jobs",
            [Segment::Key(jobs), Segment::Key(_), Segment::Key(steps), Segment::Item(_)] => {
                jobs == "jobs" && steps == "steps"
            }
            _ => false,
        })
        .collect()
}

/// `with:` keys the called action does not declare
async fn unknown_inputs(document: &Document, actions: &ActionCache) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for owner in callers(document) {
        let mut uses_path = owner.to_vec();
        uses_path.push(key("uses"));
        let Some(uses) = document.value_at(&uses_path) else {
            continue;
        };

        let mut with_path = owner.to_vec();
        with_path.push(key("with"));
        let written = document.children(&with_path);
        if written.is_empty() {
            continue;
        }

        // Nothing to compare against until a download has succeeded
        let Some(metadata) = actions.get(uses).await.filter(|m| m.resolved) else {
            continue;
        };

        for node in written {
            let Some(name) = node.key.as_deref() else {
                continue;
            };
            if metadata.input(name).is_none() {
                diagnostics.push(warning(
                    node.range,
                    format!("Input '{}' is not defined by {}", name, uses),
                ));
            }
        }
    }

    diagnostics
}
