//! YAML parsing and document handling

use serde_yaml::Value as YamlValue;
use std::fmt;
use std::path::Path;
use tower_lsp::lsp_types::{Position, Range};

/// One step in the path to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A mapping key
    Key(String),
    /// A sequence item and its index among its siblings
    Item(usize),
}

impl Segment {
    /// Key name, or `-` for sequence items
    pub fn as_key(&self) -> &str {
        match self {
            Segment::Key(key) => key,
            Segment::Item(_) => "-",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Item(index) => write!(f, "[{}]", index),
        }
    }
}

/// Render a path in slash notation, e.g. `jobs/build/steps/[0]`
pub fn path_to_string(path: &[Segment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Types of YAML nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// A `key:` entry in a mapping
    Key,
    /// A `-` entry in a sequence
    Item,
}

/// A key or sequence item with its position in the document
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_type: NodeType,
    /// The key if this is a key-value pair in a mapping
    pub key: Option<String>,
    /// Inline scalar value, empty when the value is nested or absent
    pub value: String,
    /// Range of the key (or the dash for items)
    pub range: Range,
    /// Full path to this node, ending with its own segment
    pub path: Vec<Segment>,
    /// Column the node starts at
    pub indent: u32,
}

/// What the cursor is positioned on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorPosition {
    /// Writing a key of the mapping at the context path
    Key,
    /// Writing the value of the given key
    Value(String),
    /// Inside an expression, after the given dotted segments
    Expression(Vec<String>),
}

/// Structural context at a cursor position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorContext {
    /// Path of the enclosing mapping or sequence item
    pub path: Vec<Segment>,
    pub position: CursorPosition,
    /// Partially typed word before the cursor
    pub prefix: String,
}

/// Where and why the document failed to parse as YAML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// Zero-based position, when the parser reported one
    pub position: Option<Position>,
}

impl From<&serde_yaml::Error> for SyntaxError {
    fn from(error: &serde_yaml::Error) -> Self {
        // serde_yaml locations are 1-based
        let position = error.location().map(|location| {
            Position::new(
                location.line().saturating_sub(1) as u32,
                location.column().saturating_sub(1) as u32,
            )
        });
        Self {
            message: error.to_string(),
            position,
        }
    }
}

/// Represents a parsed workflow document with position information
#[derive(Clone)]
pub struct Document {
    /// The raw text of the document
    pub text: String,
    /// The parsed YAML, if the document is valid
    pub yaml: Option<YamlValue>,
    /// Lines in the document for position lookup
    pub lines: Vec<String>,
    /// Keys and sequence items in document order
    pub nodes: Vec<Node>,
    /// Set by `parse` when the text is not valid YAML
    pub syntax_error: Option<SyntaxError>,
}

impl Document {
    /// Create a new document from the given text
    pub fn new(text: String) -> Self {
        Self {
            text,
            yaml: None,
            lines: Vec::new(),
            nodes: Vec::new(),
            syntax_error: None,
        }
    }

    /// Index the document structure, then parse it as YAML.
    ///
    /// The structural index is built even when the YAML is invalid, so a
    /// half-written document still gets completions.
    pub fn parse(&mut self) -> Result<(), serde_yaml::Error> {
        self.lines = self.text.lines().map(|s| s.to_string()).collect();

        let mut scanner = Scanner::default();
        let mut nodes = Vec::new();
        for (line_idx, line) in self.lines.iter().enumerate() {
            nodes.extend(scanner.feed(line_idx as u32, line));
        }
        self.nodes = nodes;

        self.yaml = None;
        self.syntax_error = None;
        if self.text.trim().is_empty() {
            return Ok(());
        }

        match serde_yaml::from_str::<YamlValue>(&self.text) {
            Ok(yaml) => {
                self.yaml = Some(yaml);
                Ok(())
            }
            Err(e) => {
                self.syntax_error = Some(SyntaxError::from(&e));
                Err(e)
            }
        }
    }

    /// Get the key node at the given position
    pub fn node_at_position(&self, line: u32, character: u32) -> Option<&Node> {
        self.nodes.iter().find(|node| {
            node.node_type == NodeType::Key
                && node.range.start.line == line
                && node.range.start.character <= character
                && character <= node.range.end.character
        })
    }

    /// The node at exactly this path
    pub fn lookup(&self, path: &[Segment]) -> Option<&Node> {
        self.nodes.iter().find(|node| node.path == path)
    }

    /// Direct children of the node at `path`
    pub fn children(&self, path: &[Segment]) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| node.path.len() == path.len() + 1 && node.path.starts_with(path))
            .collect()
    }

    /// Keys of the mapping at `path`
    pub fn child_keys(&self, path: &[Segment]) -> Vec<&str> {
        self.children(path)
            .into_iter()
            .filter_map(|node| node.key.as_deref())
            .collect()
    }

    /// Inline scalar value at `path`, unquoted
    pub fn value_at(&self, path: &[Segment]) -> Option<&str> {
        self.lookup(path)
            .map(|node| unquote(&node.value))
            .filter(|value| !value.is_empty())
    }

    /// Values of a sequence at `path`, written as a flow list, a block list
    /// or a single scalar
    pub fn list_values(&self, path: &[Segment]) -> Vec<String> {
        let Some(node) = self.lookup(path) else {
            return Vec::new();
        };

        if !node.value.is_empty() {
            let value = node.value.trim();
            let inner = value
                .strip_prefix('[')
                .map(|v| v.strip_suffix(']').unwrap_or(v))
                .unwrap_or(value);
            return inner
                .split(',')
                .map(|v| unquote(v.trim()).to_string())
                .filter(|v| !v.is_empty())
                .collect();
        }

        self.children(path)
            .into_iter()
            .filter(|child| child.node_type == NodeType::Item && !child.value.is_empty())
            .map(|child| unquote(&child.value).to_string())
            .collect()
    }

    /// Full text of the scalar at `path`, including block scalar bodies
    pub fn scalar_text(&self, path: &[Segment]) -> Option<String> {
        let node = self.lookup(path)?;
        if !is_block_indicator(&node.value) {
            return Some(unquote(&node.value).to_string()).filter(|v| !v.is_empty());
        }

        let body: Vec<&str> = self
            .lines
            .iter()
            .skip(node.range.start.line as usize + 1)
            .take_while(|line| line.trim().is_empty() || leading_spaces(line) > node.indent)
            .map(|line| line.trim())
            .collect();
        Some(body.join("\n"))
    }

    /// Get the context at the given position
    pub fn context_at_position(&self, line: u32, character: u32) -> CursorContext {
        let mut scanner = Scanner::default();
        for (line_idx, text) in self.lines.iter().enumerate().take(line as usize) {
            scanner.feed(line_idx as u32, text);
        }

        let current = self.lines.get(line as usize).map(String::as_str).unwrap_or("");
        let before = prefix_chars(current, character);
        let trimmed = before.trim_start();
        // Editors may place the cursor past the end of a blank line
        let indent = if trimmed.is_empty() {
            character.max(leading_spaces(before))
        } else {
            leading_spaces(before)
        };

        let (path, position, prefix) = match scanner.block_indent {
            Some(block) if indent > block => {
                let mut path = scanner.path();
                let key = match path.pop() {
                    Some(Segment::Key(key)) => key,
                    _ => String::new(),
                };
                (path, CursorPosition::Value(key), String::new())
            }
            _ => {
                let mut column = indent;
                let mut rest = trimmed;
                while let Some(after) = strip_dash(rest) {
                    scanner.enter_item(column);
                    let content = after.trim_start();
                    column += 1 + (after.len() - content.len()) as u32;
                    rest = content;
                }

                scanner.pop_to(column);
                match split_key(rest) {
                    Some((key, _, value)) => {
                        let prefix = trailing_token(value, &['.', '/', '@']);
                        (scanner.path(), CursorPosition::Value(key), prefix)
                    }
                    None => (scanner.path(), CursorPosition::Key, trailing_token(rest, &[])),
                }
            }
        };

        match expression_at(before, &position) {
            Some((segments, prefix)) => CursorContext {
                path,
                position: CursorPosition::Expression(segments),
                prefix,
            },
            None => CursorContext {
                path,
                position,
                prefix,
            },
        }
    }
}

/// Whether `path` names a workflow file (`.github/workflows/*.yml`)
pub fn is_workflow_file(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
        .unwrap_or(false);

    let parent = path.parent();
    let dir_name = |p: Option<&Path>| {
        p.and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .map(str::to_ascii_lowercase)
    };

    is_yaml
        && dir_name(parent).as_deref() == Some("workflows")
        && dir_name(parent.and_then(Path::parent)).as_deref() == Some(".github")
}

struct Frame {
    indent: u32,
    segment: Segment,
    items: usize,
}

impl Frame {
    fn is_item(&self) -> bool {
        matches!(self.segment, Segment::Item(_))
    }
}

/// Line-by-line indentation tracker
#[derive(Default)]
struct Scanner {
    stack: Vec<Frame>,
    root_items: usize,
    /// Set while inside a `|` or `>` block scalar owned by a key at this column
    block_indent: Option<u32>,
}

impl Scanner {
    fn path(&self) -> Vec<Segment> {
        self.stack.iter().map(|frame| frame.segment.clone()).collect()
    }

    fn pop_to(&mut self, indent: u32) {
        while self.stack.last().map_or(false, |top| top.indent >= indent) {
            self.stack.pop();
        }
    }

    fn enter_item(&mut self, indent: u32) -> Vec<Segment> {
        // Items of a compact sequence sit at the same column as their key
        while self
            .stack
            .last()
            .map_or(false, |top| top.indent > indent || (top.indent == indent && top.is_item()))
        {
            self.stack.pop();
        }

        let counter = match self.stack.last_mut() {
            Some(parent) => &mut parent.items,
            None => &mut self.root_items,
        };
        let index = *counter;
        *counter += 1;

        self.stack.push(Frame {
            indent,
            segment: Segment::Item(index),
            items: 0,
        });
        self.path()
    }

    fn enter_key(&mut self, indent: u32, key: &str) -> Vec<Segment> {
        self.pop_to(indent);
        self.stack.push(Frame {
            indent,
            segment: Segment::Key(key.to_string()),
            items: 0,
        });
        self.path()
    }

    fn feed(&mut self, line_no: u32, line: &str) -> Vec<Node> {
        let indent = leading_spaces(line);
        let trimmed = line.trim_start();

        if let Some(block) = self.block_indent {
            if trimmed.is_empty() || indent > block {
                return Vec::new();
            }
            self.block_indent = None;
        }
        if is_ignorable(trimmed) {
            return Vec::new();
        }

        let mut nodes = Vec::new();
        let mut column = indent;
        let mut rest = trimmed;

        while let Some(after) = strip_dash(rest) {
            let path = self.enter_item(column);
            nodes.push(Node {
                node_type: NodeType::Item,
                key: None,
                value: String::new(),
                range: Range::new(Position::new(line_no, column), Position::new(line_no, column + 1)),
                path,
                indent: column,
            });
            let content = after.trim_start();
            column += 1 + (after.len() - content.len()) as u32;
            rest = content;
        }

        if rest.is_empty() || rest.starts_with('#') {
            return nodes;
        }

        match split_key(rest) {
            Some((key, key_len, value)) => {
                let path = self.enter_key(column, &key);
                if is_block_indicator(value) {
                    self.block_indent = Some(column);
                }
                nodes.push(Node {
                    node_type: NodeType::Key,
                    key: Some(key),
                    value: value.to_string(),
                    range: Range::new(
                        Position::new(line_no, column),
                        Position::new(line_no, column + key_len),
                    ),
                    path,
                    indent: column,
                });
            }
            None => {
                if let Some(item) = nodes.last_mut() {
                    item.value = strip_comment(rest).to_string();
                }
            }
        }

        nodes
    }
}

fn leading_spaces(line: &str) -> u32 {
    line.chars().take_while(|c| *c == ' ').count() as u32
}

fn is_ignorable(trimmed: &str) -> bool {
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("---")
        || trimmed.starts_with("...")
        || trimmed.starts_with('%')
}

fn strip_dash(text: &str) -> Option<&str> {
    let after = text.strip_prefix('-')?;
    if after.is_empty() || after.starts_with(' ') || after.starts_with('\t') {
        Some(after)
    } else {
        None
    }
}

/// Split `key: value`, returning the unquoted key, its length as written and the value
fn split_key(text: &str) -> Option<(String, u32, &str)> {
    let (key, key_len, after) = match text.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let close = text[1..].find(quote)? + 1;
            let after = text[close + 1..].strip_prefix(':')?;
            (text[1..close].to_string(), text[..=close].chars().count(), after)
        }
        Some('{') | Some('[') | None => return None,
        Some(_) => {
            let separator = find_separator(text)?;
            let key = text[..separator].trim_end();
            if key.is_empty() {
                return None;
            }
            (key.to_string(), key.chars().count(), &text[separator + 1..])
        }
    };

    if !(after.is_empty() || after.starts_with(' ') || after.starts_with('\t')) {
        return None;
    }
    Some((key, key_len as u32, strip_comment(after.trim())))
}

fn find_separator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        match byte {
            b'#' if idx > 0 && bytes[idx - 1] == b' ' => return None,
            b':' if matches!(bytes.get(idx + 1), None | Some(b' ') | Some(b'\t')) => {
                return Some(idx)
            }
            _ => {}
        }
    }
    None
}

fn strip_comment(value: &str) -> &str {
    let mut quote = None;
    let mut previous = ' ';
    for (idx, c) in value.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') if previous == ' ' || idx == 0 => return value[..idx].trim_end(),
            _ => {}
        }
        previous = c;
    }
    value.trim_end()
}

fn is_block_indicator(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some('|') | Some('>'))
        && chars.all(|c| c == '+' || c == '-' || c.is_ascii_digit())
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn prefix_chars(text: &str, character: u32) -> &str {
    let end = text
        .char_indices()
        .nth(character as usize)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    &text[..end]
}

fn trailing_token(text: &str, extra: &[char]) -> String {
    let mut token: Vec<char> = text
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || extra.contains(c))
        .collect();
    token.reverse();
    token.into_iter().collect()
}

/// Dotted segments and partial word of an expression ending at the cursor
fn expression_at(before: &str, position: &CursorPosition) -> Option<(Vec<String>, String)> {
    let start = match before.rfind("${{") {
        Some(idx) if !before[idx..].contains("}}") => idx + 3,
        _ => match position {
            CursorPosition::Value(key) if key == "if" => 0,
            _ => return None,
        },
    };

    let token = trailing_token(&before[start..], &['.']);
    let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
    let prefix = segments.pop().unwrap_or_default();
    Some((segments, prefix))
}
