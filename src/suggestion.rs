//! Completion candidates independent of the LSP wire types

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind,
};

/// Category of a suggestion. Declaration order is display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SuggestionKind {
    Keyword,
    Needs,
    Env,
    Step,
    Job,
    Output,
    Input,
    Secret,
    Value,
}

impl SuggestionKind {
    fn completion_kind(self) -> CompletionItemKind {
        match self {
            SuggestionKind::Keyword => CompletionItemKind::PROPERTY,
            SuggestionKind::Needs => CompletionItemKind::REFERENCE,
            SuggestionKind::Env => CompletionItemKind::CONSTANT,
            SuggestionKind::Step | SuggestionKind::Job => CompletionItemKind::CLASS,
            SuggestionKind::Output => CompletionItemKind::VARIABLE,
            SuggestionKind::Input => CompletionItemKind::FIELD,
            SuggestionKind::Secret => CompletionItemKind::CONSTANT,
            SuggestionKind::Value => CompletionItemKind::VALUE,
        }
    }

    fn priority(self) -> u8 {
        self as u8
    }
}

/// A single completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Text shown and inserted
    pub label: String,
    /// Short type text shown next to the label
    pub detail: Option<String>,
    /// Markdown documentation
    pub documentation: Option<String>,
    pub kind: SuggestionKind,
}

impl Suggestion {
    pub fn new(label: impl Into<String>, kind: SuggestionKind) -> Self {
        Self {
            label: label.into(),
            detail: None,
            documentation: None,
            kind,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into()).filter(|d: &String| !d.is_empty());
        self
    }

    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into()).filter(|d: &String| !d.is_empty());
        self
    }

    /// Build suggestions from a static `(name, documentation)` table.
    pub fn from_table(table: &[(&str, &str)], kind: SuggestionKind) -> Vec<Self> {
        table
            .iter()
            .map(|(name, doc)| Suggestion::new(*name, kind).with_documentation(*doc))
            .collect()
    }

    /// Convert into an LSP completion item listed at `position`.
    ///
    /// Editors order items by `sort_text`, so it encodes the kind priority
    /// and then the position rather than the label.
    pub fn to_completion_item(&self, position: usize) -> CompletionItem {
        CompletionItem {
            label: self.label.clone(),
            kind: Some(self.kind.completion_kind()),
            detail: self.detail.clone(),
            documentation: self.documentation.as_ref().map(|doc| {
                Documentation::MarkupContent(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: doc.clone(),
                })
            }),
            sort_text: Some(format!("{:02}_{:04}", self.kind.priority(), position)),
            ..CompletionItem::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_item_carries_metadata() {
        let item = Suggestion::new("node-version", SuggestionKind::Input)
            .with_detail("required")
            .with_documentation("Version Spec of the version to use.")
            .to_completion_item(3);

        assert_eq!(item.label, "node-version");
        assert_eq!(item.kind, Some(CompletionItemKind::FIELD));
        assert_eq!(item.detail.as_deref(), Some("required"));
        assert_eq!(item.sort_text.as_deref(), Some("06_0003"));
        match item.documentation {
            Some(Documentation::MarkupContent(content)) => {
                assert_eq!(content.value, "Version Spec of the version to use.")
            }
            other => panic!("unexpected documentation: {:?}", other),
        }
    }

    #[test]
    fn test_empty_detail_is_dropped() {
        let suggestion = Suggestion::new("jobs", SuggestionKind::Keyword)
            .with_detail("")
            .with_documentation("");
        assert!(suggestion.detail.is_none());
        assert!(suggestion.documentation.is_none());
    }

    #[test]
    fn test_keywords_sort_before_values() {
        assert!(SuggestionKind::Keyword < SuggestionKind::Value);
        let keyword = Suggestion::new("z", SuggestionKind::Keyword).to_completion_item(7);
        let value = Suggestion::new("a", SuggestionKind::Value).to_completion_item(0);
        assert!(keyword.sort_text < value.sort_text);
    }

    #[test]
    fn test_sort_text_follows_position_not_label() {
        let later = Suggestion::new("a", SuggestionKind::Keyword).to_completion_item(10);
        let earlier = Suggestion::new("z", SuggestionKind::Keyword).to_completion_item(9);
        assert!(earlier.sort_text < later.sort_text);
    }
}
