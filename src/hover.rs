//! Hover information provider

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::action::{ActionCache, ActionParam};
use crate::parser::{Document, Segment};
use crate::schema;

/// Generate hover information for the given document and position
pub async fn provide_hover(
    document: &Document,
    position: Position,
    actions: &ActionCache,
) -> Option<Hover> {
    let node = document.node_at_position(position.line, position.character)?;
    let key = node.key.as_deref()?;
    let (_, parent) = node.path.split_last()?;

    let value = match schema::documentation(parent, key) {
        Some(doc) => format!("**{}**\n\n{}", key, doc),
        None => {
            let owner = with_owner(parent)?;
            let mut uses_path = owner.to_vec();
            uses_path.push(Segment::Key("uses".to_string()));

            let uses = document.value_at(&uses_path)?;
            let metadata = actions.get(uses).await?;
            input_markdown(metadata.input(key)?)
        }
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(node.range),
    })
}

/// The step or job whose `with:` mapping is `path`
fn with_owner(path: &[Segment]) -> Option<&[Segment]> {
    match path.split_last()? {
        (Segment::Key(with), owner) if with == "with" => Some(owner),
        _ => None,
    }
}

fn input_markdown(input: &ActionParam) -> String {
    let mut value = format!("**{}**", input.name);
    value.push_str(if input.required { " (required)" } else { " (optional)" });
    if let Some(description) = &input.description {
        value.push_str("\n\n");
        value.push_str(description);
    }
    if let Some(default) = &input.default {
        value.push_str(&format!("\n\nDefault: `{}`", default));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRef;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::error::Result;
    use crate::fetch::Fetch;
    use indoc::indoc;
    use std::sync::Arc;

    struct Checkout;

    #[tower_lsp::async_trait]
    impl Fetch for Checkout {
        async fn fetch(&self, _: &ActionRef) -> Result<String> {
            Ok(indoc! {r#"
                name: Checkout
                inputs:
                  fetch-depth:
                    description: Number of commits to fetch.
                    default: 1
            "#}
            .to_string())
        }
    }

    const WORKFLOW: &str = indoc! {r#"
        jobs:
          build:
            runs-on: ubuntu-latest
            steps:
              - uses: actions/checkout@v4
                with:
                  fetch-depth: 0
                  unknown: 1
    "#};

    fn actions() -> ActionCache {
        ActionCache::new(
            Arc::new(Checkout),
            Arc::new(ManualClock::default()),
            &Config::default(),
        )
    }

    async fn hover_text(line: u32, character: u32) -> Option<String> {
        let mut document = Document::new(WORKFLOW.to_string());
        document.parse().unwrap();

        let hover = provide_hover(&document, Position::new(line, character), &actions()).await?;
        match hover.contents {
            HoverContents::Markup(content) => Some(content.value),
            other => panic!("unexpected hover contents: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hover_on_schema_key() {
        let text = hover_text(2, 6).await.unwrap();
        assert!(text.starts_with("**runs-on**"));
        assert!(text.contains("type of machine"));
    }

    #[tokio::test]
    async fn test_hover_on_action_input() {
        let text = hover_text(6, 12).await.unwrap();
        assert_eq!(
            text,
            "**fetch-depth** (optional)\n\nNumber of commits to fetch.\n\nDefault: `1`"
        );
    }

    #[tokio::test]
    async fn test_no_hover_for_unknown_keys() {
        assert!(hover_text(7, 12).await.is_none());
        assert!(hover_text(0, 30).await.is_none());
    }
}
