//! Simple test harness for the language server

use std::error::Error;
use std::fs;
use std::sync::Arc;

use github_workflow_ls::action::{ActionCache, ActionRef};
use github_workflow_ls::cache;
use github_workflow_ls::clock::SystemClock;
use github_workflow_ls::completion::{provide_completion, CompletionSources};
use github_workflow_ls::config::Config;
use github_workflow_ls::error::Result as LsResult;
use github_workflow_ls::fetch::Fetch;
use github_workflow_ls::parser::{path_to_string, Document};
use tower_lsp::lsp_types::Position;

const SETUP_NODE: &str = r#"name: Setup Node.js environment
inputs:
  node-version:
    description: Version Spec of the version to use.
  cache:
    description: Used to specify a package manager for caching.
outputs:
  node-version:
    description: The installed node version.
"#;

/// Serves every remote action as `setup-node` so the harness runs offline
struct OfflineFetcher;

#[tower_lsp::async_trait]
impl Fetch for OfflineFetcher {
    async fn fetch(&self, _: &ActionRef) -> LsResult<String> {
        Ok(SETUP_NODE.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    println!("GitHub Workflow Language Server Test Harness");
    println!("============================================\n");

    let yaml = fs::read_to_string("demos/ci.yml").unwrap_or_else(|_| {
        println!("  Using inline workflow (demos/ci.yml not found)");
        "jobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/setup-node@v4\n        with:\n          \n".to_string()
    });

    let mut document = Document::new(yaml);
    match document.parse() {
        Ok(()) => println!("YAML parsed, {} nodes indexed", document.nodes.len()),
        Err(e) => println!("YAML invalid ({}), {} nodes indexed", e, document.nodes.len()),
    }

    let sources = CompletionSources {
        keywords: cache::keywords(),
        actions: Arc::new(ActionCache::new(
            Arc::new(OfflineFetcher),
            Arc::new(SystemClock),
            &Config::default(),
        )),
    };

    // Complete at the end of every line
    for (line, text) in document.lines.iter().enumerate() {
        let character = text.chars().count() as u32;
        let context = document.context_at_position(line as u32, character);
        let items = provide_completion(&document, Position::new(line as u32, character), &sources).await;

        let labels: Vec<_> = items.iter().take(5).map(|i| i.label.as_str()).collect();
        println!(
            "{:>3}:{:<3} {:<32} {:?} {:?}",
            line,
            character,
            path_to_string(&context.path),
            context.position,
            labels
        );
    }

    println!("\nCached action entries: {}", sources.actions.len());
    Ok(())
}
