//! Completion provider implementation

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{CompletionItem, Position};
use tracing::debug;

use crate::action::{ActionCache, ActionMetadata, ActionParam};
use crate::cache::KeywordCache;
use crate::parser::{path_to_string, CursorContext, CursorPosition, Document, Segment};
use crate::schema;
use crate::suggestion::{Suggestion, SuggestionKind};

static GITHUB_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"echo\s+["']?([\w-]+)=(.*?)["']?\s*>>\s*["']?\$\{?GITHUB_OUTPUT\}?["']?"#)
        .expect("GITHUB_OUTPUT pattern is valid")
});

/// Caches the completion provider draws on
#[derive(Clone)]
pub struct CompletionSources {
    pub keywords: Arc<KeywordCache>,
    pub actions: Arc<ActionCache>,
}

/// Generate completion items for the given document and position
pub async fn provide_completion(
    document: &Document,
    position: Position,
    sources: &CompletionSources,
) -> Vec<CompletionItem> {
    let context = document.context_at_position(position.line, position.character);
    debug!(
        "Completion at {}:{} path={} position={:?} prefix={:?}",
        position.line,
        position.character,
        path_to_string(&context.path),
        context.position,
        context.prefix
    );

    let suggestions = suggestions_for(document, &context, sources).await;
    finalize(suggestions, &context.prefix)
}

async fn suggestions_for(
    document: &Document,
    context: &CursorContext,
    sources: &CompletionSources,
) -> Vec<Suggestion> {
    match &context.position {
        CursorPosition::Key => key_suggestions(document, &context.path, sources).await,
        CursorPosition::Value(key) => value_suggestions(document, &context.path, key),
        CursorPosition::Expression(segments) => {
            expression_suggestions(document, &context.path, segments, sources).await
        }
    }
}

async fn key_suggestions(
    document: &Document,
    path: &[Segment],
    sources: &CompletionSources,
) -> Vec<Suggestion> {
    let keys: Vec<&str> = path.iter().map(Segment::as_key).collect();

    let suggestions = match keys.as_slice() {
        [] => {
            let mut suggestions = sources.keywords.get_suggestions().await.as_ref().clone();
            suggestions.extend(Suggestion::from_table(schema::WORKFLOW_KEYS, SuggestionKind::Keyword));
            suggestions
        }
        ["jobs", _, "steps", "-", "with"] => {
            action_params(document, &path[..4], sources, |m| &m.inputs, SuggestionKind::Input).await
        }
        ["jobs", _, "with"] => {
            action_params(document, &path[..2], sources, |m| &m.inputs, SuggestionKind::Input).await
        }
        ["jobs", _, "secrets"] => {
            action_params(document, &path[..2], sources, |m| &m.secrets, SuggestionKind::Secret).await
        }
        ["jobs", job, "needs", "-"] => other_jobs(document, job),
        _ => schema::keys_for(path)
            .map(|table| Suggestion::from_table(table, SuggestionKind::Keyword))
            .unwrap_or_default(),
    };

    let existing = document.child_keys(path);
    suggestions
        .into_iter()
        .filter(|s| !existing.contains(&s.label.as_str()))
        .collect()
}

fn value_suggestions(document: &Document, path: &[Segment], key: &str) -> Vec<Suggestion> {
    match (key, current_job(path)) {
        ("runs-on", _) => Suggestion::from_table(schema::RUNNER_LABELS, SuggestionKind::Value),
        ("shell", _) => Suggestion::from_table(schema::SHELLS, SuggestionKind::Value),
        ("needs", Some(job)) if path.len() == 2 => other_jobs(document, job),
        ("secrets", Some(_)) if path.len() == 2 => {
            vec![Suggestion::new("inherit", SuggestionKind::Value)
                .with_documentation("Pass all of the calling workflow's secrets to the called workflow.")]
        }
        _ => Vec::new(),
    }
}

async fn expression_suggestions(
    document: &Document,
    path: &[Segment],
    segments: &[String],
    sources: &CompletionSources,
) -> Vec<Suggestion> {
    let job = current_job(path);
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (segments.as_slice(), job) {
        ([], _) => Suggestion::from_table(schema::CONTEXTS, SuggestionKind::Keyword),
        (["github"], _) => Suggestion::from_table(schema::GITHUB_CONTEXT, SuggestionKind::Env),
        (["runner"], _) => Suggestion::from_table(schema::RUNNER_CONTEXT, SuggestionKind::Env),
        (["env"], _) => env_in_scope(document, path),
        (["inputs"], _) => workflow_inputs(document),
        (["secrets"], _) => workflow_secrets(document),
        (["steps"], Some(job)) => step_ids(document, job),
        (["steps", _], Some(_)) => Suggestion::from_table(schema::STEP_CONTEXT, SuggestionKind::Output),
        (["steps", step, "outputs"], Some(job)) => step_outputs(document, job, step, sources).await,
        (["needs"], Some(job)) => document
            .list_values(&job_path(job, &["needs"]))
            .into_iter()
            .map(|need| Suggestion::new(need, SuggestionKind::Needs))
            .collect(),
        (["needs", _], Some(_)) | (["jobs", _], _) => {
            Suggestion::from_table(schema::NEEDS_CONTEXT, SuggestionKind::Output)
        }
        (["needs", other, "outputs"], Some(_)) | (["jobs", other, "outputs"], _) => {
            job_outputs(document, other, sources).await
        }
        (["jobs"], _) => document
            .child_keys(&[key("jobs")])
            .into_iter()
            .map(|job| Suggestion::new(job, SuggestionKind::Job))
            .collect(),
        (["matrix"], Some(job)) => matrix_keys(document, job),
        _ => Vec::new(),
    }
}

/// Filter by the typed prefix, drop duplicate labels, order by kind priority
fn finalize(suggestions: Vec<Suggestion>, prefix: &str) -> Vec<CompletionItem> {
    let prefix = prefix.to_lowercase();
    let mut seen = HashSet::new();

    let mut suggestions: Vec<Suggestion> = suggestions
        .into_iter()
        .filter(|s| s.label.to_lowercase().starts_with(&prefix))
        .filter(|s| seen.insert(s.label.clone()))
        .collect();
    suggestions.sort_by_key(|s| s.kind);

    suggestions
        .iter()
        .enumerate()
        .map(|(position, s)| s.to_completion_item(position))
        .collect()
}

fn key(name: &str) -> Segment {
    Segment::Key(name.to_string())
}

fn job_path(job: &str, rest: &[&str]) -> Vec<Segment> {
    let mut path = vec![key("jobs"), key(job)];
    path.extend(rest.iter().map(|k| key(k)));
    path
}

fn current_job(path: &[Segment]) -> Option<&str> {
    match path {
        [Segment::Key(jobs), Segment::Key(job), ..] if jobs == "jobs" => Some(job.as_str()),
        _ => None,
    }
}

/// Path of the step item containing `path`, if any
fn current_step(path: &[Segment]) -> Option<&[Segment]> {
    match path {
        [Segment::Key(jobs), Segment::Key(_), Segment::Key(steps), Segment::Item(_), ..]
            if jobs == "jobs" && steps == "steps" =>
        {
            Some(&path[..4])
        }
        _ => None,
    }
}

fn child(path: &[Segment], name: &str) -> Vec<Segment> {
    let mut path = path.to_vec();
    path.push(key(name));
    path
}

async fn action_params(
    document: &Document,
    owner: &[Segment],
    sources: &CompletionSources,
    select: impl Fn(&ActionMetadata) -> &Vec<ActionParam>,
    kind: SuggestionKind,
) -> Vec<Suggestion> {
    let Some(uses) = document.value_at(&child(owner, "uses")) else {
        return Vec::new();
    };
    let Some(metadata) = sources.actions.get(uses).await else {
        return Vec::new();
    };

    select(&metadata)
        .iter()
        .map(|param| param.to_suggestion(kind))
        .collect()
}

fn other_jobs(document: &Document, current: &str) -> Vec<Suggestion> {
    document
        .children(&[key("jobs")])
        .into_iter()
        .filter_map(|node| node.key.as_deref())
        .filter(|job| *job != current)
        .map(|job| {
            let name = document.value_at(&job_path(job, &["name"])).unwrap_or_default();
            Suggestion::new(job, SuggestionKind::Needs).with_detail(name)
        })
        .collect()
}

fn env_in_scope(document: &Document, path: &[Segment]) -> Vec<Suggestion> {
    let mut scopes = vec![vec![key("env")]];
    if let Some(job) = current_job(path) {
        scopes.push(job_path(job, &["env"]));
    }
    if let Some(step) = current_step(path) {
        scopes.push(child(step, "env"));
    }

    let mut suggestions: Vec<Suggestion> = scopes
        .iter()
        .rev()
        .flat_map(|scope| {
            document.children(scope).into_iter().filter_map(|node| {
                let name = node.key.as_deref()?;
                Some(Suggestion::new(name, SuggestionKind::Env).with_detail(node.value.trim()))
            })
        })
        .collect();
    suggestions.extend(Suggestion::from_table(schema::DEFAULT_ENV, SuggestionKind::Env));
    suggestions
}

fn described_children(document: &Document, path: &[Segment], kind: SuggestionKind) -> Vec<Suggestion> {
    document
        .child_keys(path)
        .into_iter()
        .map(|name| {
            let description = document
                .value_at(&child(&child(path, name), "description"))
                .unwrap_or_default();
            Suggestion::new(name, kind).with_documentation(description)
        })
        .collect()
}

fn workflow_inputs(document: &Document) -> Vec<Suggestion> {
    ["workflow_dispatch", "workflow_call"]
        .iter()
        .flat_map(|event| {
            described_children(
                document,
                &[key("on"), key(event), key("inputs")],
                SuggestionKind::Input,
            )
        })
        .collect()
}

fn workflow_secrets(document: &Document) -> Vec<Suggestion> {
    let mut suggestions = described_children(
        document,
        &[key("on"), key("workflow_call"), key("secrets")],
        SuggestionKind::Secret,
    );
    suggestions.push(
        Suggestion::new("GITHUB_TOKEN", SuggestionKind::Secret)
            .with_documentation("Automatically created token for authenticating in a workflow run."),
    );
    suggestions
}

fn step_ids(document: &Document, job: &str) -> Vec<Suggestion> {
    let steps = job_path(job, &["steps"]);
    document
        .children(&steps)
        .into_iter()
        .filter_map(|item| {
            let id = document.value_at(&child(&item.path, "id"))?;
            let detail = document
                .value_at(&child(&item.path, "uses"))
                .or_else(|| document.value_at(&child(&item.path, "name")))
                .unwrap_or_default();
            Some(Suggestion::new(id, SuggestionKind::Step).with_detail(detail))
        })
        .collect()
}

async fn step_outputs(
    document: &Document,
    job: &str,
    step_id: &str,
    sources: &CompletionSources,
) -> Vec<Suggestion> {
    let steps = job_path(job, &["steps"]);
    let Some(step) = document
        .children(&steps)
        .into_iter()
        .find(|item| document.value_at(&child(&item.path, "id")) == Some(step_id))
    else {
        return Vec::new();
    };

    let mut suggestions =
        action_params(document, &step.path, sources, |m| &m.outputs, SuggestionKind::Output).await;

    if let Some(script) = document.scalar_text(&child(&step.path, "run")) {
        suggestions.extend(
            GITHUB_OUTPUT
                .captures_iter(&script)
                .map(|c| Suggestion::new(&c[1], SuggestionKind::Output).with_detail(&c[2])),
        );
    }
    suggestions
}

async fn job_outputs(document: &Document, job: &str, sources: &CompletionSources) -> Vec<Suggestion> {
    let outputs = job_path(job, &["outputs"]);
    let mut suggestions: Vec<Suggestion> = document
        .children(&outputs)
        .into_iter()
        .filter_map(|node| {
            let name = node.key.as_deref()?;
            Some(Suggestion::new(name, SuggestionKind::Output).with_detail(node.value.trim()))
        })
        .collect();

    // Jobs that call a reusable workflow expose its outputs
    suggestions.extend(
        action_params(document, &job_path(job, &[]), sources, |m| &m.outputs, SuggestionKind::Output).await,
    );
    suggestions
}

fn matrix_keys(document: &Document, job: &str) -> Vec<Suggestion> {
    let matrix = job_path(job, &["strategy", "matrix"]);
    let mut names: Vec<String> = document
        .child_keys(&matrix)
        .into_iter()
        .filter(|name| *name != "include" && *name != "exclude")
        .map(str::to_string)
        .collect();

    for item in document.children(&child(&matrix, "include")) {
        names.extend(document.child_keys(&item.path).into_iter().map(str::to_string));
    }

    names
        .into_iter()
        .map(|name| Suggestion::new(name, SuggestionKind::Env))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRef;
    use crate::cache::{KeywordSource, TimedCache};
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::error::Result;
    use crate::fetch::Fetch;
    use chrono::Duration;
    use indoc::indoc;

    const SETUP_NODE: &str = indoc! {r#"
        name: Setup Node.js environment
        inputs:
          node-version:
            description: Version Spec of the version to use.
          cache:
            description: Used to specify a package manager for caching.
        outputs:
          cache-hit:
            description: A boolean value to indicate if a cache was hit.
          node-version:
            description: The installed node version.
    "#};

    const BUILD_WORKFLOW: &str = indoc! {r#"
        on:
          workflow_call:
            outputs:
              artifact:
                description: Uploaded artifact name
            secrets:
              npm-token:
                required: true
    "#};

    struct StubFetcher;

    #[tower_lsp::async_trait]
    impl Fetch for StubFetcher {
        async fn fetch(&self, action: &ActionRef) -> Result<String> {
            if action.is_workflow() {
                Ok(BUILD_WORKFLOW.to_string())
            } else {
                Ok(SETUP_NODE.to_string())
            }
        }
    }

    fn sources() -> CompletionSources {
        let clock = Arc::new(ManualClock::default());
        CompletionSources {
            keywords: Arc::new(TimedCache::new(KeywordSource, clock.clone(), Duration::hours(24))),
            actions: Arc::new(ActionCache::new(Arc::new(StubFetcher), clock, &Config::default())),
        }
    }

    fn document(text: &str) -> Document {
        let mut document = Document::new(text.to_string());
        let _ = document.parse();
        document
    }

    async fn labels_at(text: &str, line: u32, character: u32) -> Vec<String> {
        provide_completion(&document(text), Position::new(line, character), &sources())
            .await
            .into_iter()
            .map(|item| item.label)
            .collect()
    }

    #[tokio::test]
    async fn test_root_offers_cached_keywords_first() {
        let labels = labels_at("", 0, 0).await;
        assert_eq!(&labels[..3], &["on", "jobs", "steps"]);
        assert!(labels.contains(&"name".to_string()));
        assert_eq!(labels.iter().filter(|l| *l == "on").count(), 1);
    }

    #[tokio::test]
    async fn test_sort_text_keeps_cached_keyword_order() {
        let mut items = provide_completion(&document(""), Position::new(0, 0), &sources()).await;
        items.sort_by(|a, b| a.sort_text.cmp(&b.sort_text));

        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(&labels[..4], &["on", "jobs", "steps", "name"]);
    }

    #[tokio::test]
    async fn test_root_skips_keys_already_written() {
        let labels = labels_at("on: push\njobs: {}\n\n", 2, 0).await;
        assert!(!labels.contains(&"on".to_string()));
        assert!(!labels.contains(&"jobs".to_string()));
        assert!(labels.contains(&"env".to_string()));
    }

    #[tokio::test]
    async fn test_job_and_step_keys() {
        let text = indoc! {r#"
            jobs:
              build:
                runs-on: ubuntu-latest

                steps:
                  - uses: actions/checkout@v4

        "#};

        let job = labels_at(text, 3, 4).await;
        assert!(job.contains(&"needs".to_string()));
        assert!(!job.contains(&"runs-on".to_string()));

        let step = labels_at(text, 6, 8).await;
        assert!(step.contains(&"with".to_string()));
        assert!(step.contains(&"id".to_string()));
        assert!(!step.contains(&"uses".to_string()));
    }

    #[tokio::test]
    async fn test_with_offers_action_inputs() {
        let text = indoc! {r#"
            jobs:
              build:
                steps:
                  - uses: actions/setup-node@v4
                    with:
                      cache: npm

        "#};

        let labels = labels_at(text, 6, 10).await;
        assert_eq!(labels, vec!["node-version"]);
    }

    #[tokio::test]
    async fn test_reusable_workflow_secrets() {
        let text = indoc! {r#"
            jobs:
              call:
                uses: octo/ci/.github/workflows/build.yml@main
                secrets:

        "#};

        let labels = labels_at(text, 4, 6).await;
        assert_eq!(labels, vec!["npm-token"]);
    }

    #[tokio::test]
    async fn test_runner_labels_filtered_by_prefix() {
        let labels = labels_at("jobs:\n  build:\n    runs-on: ubuntu\n", 2, 19).await;
        assert!(!labels.is_empty());
        assert!(labels.iter().all(|l| l.starts_with("ubuntu")));
    }

    #[tokio::test]
    async fn test_needs_offers_other_jobs() {
        let text = "jobs:\n  lint:\n    name: Lint\n  build:\n    steps: []\n  test:\n    needs: \n";
        let items = provide_completion(&document(text), Position::new(6, 11), &sources()).await;

        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["lint", "build"]);
        assert_eq!(items[0].detail.as_deref(), Some("Lint"));
    }

    const EXPRESSIONS: &str = indoc! {r#"
        on:
          workflow_dispatch:
            inputs:
              target:
                description: Deployment target
        env:
          GLOBAL: one
        jobs:
          build:
            outputs:
              version: ${{ steps.meta.outputs.version }}
            env:
              JOB_LEVEL: two
            steps:
              - id: node
                uses: actions/setup-node@v4
              - id: meta
                run: |
                  echo "version=1.2.3" >> $GITHUB_OUTPUT
                  echo "sha=${{ github.sha }}" >> "$GITHUB_OUTPUT"
              - run: echo ${{
          deploy:
            needs: [build]
            steps:
              - run: echo ${{
    "#};

    async fn expression_labels(line: u32, segments: &str) -> Vec<String> {
        let mut text: Vec<String> = EXPRESSIONS.lines().map(str::to_string).collect();
        text[line as usize].push_str(segments);
        let character = text[line as usize].chars().count() as u32;
        labels_at(&text.join("\n"), line, character).await
    }

    #[tokio::test]
    async fn test_expression_contexts() {
        let labels = expression_labels(20, "").await;
        assert!(labels.contains(&"github".to_string()));
        assert!(labels.contains(&"steps".to_string()));

        let github = expression_labels(20, "github.ref").await;
        assert!(github.iter().all(|l| l.starts_with("ref")));
        assert!(github.contains(&"ref_name".to_string()));
    }

    #[tokio::test]
    async fn test_expression_steps_and_outputs() {
        let steps = expression_labels(20, "steps.").await;
        assert_eq!(steps, vec!["node", "meta"]);

        let action_outputs = expression_labels(20, "steps.node.outputs.").await;
        assert_eq!(action_outputs, vec!["cache-hit", "node-version"]);

        let script_outputs = expression_labels(20, "steps.meta.outputs.").await;
        assert_eq!(script_outputs, vec!["version", "sha"]);
    }

    #[tokio::test]
    async fn test_expression_env_inputs_and_secrets() {
        let env = expression_labels(20, "env.").await;
        assert_eq!(&env[..2], &["JOB_LEVEL", "GLOBAL"]);
        assert!(env.contains(&"GITHUB_SHA".to_string()));

        let inputs = expression_labels(20, "inputs.").await;
        assert_eq!(inputs, vec!["target"]);

        let secrets = expression_labels(20, "secrets.").await;
        assert_eq!(secrets, vec!["GITHUB_TOKEN"]);
    }

    #[tokio::test]
    async fn test_expression_needs_outputs() {
        let needs = expression_labels(24, "needs.").await;
        assert_eq!(needs, vec!["build"]);

        let outputs = expression_labels(24, "needs.build.outputs.").await;
        assert_eq!(outputs, vec!["version"]);
    }

    #[tokio::test]
    async fn test_unknown_context_has_no_suggestions() {
        let labels = labels_at("jobs:\n  build:\n    env:\n      \n", 3, 6).await;
        assert!(labels.is_empty());
    }

    #[test]
    fn test_github_output_pattern() {
        let script = "echo \"a=1\" >> $GITHUB_OUTPUT\necho b=2 >> ${GITHUB_OUTPUT}\necho c=3 >> $GITHUB_ENV";
        let names: Vec<_> = GITHUB_OUTPUT
            .captures_iter(script)
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
