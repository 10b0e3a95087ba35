//! GitHub Action references and their `action.yml` metadata

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::debug;

use crate::cache::{Refresh, TimedCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::suggestion::{Suggestion, SuggestionKind};

/// A parsed `uses:` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionRef {
    /// `owner/repo[/path]@ref`
    Remote {
        owner: String,
        repo: String,
        path: Option<String>,
        git_ref: String,
    },
    /// `./path` relative to the workspace root
    Local { path: String },
}

impl ActionRef {
    pub fn parse(uses: &str) -> Result<Self> {
        let uses = uses.trim().trim_matches(|c| c == '"' || c == '\'');
        if uses.is_empty() {
            return Err(Error::InvalidAction("empty reference".to_string()));
        }
        if uses.starts_with("docker://") {
            return Err(Error::InvalidAction(format!("{} is a container image", uses)));
        }

        if let Some(path) = uses.strip_prefix("./") {
            let path = path.trim_end_matches('/');
            if path.is_empty() {
                return Err(Error::InvalidAction(uses.to_string()));
            }
            return Ok(ActionRef::Local {
                path: path.to_string(),
            });
        }

        let (name, git_ref) = uses
            .split_once('@')
            .filter(|(_, git_ref)| !git_ref.is_empty())
            .ok_or_else(|| Error::InvalidAction(format!("{} has no ref", uses)))?;

        let mut parts = name.splitn(3, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        if owner.is_empty() || repo.is_empty() {
            return Err(Error::InvalidAction(format!("{} is not owner/repo", uses)));
        }
        let path = parts
            .next()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(ActionRef::Remote {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path,
            git_ref: git_ref.to_string(),
        })
    }

    /// Whether this points at a reusable workflow rather than an action
    pub fn is_workflow(&self) -> bool {
        let path = match self {
            ActionRef::Remote { path, .. } => path.as_deref().unwrap_or_default(),
            ActionRef::Local { path } => path.as_str(),
        };
        path.ends_with(".yml") || path.ends_with(".yaml")
    }

    /// Raw-content URLs to try, in order
    pub fn download_urls(&self, base_url: &str) -> Vec<String> {
        let ActionRef::Remote {
            owner,
            repo,
            path,
            git_ref,
        } = self
        else {
            return Vec::new();
        };

        let mut root = format!("{}/{}/{}/{}", base_url.trim_end_matches('/'), owner, repo, git_ref);
        if let Some(path) = path {
            root.push('/');
            root.push_str(path);
        }

        if self.is_workflow() {
            vec![root]
        } else {
            vec![format!("{}/action.yml", root), format!("{}/action.yaml", root)]
        }
    }

    /// Files to try for a local reference, in order
    pub fn local_paths(&self, workspace_root: &Path) -> Vec<PathBuf> {
        let ActionRef::Local { path } = self else {
            return Vec::new();
        };

        let base = workspace_root.join(path);
        if self.is_workflow() {
            vec![base]
        } else {
            vec![base.join("action.yml"), base.join("action.yaml")]
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRef::Remote {
                owner,
                repo,
                path: Some(path),
                git_ref,
            } => write!(f, "{}/{}/{}@{}", owner, repo, path, git_ref),
            ActionRef::Remote {
                owner,
                repo,
                git_ref,
                ..
            } => write!(f, "{}/{}@{}", owner, repo, git_ref),
            ActionRef::Local { path } => write!(f, "./{}", path),
        }
    }
}

/// An input, output or secret declared by an action or reusable workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParam {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<String>,
}

impl ActionParam {
    pub fn to_suggestion(&self, kind: SuggestionKind) -> Suggestion {
        let mut detail = if self.required { "required" } else { "optional" }.to_string();
        if let Some(default) = &self.default {
            detail.push_str(&format!(", default: {}", default));
        }

        Suggestion::new(&self.name, kind)
            .with_detail(detail)
            .with_documentation(self.description.clone().unwrap_or_default())
    }
}

/// Declared interface of an action or reusable workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub inputs: Vec<ActionParam>,
    pub outputs: Vec<ActionParam>,
    pub secrets: Vec<ActionParam>,
    /// False for the placeholder served before any download succeeded
    pub resolved: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataFile {
    name: Option<YamlValue>,
    description: Option<YamlValue>,
    inputs: Option<Mapping>,
    outputs: Option<Mapping>,
    on: Option<YamlValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParamSpec {
    description: Option<YamlValue>,
    required: Option<YamlValue>,
    default: Option<YamlValue>,
}

impl ActionMetadata {
    /// Parse an `action.yml`, or a reusable workflow when `workflow` is set.
    pub fn parse(text: &str, workflow: bool) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::InvalidAction("empty metadata document".to_string()));
        }
        let file: MetadataFile = serde_yaml::from_str(text)?;

        let name = file.name.as_ref().and_then(scalar_to_string);
        let description = file.description.as_ref().and_then(scalar_to_string);

        if !workflow {
            return Ok(Self {
                name,
                description,
                inputs: params(file.inputs.as_ref()),
                outputs: params(file.outputs.as_ref()),
                secrets: Vec::new(),
                resolved: true,
            });
        }

        let call = file.on.as_ref().and_then(|on| on.get("workflow_call"));
        let section = |key: &str| {
            call.and_then(|c| c.get(key))
                .and_then(YamlValue::as_mapping)
        };

        Ok(Self {
            name,
            description,
            inputs: params(section("inputs")),
            outputs: params(section("outputs")),
            secrets: params(section("secrets")),
            resolved: true,
        })
    }

    pub fn input(&self, name: &str) -> Option<&ActionParam> {
        self.inputs.iter().find(|p| p.name == name)
    }
}

fn params(mapping: Option<&Mapping>) -> Vec<ActionParam> {
    let Some(mapping) = mapping else {
        return Vec::new();
    };

    mapping
        .iter()
        .filter_map(|(key, value)| {
            let name = scalar_to_string(key)?;
            let param: ParamSpec = serde_yaml::from_value(value.clone()).unwrap_or_default();
            Some(ActionParam {
                name,
                description: param.description.as_ref().and_then(scalar_to_string),
                required: param.required.as_ref().map(is_truthy).unwrap_or(false),
                default: param.default.as_ref().and_then(scalar_to_string),
            })
        })
        .collect()
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.trim().to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &YamlValue) -> bool {
    match value {
        YamlValue::Bool(b) => *b,
        YamlValue::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Refreshes the metadata of one action reference.
pub struct ActionSource {
    action: ActionRef,
    fetcher: Arc<dyn Fetch>,
}

#[tower_lsp::async_trait]
impl Refresh for ActionSource {
    type Value = ActionMetadata;

    async fn refresh(&self) -> Result<ActionMetadata> {
        let text = self.fetcher.fetch(&self.action).await?;
        ActionMetadata::parse(&text, self.action.is_workflow())
    }

    fn describe(&self) -> String {
        format!("action {}", self.action)
    }
}

/// Metadata caches keyed by `uses:` value.
pub struct ActionCache {
    fetcher: Arc<dyn Fetch>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry_after: Duration,
    entries: RwLock<HashMap<String, Arc<TimedCache<ActionSource>>>>,
}

impl ActionCache {
    pub fn new(fetcher: Arc<dyn Fetch>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            fetcher,
            clock,
            ttl: config.cache_ttl,
            retry_after: config.retry_after,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Metadata for a `uses:` value, or `None` if it names no action.
    pub async fn get(&self, uses: &str) -> Option<Arc<ActionMetadata>> {
        let cache = self.entry(uses)?;
        Some(cache.get().await)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, uses: &str) -> Option<Arc<TimedCache<ActionSource>>> {
        let key = uses.trim();
        if let Some(cache) = self.entries.read().get(key) {
            return Some(Arc::clone(cache));
        }

        let action = match ActionRef::parse(key) {
            Ok(action) => action,
            Err(e) => {
                debug!("Skipping metadata lookup for {:?}: {}", key, e);
                return None;
            }
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            evict_expired(&mut entries);
        }
        let cache = entries.entry(key.to_string()).or_insert_with(|| {
            let source = ActionSource {
                action,
                fetcher: Arc::clone(&self.fetcher),
            };
            Arc::new(
                TimedCache::new(source, Arc::clone(&self.clock), self.ttl)
                    .with_retry_after(self.retry_after),
            )
        });
        Some(Arc::clone(cache))
    }
}

/// Drop caches that are expired and not held by an in-flight read
fn evict_expired(entries: &mut HashMap<String, Arc<TimedCache<ActionSource>>>) {
    let before = entries.len();
    entries.retain(|_, cache| Arc::strong_count(cache) > 1 || !cache.is_expired());
    if entries.len() < before {
        debug!("Evicted {} expired action entries", before - entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use indoc::indoc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SETUP_NODE: &str = indoc! {r#"
        name: 'Setup Node.js environment'
        description: 'Setup a Node.js environment'
        inputs:
          node-version:
            description: 'Version Spec of the version to use.'
          always-auth:
            description: 'Set always-auth in npmrc.'
            default: false
          token:
            description: Used to pull node distributions.
            required: "true"
            default: ${{ github.server_url == 'https://github.com' && github.token || '' }}
        outputs:
          cache-hit:
            description: 'A boolean value to indicate if a cache was hit.'
          node-version:
            description: 'The installed node version.'
        runs:
          using: 'node20'
          main: 'dist/setup/index.js'
    "#};

    #[test]
    fn test_parse_remote_reference() {
        let action = ActionRef::parse("actions/setup-node@v4").unwrap();
        assert_eq!(
            action,
            ActionRef::Remote {
                owner: "actions".to_string(),
                repo: "setup-node".to_string(),
                path: None,
                git_ref: "v4".to_string(),
            }
        );
        assert!(!action.is_workflow());
        assert_eq!(
            action.download_urls("https://raw.githubusercontent.com/"),
            vec![
                "https://raw.githubusercontent.com/actions/setup-node/v4/action.yml",
                "https://raw.githubusercontent.com/actions/setup-node/v4/action.yaml",
            ]
        );
    }

    #[test]
    fn test_parse_sub_path_and_workflow_references() {
        let action = ActionRef::parse("github/codeql-action/init@v3").unwrap();
        assert_eq!(
            action.download_urls("https://raw.githubusercontent.com")[0],
            "https://raw.githubusercontent.com/github/codeql-action/v3/init/action.yml"
        );
        assert_eq!(action.to_string(), "github/codeql-action/init@v3");

        let workflow = ActionRef::parse("octo/ci/.github/workflows/build.yml@main").unwrap();
        assert!(workflow.is_workflow());
        assert_eq!(
            workflow.download_urls("https://raw.githubusercontent.com"),
            vec!["https://raw.githubusercontent.com/octo/ci/main/.github/workflows/build.yml"]
        );
    }

    #[test]
    fn test_parse_local_reference() {
        let action = ActionRef::parse("'./.github/actions/setup/'").unwrap();
        assert_eq!(
            action,
            ActionRef::Local {
                path: ".github/actions/setup".to_string()
            }
        );
        assert!(action.download_urls("https://example.com").is_empty());
        assert_eq!(
            action.local_paths(Path::new("/repo")),
            vec![
                PathBuf::from("/repo/.github/actions/setup/action.yml"),
                PathBuf::from("/repo/.github/actions/setup/action.yaml"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_unresolvable_references() {
        for uses in ["", "docker://alpine:3.19", "actions/checkout", "checkout@v4", "actions/checkout@", "./"] {
            assert!(
                matches!(ActionRef::parse(uses), Err(Error::InvalidAction(_))),
                "expected {:?} to be rejected",
                uses
            );
        }
    }

    #[test]
    fn test_parse_action_metadata() {
        let metadata = ActionMetadata::parse(SETUP_NODE, false).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Setup Node.js environment"));

        let names: Vec<_> = metadata.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["node-version", "always-auth", "token"]);

        let token = metadata.input("token").unwrap();
        assert!(token.required);
        assert!(token.default.as_deref().unwrap().starts_with("${{"));

        let always_auth = metadata.input("always-auth").unwrap();
        assert!(!always_auth.required);
        assert_eq!(always_auth.default.as_deref(), Some("false"));

        assert_eq!(metadata.outputs.len(), 2);
        assert!(metadata.secrets.is_empty());
        assert!(metadata.resolved);
    }

    #[test]
    fn test_parse_reusable_workflow_metadata() {
        let workflow = indoc! {r#"
            name: Build
            on:
              workflow_call:
                inputs:
                  target:
                    type: string
                    required: true
                secrets:
                  deploy-key:
                    required: false
                outputs:
                  artifact:
                    description: Name of the uploaded artifact
                    value: ${{ jobs.build.outputs.artifact }}
              push:
                inputs:
                  ignored: {}
            jobs:
              build:
                runs-on: ubuntu-latest
        "#};

        let metadata = ActionMetadata::parse(workflow, true).unwrap();
        assert_eq!(metadata.inputs.len(), 1);
        assert!(metadata.inputs[0].required);
        assert_eq!(metadata.secrets[0].name, "deploy-key");
        assert_eq!(metadata.outputs[0].name, "artifact");
    }

    #[test]
    fn test_parse_metadata_errors() {
        assert!(matches!(ActionMetadata::parse("  \n", false), Err(Error::InvalidAction(_))));
        assert!(matches!(
            ActionMetadata::parse("inputs: [unclosed", false),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_param_suggestion_detail() {
        let param = ActionParam {
            name: "token".to_string(),
            description: Some("Used to pull node distributions.".to_string()),
            required: true,
            default: Some("abc".to_string()),
        };
        let suggestion = param.to_suggestion(SuggestionKind::Input);
        assert_eq!(suggestion.detail.as_deref(), Some("required, default: abc"));
        assert_eq!(
            suggestion.documentation.as_deref(),
            Some("Used to pull node distributions.")
        );
    }

    struct StaticFetcher {
        calls: AtomicUsize,
    }

    #[tower_lsp::async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, _action: &ActionRef) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SETUP_NODE.to_string())
        }
    }

    #[tokio::test]
    async fn test_action_cache_fetches_once_per_reference() {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::default());
        let cache = ActionCache::new(fetcher.clone(), clock.clone(), &Config::default());

        let first = cache.get("actions/setup-node@v4").await.unwrap();
        let second = cache.get(" actions/setup-node@v4 ").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        cache.get("actions/setup-node@v3").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);

        clock.advance(Duration::hours(25));
        cache.get("actions/setup-node@v4").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_action_cache_ignores_invalid_references() {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = ActionCache::new(fetcher.clone(), Arc::new(ManualClock::default()), &Config::default());

        assert!(cache.get("docker://alpine").await.is_none());
        assert!(cache.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_references_are_evicted_on_insert() {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::default());
        let cache = ActionCache::new(fetcher, clock.clone(), &Config::default());

        for n in 0..500 {
            cache.get(&format!("acme/tool-{}@v1", n)).await;
        }
        assert_eq!(cache.len(), 500);

        clock.advance(Duration::days(30));
        cache.get("actions/setup-node@v4").await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_references_survive_eviction() {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::default());
        let cache = ActionCache::new(fetcher.clone(), clock.clone(), &Config::default());

        cache.get("actions/setup-node@v3").await;
        clock.advance(Duration::hours(20));
        cache.get("actions/setup-node@v4").await;
        clock.advance(Duration::hours(5));
        cache.get("actions/checkout@v4").await;

        assert_eq!(cache.len(), 2);
        cache.get("actions/setup-node@v4").await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }
}
