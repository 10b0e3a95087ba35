//! Downloading action metadata

use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::RwLock;
use reqwest::StatusCode;
use tracing::{info, warn};
use url::Url;

use crate::action::ActionRef;
use crate::config::{Config, DEFAULT_RAW_CONTENT_URL};
use crate::error::{Error, Result};

/// Retrieves the raw metadata document for an action reference.
#[tower_lsp::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, action: &ActionRef) -> Result<String>;
}

/// Fetches remote actions over HTTP and local actions from the workspace.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    workspace_root: RwLock<Option<PathBuf>>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("github-workflow-ls/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to configure HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        let base_url = match Url::parse(&config.raw_content_url) {
            Ok(url) => url.as_str().trim_end_matches('/').to_string(),
            Err(e) => {
                warn!(
                    "Invalid raw content URL {:?} ({}), using {}",
                    config.raw_content_url, e, DEFAULT_RAW_CONTENT_URL
                );
                DEFAULT_RAW_CONTENT_URL.to_string()
            }
        };

        Self {
            client,
            base_url,
            token: config.github_token.clone(),
            workspace_root: RwLock::new(None),
        }
    }

    /// Directory that `./` action references are resolved against
    pub fn set_workspace_root(&self, root: PathBuf) {
        *self.workspace_root.write() = Some(root);
    }

    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.read().clone()
    }

    /// `Ok(None)` when the document does not exist
    async fn download(&self, url: &str) -> Result<Option<String>> {
        info!("Download [{}]", url);
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| Error::Fetch {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map(Some).map_err(|source| Error::Fetch {
            url: url.to_string(),
            source,
        })
    }

    async fn read_local(&self, action: &ActionRef) -> Result<String> {
        let root = self.workspace_root().ok_or_else(|| {
            Error::InvalidAction(format!("{} needs a workspace root", action))
        })?;

        let mut last = None;
        for path in action.local_paths(&root) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == ErrorKind::NotFound => last = Some((path, e)),
                Err(source) => {
                    return Err(Error::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }

        let (path, source) = last.ok_or_else(|| Error::InvalidAction(action.to_string()))?;
        Err(Error::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[tower_lsp::async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, action: &ActionRef) -> Result<String> {
        if let ActionRef::Local { .. } = action {
            return self.read_local(action).await;
        }

        let urls = action.download_urls(&self.base_url);
        for url in &urls {
            if let Some(text) = self.download(url).await? {
                return Ok(text);
            }
        }

        Err(Error::Status {
            url: urls.last().cloned().unwrap_or_default(),
            status: StatusCode::NOT_FOUND.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_invalid_base_url_falls_back_to_default() {
        let config = Config {
            raw_content_url: "not a url".to_string(),
            ..Config::default()
        };
        let fetcher = HttpFetcher::new(&config);
        assert_eq!(fetcher.base_url, DEFAULT_RAW_CONTENT_URL);
    }

    #[tokio::test]
    async fn test_local_action_is_read_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let action_dir = dir.path().join(".github/actions/setup");
        fs::create_dir_all(&action_dir).unwrap();
        fs::write(action_dir.join("action.yaml"), "name: Setup\n").unwrap();

        let fetcher = HttpFetcher::new(&Config::default());
        fetcher.set_workspace_root(dir.path().to_path_buf());

        let action = ActionRef::parse("./.github/actions/setup").unwrap();
        let text = fetcher.fetch(&action).await.unwrap();
        assert_eq!(text, "name: Setup\n");
    }

    #[tokio::test]
    async fn test_missing_local_action_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&Config::default());
        fetcher.set_workspace_root(dir.path().to_path_buf());

        let action = ActionRef::parse("./missing").unwrap();
        assert!(matches!(fetcher.fetch(&action).await, Err(Error::Io { .. })));
    }

    #[tokio::test]
    async fn test_local_action_without_workspace_root() {
        let fetcher = HttpFetcher::new(&Config::default());
        let action = ActionRef::parse("./local").unwrap();
        assert!(matches!(
            fetcher.fetch(&action).await,
            Err(Error::InvalidAction(_))
        ));
    }
}
