//! GitHub Gist backend.
//!
//! The save document is a single file inside a private gist, found again on
//! later runs by its description.

use super::store::{DocumentBackend, Revision, UpdateOutcome};
use crate::auth::{AccessToken, CredentialProvider, Identity};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PAGE_SIZE: usize = 100;
const HISTORY_LIMIT: usize = 10;

/// GitHub Gist specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GistConfig {
    /// Base URL for the GitHub REST API (e.g. `https://api.github.com`).
    pub api_base_url: String,
    /// Gist description used as the lookup label.
    pub description: String,
    /// Name of the file holding the save inside the gist.
    pub file_name: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for GistConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            description: "StudyFall Game Save Data".to_string(),
            file_name: "studyfall-save.json".to_string(),
            user_agent: concat!("savesync/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// GitHub API response structures.
#[derive(Debug, Deserialize)]
struct GistSummary {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: HashMap<String, IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistCommit {
    version: String,
    committed_at: savesync_types::Timestamp,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// [`DocumentBackend`] over the GitHub Gist API.
pub struct GistBackend {
    config: GistConfig,
    client: Client,
    credentials: Arc<CredentialProvider>,
}

impl GistBackend {
    pub fn new(config: GistConfig, credentials: Arc<CredentialProvider>) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    pub fn config(&self) -> &GistConfig {
        &self.config
    }

    /// Looks up the account a token belongs to.
    ///
    /// Used to verify a token before handing it to [`CredentialProvider::sign_in`].
    pub async fn fetch_identity(&self, token: &AccessToken) -> SyncResult<Identity> {
        debug!("Fetching GitHub identity");
        let response = self
            .client
            .get(self.url("/user"))
            .bearer_auth(token.expose())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| transport_error("identity lookup", e))?;

        let user: GitHubUser = check(response, "identity lookup")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("failed to parse user response: {e}")))?;

        Ok(Identity {
            id: user.id,
            login: user.login,
            name: user.name,
            avatar_url: user.avatar_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Builds an authorized request with the current token.
    fn request(&self, builder: RequestBuilder) -> SyncResult<RequestBuilder> {
        let token = self.credentials.token().ok_or(SyncError::Unauthenticated)?;
        Ok(builder
            .bearer_auth(token.expose())
            .header("Accept", "application/vnd.github+json"))
    }

    fn file_payload(&self, content: &str) -> serde_json::Value {
        let mut files = serde_json::Map::new();
        files.insert(
            self.config.file_name.clone(),
            serde_json::json!({ "content": content }),
        );
        serde_json::Value::Object(files)
    }

    async fn fetch_raw(&self, raw_url: &str) -> SyncResult<String> {
        debug!("Fetching truncated gist content from raw URL");
        let response = self
            .request(self.client.get(raw_url))?
            .send()
            .await
            .map_err(|e| transport_error("raw content download", e))?;

        check(response, "raw content download")
            .await?
            .text()
            .await
            .map_err(|e| SyncError::Network(format!("failed to read raw content: {e}")))
    }
}

/// Maps a failed send to the sync error taxonomy.
fn transport_error(what: &str, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(format!("{what} failed: {e}"))
    }
}

/// Converts a non-success response into an error.
async fn check(response: Response, what: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SyncError::Auth(format!("{what} rejected ({status}): {body}")))
        }
        _ => Err(SyncError::Network(format!("{what} failed ({status}): {body}"))),
    }
}

#[async_trait]
impl DocumentBackend for GistBackend {
    fn provider_name(&self) -> &'static str {
        "GitHub Gist"
    }

    async fn create(&self, content: &str) -> SyncResult<String> {
        debug!("Creating gist {}", self.config.file_name);
        let body = serde_json::json!({
            "description": self.config.description,
            "public": false,
            "files": self.file_payload(content),
        });

        let response = self
            .request(self.client.post(self.url("/gists")))?
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("gist creation", e))?;

        let gist: Gist = check(response, "gist creation")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse created gist: {e}")))?;

        info!("Created gist {}", gist.id);
        Ok(gist.id)
    }

    async fn update(&self, id: &str, content: &str) -> SyncResult<UpdateOutcome> {
        debug!("Updating gist {}", id);
        let body = serde_json::json!({
            "description": self.config.description,
            "files": self.file_payload(content),
        });

        let response = self
            .request(self.client.patch(self.url(&format!("/gists/{id}"))))?
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("gist update", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(UpdateOutcome::NotFound);
        }
        check(response, "gist update").await?;
        Ok(UpdateOutcome::Updated)
    }

    async fn fetch(&self, id: &str) -> SyncResult<Option<String>> {
        debug!("Fetching gist {}", id);
        let response = self
            .request(self.client.get(self.url(&format!("/gists/{id}"))))?
            .send()
            .await
            .map_err(|e| transport_error("gist download", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let mut gist: Gist = check(response, "gist download")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse gist: {e}")))?;

        let file = gist.files.remove(&self.config.file_name).ok_or_else(|| {
            SyncError::MalformedDocument(format!(
                "gist {} has no file named {}",
                gist.id, self.config.file_name
            ))
        })?;

        if file.truncated {
            let raw_url = file.raw_url.ok_or_else(|| {
                SyncError::MalformedDocument("truncated gist file has no raw_url".to_string())
            })?;
            return self.fetch_raw(&raw_url).await.map(Some);
        }

        file.content
            .map(Some)
            .ok_or_else(|| SyncError::MalformedDocument("gist file has no content".to_string()))
    }

    async fn find_by_label(&self) -> SyncResult<Option<String>> {
        let mut page = 1usize;
        loop {
            debug!("Listing gists (page {})", page);
            let response = self
                .request(self.client.get(self.url("/gists")))?
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .send()
                .await
                .map_err(|e| transport_error("gist listing", e))?;

            let gists: Vec<GistSummary> = check(response, "gist listing")
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("failed to parse gist list: {e}")))?;

            let found = gists.iter().find(|g| {
                g.description.as_deref() == Some(self.config.description.as_str())
                    && g.files.contains_key(&self.config.file_name)
            });
            if let Some(gist) = found {
                return Ok(Some(gist.id.clone()));
            }

            if gists.len() < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn revisions(&self, id: &str) -> SyncResult<Vec<Revision>> {
        debug!("Listing revisions of gist {}", id);
        let response = self
            .request(self.client.get(self.url(&format!("/gists/{id}/commits"))))?
            .query(&[("per_page", HISTORY_LIMIT)])
            .send()
            .await
            .map_err(|e| transport_error("gist history", e))?;

        let commits: Vec<GistCommit> = check(response, "gist history")
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse gist history: {e}")))?;

        Ok(commits
            .into_iter()
            .take(HISTORY_LIMIT)
            .map(|c| Revision {
                version: c.version,
                committed_at: c.committed_at,
            })
            .collect())
    }

    fn document_url(&self, id: &str) -> Option<String> {
        Some(format!("https://gist.github.com/{id}"))
    }
}
