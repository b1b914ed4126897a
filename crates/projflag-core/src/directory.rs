//! Directory Lookup: the authoritative, read-only list of projects.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DirectorySettings;
use crate::error::{FlagError, FlagResult};
use crate::project::Project;

const PROJECTS_PATH: &str = "api/admin/projects";
const PROJECT_FIELDS: &str = "id,name";
const USER_AGENT: &str = "projflag";

#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Current projects, in directory order. Failures are `DirectoryUnavailable`.
    async fn list_projects(&self) -> FlagResult<Vec<Project>>;
}

/// Fixed project list. Used when no directory URL is configured, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    projects: Vec<Project>,
}

impl StaticDirectory {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn list_projects(&self) -> FlagResult<Vec<Project>> {
        Ok(self.projects.clone())
    }
}

/// Project directory over HTTP: `GET {base_url}/api/admin/projects?fields=id,name`.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: Option<u32>,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            page_size: None,
        }
    }

    /// Fetch in pages of `page_size` using `$skip`/`$top`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Build from settings; `None` when no base URL is configured.
    pub fn from_settings(settings: &DirectorySettings) -> Option<Self> {
        let base_url = settings.base_url.as_deref()?.trim();
        if base_url.is_empty() {
            return None;
        }
        let mut dir = Self::new(base_url, settings.token.clone());
        dir.client = build_client(Duration::from_secs(settings.timeout_secs.max(1)));
        if let Some(size) = settings.page_size {
            dir = dir.with_page_size(size);
        }
        Some(dir)
    }

    async fn fetch_page(&self, skip: Option<u32>) -> FlagResult<Vec<Project>> {
        let url = format!("{}/{}", self.base_url, PROJECTS_PATH);
        let mut request = self.client.get(&url).query(&[("fields", PROJECT_FIELDS)]);
        if let (Some(top), Some(skip)) = (self.page_size, skip) {
            request = request.query(&[("$skip", skip), ("$top", top)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let res = request
            .send()
            .await
            .map_err(|e| FlagError::DirectoryUnavailable(format!("request: {}", e)))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FlagError::DirectoryUnavailable(format!(
                "{}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }
        res.json::<Vec<Project>>()
            .await
            .map_err(|e| FlagError::DirectoryUnavailable(format!("response parse: {}", e)))
    }
}

#[async_trait]
impl DirectoryLookup for HttpDirectory {
    async fn list_projects(&self) -> FlagResult<Vec<Project>> {
        let Some(top) = self.page_size else {
            return self.fetch_page(None).await;
        };

        let mut projects = Vec::new();
        let mut seen = HashSet::new();
        let mut skip = 0u32;
        loop {
            let page = self.fetch_page(Some(skip)).await?;
            let short = page.len() < top as usize;
            skip = skip.saturating_add(page.len() as u32);
            let before = projects.len();
            projects.extend(page.into_iter().filter(|p| seen.insert(p.id.clone())));
            // A page with nothing new means the server is not honouring $skip/$top.
            if short || projects.len() == before {
                break;
            }
        }
        tracing::debug!(count = projects.len(), "directory listed projects");
        Ok(projects)
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
