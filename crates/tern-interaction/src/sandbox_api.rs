//! HttpSandboxService - REST adapter for the execution environment provider.
//!
//! Talks to a provider control API: environment provisioning and lookup
//! under `/v1/sandboxes`, file operations and command execution scoped by
//! environment id. Configuration comes from environment variables.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::sandbox::{CommandOutput, DirEntry, SandboxError, SandboxHandle, SandboxService};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Sandbox adapter backed by the provider's HTTP control API.
#[derive(Clone)]
pub struct HttpSandboxService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSandboxService {
    /// Creates a new adapter for the given control API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `TERN_SANDBOX_URL` is required; `TERN_SANDBOX_API_KEY` is optional.
    pub fn try_from_env() -> Result<Self, SandboxError> {
        let base_url = env::var("TERN_SANDBOX_URL").map_err(|_| {
            SandboxError::Provision("TERN_SANDBOX_URL not found in environment".into())
        })?;
        let mut service = Self::new(base_url);
        if let Ok(key) = env::var("TERN_SANDBOX_API_KEY") {
            service.api_key = Some(key);
        }
        Ok(service)
    }

    /// Sets the API key after construction.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(REQUEST_TIMEOUT);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl SandboxService for HttpSandboxService {
    async fn create(&self) -> Result<SandboxHandle, SandboxError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/sandboxes")
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SandboxError::Provision(format!("{status}: {message}")));
        }
        let body: SandboxInfo = response
            .json()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        tracing::info!(target: "tern::sandbox", id = %body.id, "provisioned environment");
        Ok(body.into_handle())
    }

    async fn resolve(&self, sandbox_id: &str) -> Result<Option<SandboxHandle>, SandboxError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/sandboxes/{sandbox_id}"))
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => {
                let body: SandboxInfo = response
                    .json()
                    .await
                    .map_err(|err| SandboxError::Transport(err.to_string()))?;
                if body.alive {
                    Ok(Some(body.into_handle()))
                } else {
                    Ok(None)
                }
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(SandboxError::Transport(format!("{status}: {message}")))
            }
        }
    }

    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/v1/sandboxes/{sandbox_id}/files"),
            )
            .json(&FileWriteRequest { path, content })
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        check_file_status(sandbox_id, path, response).await?;
        Ok(())
    }

    async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<String, SandboxError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/sandboxes/{sandbox_id}/files"),
            )
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        let response = check_file_status(sandbox_id, path, response).await?;
        let body: FileContent = response
            .json()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        Ok(body.content)
    }

    async fn list_directory(
        &self,
        sandbox_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, SandboxError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/sandboxes/{sandbox_id}/entries"),
            )
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        let response = check_file_status(sandbox_id, path, response).await?;
        let body: EntryList = response
            .json()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        Ok(body.entries)
    }

    async fn delete_path(&self, sandbox_id: &str, path: &str) -> Result<(), SandboxError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/v1/sandboxes/{sandbox_id}/files"),
            )
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        check_file_status(sandbox_id, path, response).await?;
        Ok(())
    }

    async fn run_command(
        &self,
        sandbox_id: &str,
        command: &str,
    ) -> Result<CommandOutput, SandboxError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/sandboxes/{sandbox_id}/exec"),
            )
            .timeout(COMMAND_TIMEOUT)
            .json(&ExecRequest { command })
            .send()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(sandbox_id.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SandboxError::Transport(format!("{status}: {message}")));
        }
        response
            .json::<CommandOutput>()
            .await
            .map_err(|err| SandboxError::Transport(err.to_string()))
    }
}

async fn check_file_status(
    sandbox_id: &str,
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SandboxError> {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => Err(SandboxError::Path(format!(
            "'{path}' not found in sandbox {sandbox_id}"
        ))),
        StatusCode::GONE => Err(SandboxError::NotFound(sandbox_id.to_string())),
        status if status.is_success() => Ok(response),
        status => {
            let message = response.text().await.unwrap_or_default();
            Err(SandboxError::Transport(format!("{status}: {message}")))
        }
    }
}

#[derive(Deserialize)]
struct SandboxInfo {
    id: String,
    url: String,
    #[serde(default = "default_alive")]
    alive: bool,
    #[serde(default)]
    created_at: Option<i64>,
}

fn default_alive() -> bool {
    true
}

impl SandboxInfo {
    fn into_handle(self) -> SandboxHandle {
        SandboxHandle {
            id: self.id,
            url: self.url,
            created_at: self
                .created_at
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        }
    }
}

#[derive(Serialize)]
struct FileWriteRequest<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct FileContent {
    content: String,
}

#[derive(Deserialize)]
struct EntryList {
    entries: Vec<DirEntry>,
}

#[derive(Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
}
