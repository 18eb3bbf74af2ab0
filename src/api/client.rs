//! Client for a remote executor's HTTP API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    ActivitiesResponse, ClearResponse, ErrorBody, ACTIVITIES_PATH, EXECUTE_PATH, HEALTH_PATH,
};
use crate::dispatch::{CommandDispatch, ExecuteReport, ExecuteRequest, SubmitReceipt};
use crate::error::{ErrorCode, ReconError, Result};
use crate::ledger::ActivityRecord;
use crate::poller::ActivitySource;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    /// Client for the executor at `base_url`, e.g. `http://10.0.0.5:8000`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("Invalid remote executor URL '{}'", base_url),
            )
            .with_source(e)
        })?;
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ReconError::config("Failed to create HTTP client").with_source(e)
        })?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("Cannot build URL for {}", path),
            )
            .with_source(e)
        })
    }

    fn activities_request(&self, method: Method, workspace: &str, module: &str) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, self.url(ACTIVITIES_PATH)?)
            .query(&[("workspace", workspace), ("module", module)]))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await.map_err(|e| transport_error(e, what))?;
        decode(response, what).await
    }

    pub async fn health(&self) -> Result<()> {
        let _: serde_json::Value = self
            .send(self.client.get(self.url(HEALTH_PATH)?), "health check")
            .await?;
        Ok(())
    }

    pub async fn activities(&self, workspace: &str, module: &str) -> Result<ActivitiesResponse> {
        let request = self.activities_request(Method::GET, workspace, module)?;
        self.send(request, "activities query").await
    }

    pub async fn force(&self, workspace: &str, module: &str) -> Result<ActivitiesResponse> {
        let request = self.activities_request(Method::POST, workspace, module)?;
        self.send(request, "force-complete").await
    }

    pub async fn clear(&self, workspace: &str, module: &str) -> Result<usize> {
        let request = self.activities_request(Method::DELETE, workspace, module)?;
        let response: ClearResponse = self.send(request, "clear").await?;
        Ok(response.cleared)
    }

    /// Dispatch a command; with `wait` the answer carries the terminal status
    pub async fn execute(&self, request: &ExecuteRequest, wait: bool) -> Result<ExecuteReport> {
        let builder = self
            .client
            .post(self.url(EXECUTE_PATH)?)
            .query(&[("wait", wait)])
            .json(request);
        debug!("Dispatching to {}: {}", self.base, request.cmd);
        self.send(builder, "execute").await
    }
}

fn transport_error(err: reqwest::Error, what: &str) -> ReconError {
    let code = if err.is_connect() || err.is_timeout() {
        ErrorCode::EXEC_REMOTE_UNREACHABLE
    } else {
        ErrorCode::EXEC_GENERIC
    };
    ReconError::execution_with_code(code, format!("Remote {} failed", what), None).with_source(err)
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            ReconError::execution_with_code(
                ErrorCode::EXEC_OUTPUT_ERROR,
                format!("Unreadable answer to remote {}", what),
                None,
            )
            .with_source(e)
        });
    }

    let body = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) if err.code != 0 => (err.error, err.code),
        Ok(err) => (err.error, ErrorCode::EXEC_GENERIC),
        Err(_) => (body, ErrorCode::EXEC_GENERIC),
    };
    Err(ReconError::execution_with_code(
        code,
        format!("Remote {} returned {}: {}", what, status, message),
        None,
    ))
}

#[async_trait]
impl CommandDispatch for ApiClient {
    async fn submit(&self, request: ExecuteRequest) -> Result<SubmitReceipt> {
        let report = self.execute(&request, false).await?;
        Ok(SubmitReceipt {
            id: report.id,
            duplicate: report.duplicate,
        })
    }
}

#[async_trait]
impl ActivitySource for ApiClient {
    async fn snapshot(&self, workspace: &str, module: &str) -> Result<Vec<ActivityRecord>> {
        Ok(self.activities(workspace, module).await?.activities)
    }

    async fn force_remaining(&self, workspace: &str, module: &str) -> Result<usize> {
        Ok(self.force(workspace, module).await?.forced.unwrap_or_default())
    }

    async fn reset_module(&self, workspace: &str, module: &str) -> Result<usize> {
        self.clear(workspace, module).await
    }
}
