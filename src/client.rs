//! Client for the management API, for use by sibling processes.
//!
//! ```no_run
//! # async fn run() -> Result<(), portico::client::ClientError> {
//! use portico::{client::ManagementClient, core::Route};
//!
//! let client = ManagementClient::discover("/var/run/portico".as_ref()).await?;
//! client
//!     .create_route(&Route::new("/v1/apps", "http://127.0.0.1:9001"))
//!     .await?;
//! # Ok(()) }
//! ```
use std::{path::Path, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

use crate::{
    adapters::management::{ApiResult, PORT_PATH, ROUTES_PATH},
    core::route::{ChangePortRequest, Route},
    utils::address_file::{MANAGEMENT_URL_FILENAME, await_address, await_address_with_interval},
};

/// Timeout of the discovery ping.
pub const PING_TIMEOUT: Duration = Duration::from_secs(3);
/// Polls for `management.url` before [`ManagementClient::discover`] gives up.
pub const DISCOVERY_RETRIES: u32 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// `management.url` could not be read
    #[error("failed to read management address: {0}")]
    Discovery(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The management service answered its ping with a non-200 status
    #[error("failed to ping management service (status code: {0})")]
    Ping(StatusCode),

    #[error("unexpected status {status}: {message}")]
    Unexpected { status: StatusCode, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ManagementClient {
    base_url: String,
    http: reqwest::Client,
}

impl ManagementClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        // The management service is always local; environment proxies never apply.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Wait for `management.url` under `runtime_path` and check the service
    /// answers. A gateway that is still starting gets [`DISCOVERY_RETRIES`]
    /// polls to publish the file.
    pub async fn discover(runtime_path: &Path) -> ClientResult<Self> {
        let raw = await_address(runtime_path, MANAGEMENT_URL_FILENAME, DISCOVERY_RETRIES).await?;
        Self::connect(raw).await
    }

    /// [`ManagementClient::discover`] with an explicit polling budget.
    pub async fn discover_with(
        runtime_path: &Path,
        max_retries: u32,
        interval: Duration,
    ) -> ClientResult<Self> {
        let raw = await_address_with_interval(
            runtime_path,
            MANAGEMENT_URL_FILENAME,
            max_retries,
            interval,
        )
        .await?;
        Self::connect(raw).await
    }

    async fn connect(base_url: String) -> ClientResult<Self> {
        let client = Self::new(base_url)?;

        let response = client
            .http
            .get(client.url("/ping"))
            .timeout(PING_TIMEOUT)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::Ping(response.status()));
        }

        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_route(&self, route: &Route) -> ClientResult<()> {
        let response = self.http.post(self.url(ROUTES_PATH)).json(route).send().await?;
        if response.status() != StatusCode::CREATED {
            return Err(unexpected(response).await);
        }
        Ok(())
    }

    pub async fn get_routes(&self) -> ClientResult<Vec<Route>> {
        let response = self.http.get(self.url(ROUTES_PATH)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn get_gateway_port(&self) -> ClientResult<String> {
        let response = self.http.get(self.url(PORT_PATH)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response).await);
        }
        let result: ApiResult<String> = response.json().await?;
        Ok(result.data.unwrap_or_default())
    }

    pub async fn change_gateway_port(&self, port: &str) -> ClientResult<()> {
        let request = ChangePortRequest {
            port: port.to_string(),
        };
        let response = self.http.put(self.url(PORT_PATH)).json(&request).send().await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response).await);
        }
        Ok(())
    }
}

async fn unexpected(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiResult<serde_json::Value>>(&body)
        .map(|r| r.message)
        .unwrap_or(body);
    ClientError::Unexpected { status, message }
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ManagementClient::new("http://127.0.0.1:4000/\n").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:4000");
        assert_eq!(client.url(ROUTES_PATH), "http://127.0.0.1:4000/v1/gateway/routes");
    }

    #[tokio::test]
    async fn test_discover_without_address_file() {
        let dir = TempDir::new().unwrap();
        let err = ManagementClient::discover_with(dir.path(), 2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_discover_waits_for_late_address_file() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let dir = TempDir::new().unwrap();
        let runtime = dir.path().to_path_buf();
        let published = url.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let staged = runtime.join("management.url.tmp");
            std::fs::write(&staged, published).unwrap();
            std::fs::rename(staged, runtime.join(MANAGEMENT_URL_FILENAME)).unwrap();
        });

        let client = ManagementClient::discover_with(dir.path(), 50, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(client.base_url(), url);
    }
}
