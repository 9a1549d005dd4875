//! HTTP client for the Cattle API (v2-beta).
//!
//! All resources are addressed under `{url}/projects/{project_id}`.
//! Collections are returned as `{ "data": [...], "pagination": {...} }`;
//! listings follow `pagination.next` until exhausted.

use std::time::Duration;

use async_trait::async_trait;
use rebalancer_placement::{Host, HostSelector, Replica, Service};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Filters, Platform};
use crate::error::PlatformError;

/// Connection settings for the platform API.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// API endpoint, e.g. `https://rancher.example.com/v2-beta`.
    pub url: String,

    /// Project (environment) the client is scoped to.
    pub project_id: String,

    pub access_key: Option<String>,

    pub secret_key: Option<String>,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Cattle API client.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl HttpPlatform {
    /// Create a new client from connection settings.
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/projects/{}",
                config.url.trim_end_matches('/'),
                config.project_id
            ),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Build a URL for a project-scoped path.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.access_key {
            Some(key) => request.basic_auth(key, self.secret_key.as_ref()),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let response = self.request(Method::GET, &self.url(path)).send().await?;
        handle_response(response).await
    }

    /// Fetch every page of a collection.
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &Filters,
    ) -> Result<Vec<T>, PlatformError> {
        let response = self
            .request(Method::GET, &self.url(path))
            .query(filters)
            .send()
            .await?;
        let mut page: Collection<T> = handle_response(response).await?;
        let mut items = std::mem::take(&mut page.data);

        while let Some(next) = page.pagination.and_then(|p| p.next) {
            debug!(url = %next, "Fetching next page");
            let response = self.request(Method::GET, &next).send().await?;
            page = handle_response(response).await?;
            items.append(&mut page.data);
        }

        Ok(items)
    }

    async fn host_action(&self, host_id: &str, action: &str) -> Result<Host, PlatformError> {
        let response = self
            .request(Method::POST, &self.url(&format!("/hosts/{}", host_id)))
            .query(&[("action", action)])
            .send()
            .await?;
        handle_response(response).await
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>, PlatformError> {
        self.list("/services", filters).await
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError> {
        self.get(&format!("/services/{}", service_id)).await
    }

    async fn list_hosts(
        &self,
        selector: Option<&HostSelector>,
    ) -> Result<Vec<Host>, PlatformError> {
        let hosts: Vec<Host> = self.list("/hosts", &Filters::new()).await?;
        Ok(match selector {
            Some(selector) => hosts
                .into_iter()
                .filter(|host| selector.matches(&host.labels))
                .collect(),
            None => hosts,
        })
    }

    async fn get_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        self.get(&format!("/hosts/{}", host_id)).await
    }

    async fn deactivate_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        self.host_action(host_id, "deactivate").await
    }

    async fn activate_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        self.host_action(host_id, "activate").await
    }

    async fn get_replica(&self, replica_id: &str) -> Result<Replica, PlatformError> {
        self.get(&format!("/containers/{}", replica_id)).await
    }

    async fn delete_replica(&self, replica_id: &str) -> Result<(), PlatformError> {
        let response = self
            .request(
                Method::DELETE,
                &self.url(&format!("/containers/{}", replica_id)),
            )
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            handle_error(response).await
        }
    }

    async fn stack_name(&self, stack_id: &str) -> Result<String, PlatformError> {
        let stack: Stack = self.get(&format!("/stacks/{}", stack_id)).await?;
        Ok(stack.name)
    }
}

/// Handle a successful or error response.
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PlatformError> {
    if !response.status().is_success() {
        return handle_error(response).await;
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| PlatformError::Decode(e.to_string()))
}

/// Handle an error response.
async fn handle_error<T>(response: reqwest::Response) -> Result<T, PlatformError> {
    let status = response.status();
    let url = response.url().to_string();

    // Try to parse error response
    let body = response.text().await.unwrap_or_default();
    let error_body: ApiErrorResponse =
        serde_json::from_str(&body).unwrap_or_else(|_| ApiErrorResponse {
            code: "unknown".to_string(),
            message: body.clone(),
        });

    debug!(status = %status, url = %url, code = %error_body.code, "Platform request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Unauthorized(format!("{} {}", status, url))
        }
        StatusCode::NOT_FOUND => PlatformError::NotFound(url),
        _ => PlatformError::api(status.as_u16(), error_body.code, error_body.message),
    })
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Stack {
    name: String,
}

/// API error response structure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}
