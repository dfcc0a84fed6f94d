//! Management API client for Virtual Machine Scale Sets.
//!
//! [`VirtualMachineScaleSetsClient`] is the seam the resource talks to;
//! [`RestScaleSetClient`] implements it over reqwest. Mutating calls return a
//! [`PendingOperation`] which is then driven to completion by polling the
//! `Azure-AsyncOperation` or `Location` URL the API handed back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use super::models::{
    CloudErrorBody, ExpandTypes, OperationStatus, VirtualMachineScaleSet,
    VirtualMachineScaleSetUpdate,
};
use super::API_VERSION;
use crate::config::{AzureConfig, DEFAULT_ENDPOINT};

const ASYNC_OPERATION: &str = "azure-asyncoperation";
const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default delay between long-running operation polls in seconds
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Errors returned by the management API client
#[derive(Error, Debug)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{code}: {message} (HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("long-running operation finished with status {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid endpoint {endpoint:?}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl AzureError {
    /// True when the API answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, AzureError::Api { status: 404, .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            AzureError::Timeout { .. } => true,
            AzureError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AzureError::Api { status, .. } => Some(*status),
            AzureError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for management API calls
pub type AzureResult<T> = Result<T, AzureError>;

/// A mutation the API accepted but may not have finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    /// The response already carried the final result
    Completed,
    /// Poll the `Azure-AsyncOperation` URL for a status document
    AsyncOperation {
        url: String,
        retry_after: Option<Duration>,
    },
    /// Poll the `Location` URL until it stops answering 202
    Location {
        url: String,
        retry_after: Option<Duration>,
    },
}

impl PendingOperation {
    fn from_headers(headers: &HeaderMap) -> Self {
        let retry_after = retry_after(headers);

        if let Some(url) = header_str(headers, ASYNC_OPERATION) {
            return PendingOperation::AsyncOperation { url, retry_after };
        }
        if let Some(url) = header_str(headers, LOCATION.as_str()) {
            return PendingOperation::Location { url, retry_after };
        }
        PendingOperation::Completed
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PendingOperation::Completed)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Operations on Virtual Machine Scale Sets
#[async_trait]
pub trait VirtualMachineScaleSetsClient: Send + Sync {
    /// Subscription every request is scoped to
    fn subscription_id(&self) -> &str;

    async fn get(
        &self,
        resource_group: &str,
        name: &str,
        expand: Option<ExpandTypes>,
    ) -> AzureResult<VirtualMachineScaleSet>;

    async fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSet,
    ) -> AzureResult<PendingOperation>;

    async fn update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSetUpdate,
    ) -> AzureResult<PendingOperation>;

    /// `force_deletion` of `None` leaves the parameter off the request
    async fn delete(
        &self,
        resource_group: &str,
        name: &str,
        force_deletion: Option<bool>,
    ) -> AzureResult<PendingOperation>;

    /// Block until a pending operation reaches a terminal state
    async fn wait_for_completion(&self, operation: PendingOperation) -> AzureResult<()>;
}

// ============================================================================
// REST client
// ============================================================================

/// Configuration for [`RestScaleSetClient`]
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub endpoint: String,
    pub subscription_id: String,
    pub api_version: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub user_agent: String,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subscription_id: String::new(),
            api_version: API_VERSION.to_string(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            user_agent: format!("rustible-vmss/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Builder for creating a [`RestScaleSetClient`]
pub struct RestScaleSetClientBuilder {
    config: RestClientConfig,
}

impl RestScaleSetClientBuilder {
    pub fn new() -> Self {
        Self {
            config: RestClientConfig::default(),
        }
    }

    /// Start from the `[azure]` section of the config file
    pub fn from_azure_config(azure: &AzureConfig) -> Self {
        Self {
            config: RestClientConfig {
                endpoint: azure.endpoint.clone(),
                subscription_id: azure.subscription_id.clone().unwrap_or_default(),
                api_version: azure.api_version.clone(),
                access_token: azure.access_token.clone(),
                timeout: azure.request_timeout,
                poll_interval: azure.poll_interval,
                ..Default::default()
            },
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.config.subscription_id = subscription_id.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> AzureResult<RestScaleSetClient> {
        RestScaleSetClient::from_config(self.config)
    }
}

impl Default for RestScaleSetClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// reqwest-backed [`VirtualMachineScaleSetsClient`]
pub struct RestScaleSetClient {
    client: Client,
    config: RestClientConfig,
    base: Url,
}

impl RestScaleSetClient {
    pub fn builder() -> RestScaleSetClientBuilder {
        RestScaleSetClientBuilder::new()
    }

    fn from_config(config: RestClientConfig) -> AzureResult<Self> {
        if config.subscription_id.is_empty() {
            return Err(AzureError::MissingCredential(
                "no subscription ID configured; set AZURE_SUBSCRIPTION_ID".to_string(),
            ));
        }
        if config.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(AzureError::MissingCredential(
                "no access token configured; set AZURE_ACCESS_TOKEN".to_string(),
            ));
        }

        let base = Url::parse(&config.endpoint).map_err(|e| AzureError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(AzureError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                message: "endpoint cannot be used as a base URL".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// URL of one scale set, without query parameters
    fn scale_set_url(&self, resource_group: &str, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "subscriptions",
                self.config.subscription_id.as_str(),
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.Compute",
                "virtualMachineScaleSets",
                name,
            ]);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        trace!(%method, %url, %request_id, "Sending request");

        let mut request = self
            .client
            .request(method, url)
            .header(CLIENT_REQUEST_ID, request_id);
        if let Some(token) = &self.config.access_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> AzureResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AzureError::Timeout {
                    url: url.to_string(),
                    timeout: self.config.timeout,
                }
            } else {
                AzureError::Http(e)
            }
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn mutate<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> AzureResult<PendingOperation> {
        let url_str = url.to_string();
        let mut request = self.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.send(request, &url_str).await?;
        let status = response.status();
        let operation = PendingOperation::from_headers(response.headers());
        debug!(%method, url = %url_str, %status, ?operation, "Mutation accepted");

        Ok(operation)
    }

    async fn poll(&self, operation: &PendingOperation) -> AzureResult<PollState> {
        match operation {
            PendingOperation::Completed => Ok(PollState::Done),
            PendingOperation::AsyncOperation { url, .. } => {
                let parsed = parse_url(url)?;
                let response = self.send(self.request(Method::GET, parsed), url).await?;
                let delay = retry_after(response.headers());
                let body = response.bytes().await?;
                let status: OperationStatus = serde_json::from_slice(&body)?;
                trace!(url = %url, status = %status.status, "Polled operation");

                match status.status.to_ascii_lowercase().as_str() {
                    "succeeded" => Ok(PollState::Done),
                    "failed" | "canceled" | "cancelled" => {
                        let error = status.error.unwrap_or_default();
                        Err(AzureError::OperationFailed {
                            status: status.status,
                            code: error.code,
                            message: error.message,
                        })
                    }
                    _ => Ok(PollState::Running(delay)),
                }
            }
            PendingOperation::Location { url, .. } => {
                let parsed = parse_url(url)?;
                let response = self.send(self.request(Method::GET, parsed), url).await?;
                if response.status() == StatusCode::ACCEPTED {
                    Ok(PollState::Running(retry_after(response.headers())))
                } else {
                    Ok(PollState::Done)
                }
            }
        }
    }
}

enum PollState {
    Done,
    /// Still running; poll again after the server's `Retry-After`, if any
    Running(Option<Duration>),
}

fn parse_url(url: &str) -> AzureResult<Url> {
    Url::parse(url).map_err(|e| AzureError::InvalidEndpoint {
        endpoint: url.to_string(),
        message: e.to_string(),
    })
}

/// Turn a non-2xx response into [`AzureError::Api`]
async fn api_error(response: Response) -> AzureError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: CloudErrorBody = serde_json::from_str(&body).unwrap_or_default();

    match parsed.error {
        Some(error) => AzureError::Api {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        },
        None => AzureError::Api {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("UnknownError")
                .replace(' ', ""),
            message: body,
        },
    }
}

#[async_trait]
impl VirtualMachineScaleSetsClient for RestScaleSetClient {
    fn subscription_id(&self) -> &str {
        &self.config.subscription_id
    }

    async fn get(
        &self,
        resource_group: &str,
        name: &str,
        expand: Option<ExpandTypes>,
    ) -> AzureResult<VirtualMachineScaleSet> {
        let mut url = self.scale_set_url(resource_group, name);
        if let Some(expand) = expand {
            url.query_pairs_mut().append_pair("$expand", expand.as_str());
        }

        let display = url.to_string();
        let response = self.send(self.request(Method::GET, url), &display).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSet,
    ) -> AzureResult<PendingOperation> {
        let url = self.scale_set_url(resource_group, name);
        self.mutate(Method::PUT, url, Some(parameters)).await
    }

    async fn update(
        &self,
        resource_group: &str,
        name: &str,
        parameters: &VirtualMachineScaleSetUpdate,
    ) -> AzureResult<PendingOperation> {
        let url = self.scale_set_url(resource_group, name);
        self.mutate(Method::PATCH, url, Some(parameters)).await
    }

    async fn delete(
        &self,
        resource_group: &str,
        name: &str,
        force_deletion: Option<bool>,
    ) -> AzureResult<PendingOperation> {
        let mut url = self.scale_set_url(resource_group, name);
        if let Some(force) = force_deletion {
            url.query_pairs_mut()
                .append_pair("forceDeletion", if force { "true" } else { "false" });
        }
        self.mutate::<()>(Method::DELETE, url, None).await
    }

    async fn wait_for_completion(&self, operation: PendingOperation) -> AzureResult<()> {
        let mut delay = match &operation {
            PendingOperation::Completed => return Ok(()),
            PendingOperation::AsyncOperation { retry_after, .. }
            | PendingOperation::Location { retry_after, .. } => *retry_after,
        };

        loop {
            tokio::time::sleep(delay.unwrap_or(self.config.poll_interval)).await;

            match self.poll(&operation).await? {
                PollState::Done => return Ok(()),
                PollState::Running(next) => delay = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_pending_operation_prefers_async_header() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://example/location"));
        headers.insert(ASYNC_OPERATION, HeaderValue::from_static("https://example/async"));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));

        assert_eq!(
            PendingOperation::from_headers(&headers),
            PendingOperation::AsyncOperation {
                url: "https://example/async".to_string(),
                retry_after: Some(Duration::from_secs(5)),
            }
        );
    }

    #[test]
    fn test_pending_operation_without_headers_is_completed() {
        assert!(PendingOperation::from_headers(&HeaderMap::new()).is_completed());
    }

    #[test]
    fn test_error_classification() {
        let not_found = AzureError::Api {
            status: 404,
            code: "ResourceNotFound".to_string(),
            message: "gone".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_timeout());
        assert_eq!(not_found.status(), Some(404));

        let timeout = AzureError::Timeout {
            url: "https://example".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_timeout());
    }

    #[test]
    fn test_build_requires_credentials() {
        let err = RestScaleSetClient::builder()
            .subscription_id("sub")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AzureError::MissingCredential(_)));
    }

    #[test]
    fn test_scale_set_url() {
        let client = RestScaleSetClient::builder()
            .endpoint("https://management.example.com/")
            .subscription_id("sub")
            .access_token("token")
            .build()
            .unwrap();
        let url = client.scale_set_url("my rg", "vmss1");
        assert_eq!(
            url.as_str(),
            "https://management.example.com/subscriptions/sub/resourceGroups/my%20rg/providers/Microsoft.Compute/virtualMachineScaleSets/vmss1?api-version=2021-07-01"
        );
    }
}
