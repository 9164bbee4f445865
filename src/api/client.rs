use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::errors::RequestFailure;

use super::errors::ApiClientError;
use super::models::{
    Error, InputFilesBody, SessionData, VerifyCheckBody, VerifyCheckRequest, VerifyRequest,
    VerifyResponse,
};

pub const DEFAULT_SERVER_URL: &str = "https://server-verify.hashscan.io";

/// The remote verification server, as seen by the sessions.
#[async_trait]
pub trait VerificationServer: Send + Sync {
    async fn session_data(&self) -> Result<SessionData, ApiClientError>;

    async fn clear_session(&self) -> Result<String, ApiClientError>;

    async fn upload_files(
        &self,
        files: &BTreeMap<String, String>,
    ) -> Result<SessionData, ApiClientError>;

    async fn verify_checked(
        &self,
        contracts: &[VerifyCheckRequest],
    ) -> Result<SessionData, ApiClientError>;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, ApiClientError>;
}

/// HTTP client for the verification server.
///
/// Session endpoints are correlated by cookie, so one client is one server
/// session.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    /// # Errors
    ///
    /// Fails if provided `Url` cannot be a base. We rely on that
    /// invariant in other methods.
    pub fn new(base: Url) -> Result<Self, ApiClientError> {
        // Test here so that we are sure path_segments_mut succeeds
        if base.cannot_be_a_base() {
            return Err(ApiClientError::CannotBeBase(base));
        }

        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self { base, client })
    }

    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// # Errors
    ///
    /// Will return `Err` if the URL cannot be a base.
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ApiClientError> {
        let mut url = self.base.clone();
        let url_clone = url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiClientError::CannotBeBase(url_clone))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_status(url: &Url, response: Response) -> Result<Response, ApiClientError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::BAD_REQUEST => {
                let text = response.text().await?;
                let msg = serde_json::from_str::<Error>(&text).map_or(text, |e| e.error);
                Err(ApiClientError::from(RequestFailure::new(
                    url.clone(),
                    StatusCode::BAD_REQUEST,
                    msg,
                )))
            }
            StatusCode::PAYLOAD_TOO_LARGE => Err(ApiClientError::from(RequestFailure::new(
                url.clone(),
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request payload too large",
            ))),
            status_code => Err(ApiClientError::from(RequestFailure::new(
                url.clone(),
                status_code,
                response.text().await?,
            ))),
        }
    }

    async fn parse<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, ApiClientError> {
        let response = Self::check_status(url, response).await?;
        let response_text = response.text().await?;
        log::debug!("Raw API Response from {url}: {response_text}");

        serde_json::from_str(&response_text).map_err(|error| {
            log::error!("Failed to parse JSON response: {error}");
            log::error!("Response text: {response_text}");
            ApiClientError::Payload {
                url: url.clone(),
                error,
            }
        })
    }
}

#[async_trait]
impl VerificationServer for ApiClient {
    async fn session_data(&self) -> Result<SessionData, ApiClientError> {
        let url = self.endpoint_url(&["session", "data"])?;
        let response = self.client.get(url.clone()).send().await?;
        Self::parse(&url, response).await
    }

    async fn clear_session(&self) -> Result<String, ApiClientError> {
        let url = self.endpoint_url(&["session", "clear"])?;
        let response = self.client.post(url.clone()).send().await?;
        let response = Self::check_status(&url, response).await?;
        Ok(response.text().await?)
    }

    async fn upload_files(
        &self,
        files: &BTreeMap<String, String>,
    ) -> Result<SessionData, ApiClientError> {
        let url = self.endpoint_url(&["session", "input-files"])?;
        log::debug!("Uploading {} files to {url}", files.len());
        let response = self
            .client
            .post(url.clone())
            .json(&InputFilesBody { files })
            .send()
            .await?;
        Self::parse(&url, response).await
    }

    async fn verify_checked(
        &self,
        contracts: &[VerifyCheckRequest],
    ) -> Result<SessionData, ApiClientError> {
        let url = self.endpoint_url(&["session", "verify-checked"])?;
        let response = self
            .client
            .post(url.clone())
            .json(&VerifyCheckBody { contracts })
            .send()
            .await?;
        Self::parse(&url, response).await
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, ApiClientError> {
        let url = self.endpoint_url(&["verify"])?;
        let response = self.client.post(url.clone()).json(request).send().await?;
        Self::parse(&url, response).await
    }
}
