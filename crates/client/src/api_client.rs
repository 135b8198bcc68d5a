//! HTTP API client with bearer-token auth.

use campusmeet_shared::ApiError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP client for making authenticated requests to the campusmeet backend.
#[derive(Debug, Clone, Default)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL for API requests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token attached to every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => rb.header("Authorization", format!("Bearer {token}")),
            None => rb,
        }
    }

    /// Make an authenticated GET request.
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    /// Make an authenticated POST request with a JSON body.
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.post(self.url(path))).json(body);
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    /// Make an authenticated POST request with no body. Several backend
    /// endpoints are bare actions addressed entirely by their path.
    pub async fn post_empty<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.post(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let api = ApiClient::new().with_base_url("http://localhost:8000");
        assert_eq!(api.url("/friends"), "http://localhost:8000/friends");
        assert_eq!(api.url("friends"), "http://localhost:8000/friends");

        let trailing = ApiClient::new().with_base_url("http://localhost:8000/");
        assert_eq!(trailing.url("/friends"), "http://localhost:8000/friends");
    }

    #[test]
    fn url_passes_absolute_urls_through() {
        let api = ApiClient::new().with_base_url("http://localhost:8000");
        assert_eq!(
            api.url("https://other.example/x"),
            "https://other.example/x"
        );
    }

    #[test]
    fn url_without_base_stays_relative() {
        let api = ApiClient::new();
        assert_eq!(api.url("friends"), "/friends");
        assert_eq!(api.url("/friends"), "/friends");
    }
}
