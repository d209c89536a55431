//! HTTP API client for conversation history.

use casalink_shared::{try_problem_detail, ApiError, ChatMessage};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

/// HTTP client for bearer-authenticated requests against the REST backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    pub fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, url: Url, token: &str) -> Result<TRes, ApiError> {
        tracing::debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            let body = try_problem_detail(&text).unwrap_or(text);
            return Err(ApiError::Http { status, body });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Past messages of a conversation, oldest first as returned by the backend.
    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.url(&["chat", "conversations", conversation_id, "messages"])?;
        self.get_json(url, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_segments_onto_base() {
        let client = ApiClient::new(Url::parse("https://api.casalink.pe/v1/").unwrap());
        let url = client
            .url(&["chat", "conversations", "abc 123", "messages"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.casalink.pe/v1/chat/conversations/abc%20123/messages"
        );
    }

    #[test]
    fn root_base_has_no_double_slash() {
        let client = ApiClient::new(Url::parse("http://localhost:8000").unwrap());
        let url = client.url(&["chat", "conversations"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/chat/conversations");
    }

    #[test]
    fn opaque_base_is_rejected() {
        let client = ApiClient::new(Url::parse("data:text/plain,hello").unwrap());
        assert!(matches!(client.url(&["x"]), Err(ApiError::InvalidUrl(_))));
    }
}
