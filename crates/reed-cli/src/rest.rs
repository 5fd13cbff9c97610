//! Roster REST client
//!
//! Seeds the terminal view from the chat server's conversation endpoints
//! before the socket opens. The token goes in the `Authorization` header,
//! matching the server's expectation for these routes.

use anyhow::Context;
use reed_protocol::{Conversation, UserRef};

pub struct RosterClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl RosterClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Conversations the authenticated user is part of.
    pub async fn my_conversations(&self) -> anyhow::Result<Vec<Conversation>> {
        self.get("/conversation/my-conversations").await
    }

    /// Users the authenticated user has no conversation with yet.
    pub async fn uncontacted_users(&self) -> anyhow::Result<Vec<UserRef>> {
        self.get("/conversation/uncontacted-users").await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.token)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;

        if !response.status().is_success() {
            anyhow::bail!("GET {path} failed: {}", response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("decoding GET {path} response"))
    }
}
