use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// One reply from the companion server. `audio` carries a base64-encoded
/// MP3 rendition of the reply when the server produced one.
#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one user message and waits for the reply. Any transport failure,
    /// non-success status, or unparseable body comes back as an error; the
    /// caller treats them all the same way.
    pub async fn send(&self, message: &str) -> Result<ChatReply> {
        let url = format!("{}/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let reply: ChatReply = response.json().await?;
        Ok(reply)
    }
}
