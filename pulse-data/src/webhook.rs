//! JSON webhook [`Sink`].

use crate::error::DataError;
use async_trait::async_trait;
use pulse_engine::{
    error::{ConfigError, DispatchError},
    notify::{Notification, dispatch::Sink},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{str::FromStr, time::Duration};
use tracing::debug;
use url::Url;

/// Client side timeout for a single webhook post.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Body layout expected by the receiving endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFormat {
    /// Chat robot style: `{"msgtype":"markdown","markdown":{"content":...}}`.
    #[default]
    Markdown,
    /// Plain JSON: `{"channel","title","text","fields"}`.
    Generic,
}

impl FromStr for WebhookFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" => Ok(WebhookFormat::Markdown),
            "generic" | "json" => Ok(WebhookFormat::Generic),
            other => Err(ConfigError::InvalidValue {
                key: "WEBHOOK_FORMAT".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl WebhookFormat {
    pub fn payload(&self, notification: &Notification) -> Value {
        match self {
            WebhookFormat::Markdown => markdown_payload(notification),
            WebhookFormat::Generic => generic_payload(notification),
        }
    }
}

/// Markdown body. The table goes in a code fence so its fixed widths survive rendering.
pub fn markdown_payload(notification: &Notification) -> Value {
    let mut content = format!(
        "### {}\n```\n{}\n```",
        notification.title, notification.description
    );
    for (name, value) in &notification.fields {
        content.push_str(&format!("\n> **{name}**: {value}"));
    }

    json!({
        "msgtype": "markdown",
        "markdown": { "content": content },
    })
}

pub fn generic_payload(notification: &Notification) -> Value {
    let fields: Vec<Value> = notification
        .fields
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    json!({
        "channel": notification.channel,
        "title": notification.title,
        "text": notification.description,
        "fields": fields,
    })
}

/// Posts notifications as JSON to a fixed url.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: Url,
    format: WebhookFormat,
}

impl WebhookSink {
    pub fn new(url: &str, format: WebhookFormat) -> Result<Self, DataError> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: Url::parse(url)?,
            format,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn format(&self) -> WebhookFormat {
        self.format
    }

    async fn post(&self, payload: &Value) -> Result<(), DataError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::from_status(status.as_u16(), &body));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for WebhookSink {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        let payload = self.format.payload(notification);
        self.post(&payload).await?;
        debug!(
            channel = %notification.channel,
            host = self.url.host_str().unwrap_or_default(),
            "posted webhook"
        );
        Ok(())
    }
}
