#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use super::sse::DeltaDecoder;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ChatGateway;
use crate::domain::models::ChatPrompt;
use crate::domain::models::GatewayError;
use crate::domain::models::HistoryEntry;
use crate::domain::models::Outfit;
use crate::domain::models::StreamEvent;
use crate::domain::models::WardrobeItem;

fn convert_err(err: reqwest::Error) -> GatewayError {
    return GatewayError::Transport(err.to_string());
}

fn forward(tx: &mpsc::UnboundedSender<StreamEvent>, event: StreamEvent) -> Result<(), GatewayError> {
    return tx
        .send(event)
        .map_err(|err| return GatewayError::Transport(err.to_string()));
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    user_id: String,
    message: String,
    conversation_history: Vec<HistoryEntry>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutfitRequest {
    wardrobe_items: Vec<WardrobeItem>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OutfitResponse {
    outfits: Vec<Outfit>,
}

pub struct HttpGateway {
    url: String,
    token: String,
    timeout: String,
    health_check_timeout: String,
}

impl Default for HttpGateway {
    fn default() -> HttpGateway {
        return HttpGateway {
            url: Config::get(ConfigKey::GatewayURL),
            token: Config::get(ConfigKey::GatewayToken),
            timeout: Config::get(ConfigKey::GatewayTimeout),
            health_check_timeout: Config::get(ConfigKey::GatewayHealthCheckTimeout),
        };
    }
}

impl HttpGateway {
    fn request_timeout(&self) -> Duration {
        let millis = self.timeout.parse::<u64>().unwrap_or(120_000);
        return Duration::from_millis(millis);
    }

    fn check_status(status: u16) -> Result<(), GatewayError> {
        if status == 429 {
            return Err(GatewayError::RateLimited);
        }
        if status == 402 {
            return Err(GatewayError::PaymentRequired);
        }
        if status >= 300 {
            return Err(GatewayError::Transport(format!(
                "gateway returned status {status}"
            )));
        }

        return Ok(());
    }
}

#[async_trait]
impl ChatGateway for HttpGateway {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Gateway URL is not defined");
        }

        // The hosted gateway serves nothing at its index, so only self-hosted
        // deployments get probed.
        if self.url == Config::default(ConfigKey::GatewayURL) {
            return Ok(());
        }

        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.health_check_timeout.parse::<u64>()?))
            .send()
            .await;

        if res.is_err() {
            tracing::error!(error = ?res.unwrap_err(), "gateway is not reachable");
            bail!("Gateway is not reachable");
        }

        let status = res.unwrap().status().as_u16();
        if status >= 400 {
            tracing::error!(status = status, "gateway health check failed");
            bail!("Gateway health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn stream_reply<'a>(
        &self,
        prompt: ChatPrompt,
        tx: &'a mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), GatewayError> {
        let req = CompletionRequest {
            user_id: prompt.user_id,
            message: prompt.text,
            conversation_history: prompt.history,
        };

        let res = reqwest::Client::new()
            .post(format!("{url}/v1/chat/completions", url = self.url))
            .header("Authorization", format!("Bearer {}", self.token))
            .timeout(self.request_timeout())
            .json(&req)
            .send()
            .await
            .map_err(convert_err)?;

        Self::check_status(res.status().as_u16())?;
        forward(tx, StreamEvent::Opened())?;

        let content_type = res
            .headers()
            .get("content-type")
            .and_then(|value| return value.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Non-streaming mode delivers the whole completion as one JSON body.
        if !content_type.starts_with("text/event-stream") {
            let body = res
                .json::<CompletionResponse>()
                .await
                .map_err(convert_err)?;
            forward(tx, StreamEvent::Delta(body.response))?;
            forward(tx, StreamEvent::Completed())?;
            return Ok(());
        }

        let mut decoder = DeltaDecoder::default();
        let mut stream = res.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(convert_err)?;
            for fragment in decoder.feed(&bytes) {
                forward(tx, StreamEvent::Delta(fragment))?;
            }

            if decoder.is_done() {
                break;
            }
        }

        forward(tx, StreamEvent::Completed())?;
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn suggest_outfits(&self, items: &[WardrobeItem]) -> Result<Vec<Outfit>, GatewayError> {
        let req = OutfitRequest {
            wardrobe_items: items.to_vec(),
        };

        let res = reqwest::Client::new()
            .post(format!("{url}/v1/outfit-suggestions", url = self.url))
            .header("Authorization", format!("Bearer {}", self.token))
            .timeout(self.request_timeout())
            .json(&req)
            .send()
            .await
            .map_err(convert_err)?;

        Self::check_status(res.status().as_u16())?;

        let body = res.json::<OutfitResponse>().await.map_err(convert_err)?;
        return Ok(body.outfits);
    }
}
