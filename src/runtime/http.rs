//! HTTP event source
//!
//! Streams are plain GET requests answered with `text/event-stream`; each
//! server-sent event's `data` is one frame.

use super::error::TransportError;
use super::traits::{EventSource, FrameStream};
use crate::config::ClientConfig;
use crate::protocol::{RawFrame, StreamRequest};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    message: String,
}

impl HttpEventSource {
    /// Only connection setup is bounded by the configured timeout; an open
    /// stream may stay silent indefinitely.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Check that the backend is up
    pub async fn ping(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.url("/ping"))
            .send()
            .await?
            .error_for_status()?;
        let body: PingResponse = response.json().await?;
        if body.message == "pong" {
            Ok(())
        } else {
            Err(TransportError::Request(format!(
                "unexpected ping reply: {}",
                body.message
            )))
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open_event_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<FrameStream, TransportError> {
        let response = self
            .client
            .get(self.url(&request.endpoint))
            .query(&request.params)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let frames = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                futures::future::ready(match event {
                    // Keep-alive events carry no data
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(Ok(RawFrame::new(event.data))),
                    Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
                })
            });
        Ok(frames.boxed())
    }
}
