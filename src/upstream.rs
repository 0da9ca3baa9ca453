//! Upstream quote clients.
//!
//! Two live transports feed the oracle: a streaming SSE client (primary) and
//! a polling HTTP client (secondary). Both emit [`UpstreamEvent`]s over an
//! mpsc channel and signal transport death by returning, which drops the
//! sender; the feed driver owns the reconnect policy.
//!
//! Providers disagree about payload shapes, so tick parsing accepts flat
//! numeric fields, numeric strings, and a few levels of envelope nesting.
//! Anything that does not yield a finite positive number is dropped.

use eventsource_client::{Client, SSE};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Envelope keys descended into when looking for a price.
const ENVELOPE_KEYS: &[&str] = &["data", "quote", "tick", "result"];

/// Field names a price may be published under.
const PRICE_KEYS: &[&str] = &["price", "p", "last", "value"];

/// Maximum envelope nesting depth before giving up on a payload.
const MAX_DEPTH: usize = 3;

/// Events produced by an upstream client for the feed driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpstreamEvent {
    /// The transport is established
    Open,

    /// A parsed price tick
    Tick { price: f64 },
}

/// Streaming (SSE) client for the primary live feed.
pub struct PrimaryClient {
    url: String,
    api_key: String,
}

impl PrimaryClient {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Run one connection until the stream errors or closes.
    ///
    /// Sends `Open` once the stream is established and a `Tick` per message
    /// that yields a usable price. Malformed messages are logged and dropped.
    pub async fn stream(&self, events: mpsc::Sender<UpstreamEvent>) -> anyhow::Result<()> {
        let url = format!("{}?key={}", self.url, self.api_key);
        debug!("Connecting to primary quote stream: {}", self.url);

        let client = eventsource_client::ClientBuilder::for_url(&url)?.build();
        let mut stream = client.stream();

        // `Open` is gated on the transport actually connecting; sending it
        // earlier would reset the feed's retry counter on attempts that
        // never reach the upstream.
        let mut opened = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(SSE::Event(ev)) => {
                    if !opened {
                        let _ = events.send(UpstreamEvent::Open).await;
                        opened = true;
                    }
                    match serde_json::from_str::<Value>(&ev.data) {
                        Ok(payload) => {
                            if let Some(price) = extract_price(&payload) {
                                let _ = events.send(UpstreamEvent::Tick { price }).await;
                            } else {
                                debug!("Primary tick without usable price: {}", ev.data);
                            }
                        }
                        Err(e) => {
                            debug!("Unparseable primary payload: {} - {}", e, ev.data);
                        }
                    }
                }
                Ok(SSE::Connected(_)) => {
                    if !opened {
                        let _ = events.send(UpstreamEvent::Open).await;
                        opened = true;
                    }
                }
                Ok(SSE::Comment(_)) => {
                    // Heartbeat, ignore
                }
                Err(e) => {
                    warn!("Primary stream error: {}", e);
                    return Err(anyhow::anyhow!("primary stream error: {}", e));
                }
            }
        }

        Ok(())
    }
}

/// Polling client for the secondary snapshot feed.
///
/// The endpoint returns a `{price, change24h?}`-shaped JSON document. The
/// first successful response counts as the connection opening.
pub struct SecondaryClient {
    url: String,
    api_key: String,
    poll_interval: std::time::Duration,
    http: reqwest::Client,
}

impl SecondaryClient {
    pub fn new(url: &str, api_key: &str, poll_interval: std::time::Duration) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            poll_interval,
            http: reqwest::Client::new(),
        }
    }

    /// Poll until a request fails.
    pub async fn stream(&self, events: mpsc::Sender<UpstreamEvent>) -> anyhow::Result<()> {
        debug!("Polling secondary quote endpoint: {}", self.url);
        let mut opened = false;

        loop {
            let response = self
                .http
                .get(&self.url)
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await?
                .error_for_status()?;

            let payload: Value = response.json().await?;

            if !opened {
                let _ = events.send(UpstreamEvent::Open).await;
                opened = true;
            }

            if let Some(price) = extract_price(&payload) {
                let _ = events.send(UpstreamEvent::Tick { price }).await;
            } else {
                debug!("Secondary snapshot without usable price: {}", payload);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Pull a single usable price out of a provider payload.
///
/// Accepts a bare number, a numeric string, an object with a price-like
/// field, or the same nested under a provider envelope up to [`MAX_DEPTH`]
/// levels. Returns None unless the result is a finite positive number.
pub fn extract_price(payload: &Value) -> Option<f64> {
    extract_at_depth(payload, 0)
}

fn extract_at_depth(payload: &Value, depth: usize) -> Option<f64> {
    if let Some(price) = as_usable_number(payload) {
        return Some(price);
    }
    if depth >= MAX_DEPTH {
        return None;
    }

    let object = payload.as_object()?;

    for key in PRICE_KEYS {
        if let Some(field) = object.get(*key) {
            if let Some(price) = as_usable_number(field) {
                return Some(price);
            }
        }
    }

    for key in ENVELOPE_KEYS {
        if let Some(inner) = object.get(*key) {
            if let Some(price) = extract_at_depth(inner, depth + 1) {
                return Some(price);
            }
        }
    }

    None
}

fn as_usable_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if number.is_finite() && number > 0.0 {
        Some(number)
    } else {
        None
    }
}
