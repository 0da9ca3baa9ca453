//! Price oracle feed.
//!
//! Owns one active upstream at a time and keeps an authoritative current
//! price plus a short look-back history. Live sources are tried in priority
//! order; after too many consecutive transport failures the feed falls back
//! permanently to the synthetic generator, so `current_price()` always
//! eventually yields a value once `start()` has been called.
//!
//! All tick handling runs on the single driver task and every state mutation
//! goes through one lock, so ticks never interleave for a feed instance.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::history::PriceHistoryBuffer;
use crate::synthetic::SyntheticGenerator;
use crate::types::{FeedEvent, FeedState, OracleSource, OracleStatus, PricePoint};
use crate::upstream::{PrimaryClient, SecondaryClient, UpstreamEvent};

/// Capacity of the subscriber broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// What the driver should do after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPlan {
    /// Retry the same source after the configured delay
    RetryAfterDelay,

    /// Give up on live sources; `announce` is true only for the first
    /// fallback so the notice is emitted once
    FallBack { announce: bool },
}

/// Mutable feed state. Synchronous so the state machine is testable without
/// a runtime; the async driver is a thin shell around it.
struct FeedCore {
    state: FeedState,
    source: OracleSource,
    current_price: Option<f64>,
    last_update_ms: Option<i64>,
    history: PriceHistoryBuffer,
    reconnect_attempts: u32,
    fallback_announced: bool,
}

impl FeedCore {
    fn new(retention_ms: i64) -> Self {
        Self {
            state: FeedState::Idle,
            source: OracleSource::Synthetic,
            current_price: None,
            last_update_ms: None,
            history: PriceHistoryBuffer::new(retention_ms),
            reconnect_attempts: 0,
            fallback_announced: false,
        }
    }

    fn begin_connecting(&mut self, source: OracleSource) {
        self.state = FeedState::Connecting;
        self.source = source;
    }

    /// Transition to Connected. Returns true if this was an actual
    /// transition (the caller emits the connectivity event exactly then).
    fn mark_connected(&mut self) -> bool {
        self.reconnect_attempts = 0;
        if self.state == FeedState::Connected {
            return false;
        }
        self.state = FeedState::Connected;
        true
    }

    /// Record a tick. Unusable prices are dropped without touching state.
    fn record_tick(&mut self, price: f64, now_ms: i64) -> Option<FeedEvent> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }

        self.current_price = Some(price);
        self.last_update_ms = Some(now_ms);
        self.history.record(price, now_ms);

        Some(FeedEvent::Price {
            price,
            timestamp: now_ms,
        })
    }

    /// Register a transport failure and decide the retry plan. After
    /// `max_attempts` consecutive failures the feed switches to the
    /// synthetic source for good.
    fn mark_disconnected(&mut self, max_attempts: u32) -> RetryPlan {
        self.state = FeedState::Reconnecting;
        self.reconnect_attempts += 1;

        if self.reconnect_attempts >= max_attempts {
            self.source = OracleSource::Synthetic;
            let announce = !self.fallback_announced;
            self.fallback_announced = true;
            RetryPlan::FallBack { announce }
        } else {
            RetryPlan::RetryAfterDelay
        }
    }

    fn status(&self) -> OracleStatus {
        OracleStatus {
            connected: self.state == FeedState::Connected,
            current_price: self.current_price,
            last_update_ms: self.last_update_ms,
            active_source: self.source,
            state: self.state,
        }
    }
}

/// Pick the highest-priority source the configuration supports. Live
/// sources need their credential; synthetic is always available.
fn select_source(config: &OracleConfig) -> OracleSource {
    if config.primary_api_key.is_some() {
        OracleSource::Primary
    } else if config.secondary_api_key.is_some() {
        OracleSource::Secondary
    } else {
        OracleSource::Synthetic
    }
}

/// The price oracle feed service.
///
/// Construct one per process at the composition root and share it via
/// `Arc`; `start()` spawns the driver task, `stop()` tears it down.
pub struct PriceOracleFeed {
    config: OracleConfig,
    core: Arc<RwLock<FeedCore>>,
    events: broadcast::Sender<FeedEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PriceOracleFeed {
    pub fn new(config: OracleConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let core = Arc::new(RwLock::new(FeedCore::new(config.retention_ms)));
        Self {
            config,
            core,
            events,
            driver: Mutex::new(None),
        }
    }

    /// Start the feed driver. Idempotent: a second call while the driver is
    /// running does nothing.
    pub fn start(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let config = self.config.clone();
        let core = self.core.clone();
        let events = self.events.clone();
        *driver = Some(tokio::spawn(async move {
            drive(config, core, events).await;
        }));
    }

    /// Stop the feed: aborts the driver (cancelling any pending reconnect
    /// timer and closing the active transport) and returns to Idle.
    /// Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.driver.lock().take() {
            task.abort();
            info!("Oracle feed stopped");
        }
        self.core.write().state = FeedState::Idle;
    }

    /// Subscribe to feed events (prices, connectivity, fallback notice).
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub fn current_price(&self) -> Option<f64> {
        self.core.read().current_price
    }

    /// Retained price history, oldest first.
    pub fn price_history(&self) -> Vec<PricePoint> {
        self.core.read().history.snapshot()
    }

    /// Closest recorded point at or before `timestamp_ms`.
    pub fn price_at(&self, timestamp_ms: i64) -> Option<PricePoint> {
        self.core.read().history.price_at(timestamp_ms)
    }

    /// Population standard deviation over the recent history.
    pub fn volatility(&self) -> f64 {
        self.core.read().history.volatility()
    }

    /// High and low over the retained history.
    pub fn high_low(&self) -> Option<(f64, f64)> {
        self.core.read().history.high_low()
    }

    pub fn is_connected(&self) -> bool {
        self.core.read().state == FeedState::Connected
    }

    pub fn active_source(&self) -> OracleSource {
        self.core.read().source
    }

    pub fn status(&self) -> OracleStatus {
        self.core.read().status()
    }
}

impl Drop for PriceOracleFeed {
    fn drop(&mut self) {
        if let Some(task) = self.driver.lock().take() {
            task.abort();
        }
    }
}

/// Driver loop: run the selected source until its transport dies, then
/// apply the retry plan. Source selection is static per invocation; only
/// the fallback switches it, and only to synthetic.
async fn drive(
    config: OracleConfig,
    core: Arc<RwLock<FeedCore>>,
    events: broadcast::Sender<FeedEvent>,
) {
    let mut source = select_source(&config);
    info!("Oracle feed starting with {} source", source);

    loop {
        core.write().begin_connecting(source);

        match source {
            OracleSource::Primary => {
                let key = config.primary_api_key.clone().unwrap_or_default();
                let client = PrimaryClient::new(&config.primary_url, &key);
                run_upstream(client_task_primary(client), &core, &events, source).await;
            }
            OracleSource::Secondary => {
                let key = config.secondary_api_key.clone().unwrap_or_default();
                let client =
                    SecondaryClient::new(&config.secondary_url, &key, config.poll_interval);
                run_upstream(client_task_secondary(client), &core, &events, source).await;
            }
            OracleSource::Synthetic => {
                run_synthetic(&config, &core, &events).await;
            }
        }

        let plan = core.write().mark_disconnected(config.max_reconnect_attempts);
        let _ = events.send(FeedEvent::Connectivity {
            connected: false,
            source,
        });

        match plan {
            RetryPlan::RetryAfterDelay => {
                warn!(
                    "{} source lost, reconnecting in {:?}",
                    source, config.reconnect_delay
                );
                tokio::time::sleep(config.reconnect_delay).await;
            }
            RetryPlan::FallBack { announce } => {
                source = OracleSource::Synthetic;
                if announce {
                    warn!("All live sources exhausted, falling back to synthetic prices");
                    let _ = events.send(FeedEvent::Fallback { source });
                }
            }
        }
    }
}

fn client_task_primary(
    client: PrimaryClient,
) -> impl FnOnce(mpsc::Sender<UpstreamEvent>) -> JoinHandle<()> {
    move |tx| {
        tokio::spawn(async move {
            if let Err(e) = client.stream(tx).await {
                debug!("Primary client exited: {}", e);
            }
        })
    }
}

fn client_task_secondary(
    client: SecondaryClient,
) -> impl FnOnce(mpsc::Sender<UpstreamEvent>) -> JoinHandle<()> {
    move |tx| {
        tokio::spawn(async move {
            if let Err(e) = client.stream(tx).await {
                debug!("Secondary client exited: {}", e);
            }
        })
    }
}

/// Consume one upstream connection's events until the client drops its
/// sender (transport death).
async fn run_upstream(
    spawn_client: impl FnOnce(mpsc::Sender<UpstreamEvent>) -> JoinHandle<()>,
    core: &Arc<RwLock<FeedCore>>,
    events: &broadcast::Sender<FeedEvent>,
    source: OracleSource,
) {
    let (tx, mut rx) = mpsc::channel(64);
    let task = spawn_client(tx);

    while let Some(event) = rx.recv().await {
        match event {
            UpstreamEvent::Open => {
                if core.write().mark_connected() {
                    info!("Connected to {} source", source);
                    let _ = events.send(FeedEvent::Connectivity {
                        connected: true,
                        source,
                    });
                }
            }
            UpstreamEvent::Tick { price } => {
                let now_ms = Utc::now().timestamp_millis();
                if let Some(event) = core.write().record_tick(price, now_ms) {
                    let _ = events.send(event);
                }
            }
        }
    }

    // Client task has finished; make sure it is reaped.
    let _ = task.await;
}

/// Generate synthetic ticks forever. This source cannot fail; the loop only
/// ends when the driver task is aborted by `stop()`.
async fn run_synthetic(
    config: &OracleConfig,
    core: &Arc<RwLock<FeedCore>>,
    events: &broadcast::Sender<FeedEvent>,
) {
    let mut generator = SyntheticGenerator::new(config.synthetic.clone());

    if core.write().mark_connected() {
        info!("Synthetic price generator running");
        let _ = events.send(FeedEvent::Connectivity {
            connected: true,
            source: OracleSource::Synthetic,
        });
    }

    let mut interval = tokio::time::interval(config.synthetic.tick_interval);
    loop {
        interval.tick().await;

        let price = generator.next_price();
        let now_ms = Utc::now().timestamp_millis();
        if let Some(event) = core.write().record_tick(price, now_ms) {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn offline_config() -> OracleConfig {
        let mut config = OracleConfig::default();
        config.primary_api_key = None;
        config.secondary_api_key = None;
        config.synthetic.tick_interval = Duration::from_millis(10);
        config
    }

    #[test]
    fn source_selection_priority() {
        let mut config = OracleConfig::default();
        config.primary_api_key = Some("pk".to_string());
        config.secondary_api_key = Some("sk".to_string());
        assert_eq!(select_source(&config), OracleSource::Primary);

        config.primary_api_key = None;
        assert_eq!(select_source(&config), OracleSource::Secondary);

        config.secondary_api_key = None;
        assert_eq!(select_source(&config), OracleSource::Synthetic);
    }

    #[test]
    fn record_tick_drops_unusable_prices() {
        let mut core = FeedCore::new(600_000);

        assert!(core.record_tick(f64::NAN, 1_000).is_none());
        assert!(core.record_tick(f64::INFINITY, 1_000).is_none());
        assert!(core.record_tick(0.0, 1_000).is_none());
        assert!(core.record_tick(-10.0, 1_000).is_none());

        assert!(core.current_price.is_none());
        assert!(core.history.is_empty());
    }

    #[test]
    fn record_tick_updates_state_and_history() {
        let mut core = FeedCore::new(600_000);

        let event = core.record_tick(150.5, 1_000).unwrap();
        match event {
            FeedEvent::Price { price, timestamp } => {
                assert_eq!(price, 150.5);
                assert_eq!(timestamp, 1_000);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(core.current_price, Some(150.5));
        assert_eq!(core.last_update_ms, Some(1_000));
        assert_eq!(core.history.len(), 1);
    }

    #[test]
    fn reconnect_ceiling_falls_back_to_synthetic() {
        let max_attempts = 5;
        let mut core = FeedCore::new(600_000);
        core.begin_connecting(OracleSource::Primary);

        for _ in 0..max_attempts - 1 {
            assert_eq!(
                core.mark_disconnected(max_attempts),
                RetryPlan::RetryAfterDelay
            );
            assert_eq!(core.source, OracleSource::Primary);
        }

        // The maxAttempts-th consecutive failure switches to synthetic.
        assert_eq!(
            core.mark_disconnected(max_attempts),
            RetryPlan::FallBack { announce: true }
        );
        assert_eq!(core.source, OracleSource::Synthetic);

        // The notice is one-time.
        assert_eq!(
            core.mark_disconnected(max_attempts),
            RetryPlan::FallBack { announce: false }
        );
    }

    #[test]
    fn successful_connection_resets_attempt_counter() {
        let mut core = FeedCore::new(600_000);
        core.begin_connecting(OracleSource::Primary);

        assert_eq!(core.mark_disconnected(5), RetryPlan::RetryAfterDelay);
        assert_eq!(core.mark_disconnected(5), RetryPlan::RetryAfterDelay);

        assert!(core.mark_connected());
        assert_eq!(core.reconnect_attempts, 0);

        // A later failure starts counting from scratch.
        assert_eq!(core.mark_disconnected(5), RetryPlan::RetryAfterDelay);
    }

    #[test]
    fn mark_connected_reports_transition_once() {
        let mut core = FeedCore::new(600_000);
        core.begin_connecting(OracleSource::Synthetic);

        assert!(core.mark_connected());
        assert!(!core.mark_connected());
    }

    #[tokio::test]
    async fn synthetic_feed_end_to_end() {
        let feed = PriceOracleFeed::new(offline_config());
        let mut rx = feed.subscribe();

        feed.start();

        let first = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        match first {
            FeedEvent::Connectivity { connected, source } => {
                assert!(connected);
                assert_eq!(source, OracleSource::Synthetic);
            }
            other => panic!("expected connectivity first, got {:?}", other),
        }

        let second = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no price before timeout")
            .unwrap();
        assert!(matches!(second, FeedEvent::Price { .. }));

        assert!(feed.is_connected());
        assert!(feed.current_price().is_some());
        assert_eq!(feed.active_source(), OracleSource::Synthetic);
        assert!(!feed.price_history().is_empty());

        feed.stop();
        assert!(!feed.is_connected());
        assert_eq!(feed.status().state, FeedState::Idle);

        // stop() is idempotent.
        feed.stop();
    }

    #[tokio::test]
    async fn dead_primary_falls_back_to_synthetic() {
        let mut config = offline_config();
        config.primary_api_key = Some("pk".to_string());
        // Nothing listens here; every connection attempt is refused.
        config.primary_url = "http://127.0.0.1:9".to_string();
        config.reconnect_delay = Duration::from_millis(20);
        config.max_reconnect_attempts = 2;

        let feed = PriceOracleFeed::new(config);
        let mut rx = feed.subscribe();
        feed.start();

        // The feed must announce the permanent fallback, and must never
        // claim the dead primary connected.
        let mut saw_fallback = false;
        for _ in 0..64 {
            match timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(FeedEvent::Fallback { source })) => {
                    assert_eq!(source, OracleSource::Synthetic);
                    saw_fallback = true;
                    break;
                }
                Ok(Ok(FeedEvent::Connectivity {
                    connected: true,
                    source,
                })) => {
                    assert_ne!(
                        source,
                        OracleSource::Primary,
                        "dead primary must not report connected"
                    );
                }
                Ok(Ok(_)) => continue,
                other => panic!("feed went quiet before falling back: {:?}", other),
            }
        }
        assert!(saw_fallback, "no fallback notice after exhausting retries");
        assert_eq!(feed.active_source(), OracleSource::Synthetic);

        // The synthetic source then serves prices.
        loop {
            match timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(FeedEvent::Price { .. })) => break,
                Ok(Ok(_)) => continue,
                other => panic!("no synthetic price after fallback: {:?}", other),
            }
        }
        assert!(feed.is_connected());
        assert!(feed.current_price().is_some());

        feed.stop();
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let feed = PriceOracleFeed::new(offline_config());
        feed.start();
        feed.start();

        let mut rx = feed.subscribe();
        let _ = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event before timeout")
            .unwrap();

        feed.stop();
    }
}
