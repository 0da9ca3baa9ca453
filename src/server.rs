//! WebSocket surface for feed subscribers, settlement callers, and stats
//! consumers.
//!
//! Every connected client receives the oracle's feed events as JSON. Clients
//! may also send tagged requests (settle a bet, read stats, quote a
//! multiplier); malformed input gets an error reply, never a dropped
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info};

use crate::feed::PriceOracleFeed;
use crate::ledger::RevenueLedger;
use crate::types::{ClientRequest, ServerReply};

/// Default number of events returned for a `recent` request.
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Default number of rows returned for a `top_users` request.
const DEFAULT_TOP_USERS_LIMIT: usize = 10;

/// Run the WebSocket server until the process exits.
pub async fn run_server(addr: &str, feed: Arc<PriceOracleFeed>, ledger: Arc<RevenueLedger>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind server to {}: {}", addr, e);
            return;
        }
    };

    info!("WebSocket server listening on {}", addr);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let feed_rx = feed.subscribe();
        let client_feed = feed.clone();
        let client_ledger = ledger.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_client(stream, peer_addr, feed_rx, client_feed, client_ledger).await
            {
                debug!("Client {} error: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mut feed_rx: broadcast::Receiver<crate::types::FeedEvent>,
    feed: Arc<PriceOracleFeed>,
    ledger: Arc<RevenueLedger>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    debug!("Client {} connected", peer_addr);

    loop {
        tokio::select! {
            // Push feed events to the client
            event = feed_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Client {} lagged, skipped {} events", peer_addr, skipped);
                        continue;
                    }
                }
            }

            // Handle client requests (and close/ping traffic)
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_request(&text, &feed, &ledger);
                        let json = serde_json::to_string(&reply)?;
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Client {} disconnected", peer_addr);
    Ok(())
}

/// Dispatch one client request. Infallible: every failure becomes an error
/// reply.
fn handle_request(text: &str, feed: &PriceOracleFeed, ledger: &RevenueLedger) -> ServerReply {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            return ServerReply::Error {
                message: format!("invalid request: {}", e),
            }
        }
    };

    match request {
        ClientRequest::Settle {
            bet_id,
            user_id,
            bet_amount,
            multiplier,
            won,
            true_probability,
        } => match ledger.record_bet_revenue(
            &bet_id,
            &user_id,
            bet_amount,
            multiplier,
            won,
            true_probability,
        ) {
            Ok(()) => ServerReply::Settled { bet_id },
            Err(e) => ServerReply::Error {
                message: e.to_string(),
            },
        },
        ClientRequest::Stats => ServerReply::Stats(ledger.revenue_stats()),
        ClientRequest::Recent { limit } => ServerReply::Events {
            events: ledger.recent_events(limit.unwrap_or(DEFAULT_RECENT_LIMIT)),
        },
        ClientRequest::TopUsers { limit } => ServerReply::Users {
            users: ledger.revenue_by_user(limit.unwrap_or(DEFAULT_TOP_USERS_LIMIT)),
        },
        ClientRequest::History => ServerReply::History {
            points: feed.price_history(),
        },
        ClientRequest::Quote {
            bet_amount,
            probability,
        } => ServerReply::Quote(ledger.engine().quote(bet_amount, probability)),
        ClientRequest::Project { daily_volume } => {
            ServerReply::Projection(ledger.engine().project_revenue(daily_volume))
        }
        ClientRequest::Status => ServerReply::Status(feed.status()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EconomicsConfig, OracleConfig};
    use crate::edge::HouseEdgeEngine;

    fn fixtures() -> (PriceOracleFeed, RevenueLedger) {
        let econ = EconomicsConfig::default();
        (
            PriceOracleFeed::new(OracleConfig::default()),
            RevenueLedger::new(HouseEdgeEngine::new(&econ), &econ),
        )
    }

    #[test]
    fn settle_request_records_and_acks() {
        let (feed, ledger) = fixtures();

        let reply = handle_request(
            r#"{"type":"settle","bet_id":"b1","user_id":"u1","bet_amount":10.0,"multiplier":3.0,"won":true}"#,
            &feed,
            &ledger,
        );
        assert!(matches!(reply, ServerReply::Settled { bet_id } if bet_id == "b1"));

        match handle_request(r#"{"type":"stats"}"#, &feed, &ledger) {
            ServerReply::Stats(stats) => {
                assert_eq!(stats.all_time.total_bets, 1);
                assert_eq!(stats.all_time.platform_fee_revenue, 1.0);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn invalid_settlement_becomes_error_reply() {
        let (feed, ledger) = fixtures();

        let reply = handle_request(
            r#"{"type":"settle","bet_id":"b1","user_id":"u1","bet_amount":-5.0,"multiplier":2.0,"won":false}"#,
            &feed,
            &ledger,
        );
        assert!(matches!(reply, ServerReply::Error { .. }));
        assert_eq!(ledger.event_count(), 0);
    }

    #[test]
    fn malformed_json_becomes_error_reply() {
        let (feed, ledger) = fixtures();

        assert!(matches!(
            handle_request("not json", &feed, &ledger),
            ServerReply::Error { .. }
        ));
        assert!(matches!(
            handle_request(r#"{"type":"unknown"}"#, &feed, &ledger),
            ServerReply::Error { .. }
        ));
    }

    #[test]
    fn quote_and_status_replies() {
        let (feed, ledger) = fixtures();

        match handle_request(
            r#"{"type":"quote","bet_amount":100.0,"probability":0.5}"#,
            &feed,
            &ledger,
        ) {
            ServerReply::Quote(quote) => assert_eq!(quote.display_multiplier, 1.6),
            other => panic!("unexpected reply: {:?}", other),
        }

        match handle_request(r#"{"type":"status"}"#, &feed, &ledger) {
            ServerReply::Status(status) => {
                assert!(!status.connected);
                assert!(status.current_price.is_none());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
