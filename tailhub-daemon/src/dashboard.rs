//! Dashboard HTTP server.
//!
//! # Routes
//!
//! | route          | response                                                  |
//! |----------------|-----------------------------------------------------------|
//! | `GET /`        | static dashboard page                                     |
//! | `GET /api/sources` | configured source names                               |
//! | `GET /api/events?window=&sources=` | buffered events from the replay store |
//! | `GET /stream`  | Server-Sent Events, one `data:` frame per live event      |
//!
//! A stream client is registered with the hub on connect and unregistered
//! when the response body is dropped.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tailhub_log_pipeline::{DisplayEvent, EventStore, HubHandle};

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

/// Shared handler state.
#[derive(Clone)]
pub struct DashboardState {
    pub store: Arc<EventStore>,
    pub hub: HubHandle,
    pub sources: Arc<Vec<String>>,
}

/// Builds the dashboard router.
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/sources", get(list_sources))
        .route("/api/events", get(replay_events))
        .route("/stream", get(live_stream))
        .with_state(state)
}

/// Binds `addr` and serves until `cancel` fires.
///
/// Open streams end when the hub closes its subscribers on the same token.
pub async fn serve(addr: &str, state: DashboardState, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind dashboard on {}: {}", addr, e))?;
    let local = listener.local_addr()?;
    tracing::info!(listen_addr = %local, "dashboard listening on http://{}", local);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("dashboard server failed: {}", e))?;

    tracing::info!("dashboard stopped");
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn list_sources(State(state): State<DashboardState>) -> Json<Vec<String>> {
    Json(state.sources.as_ref().clone())
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub window: Option<String>,
    pub sources: Option<String>,
}

async fn replay_events(
    State(state): State<DashboardState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let since = query
        .window
        .as_deref()
        .and_then(parse_window)
        .and_then(|window| since_from_window(Utc::now(), window));
    let sources = query
        .sources
        .as_deref()
        .map(split_sources)
        .unwrap_or_default();

    let events = state.store.query(&sources, since);
    let views: Vec<_> = events.iter().map(DisplayEvent::replay_view).collect();
    Json(views).into_response()
}

async fn live_stream(
    State(state): State<DashboardState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.register();
    let guard = Unregister {
        hub: state.hub.clone(),
        id: subscription.id,
    };
    tracing::debug!(subscriber = %subscription.id, "stream client connected");

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });
    let live = stream::unfold((subscription, guard), |(mut subscription, guard)| async move {
        let payload = subscription.recv().await?;
        let event = Event::default().data(String::from_utf8_lossy(&payload));
        Some((Ok::<_, Infallible>(event), (subscription, guard)))
    });

    Sse::new(connected.chain(live)).keep_alive(KeepAlive::default())
}

/// Unregisters a stream subscriber when its response body goes away.
struct Unregister {
    hub: HubHandle,
    id: Uuid,
}

impl Drop for Unregister {
    fn drop(&mut self) {
        tracing::debug!(subscriber = %self.id, "stream client disconnected");
        self.hub.unregister(self.id);
    }
}

/// Parses a window such as `90s`, `15m`, `3h` or `1h30m`.
///
/// Accepts one or more `<integer><unit>` pairs with units `ms`, `s`, `m`
/// and `h`. Anything else is `None`.
pub fn parse_window(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.checked_mul(60)?),
            "h" => Duration::from_secs(amount.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(unit)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

fn since_from_window(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(TimeDelta::from_std(window).ok()?)
}

fn split_sources(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_window_units() {
        assert_eq!(parse_window("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_window("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_window("168h"), Some(Duration::from_secs(168 * 3600)));
        assert_eq!(parse_window("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_window("250ms"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn parse_window_rejects_garbage() {
        for bad in ["", "  ", "15", "m", "1d", "-5m", "1.5h", "5m3"] {
            assert_eq!(parse_window(bad), None, "{bad}");
        }
    }

    #[test]
    fn since_is_now_minus_window() {
        let now = Utc::now();
        let since = since_from_window(now, Duration::from_secs(60)).unwrap();
        assert_eq!(now - since, TimeDelta::seconds(60));
    }

    #[test]
    fn split_sources_trims_and_skips_blanks() {
        assert_eq!(split_sources(" app, ,nginx,"), vec!["app", "nginx"]);
        assert!(split_sources("").is_empty());
    }
}
