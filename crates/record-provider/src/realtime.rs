//! Realtime subscriptions over websocket
//!
//! Each subscription owns one socket to `{endpoint}/realtime` and a spawned
//! task that forwards `event` frames to the callback. The task sends a
//! heartbeat ping periodically and stops when the subscription is
//! cancelled or the server closes the socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::backend::{EventCallback, RealtimeEvent, Subscription};
use crate::client::ClientConfig;
use crate::error::ProviderError;
use crate::Result;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const PING_FRAME: &str = r#"{"type":"ping"}"#;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frame envelope sent by the realtime endpoint.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Build the websocket URL for a set of channels.
pub(crate) fn realtime_url(config: &ClientConfig, channels: &[String]) -> Result<Url> {
    let mut url = Url::parse(&config.endpoint)
        .map_err(|e| ProviderError::Config(format!("invalid endpoint: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ProviderError::Config(format!(
                "unsupported endpoint scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ProviderError::Config(format!("cannot switch endpoint to {scheme}")))?;

    url.path_segments_mut()
        .map_err(|_| ProviderError::Config("endpoint cannot be a base URL".to_string()))?
        .pop_if_empty()
        .push("realtime");

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("project", &config.project);
        for channel in channels {
            query.append_pair("channels[]", channel);
        }
    }
    Ok(url)
}

/// Open a socket for `channels` and start forwarding events to `callback`.
pub(crate) async fn subscribe(
    config: &ClientConfig,
    channels: Vec<String>,
    callback: EventCallback,
) -> Result<Subscription> {
    let url = realtime_url(config, &channels)?;
    debug!(url = %url, "Connecting realtime socket");

    let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    info!(channels = ?channels, "Realtime subscription opened");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(run(socket, callback, stop_rx));

    Ok(Subscription::new(channels, move || {
        let _ = stop_tx.send(());
    }))
}

async fn run(socket: Socket, callback: EventCallback, mut stop: oneshot::Receiver<()>) {
    let (mut write, mut read) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    // Dropped handles close the channel without asking to stop.
    let mut stoppable = true;

    loop {
        tokio::select! {
            signal = &mut stop, if stoppable => {
                if signal.is_ok() {
                    let _ = write.send(Message::Close(None)).await;
                    info!("Realtime subscription closed");
                    break;
                }
                stoppable = false;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = write.send(Message::Text(PING_FRAME.to_string().into())).await {
                    warn!(error = %e, "Realtime heartbeat failed");
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(text.as_str(), &callback),
                Some(Ok(Message::Close(_))) | None => {
                    info!("Realtime socket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    break;
                }
            }
        }
    }
}

/// Handle one text frame; only `event` frames reach the callback.
pub(crate) fn dispatch(text: &str, callback: &EventCallback) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed realtime frame");
            return;
        }
    };

    match frame.kind.as_str() {
        "event" => match serde_json::from_value::<RealtimeEvent>(frame.data) {
            Ok(event) => callback(event),
            Err(e) => warn!(error = %e, "Ignoring malformed realtime event"),
        },
        "error" => warn!(data = %frame.data, "Realtime endpoint reported an error"),
        "connected" => debug!(data = %frame.data, "Realtime connected"),
        other => trace!(kind = other, "Ignoring realtime frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn url_switches_scheme_and_lists_channels() {
        let config = ClientConfig::new("https://db.example.com/v1", "proj");
        let url = realtime_url(
            &config,
            &["databases.chat.collections.messages.documents".to_string()],
        )
        .unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/v1/realtime");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("project".to_string(), "proj".to_string()),
                (
                    "channels[]".to_string(),
                    "databases.chat.collections.messages.documents".to_string()
                ),
            ]
        );
    }

    #[test]
    fn plain_http_maps_to_ws() {
        let config = ClientConfig::new("http://localhost/v1/", "p");
        let url = realtime_url(&config, &[]).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/v1/realtime");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let config = ClientConfig::new("ftp://db.example.com/v1", "p");
        assert!(matches!(
            realtime_url(&config, &[]),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn only_event_frames_reach_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: EventCallback = Arc::new(move |event: RealtimeEvent| {
            sink.lock().unwrap().push(event);
        });

        dispatch(r#"{"type":"connected","data":{"channels":[]}}"#, &callback);
        dispatch(r#"{"type":"error","data":{"code":1008,"message":"bad"}}"#, &callback);
        dispatch("not json", &callback);
        dispatch(
            r#"{"type":"event","data":{"events":["databases.chat.collections.messages.documents.d1.create"],"channels":["documents"],"timestamp":"2024-01-01T00:00:00.000+00:00","payload":{"$id":"d1","user":"ada"}}}"#,
            &callback,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload["$id"], "d1");
        assert_eq!(seen[0].channels, vec!["documents".to_string()]);
    }
}
