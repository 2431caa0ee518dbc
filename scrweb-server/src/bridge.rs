//! WebSocket transport bridge.
//!
//! One task per connection owns the [`Session`]. It multiplexes three
//! sources: inbound viewer frames, the session's pipeline events and the
//! server shutdown token. Whichever way the loop ends, the session is
//! torn down through [`Session::on_disconnect`].

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use scrweb_core::input::{map_scroll, map_swipe_up_shortcut, map_tap};
use scrweb_core::{
    ClientMessage, ConnectionId, Frame, PipelineOutcome, ScrwebError, ServerMessage, Session,
    SessionRegistry, TargetId,
};

use crate::AppState;

/// Upgrade handler mounted at the configured WebSocket path.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut events) = state.registry.open();
    let id = session.id();
    info!(session = %id, "viewer connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!(session = %id, "server shutting down");
                break;
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let result = match ClientMessage::parse(text.as_str()) {
                        Ok(msg) => dispatch(&mut session, &state.registry, msg).await,
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(Some(reply)) => {
                            if !send_message(&mut sender, reply, id).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!(session = %id, "dropping viewer message: {e}"),
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(session = %id, "dropping binary frame from viewer");
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by the socket layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %id, "socket error: {e}");
                    break;
                }
            },
            Some(event) = events.recv() => {
                let Some(msg) = session.accept(event) else {
                    continue;
                };
                if !send_message(&mut sender, msg, id).await {
                    break;
                }
            }
        }
    }

    session.on_disconnect().await;
    let _ = sender.close().await;
    info!(session = %id, "viewer disconnected");
}

/// Encode and send one message. Returns `false` once the viewer is gone.
async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
    id: ConnectionId,
) -> bool {
    let frame = match msg.into_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session = %id, "failed to encode message: {e}");
            return true;
        }
    };
    if sender.send(into_message(frame)).await.is_err() {
        debug!(session = %id, "viewer went away mid-send");
        return false;
    }
    true
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Text(text) => Message::Text(text.into()),
    }
}

/// Route one viewer command to the session or the device executor.
///
/// Returns the reply owed to the viewer, if any: stopping a running
/// pipeline answers with its `stream-stopped`. Errors are
/// [`ScrwebError::InvalidCommand`]; the caller logs and drops them. Input
/// commands return as soon as they are queued.
pub async fn dispatch(
    session: &mut Session,
    registry: &SessionRegistry,
    msg: ClientMessage,
) -> Result<Option<ServerMessage>, ScrwebError> {
    match msg {
        ClientMessage::StartStream { target_id, options } => {
            let options = options.unwrap_or_default().into_options();
            match TargetId::parse(&target_id) {
                Some(target) => {
                    session.start_stream(target, options).await;
                }
                None => {
                    debug!(session = %session.id(), "start without target; stopping only");
                    return Ok(session.stop_stream().await.map(stopped_reply));
                }
            }
        }
        ClientMessage::StopStream => {
            return Ok(session.stop_stream().await.map(stopped_reply));
        }
        ClientMessage::ControlKey { target_id, keycode } => {
            let target = require_target(&target_id)?;
            registry.executor().send_key(&target, &keycode.into_keycode()?);
        }
        ClientMessage::TouchTap { target_id, x, y } => {
            let target = require_target(&target_id)?;
            let point = map_tap(x, y, session.resolution()).ok_or_else(|| {
                ScrwebError::InvalidCommand(format!("tap ({x}, {y}) out of range"))
            })?;
            registry.executor().tap(&target, point);
        }
        ClientMessage::ControlScroll { target_id, direction } => {
            let target = require_target(&target_id)?;
            registry
                .executor()
                .swipe(&target, map_scroll(direction, session.resolution()));
        }
        ClientMessage::ControlSwipeUp { target_id } => {
            let target = require_target(&target_id)?;
            registry
                .executor()
                .swipe(&target, map_swipe_up_shortcut(session.resolution()));
        }
    }
    Ok(None)
}

fn stopped_reply(outcome: PipelineOutcome) -> ServerMessage {
    ServerMessage::StreamStopped {
        exit_code: outcome.exit_code,
    }
}

fn require_target(raw: &str) -> Result<TargetId, ScrwebError> {
    TargetId::parse(raw).ok_or_else(|| ScrwebError::InvalidCommand("missing target id".into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use scrweb_core::{DeviceConfig, DeviceShell, PipelineConfig};
    use tokio::sync::mpsc;

    use super::*;

    struct RecordingShell {
        tx: mpsc::UnboundedSender<(String, Vec<String>)>,
    }

    #[async_trait]
    impl DeviceShell for RecordingShell {
        async fn run(&self, target: &TargetId, args: &[String]) -> Result<String, ScrwebError> {
            let _ = self.tx.send((target.to_string(), args.to_vec()));
            Ok(String::new())
        }
    }

    fn registry() -> (SessionRegistry, mpsc::UnboundedReceiver<(String, Vec<String>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = SessionRegistry::new(
            PipelineConfig::default(),
            &DeviceConfig::default(),
            Arc::new(RecordingShell { tx }),
        );
        (registry, rx)
    }

    async fn next_call(
        rx: &mut mpsc::UnboundedReceiver<(String, Vec<String>)>,
    ) -> (String, Vec<String>) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no shell call")
            .expect("shell dropped")
    }

    fn parse(text: &str) -> ClientMessage {
        ClientMessage::parse(text).unwrap()
    }

    #[tokio::test]
    async fn tap_maps_against_fallback_resolution() {
        let (registry, mut calls) = registry();
        let (mut session, _events) = registry.open();

        let reply = dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"touch-tap","data":{"targetId":"R58M","x":0.5,"y":0.25}}"#),
        )
        .await
        .unwrap();
        assert_eq!(reply, None);

        let (serial, args) = next_call(&mut calls).await;
        assert_eq!(serial, "R58M");
        assert_eq!(args, ["input", "tap", "540", "480"]);
    }

    #[tokio::test]
    async fn out_of_range_tap_is_rejected() {
        let (registry, mut calls) = registry();
        let (mut session, _events) = registry.open();

        let err = dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"touch-tap","data":{"targetId":"R58M","x":1.5,"y":0.25}}"#),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScrwebError::InvalidCommand(_)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn scroll_and_swipe_up() {
        let (registry, mut calls) = registry();
        let (mut session, _events) = registry.open();

        dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"control-scroll","data":{"targetId":"R58M","direction":"down"}}"#),
        )
        .await
        .unwrap();
        let (_, args) = next_call(&mut calls).await;
        assert_eq!(args, ["input", "swipe", "540", "1152", "540", "768", "100"]);

        dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"control-swipe-up","data":{"targetId":"R58M"}}"#),
        )
        .await
        .unwrap();
        let (_, args) = next_call(&mut calls).await;
        assert_eq!(args, ["input", "swipe", "540", "1728", "540", "192", "1000"]);
    }

    #[tokio::test]
    async fn named_keycode_is_forwarded() {
        let (registry, mut calls) = registry();
        let (mut session, _events) = registry.open();

        dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"control-key","data":{"serial":"R58M","keycode":"KEYCODE_HOME"}}"#),
        )
        .await
        .unwrap();
        let (_, args) = next_call(&mut calls).await;
        assert_eq!(args, ["input", "keyevent", "KEYCODE_HOME"]);
    }

    #[tokio::test]
    async fn input_without_target_is_rejected() {
        let (registry, _calls) = registry();
        let (mut session, _events) = registry.open();

        let err = dispatch(
            &mut session,
            &registry,
            parse(r#"{"event":"control-swipe-up","data":{"targetId":"  "}}"#),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScrwebError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn start_without_target_only_stops() {
        let (registry, _calls) = registry();
        let (mut session, _events) = registry.open();

        let start = parse(r#"{"event":"start-stream","data":{"targetId":""}}"#);
        let reply = dispatch(&mut session, &registry, start).await.unwrap();
        assert_eq!(reply, None);
        assert!(session.pipeline().is_none());
        assert!(session.target().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_replies_with_outcome_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ffmpeg");
        std::fs::write(&source, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (tx, _calls) = mpsc::unbounded_channel();
        let config = PipelineConfig {
            transcode_program: source,
            virtual_source: dir.path().join("test.h264"),
            channel_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let registry =
            SessionRegistry::new(config, &DeviceConfig::default(), Arc::new(RecordingShell { tx }));
        let (mut session, _events) = registry.open();

        let start = parse(r#"{"event":"start-stream","data":{"targetId":"test-device"}}"#);
        assert_eq!(dispatch(&mut session, &registry, start).await.unwrap(), None);
        assert!(session.pipeline().is_some());

        let reply = dispatch(&mut session, &registry, parse(r#"{"event":"stop-stream"}"#))
            .await
            .unwrap();
        assert_eq!(reply, Some(ServerMessage::StreamStopped { exit_code: None }));

        let again = dispatch(&mut session, &registry, parse(r#"{"event":"stop-stream"}"#))
            .await
            .unwrap();
        assert_eq!(again, None);
    }
}
