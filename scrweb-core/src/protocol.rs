//! Viewer wire protocol.
//!
//! # Wire Protocol
//!
//! Text frames carry one JSON object each:
//! ```text
//! { "event": "<name>", "data": { ... } }
//! ```
//!
//! ## Viewer → server
//! ```text
//! start-stream     { targetId, options?: { bitrateBps?, audioEnabled?, maxDimension? } }
//! stop-stream
//! control-key      { targetId, keycode }          keycode: number | "KEYCODE_*"
//! touch-tap        { targetId, x, y }             x, y normalized to [0, 1]
//! control-scroll   { targetId, direction }        direction: "up" | "down"
//! control-swipe-up { targetId }
//! ```
//! `serial` is accepted for `targetId`; `bitrate`, `audio` and `maxSize`
//! for the option fields.
//!
//! ## Server → viewer
//! ```text
//! video-data       binary frame, raw Annex-B chunk
//! stream-stopped   { exitCode: number | null }
//! stream-error     { message }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::device::Keycode;
use crate::error::ScrwebError;
use crate::input::ScrollDirection;
use crate::target::StreamOptions;

// ── Viewer → server ──────────────────────────────────────────────

/// An inbound viewer command.
///
/// Target ids are kept raw; an empty id is meaningful for `start-stream`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartStream {
        #[serde(rename = "targetId", alias = "serial", default)]
        target_id: String,
        #[serde(default)]
        options: Option<WireStreamOptions>,
    },
    StopStream,
    ControlKey {
        #[serde(rename = "targetId", alias = "serial")]
        target_id: String,
        keycode: WireKeycode,
    },
    TouchTap {
        #[serde(rename = "targetId", alias = "serial")]
        target_id: String,
        x: f64,
        y: f64,
    },
    ControlScroll {
        #[serde(rename = "targetId", alias = "serial")]
        target_id: String,
        direction: ScrollDirection,
    },
    ControlSwipeUp {
        #[serde(rename = "targetId", alias = "serial")]
        target_id: String,
    },
}

impl ClientMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ScrwebError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Stream options as sent by the viewer; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WireStreamOptions {
    #[serde(rename = "bitrateBps", alias = "bitrate", default)]
    pub bitrate_bps: Option<u32>,
    #[serde(rename = "audioEnabled", alias = "audio", default)]
    pub audio_enabled: Option<bool>,
    #[serde(rename = "maxDimension", alias = "maxSize", default)]
    pub max_dimension: Option<u32>,
}

impl WireStreamOptions {
    /// Overlay the supplied fields on the defaults.
    pub fn into_options(self) -> StreamOptions {
        let mut options = StreamOptions::default();
        if let Some(bps) = self.bitrate_bps {
            options = options.with_bitrate(bps);
        }
        if let Some(audio) = self.audio_enabled {
            options = options.with_audio(audio);
        }
        if let Some(max) = self.max_dimension {
            options = options.with_max_dimension(max);
        }
        options
    }
}

/// A keycode as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireKeycode {
    Number(u32),
    Name(String),
}

impl WireKeycode {
    pub fn into_keycode(self) -> Result<Keycode, ScrwebError> {
        match self {
            Self::Number(code) => Ok(Keycode::Code(code)),
            Self::Name(name) => Keycode::named(&name)
                .ok_or_else(|| ScrwebError::InvalidCommand(format!("bad keycode {name:?}"))),
        }
    }
}

// ── Server → viewer ──────────────────────────────────────────────

/// An outbound message for the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    VideoData(Bytes),
    StreamStopped { exit_code: Option<i32> },
    StreamError { message: String },
}

/// A transport frame ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum TextEvent<'a> {
    StreamStopped {
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
    },
    StreamError { message: &'a str },
}

impl ServerMessage {
    pub fn into_frame(self) -> Result<Frame, ScrwebError> {
        let event = match &self {
            Self::VideoData(bytes) => return Ok(Frame::Binary(bytes.clone())),
            Self::StreamStopped { exit_code } => TextEvent::StreamStopped {
                exit_code: *exit_code,
            },
            Self::StreamError { message } => TextEvent::StreamError { message },
        };
        Ok(Frame::Text(serde_json::to_string(&event)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_stream_with_options() {
        let msg = ClientMessage::parse(
            r#"{"event":"start-stream","data":{"targetId":"emulator-5554",
                "options":{"bitrateBps":4000000,"audioEnabled":true,"maxDimension":1024}}}"#,
        )
        .unwrap();
        let ClientMessage::StartStream { target_id, options } = msg else {
            panic!("wrong variant: {msg:?}");
        };
        assert_eq!(target_id, "emulator-5554");
        let options = options.unwrap().into_options();
        assert_eq!(options.bitrate_bps, 4_000_000);
        assert!(options.audio_enabled);
        assert_eq!(options.max_dimension, Some(1024));
    }

    #[test]
    fn parse_start_stream_legacy_aliases() {
        let msg = ClientMessage::parse(concat!(
            r#"{"event":"start-stream","data":"#,
            r#"{"serial":"R58M","options":{"bitrate":1000000,"maxSize":0}}}"#,
        ))
        .unwrap();
        let ClientMessage::StartStream { target_id, options } = msg else {
            panic!("wrong variant: {msg:?}");
        };
        assert_eq!(target_id, "R58M");
        let options = options.unwrap().into_options();
        assert_eq!(options.bitrate_bps, 1_000_000);
        assert!(!options.audio_enabled);
        assert_eq!(options.max_dimension, None);
    }

    #[test]
    fn zero_bitrate_on_the_wire_uses_default() {
        let msg = ClientMessage::parse(
            r#"{"event":"start-stream","data":{"targetId":"R58M","options":{"bitrateBps":0}}}"#,
        )
        .unwrap();
        let ClientMessage::StartStream { options, .. } = msg else {
            panic!("wrong variant: {msg:?}");
        };
        assert_eq!(options.unwrap().into_options().bitrate_bps, 2_000_000);
    }

    #[test]
    fn parse_start_stream_without_target() {
        let msg = ClientMessage::parse(r#"{"event":"start-stream","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMessage::StartStream {
            target_id: String::new(),
            options: None,
        });
    }

    #[test]
    fn parse_stop_stream_without_data() {
        let msg = ClientMessage::parse(r#"{"event":"stop-stream"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StopStream);
    }

    #[test]
    fn parse_control_key_number_and_name() {
        let msg =
            ClientMessage::parse(r#"{"event":"control-key","data":{"targetId":"a","keycode":3}}"#)
                .unwrap();
        let ClientMessage::ControlKey { keycode, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(keycode.into_keycode().unwrap(), Keycode::Code(3));

        let msg = ClientMessage::parse(
            r#"{"event":"control-key","data":{"serial":"a","keycode":"KEYCODE_HOME"}}"#,
        )
        .unwrap();
        let ClientMessage::ControlKey { keycode, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(
            keycode.into_keycode().unwrap(),
            Keycode::Named("KEYCODE_HOME".into())
        );
    }

    #[test]
    fn injected_keycode_rejected() {
        let keycode = WireKeycode::Name("3; reboot".into());
        assert!(matches!(
            keycode.into_keycode(),
            Err(ScrwebError::InvalidCommand(_))
        ));
    }

    #[test]
    fn parse_tap_scroll_swipe() {
        let tap = ClientMessage::parse(
            r#"{"event":"touch-tap","data":{"targetId":"a","x":0.5,"y":0.25}}"#,
        )
        .unwrap();
        assert_eq!(tap, ClientMessage::TouchTap {
            target_id: "a".into(),
            x: 0.5,
            y: 0.25,
        });

        let scroll = ClientMessage::parse(
            r#"{"event":"control-scroll","data":{"targetId":"a","direction":"down"}}"#,
        )
        .unwrap();
        assert_eq!(scroll, ClientMessage::ControlScroll {
            target_id: "a".into(),
            direction: ScrollDirection::Down,
        });

        let swipe =
            ClientMessage::parse(r#"{"event":"control-swipe-up","data":{"targetId":"a"}}"#)
                .unwrap();
        assert_eq!(swipe, ClientMessage::ControlSwipeUp {
            target_id: "a".into()
        });
    }

    #[test]
    fn unknown_and_malformed_are_invalid_commands() {
        for text in [
            r#"{"event":"reboot","data":{}}"#,
            r#"{"event":"touch-tap","data":{"targetId":"a"}}"#,
            r#"{"event":"control-scroll","data":{"targetId":"a","direction":"left"}}"#,
            "not json",
            "",
        ] {
            assert!(
                matches!(ClientMessage::parse(text), Err(ScrwebError::InvalidCommand(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn video_data_is_binary() {
        let frame = ServerMessage::VideoData(Bytes::from_static(b"\0\0\0\x01"))
            .into_frame()
            .unwrap();
        assert_eq!(frame, Frame::Binary(Bytes::from_static(b"\0\0\0\x01")));
    }

    #[test]
    fn stream_stopped_json() {
        let Frame::Text(text) = ServerMessage::StreamStopped { exit_code: Some(0) }
            .into_frame()
            .unwrap()
        else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "stream-stopped", "data": {"exitCode": 0}})
        );

        let Frame::Text(text) = ServerMessage::StreamStopped { exit_code: None }
            .into_frame()
            .unwrap()
        else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["exitCode"], serde_json::Value::Null);
    }

    #[test]
    fn stream_error_json() {
        let Frame::Text(text) = ServerMessage::StreamError {
            message: "failed to spawn scrcpy".into(),
        }
        .into_frame()
        .unwrap() else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "stream-error");
        assert_eq!(value["data"]["message"], "failed to spawn scrcpy");
    }
}
