use crate::bridge::{Bridge, MethodCall};
use crate::constants::MAX_MESSAGE_SIZE;
use crate::notification::TimerEvent;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A bridge call as it arrives on the wire.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Echoed back on the reply so the UI can match responses.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub call: MethodCall,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "result")]
    Result { id: Option<u64>, value: Value },
    #[serde(rename = "not_implemented")]
    NotImplemented { id: Option<u64>, method: String },
    #[serde(rename = "timer_event")]
    TimerEvent { event: TimerEvent },
}

/// Read one length-prefixed JSON message.
///
/// Native messaging framing: a 4-byte little-endian length followed by
/// that many bytes of UTF-8 JSON.
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;

    serde_json::from_slice(&buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_message<W: Write>(writer: &mut W, message: &OutgoingMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Reply too large: {} bytes", json.len()),
        ));
    }
    let len = u32::try_from(json.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()
}

/// Serves bridge calls over a framed byte stream until the peer hangs up.
pub struct NativeHost<W: Write> {
    bridge: Arc<Bridge>,
    writer: Arc<Mutex<W>>,
}

impl<W: Write> NativeHost<W> {
    pub fn new(bridge: Arc<Bridge>, writer: Arc<Mutex<W>>) -> Self {
        Self { bridge, writer }
    }

    /// Process messages until `reader` hits EOF. Malformed messages are
    /// logged and skipped; oversized ones end the session since the stream
    /// cannot be resynchronised.
    pub fn run<R: Read>(&self, reader: &mut R) -> io::Result<()> {
        loop {
            let message: IncomingMessage = match read_message(reader) {
                Ok(message) => message,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) if e.get_ref().is_some_and(|inner| inner.is::<serde_json::Error>()) => {
                    warn!("Skipping malformed message: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let reply = self.handle_message(message);
            self.send(&reply)?;
        }
    }

    pub fn handle_message(&self, message: IncomingMessage) -> OutgoingMessage {
        let IncomingMessage { id, call } = message;
        match self.bridge.handle(&call) {
            Ok(value) => OutgoingMessage::Result { id, value },
            Err(e) => {
                debug!("{e}");
                OutgoingMessage::NotImplemented {
                    id,
                    method: call.method,
                }
            }
        }
    }

    pub fn send(&self, message: &OutgoingMessage) -> io::Result<()> {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("NativeHost: writer mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        write_message(&mut *writer, message)
    }

    /// Push notification actions to the UI as they happen. Ends when the
    /// sender side is dropped or the stream is gone.
    pub async fn forward_timer_events(&self, mut events: mpsc::UnboundedReceiver<TimerEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.send(&OutgoingMessage::TimerEvent { event }) {
                warn!("Failed to forward timer event: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FocusConfig;
    use crate::test_utils::test_host;
    use serde_json::json;
    use std::io::Cursor;
    use tokio::runtime::Handle;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut bytes = u32::try_from(body.len()).unwrap().to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    fn replies(mut bytes: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            out.push(read_message(&mut bytes).unwrap());
        }
        out
    }

    fn host() -> NativeHost<Vec<u8>> {
        let (host, _fakes) = test_host();
        let bridge = Bridge::new(FocusConfig::default(), host, Handle::current());
        NativeHost::new(Arc::new(bridge), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_read_message_little_endian() {
        let mut input = Cursor::new(frame(br#"{"method":"getFocusState"}"#));
        let value: Value = read_message(&mut input).unwrap();
        assert_eq!(value, json!({ "method": "getFocusState" }));
    }

    #[test]
    fn test_read_rejects_oversized_length() {
        let len = u32::try_from(MAX_MESSAGE_SIZE + 1).unwrap();
        let mut input = Cursor::new(len.to_le_bytes().to_vec());
        let err = read_message::<_, Value>(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_message_frames_json() {
        let mut out = Vec::new();
        let message = OutgoingMessage::Result {
            id: Some(7),
            value: json!(true),
        };
        write_message(&mut out, &message).unwrap();

        let expected = br#"{"type":"result","id":7,"value":true}"#;
        let (len, body) = out.split_at(4);
        assert_eq!(len, u32::try_from(expected.len()).unwrap().to_le_bytes());
        assert_eq!(body, expected);
    }

    #[test]
    fn test_timer_event_message_shape() {
        let message = OutgoingMessage::TimerEvent {
            event: TimerEvent::PauseToggled { running: false },
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "timer_event",
                "event": { "event": "pause_toggled", "running": false },
            })
        );
    }

    #[tokio::test]
    async fn test_run_answers_each_call_until_eof() {
        let host = host();
        let mut input = frame(br#"{"id":1,"method":"checkAuthorizationStatus"}"#);
        input.extend(frame(br#"{"id":2,"method":"openScreenTimeReport","arguments":{}}"#));
        input.extend(frame(br#"{"id":3,"method":"presentPicker","arguments":{}}"#));
        input.extend(frame(b"not json"));
        input.extend(frame(br#"{"method":"getFocusState"}"#));

        host.run(&mut Cursor::new(input)).unwrap();

        let written = host.writer.lock().unwrap().clone();
        let replies = replies(&written);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], json!({ "type": "result", "id": 1, "value": true }));
        assert_eq!(
            replies[1],
            json!({ "type": "not_implemented", "id": 2, "method": "openScreenTimeReport" })
        );
        assert_eq!(replies[2], json!({ "type": "result", "id": 3, "value": null }));
        assert_eq!(replies[3]["value"]["active"], json!(false));
    }

    #[tokio::test]
    async fn test_forwards_timer_events() {
        let host = host();
        let events = host.bridge.subscribe_timer_events();
        host.run(&mut Cursor::new(frame(br#"{"method":"startTimerService"}"#)))
            .unwrap();
        host.run(&mut Cursor::new(frame(br#"{"method":"stopTimerService"}"#)))
            .unwrap();
        drop(host.bridge.subscribe_timer_events());

        host.forward_timer_events(events).await;

        let written = host.writer.lock().unwrap().clone();
        let replies = replies(&written);
        assert_eq!(
            replies.last().unwrap(),
            &json!({ "type": "timer_event", "event": { "event": "stopped" } })
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_eof() {
        let host = host();
        let mut input = frame(br#"{"method":"getFocusState"}"#);
        input.truncate(10);
        assert!(host.run(&mut Cursor::new(input)).is_ok());
    }
}
