//! Import channel — lets companion tools (browser userscripts, generator
//! front-ends) push images into a running GridCut.
//!
//! Protocol: newline-delimited JSON over a loopback TCP socket.
//! - `{"type":"IMPORT_IMAGE","origin":"https://…","imageData":"data:image/…"}`
//!   imports an image.
//! - `{"type":"PING","origin":"https://…"}` is answered with one
//!   `{"type":"RECEIVER_READY"}` on the same connection.
//!
//! Messages are trusted only when their `origin` is on the allow-list;
//! anything else is dropped with no reply and no state change. The one
//! exception is the startup handshake: when `GRIDCUT_OPENER` names an
//! endpoint, a single unauthenticated `RECEIVER_READY` is sent to it — it
//! carries nothing but a readiness signal.

use crate::raster;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;

/// Port the listener binds on 127.0.0.1. Companion scripts hardcode it too.
pub const DEFAULT_PORT: u16 = 46_821;

/// Origins whose messages are trusted. Mirrors the generator sites the
/// companion userscript runs on.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://gemini.google.com",
    "https://chatgpt.com",
    "https://claude.ai",
    "https://www.midjourney.com",
    "https://www.doubao.com",
    "https://www.runninghub.cn",
    "https://jimeng.jianying.com",
];

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(rename = "imageData", default)]
    pub image_data: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl OutboundMessage {
    pub fn receiver_ready() -> Self {
        Self { kind: "RECEIVER_READY" }
    }
}

/// What a single inbound message amounts to, decided before any decoding of
/// payload bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Untrusted origin, unknown type, or malformed payload: ignore entirely.
    Drop,
    /// Trusted IMPORT_IMAGE: the data-URI to decode.
    Import(String),
    /// Trusted PING: reply to the sender.
    Reply(OutboundMessage),
}

/// Pure trust-and-dispatch decision for one message. Origin is checked
/// first; payload shape second. Kept free of I/O so the allow-list rules
/// are testable without sockets.
pub fn handle_message(msg: &InboundMessage, allowed: &[String]) -> MessageOutcome {
    let trusted = msg
        .origin
        .as_deref()
        .map(|o| allowed.iter().any(|a| a == o))
        .unwrap_or(false);
    if !trusted {
        return MessageOutcome::Drop;
    }

    match msg.kind.as_str() {
        "IMPORT_IMAGE" => match &msg.image_data {
            Some(data) if data.starts_with("data:image/") => {
                MessageOutcome::Import(data.clone())
            }
            _ => MessageOutcome::Drop,
        },
        "PING" => MessageOutcome::Reply(OutboundMessage::receiver_ready()),
        _ => MessageOutcome::Drop,
    }
}

/// Event delivered to the UI thread from the listener.
pub enum ChannelEvent {
    /// A trusted image arrived, already decoded.
    ImportImage(RgbaImage),
}

/// Start the channel listener on a background thread. Received images are
/// delivered through the returned channel; the thread exits when the
/// receiver is dropped or the listener socket dies.
pub fn start_listener(
    port: u16,
    allowed: Vec<String>,
) -> std::io::Result<mpsc::Receiver<ChannelEvent>> {
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            if !serve_connection(stream, &allowed, &tx) {
                // Receiver dropped — app is shutting down.
                return;
            }
        }
    });

    Ok(rx)
}

/// Handle one client connection. Returns false once the UI side is gone.
fn serve_connection(
    stream: TcpStream,
    allowed: &[String],
    tx: &mpsc::Sender<ChannelEvent>,
) -> bool {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return true,
    });
    let mut writer = stream;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return true,
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(msg) = serde_json::from_str::<InboundMessage>(trimmed) else {
            continue;
        };

        match handle_message(&msg, allowed) {
            MessageOutcome::Drop => {}
            MessageOutcome::Reply(reply) => {
                if let Ok(json) = serde_json::to_string(&reply) {
                    let _ = writeln!(writer, "{}", json);
                }
            }
            MessageOutcome::Import(data_uri) => match raster::load_data_uri(&data_uri) {
                Ok(img) => {
                    crate::log_info!(
                        "Import channel: {}x{} image from {}",
                        img.width(),
                        img.height(),
                        msg.origin.as_deref().unwrap_or("?")
                    );
                    if tx.send(ChannelEvent::ImportImage(img)).is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    crate::log_warn!("Import channel: payload rejected: {}", e);
                }
            },
        }
    }
}

/// Startup handshake: tell the endpoint that opened us we are ready to
/// receive. Carries only the readiness signal, no allow-list check; inbound
/// payloads still go through `handle_message`.
pub fn send_ready_handshake(endpoint: &str) {
    match TcpStream::connect(endpoint) {
        Ok(mut stream) => {
            if let Ok(json) = serde_json::to_string(&OutboundMessage::receiver_ready()) {
                let _ = writeln!(stream, "{}", json);
            }
        }
        Err(e) => {
            crate::log_warn!("Handshake to {} failed: {}", endpoint, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn allowed() -> Vec<String> {
        DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect()
    }

    fn msg(kind: &str, origin: Option<&str>, data: Option<&str>) -> InboundMessage {
        InboundMessage {
            kind: kind.to_string(),
            origin: origin.map(String::from),
            image_data: data.map(String::from),
        }
    }

    #[test]
    fn untrusted_origin_is_dropped_silently() {
        let outcomes = [
            handle_message(&msg("IMPORT_IMAGE", Some("https://evil.example"), Some("data:image/png;base64,AAAA")), &allowed()),
            handle_message(&msg("PING", Some("https://evil.example"), None), &allowed()),
            handle_message(&msg("PING", None, None), &allowed()),
        ];
        for outcome in outcomes {
            assert_eq!(outcome, MessageOutcome::Drop);
        }
    }

    #[test]
    fn trusted_ping_gets_exactly_one_ready_reply() {
        let outcome = handle_message(&msg("PING", Some("https://claude.ai"), None), &allowed());
        assert_eq!(outcome, MessageOutcome::Reply(OutboundMessage::receiver_ready()));
    }

    #[test]
    fn trusted_import_requires_image_data_uri() {
        let ok = handle_message(
            &msg("IMPORT_IMAGE", Some("https://gemini.google.com"), Some("data:image/png;base64,AAAA")),
            &allowed(),
        );
        assert!(matches!(ok, MessageOutcome::Import(_)));

        // Non-image payloads and missing payloads are dropped even when trusted.
        for bad in [Some("data:text/html;base64,AAAA"), Some("https://x/y.png"), None] {
            let outcome = handle_message(
                &msg("IMPORT_IMAGE", Some("https://gemini.google.com"), bad),
                &allowed(),
            );
            assert_eq!(outcome, MessageOutcome::Drop);
        }
    }

    #[test]
    fn unknown_message_types_are_dropped() {
        let outcome = handle_message(&msg("SELF_DESTRUCT", Some("https://claude.ai"), None), &allowed());
        assert_eq!(outcome, MessageOutcome::Drop);
    }

    #[test]
    fn wire_format_parses() {
        let raw = r#"{"type":"IMPORT_IMAGE","origin":"https://chatgpt.com","imageData":"data:image/png;base64,Zm9v"}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, "IMPORT_IMAGE");
        assert_eq!(msg.origin.as_deref(), Some("https://chatgpt.com"));

        let reply = serde_json::to_string(&OutboundMessage::receiver_ready()).unwrap();
        assert_eq!(reply, r#"{"type":"RECEIVER_READY"}"#);
    }

    #[test]
    fn import_payload_decodes_end_to_end() {
        let img = image::RgbaImage::from_pixel(3, 3, image::Rgba([9, 9, 9, 255]));
        let png = crate::raster::encode_png(&img).unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let outcome = handle_message(
            &msg("IMPORT_IMAGE", Some("https://www.midjourney.com"), Some(&uri)),
            &allowed(),
        );
        let MessageOutcome::Import(data) = outcome else {
            panic!("expected import");
        };
        assert_eq!(crate::raster::load_data_uri(&data).unwrap(), img);
    }
}
