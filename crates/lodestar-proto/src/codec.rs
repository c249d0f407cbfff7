//! IRC message codec for tokio.
//!
//! Frames a byte stream into `\r\n`-terminated lines and parses each line
//! into a [`Message`]. Incoming bytes are decoded as UTF-8 with lossy
//! replacement; stray legacy bytes never drop a line.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::Message;

/// Hard cap on outgoing line length, terminator included (RFC 2812 §2.3).
pub const MAX_LINE_LEN: usize = 512;

/// Tokio codec for encoding/decoding IRC messages.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Scan position for the next newline search, so large partial lines are
    /// not rescanned from the start on every read.
    next_index: usize,
}

impl IrcCodec {
    /// Create a new codec.
    pub fn new() -> IrcCodec {
        IrcCodec::default()
    }

    /// Sanitize outgoing message data: truncate at the first embedded line
    /// ending so a payload cannot smuggle additional commands.
    fn sanitize(data: &str) -> &str {
        match data.find(['\r', '\n']) {
            Some(pos) => &data[..pos],
            None => data,
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        let Some(offset) = src[self.next_index..].iter().position(|&b| b == b'\n') else {
            self.next_index = src.len();
            return Ok(None);
        };

        let line = src.split_to(self.next_index + offset + 1);
        self.next_index = 0;

        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            // Blank keepalive lines are legal noise between messages.
            return self.decode(src);
        }

        let msg = trimmed.parse::<Message>()?;
        Ok(Some(msg))
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let line = msg.to_string();
        let mut line = Self::sanitize(&line);
        if line.len() > MAX_LINE_LEN - 2 {
            let mut end = MAX_LINE_LEN - 2;
            while end > 0 && !line.is_char_boundary(end) {
                end -= 1;
            }
            line = &line[..end];
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    fn decode_all(codec: &mut IrcCodec, bytes: &[u8]) -> Vec<Message> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Ok(Some(msg)) = codec.decode(&mut buf) {
            out.push(msg);
        }
        out
    }

    #[test]
    fn decodes_complete_lines() {
        let mut codec = IrcCodec::new();
        let msgs = decode_all(&mut codec, b"PING :one\r\nPING :two\r\n");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].command, Command::PING("one".into(), None));
        assert_eq!(msgs[1].command, Command::PING("two".into(), None));
    }

    #[test]
    fn waits_for_full_line() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b"PING :par"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"tial\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, Command::PING("partial".into(), None));
    }

    #[test]
    fn bare_lf_is_accepted() {
        let mut codec = IrcCodec::new();
        let msgs = decode_all(&mut codec, b"PING :token\n");
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn blank_lines_skipped() {
        let mut codec = IrcCodec::new();
        let msgs = decode_all(&mut codec, b"\r\nPING :token\r\n");
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn parse_error_is_not_fatal() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b"@@@ bogus\r\nPING :ok\r\n"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(!err.is_fatal());
        // Stream continues after the bad line.
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, Command::PING("ok".into(), None));
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::privmsg("#chan", "hello"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #chan :hello\r\n");
    }

    #[test]
    fn encode_truncates_embedded_newline() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::privmsg("#chan", "hello\r\nQUIT"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #chan :hello\r\n");
    }

    #[test]
    fn encode_caps_line_length() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        let long = "x".repeat(600);
        codec.encode(Message::privmsg("#chan", long), &mut buf).unwrap();
        assert_eq!(buf.len(), MAX_LINE_LEN);
        assert!(buf.ends_with(b"\r\n"));
    }
}
