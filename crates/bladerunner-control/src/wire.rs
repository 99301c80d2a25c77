//! Message framing for the control protocol.
//!
//! Two wire formats are provided. [`LineFormat`] is the original newline
//! delimited text protocol (`ping\n`, `v1 pong\n`, `error: message\n`) and
//! remains the default for compatibility with older clients. [`JsonFormat`]
//! writes one JSON object per line and preserves every field of a
//! [`Message`]; it is the preferred format for new peers.
//!
//! The line format cannot tell a command from a reply: a decoded plain line
//! populates both `command` and `response`, and the caller decides which one
//! it expected.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::message::Message;

const MAX_LINE_BYTES: usize = 64 * 1024;
const ERROR_PREFIX: &str = "error: ";

/// Errors raised while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The message had no payload field to encode.
    #[error("empty message")]
    EmptyMessage,
    /// The peer sent a line longer than the protocol allows.
    #[error("message exceeds {max} byte limit")]
    TooLarge { max: usize },
    /// The peer sent bytes that are not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
    /// JSON encoding or decoding failed.
    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
    /// The underlying transport failed; the error is passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WireError {
    /// Returns the transport error kind when the failure came from IO.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(error) => Some(error.kind()),
            _ => None,
        }
    }

    /// Returns `true` when the peer sent something that could not be parsed,
    /// as opposed to the connection failing.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::TooLarge { .. } | Self::InvalidUtf8 | Self::Json(_)
        )
    }
}

/// Serialization strategy for control messages.
pub trait WireFormat: Send + Sync + std::fmt::Debug {
    /// Writes one message to `writer`.
    fn encode(&self, writer: &mut dyn Write, message: &Message) -> Result<(), WireError>;

    /// Reads one message from `reader`.
    fn decode(&self, reader: &mut dyn Read) -> Result<Message, WireError>;
}

/// Newline-delimited text protocol.
///
/// Version 1 and later prefix the payload with `v<N> `; the legacy protocol
/// (version 0) writes the payload alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineFormat;

impl WireFormat for LineFormat {
    fn encode(&self, writer: &mut dyn Write, message: &Message) -> Result<(), WireError> {
        let payload = match (&message.error, &message.response, &message.command) {
            (Some(error), _, _) => format!("{ERROR_PREFIX}{error}"),
            (None, Some(response), _) => response.clone(),
            (None, None, Some(command)) => command.clone(),
            (None, None, None) => return Err(WireError::EmptyMessage),
        };
        let line = if message.version > 0 {
            format!("v{} {payload}\n", message.version)
        } else {
            format!("{payload}\n")
        };
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Message, WireError> {
        let line = read_line(reader)?;
        // Only the terminator goes: `v1 ` is a versioned empty payload.
        let (version, text) = split_version(line.strip_suffix('\r').unwrap_or(&line));

        if let Some(error) = text.strip_prefix(ERROR_PREFIX) {
            return Ok(Message::error(error).with_version(version));
        }

        Ok(Message {
            version,
            command: Some(text.to_owned()),
            response: Some(text.to_owned()),
            error: None,
        })
    }
}

/// One JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl WireFormat for JsonFormat {
    fn encode(&self, writer: &mut dyn Write, message: &Message) -> Result<(), WireError> {
        let mut payload = serde_json::to_vec(message)?;
        payload.push(b'\n');
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Message, WireError> {
        let line = read_line(reader)?;
        Ok(serde_json::from_str(&line)?)
    }
}

/// Names one of the built-in wire formats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WireFormatKind {
    /// [`LineFormat`].
    #[default]
    Line,
    /// [`JsonFormat`].
    Json,
}

impl WireFormatKind {
    /// Flag spelling of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Json => "json",
        }
    }

    /// Instantiates the named format.
    pub fn format(self) -> Arc<dyn WireFormat> {
        match self {
            Self::Line => Arc::new(LineFormat),
            Self::Json => Arc::new(JsonFormat),
        }
    }
}

impl fmt::Display for WireFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormatKind {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown wire format '{other}' (expected line or json)")),
        }
    }
}

/// Splits an optional `v<N> ` prefix from `text`.
///
/// Text without a well-formed prefix is legacy version 0 and is returned
/// unchanged.
fn split_version(text: &str) -> (u32, &str) {
    let Some(rest) = text.strip_prefix('v') else {
        return (0, text);
    };
    let Some((digits, payload)) = rest.split_once(' ') else {
        return (0, text);
    };
    match digits.parse::<u32>() {
        Ok(version) => (version, payload),
        Err(_) => (0, text),
    }
}

/// Reads a single newline-terminated line.
///
/// End of stream before any byte is an `UnexpectedEof` IO error; a partial
/// line terminated by end of stream is returned as-is.
fn read_line(reader: &mut dyn Read) -> Result<String, WireError> {
    let mut buffer = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        let read = read_with_retry(reader, &mut byte)?;
        if read == 0 {
            if buffer.is_empty() {
                return Err(WireError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before a message was received",
                )));
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        buffer.push(byte[0]);
        if buffer.len() > MAX_LINE_BYTES {
            return Err(WireError::TooLarge {
                max: MAX_LINE_BYTES,
            });
        }
    }
    String::from_utf8(buffer).map_err(|_| WireError::InvalidUtf8)
}

fn read_with_retry(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case("line", WireFormatKind::Line)]
    #[case("JSON", WireFormatKind::Json)]
    fn wire_format_kind_parses_flag_spellings(#[case] text: &str, #[case] expected: WireFormatKind) {
        assert_eq!(text.parse::<WireFormatKind>(), Ok(expected));
        assert_eq!(expected.to_string().parse::<WireFormatKind>(), Ok(expected));
    }

    #[test]
    fn wire_format_kind_rejects_unknown_names() {
        let error = "yaml".parse::<WireFormatKind>().expect_err("unknown format");
        assert!(error.contains("yaml"), "{error}");
    }

    fn encode_to_string(format: &dyn WireFormat, message: &Message) -> String {
        let mut buffer = Vec::new();
        format.encode(&mut buffer, message).expect("encode message");
        String::from_utf8(buffer).expect("utf8 output")
    }

    #[rstest]
    #[case::command(Message::command("ping"), "v1 ping\n")]
    #[case::legacy_response(Message::response("pong"), "pong\n")]
    #[case::versioned_error(Message::error("boom").with_version(1), "v1 error: boom\n")]
    #[case::error_wins(
        Message { error: Some("bad".into()), response: Some("ok".into()), ..Message::default() },
        "error: bad\n"
    )]
    fn line_format_writes_single_payload(#[case] message: Message, #[case] expected: &str) {
        assert_eq!(encode_to_string(&LineFormat, &message), expected);
    }

    #[test]
    fn line_format_rejects_empty_message() {
        let mut buffer = Vec::new();
        let error = LineFormat
            .encode(&mut buffer, &Message::default())
            .expect_err("empty message must fail");
        assert!(matches!(error, WireError::EmptyMessage));
        assert!(buffer.is_empty(), "nothing should be written");
    }

    #[rstest]
    #[case::legacy("pong\n", 0, Some("pong"), None)]
    #[case::versioned("v1 running\n", 1, Some("running"), None)]
    #[case::versioned_error("v2 error: unknown command: x\n", 2, None, Some("unknown command: x"))]
    #[case::legacy_error("error: nope\n", 0, None, Some("nope"))]
    #[case::not_a_version("vm-dir\n", 0, Some("vm-dir"), None)]
    #[case::unterminated("status", 0, Some("status"), None)]
    #[case::versioned_empty("v1 \n", 1, Some(""), None)]
    #[case::crlf("v1 pong\r\n", 1, Some("pong"), None)]
    fn line_format_recovers_payload(
        #[case] input: &str,
        #[case] version: u32,
        #[case] response: Option<&str>,
        #[case] error: Option<&str>,
    ) {
        let message = LineFormat
            .decode(&mut Cursor::new(input.as_bytes()))
            .expect("decode line");
        assert_eq!(message.version, version);
        assert_eq!(message.response.as_deref(), response);
        assert_eq!(message.error.as_deref(), error);
        if response.is_some() {
            assert_eq!(message.command, message.response, "line text fills both fields");
        }
    }

    #[test]
    fn line_format_round_trips_command_with_arguments() {
        let encoded = encode_to_string(&LineFormat, &Message::command("config.set key value"));
        let decoded = LineFormat
            .decode(&mut Cursor::new(encoded.into_bytes()))
            .expect("decode");
        assert_eq!(decoded.command.as_deref(), Some("config.set key value"));
        assert_eq!(decoded.version, 1);
    }

    #[rstest]
    #[case::command(Message::command("config.set key value"))]
    #[case::empty_reply(Message::response("").with_version(1))]
    #[case::legacy_reply(Message::response("running"))]
    #[case::error(Message::error("unknown config key: x").with_version(1))]
    fn line_format_recovers_the_field_that_was_set(#[case] message: Message) {
        let encoded = encode_to_string(&LineFormat, &message);
        let decoded = LineFormat
            .decode(&mut Cursor::new(encoded.into_bytes()))
            .expect("decode");
        assert_eq!(decoded.version, message.version);
        match (&message.error, &message.response, &message.command) {
            (Some(error), _, _) => assert_eq!(decoded.error.as_ref(), Some(error)),
            (None, Some(response), _) => assert_eq!(decoded.response.as_ref(), Some(response)),
            (None, None, command) => assert_eq!(&decoded.command, command),
        }
    }

    #[rstest]
    #[case::all_empty(Message::default())]
    #[case::empty_strings(Message {
        version: 0,
        command: Some(String::new()),
        response: Some(String::new()),
        error: Some(String::new()),
    })]
    #[case::everything(Message {
        version: 3,
        command: Some("config.get name".into()),
        response: Some("line one\nline two".into()),
        error: Some("quote \" and tab \t".into()),
    })]
    fn json_format_round_trips_every_field(#[case] message: Message) {
        let encoded = encode_to_string(&JsonFormat, &message);
        assert_eq!(encoded.matches('\n').count(), 1, "one line per message");
        let decoded = JsonFormat
            .decode(&mut Cursor::new(encoded.into_bytes()))
            .expect("decode json");
        assert_eq!(decoded, message);
    }

    #[test]
    fn json_format_omits_absent_fields() {
        let encoded = encode_to_string(&JsonFormat, &Message::response("pong"));
        assert_eq!(encoded, "{\"response\":\"pong\"}\n");
    }

    #[test]
    fn json_format_reports_malformed_input() {
        let error = JsonFormat
            .decode(&mut Cursor::new(b"{not json}\n".to_vec()))
            .expect_err("malformed json");
        assert!(error.is_malformed());
    }

    #[rstest]
    #[case::line(&LineFormat as &dyn WireFormat)]
    #[case::json(&JsonFormat as &dyn WireFormat)]
    fn decode_propagates_end_of_stream(#[case] format: &dyn WireFormat) {
        let error = format
            .decode(&mut Cursor::new(Vec::new()))
            .expect_err("eof must fail");
        assert_eq!(error.io_kind(), Some(io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn decode_propagates_transport_errors_unchanged() {
        struct BrokenPipe;
        impl Read for BrokenPipe {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        let error = LineFormat
            .decode(&mut BrokenPipe)
            .expect_err("transport failure");
        assert_eq!(error.io_kind(), Some(io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn decode_rejects_oversized_lines() {
        let input = vec![b'a'; MAX_LINE_BYTES + 2];
        let error = LineFormat
            .decode(&mut Cursor::new(input))
            .expect_err("oversized line");
        assert!(matches!(error, WireError::TooLarge { .. }));
    }
}
