use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::MAX_MESSAGE_SIZE;

const HEADER_LEN: usize = 4;
const READ_CHUNK: usize = 8 * 1024;

/// Largest payload a `u32` length header can describe.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// How messages are delimited on a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// `[u32 big-endian length][payload]` per message.
    #[default]
    LengthPrefixed,
    /// No delimiters. A request ends when the buffered bytes form a complete
    /// JSON value or the peer half-closes; a response ends at end of stream.
    Unframed,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LengthPrefixed => "length-prefixed",
            Self::Unframed => "unframed",
        })
    }
}

impl FromStr for Framing {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "length-prefixed" => Ok(Self::LengthPrefixed),
            "unframed" => Ok(Self::Unframed),
            other => Err(ProtocolError::FramingError(format!(
                "unknown framing mode: {other}"
            ))),
        }
    }
}

/// Frames and unframes protocol messages.
///
/// `max_message_size` bounds incoming requests. Responses can be far larger
/// (a pulled repository is the whole repository), so they are bounded
/// separately by `max_response_size`, and outgoing payloads only by what the
/// framing can express.
#[derive(Clone, Copy, Debug)]
pub struct DepotCodec {
    framing: Framing,
    max_message_size: usize,
    max_response_size: usize,
}

impl Default for DepotCodec {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

impl DepotCodec {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            max_message_size: MAX_MESSAGE_SIZE,
            max_response_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.max_response_size = max;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn max_response_size(&self) -> usize {
        self.max_response_size
    }

    /// Encode one payload for the wire.
    pub fn encode(&self, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
        match self.framing {
            Framing::LengthPrefixed => {
                let header = frame_header(payload.len())?;
                let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
                buf.extend_from_slice(&header);
                buf.extend_from_slice(payload);
                Ok(buf)
            }
            Framing::Unframed => Ok(payload.to_vec()),
        }
    }

    /// Try to decode one message from the front of `data`.
    ///
    /// Returns `Ok(None)` while more bytes are needed, otherwise the payload
    /// and the number of bytes consumed. In unframed mode a buffer that is
    /// not valid JSON (and not merely truncated JSON) counts as complete, so
    /// the caller can reject it as a parse failure.
    pub fn decode(&self, data: &[u8]) -> ProtocolResult<Option<(Vec<u8>, usize)>> {
        match self.framing {
            Framing::LengthPrefixed => {
                if data.len() < HEADER_LEN {
                    return Ok(None);
                }
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&data[..HEADER_LEN]);
                let len = u32::from_be_bytes(header) as usize;
                check_size(len, self.max_message_size)?;
                let total = HEADER_LEN + len;
                if data.len() < total {
                    return Ok(None);
                }
                Ok(Some((data[HEADER_LEN..total].to_vec(), total)))
            }
            Framing::Unframed => {
                if is_complete_json(data) {
                    Ok(Some((data.to_vec(), data.len())))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Read one request. `Ok(None)` means the peer closed before sending
    /// anything.
    pub async fn read_message<R>(&self, reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let message = match self.framing {
            Framing::LengthPrefixed => self.read_frame(reader, self.max_message_size).await?,
            Framing::Unframed => self.read_json(reader).await?,
        };
        if let Some(bytes) = &message {
            trace!(framing = %self.framing, bytes = bytes.len(), "message read");
        }
        Ok(message)
    }

    async fn read_frame<R>(&self, reader: &mut R, max: usize) -> ProtocolResult<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::FramingError(format!(
                    "truncated frame header: {filled} of {HEADER_LEN} bytes"
                )));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(header) as usize;
        check_size(len, max)?;
        // Grow with the data actually received rather than trusting the header.
        let mut payload = Vec::with_capacity(len.min(READ_CHUNK));
        (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;
        if payload.len() < len {
            return Err(ProtocolError::FramingError(format!(
                "truncated frame: expected {len} bytes, got {}",
                payload.len()
            )));
        }
        Ok(Some(payload))
    }

    async fn read_json<R>(&self, reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            if !buf.is_empty() && is_complete_json(&buf) {
                return Ok(Some(buf.to_vec()));
            }
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                return Ok(if buf.is_empty() { None } else { Some(buf.to_vec()) });
            }
            check_size(buf.len(), self.max_message_size)?;
        }
    }

    /// Write one payload and flush.
    pub async fn write_message<W>(&self, writer: &mut W, payload: &[u8]) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.framing == Framing::LengthPrefixed {
            writer.write_all(&frame_header(payload.len())?).await?;
        }
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read every response part until the peer closes.
    ///
    /// Unframed responses have no boundaries, so the whole stream comes back
    /// as a single part. Each part is bounded by `max_response_size`.
    pub async fn read_all<R>(&self, reader: &mut R) -> ProtocolResult<Vec<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut parts = Vec::new();
        match self.framing {
            Framing::LengthPrefixed => {
                while let Some(part) = self.read_frame(reader, self.max_response_size).await? {
                    parts.push(part);
                }
            }
            Framing::Unframed => {
                let mut buf = Vec::new();
                let limit = self.max_response_size as u64;
                (&mut *reader).take(limit.saturating_add(1)).read_to_end(&mut buf).await?;
                check_size(buf.len(), self.max_response_size)?;
                if !buf.is_empty() {
                    parts.push(buf);
                }
            }
        }
        Ok(parts)
    }
}

fn check_size(size: usize, max: usize) -> ProtocolResult<()> {
    if size > max {
        return Err(ProtocolError::MessageTooLarge { size, max });
    }
    Ok(())
}

fn frame_header(len: usize) -> ProtocolResult<[u8; HEADER_LEN]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        })
}

/// `false` only when `data` is a truncated prefix of some JSON value.
fn is_complete_json(data: &[u8]) -> bool {
    match serde_json::from_slice::<IgnoredAny>(data) {
        Ok(_) => true,
        Err(e) => !e.is_eof(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn length_prefixed_encode_layout() {
        let codec = DepotCodec::default();
        let encoded = codec.encode(b"hello").unwrap();
        assert_eq!(&encoded[..4], &5u32.to_be_bytes());
        assert_eq!(&encoded[4..], b"hello");
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let codec = DepotCodec::default();
        let encoded = codec.encode(b"payload").unwrap();
        assert_eq!(codec.decode(&encoded[..2]).unwrap(), None);
        assert_eq!(codec.decode(&encoded[..6]).unwrap(), None);
        let (payload, consumed) = codec.decode(&encoded).unwrap().unwrap();
        assert_eq!(payload, b"payload");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn decode_leaves_following_frames() {
        let codec = DepotCodec::default();
        let mut data = codec.encode(b"one").unwrap();
        data.extend(codec.encode(b"two").unwrap());
        let (first, consumed) = codec.decode(&data).unwrap().unwrap();
        assert_eq!(first, b"one");
        let (second, _) = codec.decode(&data[consumed..]).unwrap().unwrap();
        assert_eq!(second, b"two");
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let codec = DepotCodec::default().with_max_message_size(4);
        let header = 1000u32.to_be_bytes();
        assert!(matches!(
            codec.decode(&header),
            Err(ProtocolError::MessageTooLarge { size: 1000, .. })
        ));
    }

    #[test]
    fn request_limit_does_not_bound_outgoing_payloads() {
        let codec = DepotCodec::default().with_max_message_size(4);
        let encoded = codec.encode(b"longer than four").unwrap();
        assert_eq!(&encoded[..4], &16u32.to_be_bytes());
        assert_eq!(
            DepotCodec::new(Framing::Unframed)
                .with_max_message_size(4)
                .encode(b"longer than four")
                .unwrap(),
            b"longer than four"
        );
    }

    #[tokio::test]
    async fn responses_use_their_own_limit() {
        let codec = DepotCodec::default().with_max_message_size(16);
        let (mut client, mut server) = duplex(1024);
        let big = vec![9u8; 4000];

        let writer = {
            let big = big.clone();
            tokio::spawn(async move {
                codec.write_message(&mut client, &big).await.unwrap();
            })
        };
        let parts = codec.read_all(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(parts, vec![big]);

        let small = codec.with_max_response_size(100);
        let (mut client, mut server) = duplex(1024);
        let writer = tokio::spawn(async move {
            // The reader gives up after the header, so the rest may not fit.
            let _ = codec.write_message(&mut client, &[1u8; 500]).await;
        });
        assert!(matches!(
            small.read_all(&mut server).await,
            Err(ProtocolError::MessageTooLarge { size: 500, max: 100 })
        ));
        drop(server);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn unframed_response_limit() {
        let codec = DepotCodec::new(Framing::Unframed).with_max_response_size(8);
        let (mut client, mut server) = duplex(64);
        client.write_all(b"0123456789").await.unwrap();
        drop(client);
        assert!(matches!(
            codec.read_all(&mut server).await,
            Err(ProtocolError::MessageTooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn unframed_completeness() {
        let codec = DepotCodec::new(Framing::Unframed);
        assert_eq!(codec.decode(br#"{"action":"list"#).unwrap(), None);
        assert_eq!(codec.decode(b"   ").unwrap(), None);
        let (payload, _) = codec
            .decode(br#"{"action":"listRepositories"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(payload, br#"{"action":"listRepositories"}"#);
        // Garbage is "complete" so it reaches the parser and gets rejected there.
        assert!(codec.decode(b"not json").unwrap().is_some());
    }

    #[test]
    fn framing_names() {
        assert_eq!("unframed".parse::<Framing>().unwrap(), Framing::Unframed);
        assert_eq!(
            Framing::LengthPrefixed.to_string().parse::<Framing>().unwrap(),
            Framing::LengthPrefixed
        );
        assert!("bogus".parse::<Framing>().is_err());
        assert_eq!(Framing::default(), Framing::LengthPrefixed);
    }

    #[tokio::test]
    async fn framed_stream_roundtrip() {
        let codec = DepotCodec::default();
        let (mut client, mut server) = duplex(64);

        let writer = tokio::spawn(async move {
            codec.write_message(&mut client, b"first").await.unwrap();
            codec.write_message(&mut client, b"").await.unwrap();
            codec.write_message(&mut client, &[7u8; 300]).await.unwrap();
        });

        let parts = codec.read_all(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(parts, vec![b"first".to_vec(), Vec::new(), vec![7u8; 300]]);
    }

    #[tokio::test]
    async fn framed_read_reports_clean_close() {
        let codec = DepotCodec::default();
        let (client, mut server) = duplex(64);
        drop(client);
        assert_eq!(codec.read_message(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_request_header_is_rejected_before_reading() {
        let codec = DepotCodec::default().with_max_message_size(64);
        let (mut client, mut server) = duplex(64);
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        assert!(matches!(
            codec.read_message(&mut server).await,
            Err(ProtocolError::MessageTooLarge { max: 64, .. })
        ));
    }

    #[tokio::test]
    async fn framed_read_detects_truncation() {
        let codec = DepotCodec::default();
        let (mut client, mut server) = duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"short").await.unwrap();
        drop(client);
        assert!(matches!(
            codec.read_message(&mut server).await,
            Err(ProtocolError::FramingError(_))
        ));
    }

    #[tokio::test]
    async fn unframed_read_stops_at_complete_document() {
        let codec = DepotCodec::new(Framing::Unframed);
        let (mut client, mut server) = duplex(8);

        let doc = br#"{"action":"pullRepository","repositoryName":"demo"}"#;
        let writer = tokio::spawn(async move {
            for chunk in doc.chunks(5) {
                client.write_all(chunk).await.unwrap();
            }
            // Keep the write half open: the reader must not wait for EOF.
            client
        });

        let message = codec.read_message(&mut server).await.unwrap().unwrap();
        assert_eq!(message, doc);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn unframed_read_returns_partial_on_close() {
        let codec = DepotCodec::new(Framing::Unframed);
        let (mut client, mut server) = duplex(64);
        client.write_all(br#"{"action":"#).await.unwrap();
        drop(client);
        let message = codec.read_message(&mut server).await.unwrap().unwrap();
        assert_eq!(message, br#"{"action":"#);
    }

    #[tokio::test]
    async fn unframed_response_is_whole_stream() {
        let codec = DepotCodec::new(Framing::Unframed);
        let (mut client, mut server) = duplex(64);
        codec.write_message(&mut client, b"part one ").await.unwrap();
        codec.write_message(&mut client, b"part two").await.unwrap();
        drop(client);
        let parts = codec.read_all(&mut server).await.unwrap();
        assert_eq!(parts, vec![b"part one part two".to_vec()]);
    }
}
