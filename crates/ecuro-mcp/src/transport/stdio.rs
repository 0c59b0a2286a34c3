use std::{io, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::{
    codec::{
        AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead, FramedWrite, LinesCodec,
    },
    sync::CancellationToken,
};
use tracing::Instrument;

use super::TransportError;
use crate::{
    ErrorData,
    handler::server::{ServerHandler, handle_message},
    model::{JsonRpcMessage, ServerJsonRpcMessage},
};

/// Longest inbound line accepted; longer lines are discarded and answered
/// with a parse error.
pub const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

#[derive(Debug, PartialEq)]
enum Frame {
    Line(Bytes),
    Oversized,
}

/// Newline framing over raw bytes.
///
/// Decoding never fails on content: text encoding is left to the JSON parser
/// and an over-long line becomes [`Frame::Oversized`] while the rest of it is
/// skipped, so one bad line never ends the stream.
struct FrameCodec(AnyDelimiterCodec);

impl FrameCodec {
    fn new(max_length: usize) -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            max_length,
        ))
    }

    fn lift(
        decoded: Result<Option<Bytes>, AnyDelimiterCodecError>,
    ) -> Result<Option<Frame>, io::Error> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Oversized)),
            Err(AnyDelimiterCodecError::Io(error)) => Err(error),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        Self::lift(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        Self::lift(self.0.decode_eof(src))
    }
}

/// Serve one engine over the process's stdin and stdout.
pub async fn serve_stdio<S: ServerHandler>(
    engine: Arc<S>,
    ct: CancellationToken,
) -> Result<(), TransportError> {
    serve(engine, tokio::io::stdin(), tokio::io::stdout(), ct)
        .instrument(tracing::info_span!("stdio-server"))
        .await
}

/// Newline-delimited JSON-RPC over any reader/writer pair.
///
/// Requests are handled concurrently; a single writer task serializes the
/// replies. Returns once the reader hits EOF (or `ct` fires) and every
/// in-flight reply has been written.
pub async fn serve<S, R, W>(
    engine: Arc<S>,
    reader: R,
    writer: W,
    ct: CancellationToken,
) -> Result<(), TransportError>
where
    S: ServerHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_with_max_line_length(engine, reader, writer, MAX_LINE_LENGTH, ct).await
}

pub async fn serve_with_max_line_length<S, R, W>(
    engine: Arc<S>,
    reader: R,
    writer: W,
    max_line_length: usize,
    ct: CancellationToken,
) -> Result<(), TransportError>
where
    S: ServerHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(reader, FrameCodec::new(max_line_length));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    let (tx, mut rx) = mpsc::channel::<ServerJsonRpcMessage>(64);

    let read = async move {
        loop {
            let frame = tokio::select! {
                _ = ct.cancelled() => break,
                frame = lines.next() => match frame {
                    Some(frame) => frame?,
                    None => break,
                },
            };
            let line = match frame {
                Frame::Line(line) => line,
                Frame::Oversized => {
                    tracing::warn!(max_line_length, "rejected oversized message");
                    let error = JsonRpcMessage::error(
                        None,
                        ErrorData::parse_error(
                            "message too large",
                            Some(serde_json::json!({ "maxBytes": max_line_length })),
                        ),
                    );
                    if tx.send(error).await.is_err() {
                        break;
                    }
                    continue;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let message = match JsonRpcMessage::from_slice(&line) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!("rejected malformed message");
                    if tx.send(*error).await.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let engine = engine.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(reply) = handle_message(engine.as_ref(), message).await {
                    if tx.send(reply).await.is_err() {
                        tracing::debug!("stdout closed, dropping reply");
                    }
                }
            });
        }
        tracing::info!("stdin closed");
        Ok::<_, TransportError>(())
    };

    let write = async move {
        while let Some(message) = rx.recv().await {
            sink.send(serde_json::to_string(&message)?).await?;
        }
        Ok::<_, TransportError>(())
    };

    tokio::try_join!(read, write)?;
    Ok(())
}
