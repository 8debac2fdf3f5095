//! `Content-Length` framing for JSON-RPC over a byte stream.
//!
//! Every message is `Content-Length: N\r\n\r\n` followed by exactly `N`
//! bytes of JSON. Other headers (`Content-Type`) are accepted and ignored.

use anyhow::{Context, Result, bail, ensure};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on one frame. Editors send whole documents in `didOpen` and
/// full-sync `didChange`, so this is generous.
const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next decoded frame; `Ok(None)` when the stream ends between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(length) = self.read_header().await? else {
            return Ok(None);
        };
        ensure!(
            length <= MAX_FRAME_BYTES,
            "frame of {length} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        );

        let mut body = vec![0u8; length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let value = serde_json::from_slice(&body).context("decoding frame body")?;
        Ok(Some(value))
    }

    async fn read_header(&mut self) -> Result<Option<usize>> {
        let mut length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if read == 0 {
                if started {
                    bail!("stream ended inside a frame header");
                }
                return Ok(None);
            }
            started = true;

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(value) = header_value(line, "Content-Length") {
                let parsed = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid Content-Length {value:?}"))?;
                length = Some(parsed);
            }
        }

        length.map(Some).context("frame header has no Content-Length")
    }
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, message: &Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding frame body")?;
        let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(&body);

        self.writer
            .write_all(&frame)
            .await
            .context("writing frame")?;
        self.writer.flush().await.context("flushing frame")
    }
}
