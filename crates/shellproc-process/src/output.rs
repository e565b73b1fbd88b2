//! Merged stdout/stderr output as a stream of text chunks

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const CHANNEL_CAPACITY: usize = 256;

/// Type-erased pipe reader accepted by [`OutputStream::merge`]
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Incremental UTF-8 decoder for one byte stream.
///
/// Sequences split across reads are held back until completed; invalid
/// sequences decode to U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut consumed = 0;

        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = consumed + err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_up_to]));
                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_up_to + len;
                        }
                        None => {
                            // incomplete sequence at the end; wait for more bytes
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        text
    }

    /// Flush whatever is left once the underlying stream has ended
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Ordered stream of decoded text chunks from stdout and stderr.
///
/// The stream ends once every attached pipe has reached EOF.
pub struct OutputStream {
    inner: ReceiverStream<String>,
}

impl OutputStream {
    /// Merge the given readers into one stream.
    ///
    /// Each reader is drained by its own task; chunks are forwarded in the
    /// order they are read.
    pub fn merge(readers: Vec<(&'static str, BoxedReader)>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        for (label, reader) in readers {
            tokio::spawn(pump(label, reader, tx.clone()));
        }
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Build a stream from an existing channel receiver
    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for OutputStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn pump<R>(label: &'static str, mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8ChunkDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if tx.send(text).await.is_err() {
                    debug!(pipe = label, "Output consumer dropped, stopping reader");
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(pipe = label, error = %e, "Failed to read process output");
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(rest).await;
    }
    debug!(pipe = label, "Output pipe closed");
}
