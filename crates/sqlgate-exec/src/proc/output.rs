use std::{fmt, io};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Capacity of the line channel feeding the readiness detector.
pub(crate) const LINE_BUFFER: usize = 256;

/// One decoded line, or the read error that ended a scanned stream.
pub type LineEvent = io::Result<OutputLine>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Drain `reader` until EOF, logging every line.
///
/// Lines of a scanned stream are also forwarded to `tx` until the receiver closes; the pump
/// keeps draining afterwards so the proxy never blocks on a full pipe.
pub(crate) fn pump<R>(
    reader: R,
    stream: OutputStream,
    tx: Option<mpsc::Sender<LineEvent>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(raw)) => {
                    let text = decode(&raw);
                    debug!(target: "sqlgate::proxy", %stream, "{text}");
                    if let Some(sender) = &tx
                        && !sender.is_closed()
                    {
                        let _ = sender.send(Ok(OutputLine { stream, text })).await;
                    }
                }
                Ok(None) => {
                    debug!(target: "sqlgate::proxy", %stream, "stream closed");
                    break;
                }
                Err(e) => {
                    warn!(target: "sqlgate::proxy", %stream, error = %e, "read failed");
                    if let Some(sender) = &tx {
                        let _ = sender.send(Err(e)).await;
                    }
                    break;
                }
            }
        }
    })
}

fn decode(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_carriage_return_and_tolerates_bad_utf8() {
        assert_eq!(decode(b"ready\r"), "ready");
        assert_eq!(decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn forwards_complete_and_trailing_partial_lines() {
        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        let input: &[u8] = b"first\r\nsecond\nthird-no-newline";
        pump(input, OutputStream::Stderr, Some(tx)).await.unwrap();

        let mut got = Vec::new();
        while let Some(event) = rx.recv().await {
            got.push(event.unwrap());
        }
        let texts: Vec<_> = got.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third-no-newline"]);
        assert!(got.iter().all(|l| l.stream == OutputStream::Stderr));
    }

    #[tokio::test]
    async fn keeps_draining_after_receiver_closes() {
        let (tx, mut rx) = mpsc::channel(1);
        rx.close();
        let input: Vec<u8> = "line\n".repeat(1_000).into_bytes();
        // Would hang on the bounded channel if closed receivers were not skipped.
        pump(std::io::Cursor::new(input), OutputStream::Stdout, Some(tx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unscanned_stream_is_drained_only() {
        pump(&b"x\ny\n"[..], OutputStream::Stdout, None).await.unwrap();
    }
}
