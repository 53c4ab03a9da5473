use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    error::ExecError,
    proc::output::{LineEvent, OutputLine},
};

/// Decides whether a single line of proxy output means the tunnel accepts connections.
pub trait ReadinessPredicate: Send + Sync {
    fn is_ready(&self, line: &str) -> bool;
}

impl<F> ReadinessPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    #[inline]
    fn is_ready(&self, line: &str) -> bool {
        self(line)
    }
}

/// Substring match against the proxy's log wording.
///
/// The wording is not a documented interface of the proxy, which is why the marker is
/// configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPredicate {
    marker: String,
    ignore_case: bool,
}

impl MarkerPredicate {
    pub const DEFAULT_MARKER: &'static str = "Ready for new connections";

    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            ignore_case: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.marker = self.marker.to_lowercase();
        self.ignore_case = true;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for MarkerPredicate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARKER)
    }
}

impl ReadinessPredicate for MarkerPredicate {
    fn is_ready(&self, line: &str) -> bool {
        if self.ignore_case {
            line.to_lowercase().contains(&self.marker)
        } else {
            line.contains(&self.marker)
        }
    }
}

/// Consume scanned output until `predicate` matches.
///
/// On match the readiness flag is raised and the channel is closed so the pumps stop
/// forwarding. Read errors and end of output before a match are fatal.
pub(crate) async fn detect_ready(
    lines: &mut mpsc::Receiver<LineEvent>,
    predicate: &dyn ReadinessPredicate,
    flag: &AtomicBool,
) -> Result<OutputLine, ExecError> {
    while let Some(event) = lines.recv().await {
        let line = event.map_err(ExecError::OutputStream)?;
        if predicate.is_ready(&line.text) {
            flag.store(true, Ordering::Release);
            lines.close();
            info!(stream = %line.stream, "proxy ready");
            return Ok(line);
        }
        debug!(stream = %line.stream, "waiting for readiness marker");
    }
    Err(ExecError::OutputClosed)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::proc::output::OutputStream;

    fn line(text: &str) -> LineEvent {
        Ok(OutputLine {
            stream: OutputStream::Stderr,
            text: text.to_string(),
        })
    }

    #[test]
    fn default_marker_matches_proxy_wording() {
        let p = MarkerPredicate::default();
        assert!(p.is_ready("2024/01/01 12:00:00 Ready for new connections"));
        assert!(!p.is_ready("Listening on 127.0.0.1:5800 for proj:region:db"));
        assert!(!p.is_ready("ready for new connections"));
    }

    #[test]
    fn ignore_case_marker() {
        let p = MarkerPredicate::default().ignore_case();
        assert!(p.is_ready("The proxy has started successfully and is ready for new connections!"));
    }

    #[test]
    fn closures_are_predicates() {
        let p = |line: &str| line.starts_with("OK");
        assert!(ReadinessPredicate::is_ready(&p, "OK go"));
        assert!(!ReadinessPredicate::is_ready(&p, "not OK"));
    }

    #[tokio::test]
    async fn sets_flag_on_match_and_closes_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("starting")).await.unwrap();
        tx.send(line("Ready for new connections")).await.unwrap();
        let flag = AtomicBool::new(false);

        let got = detect_ready(&mut rx, &MarkerPredicate::default(), &flag).await.unwrap();
        assert_eq!(got.text, "Ready for new connections");
        assert!(flag.load(Ordering::Acquire));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn read_error_is_fatal() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("starting")).await.unwrap();
        tx.send(Err(io::Error::other("pipe broke"))).await.unwrap();
        let flag = AtomicBool::new(false);

        let err = detect_ready(&mut rx, &MarkerPredicate::default(), &flag).await.unwrap_err();
        assert!(matches!(err, ExecError::OutputStream(_)));
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn end_of_output_without_marker() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(line("dialing")).await.unwrap();
        drop(tx);
        let flag = AtomicBool::new(false);

        let err = detect_ready(&mut rx, &MarkerPredicate::default(), &flag).await.unwrap_err();
        assert!(matches!(err, ExecError::OutputClosed));
    }
}
