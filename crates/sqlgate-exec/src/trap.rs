//! Operator interrupt handling.
//!
//! The trap must be installed before the proxy is spawned: the proxy runs in its own process
//! group, so a terminal Ctrl-C reaches only this process and teardown is the sole way the proxy
//! learns about it.
use std::fmt;

use tracing::{debug, warn};

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapSignal {
    Interrupt,
    Terminate,
}

impl TrapSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            TrapSignal::Interrupt => "SIGINT",
            TrapSignal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for TrapSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use tokio::signal::unix::{Signal, SignalKind, signal};

        pub struct SignalTrap {
            interrupt: Signal,
            terminate: Signal,
        }

        impl SignalTrap {
            pub fn install() -> Result<Self, ExecError> {
                let interrupt = signal(SignalKind::interrupt()).map_err(ExecError::SignalInstall)?;
                let terminate = signal(SignalKind::terminate()).map_err(ExecError::SignalInstall)?;
                debug!("signal trap installed (SIGINT, SIGTERM)");
                Ok(Self { interrupt, terminate })
            }

            /// Resolves on the first SIGINT or SIGTERM delivered after installation.
            pub async fn recv(&mut self) -> TrapSignal {
                let signal = tokio::select! {
                    _ = self.interrupt.recv() => TrapSignal::Interrupt,
                    _ = self.terminate.recv() => TrapSignal::Terminate,
                };
                warn!(%signal, "termination signal received");
                signal
            }
        }
    } else {
        pub struct SignalTrap {
            _priv: (),
        }

        impl SignalTrap {
            pub fn install() -> Result<Self, ExecError> {
                debug!("signal trap installed (ctrl-c)");
                Ok(Self { _priv: () })
            }

            pub async fn recv(&mut self) -> TrapSignal {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "ctrl-c listener failed; treating as interrupt");
                }
                warn!("termination signal received");
                TrapSignal::Interrupt
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(TrapSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(TrapSignal::Terminate.as_str(), "SIGTERM");
    }

    #[tokio::test]
    async fn install_succeeds_inside_runtime() {
        let trap = SignalTrap::install();
        assert!(trap.is_ok());
    }
}
