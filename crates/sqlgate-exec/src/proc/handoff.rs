use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::{
    error::ExecError,
    proc::{ProxyConfig, ProxyHandle, ProxyProcess},
    trap::TrapSignal,
};

/// Run `work` behind a ready proxy.
///
/// The proxy is spawned, `work` starts only after the readiness predicate matched, and the
/// whole session races `interrupt`. An unexpected proxy exit while `work` runs aborts it.
/// Whatever the route out (success, error, timeout, exit, interrupt), teardown runs exactly
/// once before returning; teardown failures are logged and never replace the outcome.
pub async fn supervise<T, E, I, W, Fut>(cfg: &ProxyConfig, interrupt: I, work: W) -> Result<T, E>
where
    E: From<ExecError>,
    I: Future<Output = TrapSignal>,
    W: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut proxy = ProxyProcess::spawn(cfg)?;
    let handle = proxy.handle();

    let outcome = tokio::select! {
        res = session(&mut proxy, work) => res,
        signal = interrupt => Err(ExecError::Interrupted(signal).into()),
    };

    teardown(&handle).await;
    drop(proxy);
    outcome
}

async fn session<T, E, W, Fut>(proxy: &mut ProxyProcess, work: W) -> Result<T, E>
where
    E: From<ExecError>,
    W: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    proxy.wait_ready().await?;
    let handle = proxy.handle();
    debug!(pid = handle.pid(), "handing off to work");

    tokio::select! {
        res = work() => res,
        outcome = handle.exited() => Err(ExecError::ProxyExited { status: outcome.to_string() }.into()),
    }
}

async fn teardown(handle: &ProxyHandle) {
    match handle.shutdown().await {
        Ok(()) => info!(pid = handle.pid(), "proxy teardown complete"),
        Err(e) => error!(pid = handle.pid(), error = %e, "proxy teardown failed"),
    }
    if handle.exit_outcome().is_none() {
        warn!(pid = handle.pid(), "proxy leader not reaped after teardown");
    }
}
