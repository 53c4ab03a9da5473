use std::{future::Future, path::PathBuf, sync::Arc};

use tracing::{debug, info};

use sqlgate_exec::{MarkerPredicate, ProxyConfig, TrapSignal, locate, supervise};
use sqlgate_migrate::{MigrationRunner, MigrationSet};
use sqlgate_model::{DatabaseTarget, Endpoint};

use crate::{config::RunConfig, error::RunError};

/// Locate the proxy, bring it up, apply pending migrations through it, tear it down.
///
/// Startup checks (proxy executable, migrations directory) run before anything is spawned.
/// `interrupt` should come from a signal trap installed before this call.
pub async fn run<I>(cfg: &RunConfig, interrupt: I) -> Result<u64, RunError>
where
    I: Future<Output = TrapSignal>,
{
    let program = locate(&cfg.tuning.proxy_binary)?;
    MigrationSet::ensure_dir(&cfg.tuning.migrations_dir)?;

    let endpoint = Endpoint::loopback(cfg.tuning.proxy_port);
    let target = DatabaseTarget::new(endpoint, &cfg.settings);
    let runner = MigrationRunner::new(&cfg.tuning.migrations_dir);
    let proxy = proxy_config(cfg, program);

    info!(
        instance = %cfg.settings.instance_id,
        %endpoint,
        program = %proxy.program.display(),
        "starting proxy"
    );
    debug!(?proxy, "proxy configuration");

    supervise(&proxy, interrupt, || async move {
        runner.run(&target).await.map_err(RunError::from)
    })
    .await
}

fn proxy_config(cfg: &RunConfig, program: PathBuf) -> ProxyConfig {
    let stream = cfg.tuning.ready_stream;
    ProxyConfig::new(program)
        .with_args(cfg.proxy_args())
        .with_ready_timeout(cfg.tuning.ready_timeout)
        .with_kill_grace(cfg.tuning.kill_grace)
        .with_streams(stream.scans_stdout(), stream.scans_stderr())
        .with_predicate(Arc::new(MarkerPredicate::new(cfg.tuning.ready_marker.clone())))
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        fs,
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
        time::Duration,
    };

    use sqlgate_model::{ReadyStream, Settings, Tuning};

    use super::*;

    struct Fixture {
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        /// Fake proxy: records its arguments, then runs `body`.
        fn proxy(&self, body: &str) -> PathBuf {
            let path = self.path("cloud_sql_proxy");
            let script = format!(
                "#!/bin/sh\necho \"$@\" > {}\n{body}\n",
                self.path("proxy.args").display()
            );
            fs::write(&path, script).unwrap();
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn migrations(&self) -> PathBuf {
            let dir = self.path("migrations");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("0001_init.sql"), "SELECT 1;").unwrap();
            dir
        }

        fn config(&self, proxy: &Path, migrations: PathBuf) -> RunConfig {
            RunConfig {
                settings: Settings {
                    credentials_file: self.path("sa.json"),
                    instance_id: "acme:europe-west1:orders".into(),
                    db_name: "orders".into(),
                    db_user: "app".into(),
                    db_password: "secret".into(),
                },
                tuning: Tuning {
                    proxy_binary: proxy.display().to_string(),
                    proxy_port: closed_port(),
                    ready_timeout: Duration::from_secs(5),
                    kill_grace: Duration::from_millis(300),
                    ready_stream: ReadyStream::Both,
                    migrations_dir: migrations,
                    ..Tuning::default()
                },
            }
        }

        fn proxy_ran(&self) -> bool {
            self.path("proxy.args").exists()
        }
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn never() -> impl Future<Output = TrapSignal> {
        std::future::pending()
    }

    #[tokio::test]
    async fn missing_proxy_executable() {
        let fx = Fixture::new();
        let cfg = fx.config(&fx.path("no_such_proxy"), fx.migrations());
        let err = run(&cfg, never()).await.unwrap_err();
        assert_eq!(err.kind(), "ExecutableNotFound");
    }

    #[tokio::test]
    async fn missing_migrations_directory_fails_before_spawn() {
        let fx = Fixture::new();
        let proxy = fx.proxy("echo 'Ready for new connections' >&2; exec sleep 30");
        let cfg = fx.config(&proxy, fx.path("migrations"));

        let err = run(&cfg, never()).await.unwrap_err();
        assert_eq!(err.kind(), "MissingMigrationsDirectory");
        assert!(!fx.proxy_ran(), "proxy must not start without migrations");
    }

    #[tokio::test]
    async fn ready_proxy_hands_off_to_migrations() {
        let fx = Fixture::new();
        let proxy = fx.proxy("echo 'Ready for new connections' >&2; exec sleep 30");
        let cfg = fx.config(&proxy, fx.migrations());

        // Nothing listens behind the fake proxy, so the handoff ends in a connection error.
        let err = run(&cfg, never()).await.unwrap_err();
        assert_eq!(err.kind(), "DatabaseConnectionError", "{err}");

        let args = fs::read_to_string(fx.path("proxy.args")).unwrap();
        assert_eq!(
            args.trim(),
            format!("-instances=acme:europe-west1:orders=tcp:{}", cfg.tuning.proxy_port)
        );
    }

    #[tokio::test]
    async fn silent_proxy_times_out() {
        let fx = Fixture::new();
        let proxy = fx.proxy("echo 'dialing' >&2; exec sleep 30");
        let mut cfg = fx.config(&proxy, fx.migrations());
        cfg.tuning.ready_timeout = Duration::from_secs(1);

        let err = run(&cfg, never()).await.unwrap_err();
        assert_eq!(err.kind(), "ReadinessTimeout");
    }

    #[tokio::test]
    async fn custom_marker_is_honoured() {
        let fx = Fixture::new();
        let proxy = fx.proxy("echo 'proxy is listening' >&2; exec sleep 30");
        let mut cfg = fx.config(&proxy, fx.migrations());
        cfg.tuning.ready_marker = "is listening".into();

        let err = run(&cfg, never()).await.unwrap_err();
        assert_eq!(err.kind(), "DatabaseConnectionError");
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_readiness() {
        let fx = Fixture::new();
        let proxy = fx.proxy("exec sleep 30");
        let mut cfg = fx.config(&proxy, fx.migrations());
        cfg.tuning.ready_timeout = Duration::from_secs(30);

        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            TrapSignal::Interrupt
        };
        let err = run(&cfg, interrupt).await.unwrap_err();
        assert_eq!(err.kind(), "Interrupted");
        assert_eq!(err.exit_code(), std::process::ExitCode::from(130));
    }

    #[tokio::test]
    async fn crashing_proxy_is_fatal() {
        let fx = Fixture::new();
        let proxy = fx.proxy("echo 'could not find default credentials' >&2; sleep 0.1; exit 1");
        let cfg = fx.config(&proxy, fx.migrations());

        let err = run(&cfg, never()).await.unwrap_err();
        assert!(
            matches!(err.kind(), "ProxyExited" | "OutputStreamError"),
            "unexpected: {err}"
        );
    }
}
