use crate::agent::StatusProbe;
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::kubernetes::{fetch_endpoints, resolve};
use crate::reconcile::reconcile;
use crate::report::write_report;
use crate::types::{ReconciliationResult, Trigger};
use kube::Client;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Everything needed to run a reconciliation pass against one endpoints object.
pub struct Tracer {
    client: Client,
    probe: Arc<dyn StatusProbe>,
    namespace: String,
    endpoints: String,
    concurrency: usize,
}

impl Tracer {
    pub fn new(
        client: Client,
        probe: Arc<dyn StatusProbe>,
        namespace: String,
        endpoints: String,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            probe,
            namespace,
            endpoints,
            concurrency,
        }
    }

    /// Fetch the endpoints, then query every agent behind them.
    ///
    /// Nothing is carried over from earlier passes.
    pub async fn run_pass(&self) -> Result<ReconciliationResult> {
        let eps = fetch_endpoints(&self.client, &self.namespace, &self.endpoints).await?;
        let resolved = resolve(&eps)?;
        info!(
            "[{}/{}] Inspecting {} Manifest Agents on port {}",
            self.namespace,
            self.endpoints,
            resolved.pods.len(),
            resolved.port
        );
        Ok(reconcile(self.probe.as_ref(), &resolved, self.concurrency).await)
    }

    /// Run a pass per trigger until the channel closes or `shutdown` resolves.
    ///
    /// `shutdown` is polled across the whole loop, including while a pass is
    /// in flight. Triggers that pile up while a pass is running collapse into
    /// a single follow-up pass. A failed pass is logged and skipped.
    pub async fn run<W, S>(
        &self,
        mut triggers: mpsc::Receiver<Trigger>,
        shutdown: S,
        out: &mut W,
        format: OutputFormat,
        color: bool,
    ) -> anyhow::Result<()>
    where
        W: Write,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut rerun = false;
        loop {
            if !rerun {
                tokio::select! {
                    trigger = triggers.recv() => match trigger {
                        Some(trigger) => debug!("Pass triggered by {:?}", trigger),
                        None => {
                            debug!("All trigger sources closed");
                            break;
                        }
                    },
                    _ = &mut shutdown => {
                        info!("Interrupted, exiting");
                        break;
                    }
                }
            }

            let pass = tokio::select! {
                pass = self.run_pass() => pass,
                _ = &mut shutdown => {
                    info!("Interrupted during a pass, exiting");
                    break;
                }
            };
            match pass {
                Ok(result) => write_report(out, &result, format, color)?,
                Err(e) => error!("[{}/{}] {}", self.namespace, self.endpoints, e),
            }

            rerun = false;
            while triggers.try_recv().is_ok() {
                rerun = true;
            }
        }
        Ok(())
    }
}

/// Resolves on the first Ctrl-C.
///
/// If the signal handler cannot be installed this never resolves, and the
/// process keeps the default SIGINT behavior.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kubernetes::initialize_client;
    use crate::types::{AgentStatus, PodState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Every agent reports the same stream.
    struct SameStreamProbe {
        stream: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusProbe for SameStreamProbe {
        async fn status(&self, _ip: &str, port: i32) -> Result<AgentStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if port != 8080 {
                return Err(Error::Transport(format!("unexpected port {}", port)));
            }
            Ok(AgentStatus {
                stream_id: self.stream.to_string(),
                ..Default::default()
            })
        }
    }

    /// Takes far longer to answer than any test waits.
    struct StalledProbe;

    #[async_trait]
    impl StatusProbe for StalledProbe {
        async fn status(&self, _ip: &str, _port: i32) -> Result<AgentStatus> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentStatus::default())
        }
    }

    const EPS_PATH: &str = "/api/v1/namespaces/default/endpoints/manifest-agent";

    async fn api_server(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EPS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn two_agents() -> serde_json::Value {
        serde_json::json!({
            "kind": "Endpoints",
            "apiVersion": "v1",
            "metadata": {"name": "manifest-agent", "namespace": "default"},
            "subsets": [{
                "addresses": [
                    {"ip": "10.0.0.1", "targetRef": {"kind": "Pod", "namespace": "default", "name": "ma-1"}},
                    {"ip": "10.0.0.2", "targetRef": {"kind": "Pod", "namespace": "default", "name": "ma-2"}}
                ],
                "ports": [{"port": 8080}]
            }]
        })
    }

    async fn tracer(server: &MockServer, probe: Arc<dyn StatusProbe>) -> Tracer {
        let client = initialize_client(&server.uri(), None).await.unwrap();
        Tracer::new(
            client,
            probe,
            "default".to_string(),
            "manifest-agent".to_string(),
            1,
        )
    }

    fn probe(stream: &'static str) -> Arc<SameStreamProbe> {
        Arc::new(SameStreamProbe {
            stream,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_pass_flags_shared_stream() {
        let server = api_server(two_agents()).await;
        let tracer = tracer(&server, probe("s1")).await;

        let result = tracer.run_pass().await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["ma-1"], PodState::Duplicate("s1".to_string()));
        assert_eq!(result["ma-2"], PodState::Duplicate("s1".to_string()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"ma-1": "s1****", "ma-2": "s1****"}));
    }

    #[tokio::test]
    async fn test_pass_is_repeatable() {
        let server = api_server(two_agents()).await;
        let tracer = tracer(&server, probe("s1")).await;

        let first = tracer.run_pass().await.unwrap();
        let second = tracer.run_pass().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_pass_aborts_without_endpoints() {
        let server = api_server(serde_json::json!({
            "kind": "Endpoints",
            "apiVersion": "v1",
            "metadata": {"name": "manifest-agent"},
            "subsets": []
        }))
        .await;
        let probe = probe("s1");
        let tracer = tracer(&server, probe.clone()).await;

        let result = tracer.run_pass().await;

        assert!(matches!(result, Err(Error::NoEndpoints(_))));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_coalesces_pending_triggers() {
        let server = api_server(two_agents()).await;
        let probe = probe("");
        let tracer = tracer(&server, probe.clone()).await;

        let (tx, rx) = mpsc::channel(8);
        for _ in 0..3 {
            tx.send(Trigger::Tick).await.unwrap();
        }
        tx.send(Trigger::EndpointsChanged).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        tracer
            .run(rx, std::future::pending(), &mut out, OutputFormat::Json, false)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(" ================ ").count(), 2);
        assert!(text.contains("\"ma-1\": \"Idle\""));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_skips_failed_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EPS_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let tracer = tracer(&server, probe("s1")).await;

        let (tx, rx) = mpsc::channel(1);
        tx.send(Trigger::Tick).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        tracer
            .run(rx, std::future::pending(), &mut out, OutputFormat::Json, false)
            .await
            .unwrap();

        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_interrupted_mid_pass() {
        let server = api_server(two_agents()).await;
        let tracer = tracer(&server, Arc::new(StalledProbe)).await;

        let (tx, rx) = mpsc::channel(1);
        tx.send(Trigger::Tick).await.unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = stop_tx.send(());
        });
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let mut out = Vec::new();
        let finished = tokio::time::timeout(
            Duration::from_secs(10),
            tracer.run(rx, shutdown, &mut out, OutputFormat::Json, false),
        )
        .await;

        assert!(finished.is_ok());
        finished.unwrap().unwrap();
        assert!(out.is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_stops_when_interrupted_while_idle() {
        let server = api_server(two_agents()).await;
        let tracer = tracer(&server, probe("s1")).await;

        let (tx, rx) = mpsc::channel::<Trigger>(1);
        let shutdown = tokio::time::sleep(Duration::from_millis(100));

        let mut out = Vec::new();
        let finished = tokio::time::timeout(
            Duration::from_secs(10),
            tracer.run(rx, shutdown, &mut out, OutputFormat::Json, false),
        )
        .await;

        assert!(finished.is_ok());
        assert!(out.is_empty());
        drop(tx);
    }
}
