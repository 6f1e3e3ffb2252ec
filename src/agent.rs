use crate::error::{Error, Result};
use crate::types::AgentStatus;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Source of Manifest Agent status snapshots.
///
/// `Transport` means the agent could not be reached, `Decode` that it
/// answered with something other than a status document.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn status(&self, ip: &str, port: i32) -> Result<AgentStatus>;
}

/// Queries `http://{ip}:{port}/status` on each agent.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    client: reqwest::Client,
}

impl HttpStatusProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

/// IPv6 hosts are bracketed.
pub fn status_url(ip: &str, port: i32) -> String {
    match (ip.parse::<IpAddr>(), u16::try_from(port)) {
        (Ok(addr), Ok(port)) => format!("http://{}/status", SocketAddr::new(addr, port)),
        _ => format!("http://{}:{}/status", ip, port),
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn status(&self, ip: &str, port: i32) -> Result<AgentStatus> {
        let url = status_url(ip, port);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let code = resp.status();
        let body = resp.bytes().await?;
        if !code.is_success() {
            debug!("{} answered {}", url, code);
        }

        let status: AgentStatus = serde_json::from_slice(&body)?;
        debug!(
            "{}: stream={:?} isid={} polls_ok={} polls_failed={} active_recordings={}",
            ip,
            status.stream_id,
            status.isid,
            status.mpd_poll_success_count,
            status.mpd_poll_failure_count,
            status.active_recordings
        );
        Ok(status)
    }
}
