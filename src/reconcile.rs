use crate::agent::StatusProbe;
use crate::error::Error;
use crate::types::{PodState, ReconciliationResult, ResolvedEndpoints};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Ask every resolved agent for its stream and flag streams owned twice.
///
/// Up to `concurrency` queries run at once, but results are folded in IP
/// order, so the first claimant of a stream is always the lowest IP.
pub async fn reconcile(
    probe: &dyn StatusProbe,
    endpoints: &ResolvedEndpoints,
    concurrency: usize,
) -> ReconciliationResult {
    let port = endpoints.port;
    let replies: Vec<_> = stream::iter(endpoints.pods.iter())
        .map(|(ip, pod)| async move { (ip, pod, probe.status(ip, port).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    // stream ID -> IP of the first agent that claimed it
    let mut claims: HashMap<String, &str> = HashMap::new();
    let mut result = ReconciliationResult::new();

    for (ip, pod, reply) in replies {
        let name = pod.name.clone().unwrap_or_default();
        let status = match reply {
            Ok(status) => status,
            Err(Error::Decode(e)) => {
                warn!("Unmarshal status of {} ({}) failed: {}", name, ip, e);
                result.insert(name, PodState::StatusUnknown);
                continue;
            }
            Err(e) => {
                warn!("Cannot access Manifest Agent {} ({}): {}", name, ip, e);
                result.insert(name, PodState::Down);
                continue;
            }
        };

        if status.is_idle() {
            debug!("{} ({}) is idle", name, ip);
            result.insert(name, PodState::Idle);
            continue;
        }

        let stream_id = status.stream_id;
        match claims.get(&stream_id) {
            Some(first_ip) => {
                let first = endpoints
                    .pods
                    .get(*first_ip)
                    .and_then(|r| r.name.clone())
                    .unwrap_or_default();
                warn!(
                    "Multiple Manifest Agents own stream {}: {} and {}",
                    stream_id, name, first
                );
                result.insert(name, PodState::Duplicate(stream_id.clone()));
                result.insert(first, PodState::Duplicate(stream_id));
            }
            None => {
                claims.insert(stream_id.clone(), ip.as_str());
                result.insert(name, PodState::Owns(stream_id));
            }
        }
    }

    result
}

/// Streams claimed by more than one agent, with the claiming pods.
pub fn duplicates(result: &ReconciliationResult) -> Vec<(String, Vec<String>)> {
    let mut by_stream: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (pod, state) in result {
        if let PodState::Duplicate(stream) = state {
            by_stream.entry(stream).or_default().push(pod.clone());
        }
    }
    by_stream
        .into_iter()
        .map(|(stream, pods)| (stream.to_string(), pods))
        .collect()
}
