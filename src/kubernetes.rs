use crate::error::{Error, Result};
use crate::types::{ResolvedEndpoints, Trigger};
use futures::{TryStreamExt, stream::StreamExt};
use k8s_openapi::api::core::v1::{Endpoints, ObjectReference};
use kube::runtime::watcher::{Config as WatcherConfig, Event, watcher};
use kube::{Api, Client, config};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Build a client either from an explicit API server URL or a kubeconfig context.
pub async fn initialize_client(apiserver: &str, context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(ctx) => {
            let config = config::Config::from_kubeconfig(&config::KubeConfigOptions {
                context: Some(ctx.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Client(format!("Context '{}' not found in kubeconfig: {}", ctx, e)))?;
            info!("Using kubeconfig context: {}", ctx);
            config
        }
        None => {
            let url = apiserver
                .parse::<http::Uri>()
                .map_err(|e| Error::Client(format!("Invalid API server url '{}': {}", apiserver, e)))?;
            info!("Using API server: {}", apiserver);
            config::Config::new(url)
        }
    };
    Client::try_from(config).map_err(|e| Error::Client(e.to_string()))
}

/// GET /api/v1/namespaces/{namespace}/endpoints/{name}
pub async fn fetch_endpoints(client: &Client, namespace: &str, name: &str) -> Result<Endpoints> {
    let api: Api<Endpoints> = Api::namespaced(client.clone(), namespace);
    let endpoints = api.get(name).await?;
    Ok(endpoints)
}

/// Map the ready addresses of the first subset to their pod references.
///
/// Only the first subset and its first port are looked at. A later address
/// with the same IP replaces an earlier one; addresses without a target
/// reference are dropped.
pub fn resolve(endpoints: &Endpoints) -> Result<ResolvedEndpoints> {
    let subset = endpoints
        .subsets
        .as_ref()
        .and_then(|subsets| subsets.first())
        .ok_or_else(|| Error::NoEndpoints("endpoints object has no subsets".to_string()))?;

    let addresses = subset
        .addresses
        .as_deref()
        .filter(|addrs| !addrs.is_empty())
        .ok_or_else(|| Error::NoEndpoints("first subset has no addresses".to_string()))?;

    let port = subset
        .ports
        .as_ref()
        .and_then(|ports| ports.first())
        .map(|p| p.port)
        .ok_or_else(|| Error::NoEndpoints("first subset has no ports".to_string()))?;

    let mut by_ip: BTreeMap<String, Option<ObjectReference>> = BTreeMap::new();
    for addr in addresses {
        by_ip.insert(addr.ip.clone(), addr.target_ref.clone());
    }

    let mut pods = BTreeMap::new();
    for (ip, target_ref) in by_ip {
        match target_ref {
            Some(r) => {
                pods.insert(ip, r);
            }
            None => debug!("Object reference for {} is nil, skip this pod", ip),
        }
    }

    Ok(ResolvedEndpoints { pods, port })
}

/// Send a trigger on every change to the named endpoints object.
pub async fn watch_endpoints(
    client: Client,
    namespace: String,
    name: String,
    tx: mpsc::Sender<Trigger>,
) -> anyhow::Result<()> {
    let api: Api<Endpoints> = Api::namespaced(client, &namespace);
    let field_selector = format!("metadata.name={}", name);
    let cfg = WatcherConfig::default().fields(&field_selector);

    let mut stream = watcher(api, cfg).boxed();
    while let Some(event) = stream.try_next().await? {
        match event {
            Event::Apply(_) | Event::Delete(_) => {
                debug!("[{}/{}] Endpoints changed", namespace, name);
                if tx.send(Trigger::EndpointsChanged).await.is_err() {
                    return Ok(());
                }
            }
            Event::Init => {
                debug!("[{}/{}] Initializing endpoints watcher", namespace, name);
            }
            Event::InitApply(_) => {}
            Event::InitDone => {
                info!("[{}/{}] Endpoints watcher ready", namespace, name);
            }
        }
    }
    Ok(())
}
