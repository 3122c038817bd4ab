use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{DeleteParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{DeleteOutcome, EventRecord, NamespaceScope, PodPhase, PodRef};
use crate::utils::{is_not_found, to_utc};

const PENDING_SELECTOR: &str = "status.phase=Pending";

/// The three cluster capabilities the remediator depends on.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Pods in scope. Implementations should narrow to Pending server-side but
    /// callers must not rely on it.
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodRef>>;

    async fn list_events(&self, pod: &PodRef) -> Result<Vec<EventRecord>>;

    async fn delete_pod(&self, pod: &PodRef) -> Result<DeleteOutcome>;
}

/// How the client authenticates to the API server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// kubeconfig if present, otherwise in-cluster.
    #[default]
    Infer,
    InCluster,
    Kubeconfig {
        path: Option<PathBuf>,
        context: Option<String>,
    },
}

pub async fn build_client(auth: &AuthMode) -> Result<Client> {
    let config = match auth {
        AuthMode::Infer => Config::infer()
            .await
            .map_err(|e| Error::Connectivity(format!("could not infer cluster config: {}", e)))?,
        AuthMode::InCluster => Config::incluster()
            .map_err(|e| Error::Connectivity(format!("in-cluster config unavailable: {}", e)))?,
        AuthMode::Kubeconfig { path, context } => {
            let options = KubeConfigOptions {
                context: context.clone(),
                ..Default::default()
            };
            let kubeconfig = match path {
                Some(p) => Kubeconfig::read_from(p).map_err(|e| {
                    Error::Connectivity(format!("could not read kubeconfig {}: {}", p.display(), e))
                })?,
                None => Kubeconfig::read()
                    .map_err(|e| Error::Connectivity(format!("could not read kubeconfig: {}", e)))?,
            };
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::Connectivity(format!("invalid kubeconfig: {}", e)))?
        }
    };
    info!("Connecting to cluster at {}", config.cluster_url);
    Client::try_from(config).map_err(|e| Error::Connectivity(e.to_string()))
}

pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_pods_in(&self, api: Api<Pod>) -> Result<Vec<PodRef>> {
        let lp = ListParams::default().fields(PENDING_SELECTOR);
        let pods = api
            .list(&lp)
            .await
            .map_err(|e| Error::Connectivity(e.to_string()))?;
        Ok(pods.items.iter().map(pod_ref).collect())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodRef>> {
        match scope {
            NamespaceScope::All => self.list_pods_in(Api::all(self.client.clone())).await,
            NamespaceScope::Only(namespaces) => {
                let mut pods = Vec::new();
                for ns in namespaces {
                    let api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
                    pods.extend(self.list_pods_in(api).await?);
                }
                Ok(pods)
            }
        }
    }

    async fn list_events(&self, pod: &PodRef) -> Result<Vec<EventRecord>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &pod.namespace);
        let lp = ListParams::default().fields(&format!(
            "involvedObject.kind=Pod,involvedObject.name={}",
            pod.name
        ));
        let events = api.list(&lp).await.map_err(|e| Error::EventQuery {
            pod: pod.to_string(),
            message: e.to_string(),
        })?;
        debug!("[{}] {} event(s)", pod, events.items.len());
        Ok(events.items.iter().map(event_record).collect())
    }

    async fn delete_pod(&self, pod: &PodRef) -> Result<DeleteOutcome> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        match api.delete(&pod.name, &DeleteParams::default()).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(Error::Deletion {
                pod: pod.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn pod_ref(pod: &Pod) -> PodRef {
    PodRef {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
        uid: pod.uid(),
        phase: PodPhase::from_status(pod.status.as_ref().and_then(|s| s.phase.as_deref())),
    }
}

fn event_record(event: &Event) -> EventRecord {
    let involved = &event.involved_object;
    // Same precedence kubectl uses when printing LAST SEEN.
    let last_timestamp = event
        .last_timestamp
        .as_ref()
        .and_then(to_utc)
        .or_else(|| event.event_time.as_ref().and_then(to_utc))
        .or_else(|| event.first_timestamp.as_ref().and_then(to_utc))
        .or_else(|| event.metadata.creation_timestamp.as_ref().and_then(to_utc));

    EventRecord {
        namespace: involved
            .namespace
            .clone()
            .or_else(|| event.namespace())
            .unwrap_or_default(),
        pod_name: involved.name.clone().unwrap_or_default(),
        pod_uid: involved.uid.clone(),
        reason: event.reason.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        type_: event.type_.clone(),
        count: event.count,
        last_timestamp,
    }
}
