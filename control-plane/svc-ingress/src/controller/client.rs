use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    Client, ResourceExt,
    api::{Api, DeleteParams, PostParams},
};
use tracing::trace;

use super::key::ResourceKey;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("ingress {0} already exists")]
    AlreadyExists(ResourceKey),
    #[error("ingress {0} not found")]
    NotFound(ResourceKey),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("kube api error: {0}")]
    Kube(#[source] kube::Error),
}

impl ApiError {
    /// Separate the outcomes a reconciler can treat as already satisfied
    /// from generic failures.
    pub fn classify(key: ResourceKey, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref ae)
                if ae.code == 409 && ae.reason == "AlreadyExists" =>
            {
                ApiError::AlreadyExists(key)
            }
            kube::Error::Api(ref ae) if ae.code == 404 => ApiError::NotFound(key),
            other => ApiError::Kube(other),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ApiError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Write access to Ingresses. Reads come from the local cache instead.
#[async_trait]
pub trait IngressApi: Send + Sync {
    async fn create(&self, ingress: &Ingress) -> Result<(), ApiError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError>;
}

pub struct KubeIngressApi {
    client: Client,
    field_manager: String,
    timeout: Duration,
}

impl KubeIngressApi {
    pub fn new(
        client: Client,
        field_manager: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, key: &ResourceKey, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(res) => res.map_err(|e| ApiError::classify(key.clone(), e)),
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl IngressApi for KubeIngressApi {
    async fn create(&self, ingress: &Ingress) -> Result<(), ApiError> {
        let ns = ingress.namespace().unwrap_or_default();
        let key = ResourceKey::new(&ns, ingress.name_any());
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &ns);
        let pp = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        trace!(%key, "POST ingress");
        self.bounded(&key, api.create(&pp, ingress)).await.map(|_| ())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let key = ResourceKey::new(namespace, name);
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        trace!(%key, "DELETE ingress");
        self.bounded(&key, api.delete(name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }
}
