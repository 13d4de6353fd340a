use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt, core::ObjectMeta};

use crate::config::IngressConfig;

use super::key::ResourceKey;

pub const PARENT_API_VERSION: &str = "v1";
pub const PARENT_KIND: &str = "Service";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const PATH_TYPE_PREFIX: &str = "Prefix";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("service {0}: no ports declared")]
    NoPorts(ResourceKey),
    #[error("service {0}: name and uid are required for an owner reference")]
    MissingOwnerIdentity(ResourceKey),
}

/// Render the Ingress that exposes `svc` at `http://<host>/<svc name>`.
///
/// The Ingress shares the Service's namespace and name, is controlled by the
/// Service, and routes prefix `/<name>` to the Service's first declared port.
pub fn build_ingress(
    svc: &Service,
    cfg: &IngressConfig,
) -> Result<Ingress, BuildError> {
    let name = svc.name_any();
    let namespace = svc.namespace();
    let key = ResourceKey::new(namespace.clone().unwrap_or_default(), &name);

    let port = svc
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|p| p.port)
        .ok_or_else(|| BuildError::NoPorts(key.clone()))?;
    let mut owner = svc
        .controller_owner_ref(&())
        .ok_or(BuildError::MissingOwnerIdentity(key))?;
    // foreground deletion of the Service waits for the Ingress
    owner.block_owner_deletion = Some(true);

    let path = HTTPIngressPath {
        path: Some(format!("/{name}")),
        path_type: PATH_TYPE_PREFIX.to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: name.clone(),
                port: Some(ServiceBackendPort {
                    name: None,
                    number: Some(port),
                }),
            }),
            ..Default::default()
        },
    };

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(name),
            namespace,
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                cfg.field_manager.clone(),
            )])),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(cfg.class_name.clone()),
            rules: Some(vec![IngressRule {
                host: Some(cfg.host.clone()),
                http: Some(HTTPIngressRuleValue { paths: vec![path] }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// The owner reference flagged as controller, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.controller == Some(true))
}

pub fn is_parent_ref(owner: &OwnerReference) -> bool {
    owner.kind == PARENT_KIND && owner.api_version == PARENT_API_VERSION
}

/// Whether `ingress` is controlled by `svc`. UIDs are compared only when
/// both sides carry one, so a recreated Service does not adopt the
/// previous incarnation's Ingress.
pub fn is_controlled_by(ingress: &Ingress, svc: &Service) -> bool {
    let Some(owner) = controller_of(ingress) else {
        return false;
    };
    if !is_parent_ref(owner) || owner.name != svc.name_any() {
        return false;
    }
    match svc.uid() {
        Some(uid) if !owner.uid.is_empty() => owner.uid == uid,
        _ => true,
    }
}
