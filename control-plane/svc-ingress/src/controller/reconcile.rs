use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::config::IngressConfig;

use super::builder::{build_ingress, is_controlled_by};
use super::client::IngressApi;
use super::errors::ReconcileErr;
use super::key::ResourceKey;
use super::store::ObjectStore;

/// Everything a sync needs; built once at startup and shared by all workers.
pub struct ControllerContext {
    pub services: ObjectStore<Service>,
    pub ingresses: ObjectStore<Ingress>,
    pub api: Arc<dyn IngressApi>,
    pub ingress: IngressConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Delete,
    Noop,
    /// A same-named Ingress exists that this Service does not control.
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    ParentGone,
    InSync,
    Created,
    Deleted,
    /// The remote call raced with another actor and found the goal reached.
    AlreadySatisfied,
    Foreign,
}

pub fn has_marker(svc: &Service, annotation: &str) -> bool {
    svc.annotations().contains_key(annotation)
}

pub fn decide(
    wants_ingress: bool,
    observed: Option<&Ingress>,
    svc: &Service,
) -> Decision {
    match (wants_ingress, observed) {
        (true, None) => Decision::Create,
        (false, None) => Decision::Noop,
        (_, Some(ing)) if !is_controlled_by(ing, svc) => Decision::Foreign,
        (true, Some(_)) => Decision::Noop,
        (false, Some(_)) => Decision::Delete,
    }
}

#[instrument(skip_all, fields(key = %key))]
pub async fn sync(
    ctx: &ControllerContext,
    key: &str,
) -> Result<SyncOutcome, ReconcileErr> {
    let key: ResourceKey = key.parse()?;
    let (ns, name) = (&key.namespace, &key.name);

    let svc = match ctx.services.get(&key) {
        Ok(svc) => svc,
        Err(e) if e.is_not_found() => {
            debug!(%ns, %name, "sync: service gone; nothing to reconcile");
            return Ok(SyncOutcome::ParentGone);
        }
        Err(e) => return Err(e.into()),
    };
    let wants_ingress = has_marker(&svc, &ctx.ingress.annotation);

    let observed = match ctx.ingresses.get(&key) {
        Ok(ing) => Some(ing),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let decision = decide(wants_ingress, observed.as_deref(), &svc);
    debug!(%ns, %name, wants_ingress, has_ingress = observed.is_some(), ?decision, "sync: decided");

    let outcome = match decision {
        Decision::Create => {
            let ingress = build_ingress(&svc, &ctx.ingress)?;
            match ctx.api.create(&ingress).await {
                Ok(()) => {
                    info!(%ns, %name, host = %ctx.ingress.host, "sync: created ingress");
                    SyncOutcome::Created
                }
                Err(e) if e.is_already_exists() => {
                    debug!(%ns, %name, "sync: ingress already exists");
                    SyncOutcome::AlreadySatisfied
                }
                Err(e) => return Err(e.into()),
            }
        }
        Decision::Delete => match ctx.api.delete(ns, name).await {
            Ok(()) => {
                info!(%ns, %name, "sync: deleted ingress");
                SyncOutcome::Deleted
            }
            Err(e) if e.is_not_found() => {
                debug!(%ns, %name, "sync: ingress already gone");
                SyncOutcome::AlreadySatisfied
            }
            Err(e) => return Err(e.into()),
        },
        Decision::Noop => SyncOutcome::InSync,
        Decision::Foreign => {
            warn!(%ns, %name, "sync: ingress exists but is not controlled by this service; leaving it alone");
            SyncOutcome::Foreign
        }
    };
    Ok(outcome)
}
