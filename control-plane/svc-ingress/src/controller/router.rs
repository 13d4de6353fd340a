use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use tracing::trace;

use super::builder::{controller_of, is_parent_ref};
use super::errors::report_error;
use super::informer::{EventHandler, ResourceEvent};
use super::key::ResourceKey;
use super::queue::WorkQueue;
use super::reconcile::has_marker;
use super::types::UpdateFilter;

/// Cache events of every watched kind, resolved once at the router.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    Service(ResourceEvent<Service>),
    Ingress(ResourceEvent<Ingress>),
}

/// Turns cache events into queue keys, dropping the ones that cannot
/// change a sync decision.
pub struct EventRouter {
    queue: WorkQueue<String>,
    annotation: String,
    filter: UpdateFilter,
}

impl EventRouter {
    pub fn new(
        queue: WorkQueue<String>,
        annotation: impl Into<String>,
        filter: UpdateFilter,
    ) -> Self {
        Self {
            queue,
            annotation: annotation.into(),
            filter,
        }
    }

    pub fn route(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::Service(ResourceEvent::Added(svc)) => {
                self.on_parent_added(&svc)
            }
            ClusterEvent::Service(ResourceEvent::Updated { old, new }) => {
                self.on_parent_updated(&old, &new)
            }
            // owner-reference GC removes the ingress; its delete event follows
            ClusterEvent::Service(ResourceEvent::Deleted(_)) => {}
            ClusterEvent::Ingress(ResourceEvent::Added(ing)) => {
                self.on_child_changed(None, &ing)
            }
            ClusterEvent::Ingress(ResourceEvent::Updated { old, new }) => {
                self.on_child_changed(Some(&old), &new)
            }
            ClusterEvent::Ingress(ResourceEvent::Deleted(ing)) => {
                self.on_child_deleted(&ing)
            }
        }
    }

    pub fn on_parent_added(&self, svc: &Service) {
        self.enqueue(svc);
    }

    pub fn on_parent_updated(&self, old: &Service, new: &Service) {
        let changed = match self.filter {
            UpdateFilter::Full => old != new,
            UpdateFilter::Relevant => {
                self.relevant_view(old) != self.relevant_view(new)
            }
        };
        if !changed {
            trace!(name = ?new.meta().name, "service update is irrelevant; skipping");
            return;
        }
        self.enqueue(new);
    }

    /// Enqueue the owning Service when a Service-controlled Ingress shows
    /// up or changes. An Ingress that reaches the cache after its Service
    /// stopped wanting it is removed this way.
    pub fn on_child_changed(&self, old: Option<&Ingress>, new: &Ingress) {
        if service_controlled(new) || old.is_some_and(service_controlled) {
            self.enqueue(new);
        } else {
            trace!(name = ?new.meta().name, "ingress not controlled by a service; ignoring");
        }
    }

    /// Enqueue the owning Service when a Service-controlled Ingress is
    /// deleted. Ingress and Service share namespace and name.
    pub fn on_child_deleted(&self, ing: &Ingress) {
        if service_controlled(ing) {
            self.enqueue(ing);
        } else {
            trace!(name = ?ing.meta().name, "deleted ingress not controlled by a service; ignoring");
        }
    }

    fn enqueue<K: Resource>(&self, obj: &K) {
        match ResourceKey::for_object(obj) {
            Ok(key) => self.queue.add(key.to_string()),
            Err(e) => report_error("dropping event for object without a key", &e),
        }
    }

    fn relevant_view(&self, svc: &Service) -> (bool, Vec<i32>) {
        let ports = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .map(|ports| ports.iter().map(|p| p.port).collect())
            .unwrap_or_default();
        (has_marker(svc, &self.annotation), ports)
    }
}

fn service_controlled(ing: &Ingress) -> bool {
    controller_of(ing).is_some_and(is_parent_ref)
}

impl EventHandler<Service> for EventRouter {
    fn on_event(&self, event: ResourceEvent<Service>) {
        self.route(ClusterEvent::Service(event));
    }
}

impl EventHandler<Ingress> for EventRouter {
    fn on_event(&self, event: ResourceEvent<Ingress>) {
        self.route(ClusterEvent::Ingress(event));
    }
}
