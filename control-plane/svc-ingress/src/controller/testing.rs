use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    ResourceExt,
    core::ObjectMeta,
    runtime::{reflector::{self, store::Writer}, watcher},
};

use crate::config::IngressConfig;

use super::builder::build_ingress;
use super::client::{ApiError, IngressApi};
use super::key::ResourceKey;
use super::reconcile::ControllerContext;
use super::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKey),
    Delete(ResourceKey),
}

/// Records every call; succeeds unless a failure was scripted.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    created: Mutex<Vec<Ingress>>,
    create_failures: Mutex<VecDeque<ApiError>>,
    delete_failures: Mutex<VecDeque<ApiError>>,
}

impl RecordingApi {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<Ingress> {
        self.created.lock().unwrap().clone()
    }

    pub fn fail_next_create(&self, err: ApiError) {
        self.create_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_delete(&self, err: ApiError) {
        self.delete_failures.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl IngressApi for RecordingApi {
    async fn create(&self, ingress: &Ingress) -> Result<(), ApiError> {
        let key = ResourceKey::new(
            ingress.namespace().unwrap_or_default(),
            ingress.name_any(),
        );
        self.calls.lock().unwrap().push(Call::Create(key));
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.created.lock().unwrap().push(ingress.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(ResourceKey::new(namespace, name)));
        match self.delete_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn service(ns: &str, name: &str, ports: &[i32], annotated: bool) -> Service {
    let annotations = annotated
        .then(|| BTreeMap::from([("ingress/http".to_string(), String::new())]));
    Service {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(ns.into()),
            uid: Some(format!("uid-{ns}-{name}")),
            annotations,
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|p| ServicePort {
                        port: *p,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn owned_ingress(svc: &Service) -> Ingress {
    let mut with_port = svc.clone();
    if let Some(spec) = with_port.spec.as_mut() {
        if spec.ports.as_ref().is_none_or(|p| p.is_empty()) {
            spec.ports = Some(vec![ServicePort {
                port: 80,
                ..Default::default()
            }]);
        }
    }
    build_ingress(&with_port, &IngressConfig::default()).unwrap()
}

/// Controller context whose stores are fed directly through reflector
/// writers.
pub struct Fixture {
    pub api: Arc<RecordingApi>,
    pub ctx: Arc<ControllerContext>,
    services: Writer<Service>,
    ingresses: Writer<Ingress>,
}

impl Fixture {
    /// Both stores listed and empty.
    pub fn synced() -> Self {
        let mut fx = Self::unsynced();
        fx.services.apply_watcher_event(&watcher::Event::Init);
        fx.services.apply_watcher_event(&watcher::Event::InitDone);
        fx.ingresses.apply_watcher_event(&watcher::Event::Init);
        fx.ingresses.apply_watcher_event(&watcher::Event::InitDone);
        fx
    }

    pub fn unsynced() -> Self {
        let api = Arc::new(RecordingApi::default());
        let (svc_reader, services) = reflector::store();
        let (ing_reader, ingresses) = reflector::store();
        let ctx = Arc::new(ControllerContext {
            services: ObjectStore::new(svc_reader),
            ingresses: ObjectStore::new(ing_reader),
            api: api.clone(),
            ingress: IngressConfig::default(),
        });
        Self {
            api,
            ctx,
            services,
            ingresses,
        }
    }

    pub fn put_service(&mut self, svc: Service) {
        self.services.apply_watcher_event(&watcher::Event::Apply(svc));
    }

    pub fn put_ingress(&mut self, ing: Ingress) {
        self.ingresses.apply_watcher_event(&watcher::Event::Apply(ing));
    }

    pub fn remove_ingress(&mut self, ing: Ingress) {
        self.ingresses.apply_watcher_event(&watcher::Event::Delete(ing));
    }
}
