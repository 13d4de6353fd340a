#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{ResourceExt, core::ObjectMeta, runtime::watcher};
use svc_ingress::config::{BackoffConfig, ControllerConfig};
use svc_ingress::controller::Controller;
use svc_ingress::controller::client::{ApiError, IngressApi};
use svc_ingress::controller::key::ResourceKey;
use svc_ingress::controller::queue::WorkQueue;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

pub const ANNOTATION: &str = "ingress/http";

pub type WatchTx<K> = UnboundedSender<Result<watcher::Event<K>, watcher::Error>>;

/// In-memory Ingress API. Every successful write is echoed back as a watch
/// event, the way the API server would deliver it to the controller.
pub struct FakeCluster {
    ingresses: Mutex<HashMap<ResourceKey, Ingress>>,
    creates: Mutex<u32>,
    deletes: Mutex<u32>,
    failing_creates: Mutex<u32>,
    events: WatchTx<Ingress>,
}

impl FakeCluster {
    pub fn new(events: WatchTx<Ingress>) -> Self {
        Self {
            ingresses: Mutex::new(HashMap::new()),
            creates: Mutex::new(0),
            deletes: Mutex::new(0),
            failing_creates: Mutex::new(0),
            events,
        }
    }

    pub fn ingress(&self, ns: &str, name: &str) -> Option<Ingress> {
        self.ingresses
            .lock()
            .unwrap()
            .get(&ResourceKey::new(ns, name))
            .cloned()
    }

    pub fn create_calls(&self) -> u32 {
        *self.creates.lock().unwrap()
    }

    pub fn delete_calls(&self) -> u32 {
        *self.deletes.lock().unwrap()
    }

    /// Fail the next `n` create calls with a timeout.
    pub fn fail_creates(&self, n: u32) {
        *self.failing_creates.lock().unwrap() = n;
    }

    /// Seed an object that exists before the controller starts. It reaches
    /// the cache only through [`Harness::initial_sync`].
    pub fn insert(&self, ingress: Ingress) {
        let key = ResourceKey::new(ingress.namespace().unwrap_or_default(), ingress.name_any());
        self.ingresses.lock().unwrap().insert(key, ingress);
    }

    /// Create behind the controller's back.
    pub fn create_externally(&self, ingress: Ingress) {
        self.insert(ingress.clone());
        let _ = self.events.send(Ok(watcher::Event::Apply(ingress)));
    }

    /// Delete behind the controller's back.
    pub fn delete_externally(&self, ns: &str, name: &str) {
        let removed = self
            .ingresses
            .lock()
            .unwrap()
            .remove(&ResourceKey::new(ns, name));
        if let Some(ing) = removed {
            let _ = self.events.send(Ok(watcher::Event::Delete(ing)));
        }
    }
}

#[async_trait]
impl IngressApi for FakeCluster {
    async fn create(&self, ingress: &Ingress) -> Result<(), ApiError> {
        *self.creates.lock().unwrap() += 1;
        {
            let mut failing = self.failing_creates.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(ApiError::Timeout(Duration::from_millis(1)));
            }
        }
        let key = ResourceKey::new(ingress.namespace().unwrap_or_default(), ingress.name_any());
        {
            let mut map = self.ingresses.lock().unwrap();
            if map.contains_key(&key) {
                return Err(ApiError::AlreadyExists(key));
            }
            map.insert(key, ingress.clone());
        }
        let _ = self.events.send(Ok(watcher::Event::Apply(ingress.clone())));
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        *self.deletes.lock().unwrap() += 1;
        let key = ResourceKey::new(namespace, name);
        let removed = self.ingresses.lock().unwrap().remove(&key);
        match removed {
            Some(ing) => {
                let _ = self.events.send(Ok(watcher::Event::Delete(ing)));
                Ok(())
            }
            None => Err(ApiError::NotFound(key)),
        }
    }
}

/// A controller driven by channels instead of real watches.
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub queue: WorkQueue<String>,
    pub stop: CancellationToken,
    services: WatchTx<Service>,
    ingresses: WatchTx<Ingress>,
    informers: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    controller: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn start(cfg: ControllerConfig) -> Self {
        let (svc_tx, svc_rx) = unbounded_channel();
        let (ing_tx, ing_rx) = unbounded_channel();
        let cluster = Arc::new(FakeCluster::new(ing_tx.clone()));
        let (controller, caches) = Controller::new(cfg, cluster.clone());
        let queue = controller.queue();

        let informers = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(
                caches
                    .services
                    .run(UnboundedReceiverStream::new(svc_rx), informers.clone()),
            ),
            tokio::spawn(
                caches
                    .ingresses
                    .run(UnboundedReceiverStream::new(ing_rx), informers.clone()),
            ),
        ];
        let stop = CancellationToken::new();
        let handle = tokio::spawn(controller.run(stop.clone()));

        Self {
            cluster,
            queue,
            stop,
            services: svc_tx,
            ingresses: ing_tx,
            informers,
            tasks,
            controller: Some(handle),
        }
    }

    /// Deliver the initial listing of both kinds.
    pub fn initial_sync(&self, services: Vec<Service>, ingresses: Vec<Ingress>) {
        let _ = self.services.send(Ok(watcher::Event::Init));
        for svc in services {
            let _ = self.services.send(Ok(watcher::Event::InitApply(svc)));
        }
        let _ = self.services.send(Ok(watcher::Event::InitDone));

        let _ = self.ingresses.send(Ok(watcher::Event::Init));
        for ing in ingresses {
            let _ = self.ingresses.send(Ok(watcher::Event::InitApply(ing)));
        }
        let _ = self.ingresses.send(Ok(watcher::Event::InitDone));
    }

    pub fn apply_service(&self, svc: Service) {
        let _ = self.services.send(Ok(watcher::Event::Apply(svc)));
    }

    /// Cancel the controller and wait for it to return.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.controller.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("controller did not stop in time")
                .expect("controller task panicked");
        }
        self.informers.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        backoff: BackoffConfig {
            base_delay_ms: 1,
            max_delay_secs: 1,
        },
        ..Default::default()
    }
}

pub fn service(ns: &str, name: &str, port: i32, annotated: bool) -> Service {
    let annotations =
        annotated.then(|| BTreeMap::from([(ANNOTATION.to_string(), "true".to_string())]));
    Service {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(ns.into()),
            uid: Some(format!("{ns}-{name}-uid")),
            annotations,
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".into()),
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Poll `check` until it holds, panicking after ~2s.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
