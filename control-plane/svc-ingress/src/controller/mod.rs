pub mod builder;
pub mod client;
pub mod errors;
pub mod informer;
pub mod key;
pub mod queue;
pub mod reconcile;
pub mod router;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Context;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    Client,
    api::Api,
    runtime::{WatchStreamExt, watcher},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ControllerConfig;

use self::client::{IngressApi, KubeIngressApi};
use self::errors::report_error;
use self::informer::Informer;
use self::queue::{ExponentialBackoff, WorkQueue};
use self::reconcile::ControllerContext;
use self::router::EventRouter;
use self::worker::WorkerPool;

/// The cache writers of a [`Controller`]. The caller drives them, so any
/// event source can feed the caches.
pub struct Informers {
    pub services: Informer<Service>,
    pub ingresses: Informer<Ingress>,
}

/// Wires caches, router, queue and workers together.
pub struct Controller {
    cfg: ControllerConfig,
    ctx: Arc<ControllerContext>,
    queue: WorkQueue<String>,
}

impl Controller {
    pub fn new(cfg: ControllerConfig, api: Arc<dyn IngressApi>) -> (Self, Informers) {
        let queue = WorkQueue::new(
            "services",
            ExponentialBackoff::new(
                cfg.backoff.base_delay(),
                cfg.backoff.max_delay(),
            ),
        );
        let router = Arc::new(EventRouter::new(
            queue.clone(),
            cfg.ingress.annotation.clone(),
            cfg.update_filter(),
        ));
        let informers = Informers {
            services: Informer::new("Service").with_handler(router.clone()),
            ingresses: Informer::new("Ingress").with_handler(router),
        };
        let ctx = Arc::new(ControllerContext {
            services: informers.services.store(),
            ingresses: informers.ingresses.store(),
            api,
            ingress: cfg.ingress.clone(),
        });
        (Self { cfg, ctx, queue }, informers)
    }

    pub fn queue(&self) -> WorkQueue<String> {
        self.queue.clone()
    }

    pub fn context(&self) -> Arc<ControllerContext> {
        self.ctx.clone()
    }

    /// Wait for both caches, then process keys until `stop` fires.
    pub async fn run(self, stop: CancellationToken) {
        let synced = async {
            self.ctx.services.wait_for_sync().await?;
            self.ctx.ingresses.wait_for_sync().await
        };
        tokio::select! {
            _ = stop.cancelled() => {
                info!("stopped before caches synced");
                self.queue.shut_down();
                return;
            }
            res = synced => {
                if let Err(e) = res {
                    report_error("caches never synced", &e);
                    self.queue.shut_down();
                    return;
                }
            }
        }
        info!(
            workers = self.cfg.workers,
            max_retry = self.cfg.max_retry,
            filter = %self.cfg.update_filter(),
            "caches synced; starting workers"
        );
        WorkerPool::new(
            self.ctx.clone(),
            self.queue.clone(),
            self.cfg.workers,
            self.cfg.max_retry,
        )
        .run(stop)
        .await;
    }
}

pub async fn run_controller(
    client: Client,
    cfg: ControllerConfig,
    stop: CancellationToken,
) -> anyhow::Result<()> {
    let api = Arc::new(KubeIngressApi::new(
        client.clone(),
        cfg.ingress.field_manager.clone(),
        cfg.call_timeout(),
    ));
    let (services, ingresses): (Api<Service>, Api<Ingress>) =
        match cfg.watch_namespace.as_deref() {
            Some(ns) => {
                (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns))
            }
            None => (Api::all(client.clone()), Api::all(client)),
        };
    info!(namespace = ?cfg.watch_namespace, annotation = %cfg.ingress.annotation, "starting controller");

    let (controller, informers) = Controller::new(cfg, api);
    // cancelled only after the workers have drained
    let watches = CancellationToken::new();
    let svc_task = tokio::spawn(informers.services.run(
        watcher(services, watcher::Config::default()).default_backoff(),
        watches.clone(),
    ));
    let ing_task = tokio::spawn(informers.ingresses.run(
        watcher(ingresses, watcher::Config::default()).default_backoff(),
        watches.clone(),
    ));

    controller.run(stop).await;
    watches.cancel();
    let (svc_res, ing_res) = tokio::join!(svc_task, ing_task);
    svc_res.context("service informer panicked")?;
    ing_res.context("ingress informer panicked")?;
    Ok(())
}
