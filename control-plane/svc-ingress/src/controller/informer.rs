use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use kube::{
    Resource,
    runtime::{
        reflector::{self, ObjectRef, Store, store::Writer},
        watcher,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::errors::report_error;
use super::key::ResourceKey;
use super::store::ObjectStore;

/// Change notification emitted after the store has been updated.
#[derive(Debug, Clone)]
pub enum ResourceEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

pub trait EventHandler<K>: Send + Sync {
    fn on_event(&self, event: ResourceEvent<K>);
}

/// Feeds a reflector store from a watch stream and fans out change events.
pub struct Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: &'static str,
    writer: Writer<K>,
    reader: Store<K>,
    handlers: Vec<Arc<dyn EventHandler<K>>>,
    synced: bool,
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(kind: &'static str) -> Self {
        let (reader, writer) = reflector::store();
        Self {
            kind,
            writer,
            reader,
            handlers: Vec::new(),
            synced: false,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler<K>>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn store(&self) -> ObjectStore<K> {
        ObjectStore::new(self.reader.clone())
    }

    /// Drive the informer until the stream ends or `token` is cancelled.
    pub async fn run<S>(mut self, stream: S, token: CancellationToken)
    where
        S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send,
    {
        let mut stream = std::pin::pin!(stream);
        info!(kind = self.kind, "informer started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(kind = self.kind, "informer cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.apply(event),
                    Some(Err(e)) => {
                        warn!(kind = self.kind, error = %e, "watch error; stream will retry");
                    }
                    None => {
                        warn!(kind = self.kind, "watch stream ended");
                        break;
                    }
                },
            }
        }
    }

    pub fn apply(&mut self, event: watcher::Event<K>) {
        match &event {
            watcher::Event::Init => {
                debug!(kind = self.kind, "relist started");
                self.writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) => {
                if self.key_of(obj).is_some() {
                    self.writer.apply_watcher_event(&event);
                }
            }
            watcher::Event::InitDone => self.finish_relist(&event),
            watcher::Event::Apply(obj) => {
                if self.key_of(obj).is_none() {
                    return;
                }
                let oref = ObjectRef::from_obj(obj);
                let old = self.reader.get(&oref);
                self.writer.apply_watcher_event(&event);
                let new = self
                    .reader
                    .get(&oref)
                    .unwrap_or_else(|| Arc::new(obj.clone()));
                match old {
                    Some(old) => self.dispatch(ResourceEvent::Updated { old, new }),
                    None => self.dispatch(ResourceEvent::Added(new)),
                }
            }
            watcher::Event::Delete(obj) => {
                if let Some(key) = self.key_of(obj) {
                    self.writer.apply_watcher_event(&event);
                    trace!(kind = self.kind, %key, "removed from cache");
                    self.dispatch(ResourceEvent::Deleted(Arc::new(obj.clone())));
                }
            }
        }
    }

    // The writer swaps the relisted buffer in wholesale, so changes are
    // recovered by diffing the store around the swap.
    fn finish_relist(&mut self, event: &watcher::Event<K>) {
        let mut before = self.snapshot();
        self.writer.apply_watcher_event(event);
        let after = self.snapshot();

        for (oref, gone) in before.iter() {
            if !after.contains_key(oref) {
                self.dispatch(ResourceEvent::Deleted(gone.clone()));
            }
        }
        let count = after.len();
        for (oref, new) in after {
            match before.remove(&oref) {
                Some(old) => self.dispatch(ResourceEvent::Updated { old, new }),
                None => self.dispatch(ResourceEvent::Added(new)),
            }
        }
        if !self.synced {
            self.synced = true;
            info!(kind = self.kind, count, "initial sync complete");
        } else {
            debug!(kind = self.kind, count, "relist complete");
        }
    }

    fn snapshot(&self) -> HashMap<ObjectRef<K>, Arc<K>> {
        self.reader
            .state()
            .into_iter()
            .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
            .collect()
    }

    fn dispatch(&self, event: ResourceEvent<K>) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }

    fn key_of(&self, obj: &K) -> Option<ResourceKey> {
        match ResourceKey::for_object(obj) {
            Ok(key) => Some(key),
            Err(e) => {
                report_error("watch event carries an object without a key", &e);
                None
            }
        }
    }
}
