//! Network policy controller watch index
//!
//! Kubernetes watches deliver the current state of each object; the controller reasons about
//! transitions. An [`Index`] remembers the last version of every object it has observed so that
//! each watch update can be turned into a lifecycle [`Event`]:
//!
//! ```text
//! [ watch ] -> [ Index<T> ] --(Add | Update { old, new } | Delete)--> [ controller ]
//! ```
//!
//! Events are published on an unbounded channel so that watch processing never waits on API
//! calls made by the controller. One index is maintained per watched kind.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;

#[cfg(test)]
mod tests;

pub use self::metrics::IndexMetrics;
use ahash::AHashMap as HashMap;
use kubert::index::NamespacedRemoved;
use netpol_controller_core::Event;
use netpol_controller_k8s_api::{Object, Resource, ResourceExt};
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;

pub type SharedIndex<T> = Arc<RwLock<Index<T>>>;

/// Holds the last-seen version of every object of a single kind, by namespace and name.
#[derive(Debug)]
pub struct Index<T> {
    kind: String,
    namespaces: HashMap<String, HashMap<String, T>>,
    events: UnboundedSender<Event>,
    metrics: IndexMetrics,
}

// === impl Index ===

impl<T> Index<T>
where
    T: Resource<DynamicType = ()> + Clone + Into<Object>,
{
    pub fn shared(events: UnboundedSender<Event>, metrics: IndexMetrics) -> SharedIndex<T> {
        Arc::new(RwLock::new(Self {
            kind: T::kind(&()).to_string(),
            namespaces: HashMap::default(),
            events,
            metrics,
        }))
    }

    /// The number of objects held for `namespace`.
    pub fn size(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |objects| objects.len())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, namespace: &str, name: &str) -> Option<&T> {
        self.namespaces.get(namespace)?.get(name)
    }

    fn publish(&self, event: Event) {
        self.metrics.event(&self.kind, &event);
        if self.events.send(event).is_err() {
            tracing::debug!(kind = %self.kind, "Event receiver dropped");
        }
    }

    fn update_size(&self, namespace: &str) {
        self.metrics
            .size(&self.kind, namespace, self.size(namespace));
    }
}

impl<T> kubert::index::IndexNamespacedResource<T> for Index<T>
where
    T: Resource<DynamicType = ()> + Clone + Into<Object>,
{
    fn apply(&mut self, obj: T) {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_unchecked();

        let event = match self
            .namespaces
            .entry(namespace.clone())
            .or_default()
            .entry(name)
        {
            Entry::Vacant(entry) => {
                entry.insert(obj.clone());
                Event::Add(obj.into())
            }
            Entry::Occupied(mut entry) => {
                let version = obj.resource_version();
                if version.is_some() && entry.get().resource_version() == version {
                    tracing::trace!(%namespace, name = %entry.key(), "Ignoring unchanged version");
                    return;
                }
                let old = entry.insert(obj.clone());
                Event::Update {
                    old: old.into(),
                    new: obj.into(),
                }
            }
        };

        self.publish(event);
        self.update_size(&namespace);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Entry::Occupied(mut objects) = self.namespaces.entry(namespace.clone()) else {
            tracing::debug!(%namespace, %name, "Ignoring delete of unknown object");
            return;
        };
        let Some(obj) = objects.get_mut().remove(&name) else {
            tracing::debug!(%namespace, %name, "Ignoring delete of unknown object");
            return;
        };
        if objects.get().is_empty() {
            objects.remove();
        }

        self.publish(Event::Delete(obj.into()));
        self.update_size(&namespace);
    }

    fn reset(&mut self, objects: Vec<T>, removed: NamespacedRemoved) {
        self.metrics.reset(&self.kind);
        for obj in objects {
            self.apply(obj);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete(namespace.clone(), name);
            }
        }
    }
}
