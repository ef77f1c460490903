use netpol_controller_core::Event;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_events: Family<EventLabels, Counter>,
    index_size: Family<NamespacedIndexLabels, Gauge>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    kind: String,
    event: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NamespacedIndexLabels {
    namespace: String,
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_events = Family::default();
        prom.register(
            "index_events",
            "Count of lifecycle events emitted by the index",
            index_events.clone(),
        );

        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            index_events,
            index_size,
            index_resets,
        }
    }

    pub(crate) fn event(&self, kind: &str, event: &Event) {
        self.index_events
            .get_or_create(&EventLabels {
                kind: kind.to_string(),
                event: event.as_str().to_string(),
            })
            .inc();
    }

    pub(crate) fn size(&self, kind: &str, namespace: &str, size: usize) {
        self.index_size
            .get_or_create(&NamespacedIndexLabels {
                namespace: namespace.to_string(),
                kind: kind.to_string(),
            })
            .set(size as i64);
    }

    pub(crate) fn reset(&self, kind: &str) {
        self.index_resets
            .get_or_create(&IndexLabels {
                kind: kind.to_string(),
            })
            .inc();
    }
}
