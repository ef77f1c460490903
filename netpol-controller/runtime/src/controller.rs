use crate::core::{Error, Event, Outcome, ReadObjects, Reconciler, WriteObjects};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Drains the events of a single watched kind, one at a time, through the reconciler.
pub struct Controller<C> {
    kind: String,
    events: UnboundedReceiver<Event>,
    reconciler: Arc<Reconciler<C>>,
    metrics: ControllerMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    events: Family<EventLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    kind: String,
    event: String,
    result: String,
}

// === impl Controller ===

impl<C> Controller<C>
where
    C: ReadObjects + WriteObjects,
{
    pub fn new(
        kind: impl ToString,
        events: UnboundedReceiver<Event>,
        reconciler: Arc<Reconciler<C>>,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            events,
            reconciler,
            metrics,
        }
    }

    /// Processes events until the index stops publishing or shutdown is signaled. An event that
    /// is being processed when shutdown is signaled is completed first.
    pub async fn run(mut self, drain: drain::Watch) {
        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                biased;

                _ = (&mut shutdown) => {
                    debug!(kind = %self.kind, "Shutting down");
                    return;
                }

                event = self.events.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => return,
                },
            }
        }
    }

    async fn process(&self, event: Event) {
        let op = event.as_str();
        let namespace = event.object().namespace().to_string();
        let name = event.object().name().to_string();

        let result = match self.reconciler.handle(event).await {
            Ok(Outcome::Unchanged) => "ok",
            Ok(outcome) => {
                debug!(%namespace, %name, ?outcome, "Reconciled");
                "ok"
            }
            Err(error) if error.is_skip() => {
                debug!(%namespace, %name, %error, "Skipped");
                "skipped"
            }
            Err(error) if error.is_already_exists() => {
                info!(%namespace, %name, %error, "Network policy already exists");
                "failed"
            }
            Err(error @ (Error::Lookup { .. } | Error::List { .. } | Error::Write { .. })) => {
                error!(%namespace, %name, event = %op, %error, "Failed to reconcile");
                "failed"
            }
            Err(error) => {
                warn!(%namespace, %name, event = %op, %error, "Failed to reconcile");
                "failed"
            }
        };
        self.metrics.record(&self.kind, op, result);
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let events = Family::default();
        prom.register(
            "controller_events",
            "Count of events processed by the controller",
            events.clone(),
        );
        Self { events }
    }

    fn record(&self, kind: &str, event: &str, result: &str) {
        self.events
            .get_or_create(&EventLabels {
                kind: kind.to_string(),
                event: event.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    #[cfg(test)]
    fn count(&self, kind: &str, event: &str, result: &str) -> u64 {
        self.events
            .get_or_create(&EventLabels {
                kind: kind.to_string(),
                event: event.to_string(),
                result: result.to_string(),
            })
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{AllowList, ClientError},
        k8s::{Kind, NetworkPolicy, Object, ObjectMeta, Pod, Service},
    };
    use tokio::sync::mpsc;

    /// A cluster without any objects that accepts every write.
    struct EmptyCluster;

    #[async_trait::async_trait]
    impl ReadObjects for EmptyCluster {
        async fn get_object(&self, _: Kind, _: &str, _: &str) -> Result<Object, ClientError> {
            Err(ClientError::NotFound)
        }

        async fn list_policies(&self, _: &str) -> Result<Vec<NetworkPolicy>, ClientError> {
            Ok(vec![])
        }
    }

    #[async_trait::async_trait]
    impl WriteObjects for EmptyCluster {
        async fn create(&self, _: Object) -> Result<(), ClientError> {
            Ok(())
        }

        async fn update(&self, _: Object) -> Result<(), ClientError> {
            Ok(())
        }

        async fn delete(&self, _: Kind, _: &str, _: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn mk_pod(labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("pod-0".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn records_event_results() {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = ControllerMetrics::default();
        let reconciler = Arc::new(Reconciler::new(EmptyCluster, Arc::new(AllowList::default())));
        let controller = Controller::new("Pod", rx, reconciler, metrics.clone());
        let (_signal, drain) = drain::channel();

        tx.send(Event::Add(mk_pod(&[("app", "web")]).into()))
            .unwrap();
        tx.send(Event::Add(Service::default().into())).unwrap();
        tx.send(Event::Delete(mk_pod(&[("app", "web")]).into()))
            .unwrap();
        drop(tx);

        controller.run(drain).await;

        assert_eq!(metrics.count("Pod", "add", "ok"), 1);
        assert_eq!(metrics.count("Pod", "add", "skipped"), 1);
        assert_eq!(metrics.count("Pod", "delete", "failed"), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stops_on_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = ControllerMetrics::default();
        let reconciler = Arc::new(Reconciler::new(EmptyCluster, Arc::new(AllowList::default())));
        let controller = Controller::new("Pod", rx, reconciler, metrics.clone());
        let (signal, drain) = drain::channel();

        let task = tokio::spawn(controller.run(drain));
        signal.drain().await;
        task.await.expect("controller must not panic");

        // Events published after shutdown are not processed.
        tx.send(Event::Add(mk_pod(&[("app", "web")]).into()))
            .unwrap_err();
        assert_eq!(metrics.count("Pod", "add", "ok"), 0);
    }
}
