use crate::{Index, IndexMetrics, SharedIndex};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use maplit::btreemap;
use netpol_controller_core::Event;
use netpol_controller_k8s_api::{self as k8s, Object};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};

#[test]
fn first_apply_is_an_add() {
    let mut test = TestConfig::default();
    let pod = mk_pod("ns-0", "pod-0", "1", "web");

    test.index.write().apply(pod.clone());

    assert_eq!(test.next(), Event::Add(pod.into()));
    assert_eq!(test.index.read().size("ns-0"), 1);
    test.assert_idle();
}

#[test]
fn reapply_is_an_update_with_the_previous_version() {
    let mut test = TestConfig::default();
    let old = mk_pod("ns-0", "pod-0", "1", "web");
    let new = mk_pod("ns-0", "pod-0", "2", "api");

    test.index.write().apply(old.clone());
    test.index.write().apply(new.clone());

    assert_eq!(test.next(), Event::Add(old.clone().into()));
    assert_eq!(
        test.next(),
        Event::Update {
            old: old.into(),
            new: new.clone().into(),
        }
    );
    assert_eq!(
        test.index.read().get("ns-0", "pod-0").cloned(),
        Some(new)
    );
    test.assert_idle();
}

#[test]
fn unchanged_versions_are_ignored() {
    let mut test = TestConfig::default();
    let pod = mk_pod("ns-0", "pod-0", "1", "web");

    test.index.write().apply(pod.clone());
    test.index.write().apply(pod.clone());

    assert_eq!(test.next(), Event::Add(pod.into()));
    test.assert_idle();
}

#[test]
fn delete_publishes_the_last_seen_version() {
    let mut test = TestConfig::default();
    let old = mk_pod("ns-0", "pod-0", "1", "web");
    let new = mk_pod("ns-0", "pod-0", "2", "api");

    test.index.write().apply(old);
    test.index.write().apply(new.clone());
    test.index
        .write()
        .delete("ns-0".to_string(), "pod-0".to_string());

    assert!(matches!(test.next(), Event::Add(_)));
    assert!(matches!(test.next(), Event::Update { .. }));
    assert_eq!(test.next(), Event::Delete(new.into()));
    assert_eq!(test.index.read().size("ns-0"), 0);
    test.assert_idle();
}

#[test]
fn unknown_deletes_are_ignored() {
    let mut test = TestConfig::default();
    test.index.write().apply(mk_pod("ns-0", "pod-0", "1", "web"));
    let _ = test.next();

    test.index
        .write()
        .delete("ns-0".to_string(), "pod-1".to_string());
    test.index
        .write()
        .delete("ns-1".to_string(), "pod-0".to_string());

    assert_eq!(test.index.read().size("ns-0"), 1);
    test.assert_idle();
}

#[test]
fn reset_applies_and_removes() {
    let mut test = TestConfig::default();
    let kept = mk_pod("ns-0", "pod-0", "1", "web");
    let gone = mk_pod("ns-1", "pod-1", "1", "api");
    test.index.write().apply(kept.clone());
    test.index.write().apply(gone.clone());
    let _ = test.next();
    let _ = test.next();

    let added = mk_pod("ns-0", "pod-2", "1", "db");
    let mut removed = NamespacedRemoved::default();
    removed
        .entry("ns-1".to_string())
        .or_default()
        .insert("pod-1".to_string());
    test.index
        .write()
        .reset(vec![kept, added.clone()], removed);

    assert_eq!(test.next(), Event::Add(added.into()));
    assert_eq!(test.next(), Event::Delete(gone.into()));
    assert_eq!(test.index.read().size("ns-0"), 2);
    assert_eq!(test.index.read().size("ns-1"), 0);
    test.assert_idle();
}

#[test]
fn events_are_published_per_kind() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let index: SharedIndex<k8s::Service> = Index::shared(tx, IndexMetrics::default());
    let svc = k8s::Service {
        metadata: k8s::ObjectMeta {
            namespace: Some("ns-0".to_string()),
            name: Some("svc-0".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    index.write().apply(svc.clone());

    let event = rx.try_recv().expect("event must be published");
    assert_eq!(event, Event::Add(Object::Service(svc)));
}

struct TestConfig {
    index: SharedIndex<k8s::Pod>,
    rx: UnboundedReceiver<Event>,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl Default for TestConfig {
    fn default() -> Self {
        let _tracing = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            index: Index::shared(tx, IndexMetrics::default()),
            rx,
            _tracing,
        }
    }
}

impl TestConfig {
    fn next(&mut self) -> Event {
        self.rx.try_recv().expect("an event must be published")
    }

    fn assert_idle(&mut self) {
        assert_eq!(self.rx.try_recv(), Err(TryRecvError::Empty));
    }
}

fn mk_pod(ns: &str, name: &str, version: &str, app: &str) -> k8s::Pod {
    k8s::Pod {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            resource_version: Some(version.to_string()),
            labels: Some(btreemap! { "app".to_string() => app.to_string() }),
            ..Default::default()
        },
        ..Default::default()
    }
}
