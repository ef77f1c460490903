use crate::Error;
use netpol_controller_k8s_api::{
    labels::{self, Map},
    Container, Kind, Object, OwnerReference, PodSpec, PodTemplateSpec,
};
use std::fmt;

/// Owner kinds that govern a pod's network policy on its behalf.
const CONTROLLER_KINDS: [&str; 4] = ["ReplicaSet", "Deployment", "StatefulSet", "DaemonSet"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
}

/// A managed object, normalized from a watch event.
#[derive(Clone, Debug, PartialEq)]
pub struct Workload {
    kind: WorkloadKind,
    name: String,
    namespace: String,
    labels: Map,
    owners: Vec<OwnerReference>,
    env: Vec<(String, String)>,
    object: Object,
}

/// Returns the effective label set of a workload object: a pod's labels, or a controller's
/// selector `matchLabels`.
///
/// Fails with [`Error::UnsupportedType`] for kinds that are not workloads and with
/// [`Error::SkippedOwnedPod`] for pods that are governed by a controller.
pub fn direct_labels(obj: &Object) -> Result<Map, Error> {
    match obj {
        Object::Pod(pod) => {
            if let Some(owner) = pod
                .metadata
                .owner_references
                .iter()
                .flatten()
                .find(|o| CONTROLLER_KINDS.contains(&o.kind.as_str()))
            {
                return Err(Error::SkippedOwnedPod {
                    namespace: obj.namespace().to_string(),
                    name: obj.name().to_string(),
                    owner: owner.kind.clone(),
                });
            }
            Ok(pod.metadata.labels.clone().unwrap_or_default())
        }
        Object::Deployment(o) => Ok(o
            .spec
            .as_ref()
            .map(|s| labels::selector_map(&s.selector))
            .unwrap_or_default()),
        Object::StatefulSet(o) => Ok(o
            .spec
            .as_ref()
            .map(|s| labels::selector_map(&s.selector))
            .unwrap_or_default()),
        Object::DaemonSet(o) => Ok(o
            .spec
            .as_ref()
            .map(|s| labels::selector_map(&s.selector))
            .unwrap_or_default()),
        Object::Service(_) | Object::Ingress(_) | Object::NetworkPolicy(_) => {
            Err(Error::UnsupportedType(obj.kind()))
        }
    }
}

fn containers(obj: &Object) -> &[Container] {
    fn template(t: &PodTemplateSpec) -> Option<&PodSpec> {
        t.spec.as_ref()
    }

    let spec = match obj {
        Object::Pod(o) => o.spec.as_ref(),
        Object::Deployment(o) => o.spec.as_ref().and_then(|s| template(&s.template)),
        Object::StatefulSet(o) => o.spec.as_ref().and_then(|s| template(&s.template)),
        Object::DaemonSet(o) => o.spec.as_ref().and_then(|s| template(&s.template)),
        Object::Service(_) | Object::Ingress(_) | Object::NetworkPolicy(_) => None,
    };
    spec.map(|s| s.containers.as_slice()).unwrap_or_default()
}

// === impl WorkloadKind ===

impl WorkloadKind {
    pub fn as_kind(&self) -> Kind {
        match self {
            Self::Pod => Kind::Pod,
            Self::Deployment => Kind::Deployment,
            Self::StatefulSet => Kind::StatefulSet,
            Self::DaemonSet => Kind::DaemonSet,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_kind().fmt(f)
    }
}

// === impl Workload ===

impl TryFrom<Object> for Workload {
    type Error = Error;

    fn try_from(object: Object) -> Result<Self, Error> {
        let labels = direct_labels(&object)?;
        let kind = match &object {
            Object::Pod(_) => WorkloadKind::Pod,
            Object::Deployment(_) => WorkloadKind::Deployment,
            Object::StatefulSet(_) => WorkloadKind::StatefulSet,
            Object::DaemonSet(_) => WorkloadKind::DaemonSet,
            Object::Service(_) | Object::Ingress(_) | Object::NetworkPolicy(_) => {
                return Err(Error::UnsupportedType(object.kind()))
            }
        };
        let env = containers(&object)
            .iter()
            .flat_map(|c| c.env.iter().flatten())
            .filter_map(|e| Some((e.name.clone(), e.value.clone()?)))
            .collect();
        Ok(Self {
            kind,
            name: object.name().to_string(),
            namespace: object.namespace().to_string(),
            labels,
            owners: object
                .metadata()
                .owner_references
                .clone()
                .unwrap_or_default(),
            env,
            object,
        })
    }
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The workload's effective label set.
    pub fn labels(&self) -> &Map {
        &self.labels
    }

    pub fn owners(&self) -> &[OwnerReference] {
        &self.owners
    }

    /// Declared `name=value` environment variables across all containers. Variables populated
    /// through `valueFrom` are omitted.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns the underlying object with its metadata labels replaced by `labels`.
    pub(crate) fn relabeled(&self, labels: Map) -> Object {
        let mut obj = self.object.clone();
        obj.metadata_mut().labels = Some(labels);
        obj
    }

    /// Replaces the effective label set after the object has been relabeled.
    pub(crate) fn set_labels(&mut self, labels: Map) {
        self.labels = labels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use netpol_controller_k8s_api::{
        api::apps::v1::DeploymentSpec, Deployment, EnvVar, LabelSelector, ObjectMeta, Pod,
        Service,
    };

    fn mk_owner(kind: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: "owner".to_string(),
            uid: "uid".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn pods_use_metadata_labels() {
        let pod = Pod {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("pod-0".to_string()),
                labels: Some(btreemap! { "app".to_string() => "web".to_string() }),
                ..Default::default()
            },
            ..Default::default()
        };
        let workload = Workload::try_from(Object::from(pod)).expect("pod must be a workload");
        assert_eq!(workload.kind(), WorkloadKind::Pod);
        assert_eq!(workload.name(), "pod-0");
        assert_eq!(workload.namespace(), "ns-0");
        assert_eq!(
            workload.labels(),
            &btreemap! { "app".to_string() => "web".to_string() }
        );
    }

    #[test]
    fn owned_pods_are_skipped() {
        for kind in CONTROLLER_KINDS {
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some("pod-0".to_string()),
                    owner_references: Some(vec![mk_owner(kind)]),
                    ..Default::default()
                },
                ..Default::default()
            };
            let err = Workload::try_from(Object::from(pod)).expect_err("pod must be skipped");
            assert!(err.is_skip(), "{kind}");
            assert!(matches!(err, Error::SkippedOwnedPod { owner, .. } if owner == kind));
        }

        // Pods owned by anything else, e.g. a Job, are managed directly.
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("pod-0".to_string()),
                owner_references: Some(vec![mk_owner("Job")]),
                ..Default::default()
            },
            ..Default::default()
        };
        let workload = Workload::try_from(Object::from(pod)).expect("pod must be managed");
        assert_eq!(workload.owners().len(), 1);
    }

    #[test]
    fn deployments_use_selector_and_template_env() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("deploy-0".to_string()),
                labels: Some(btreemap! { "team".to_string() => "a".to_string() }),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(btreemap! { "app".to_string() => "web".to_string() }),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "main".to_string(),
                            env: Some(vec![
                                EnvVar {
                                    name: "DB".to_string(),
                                    value: Some("db.ns-0.svc.cluster.local".to_string()),
                                    ..Default::default()
                                },
                                EnvVar {
                                    name: "FROM_SECRET".to_string(),
                                    ..Default::default()
                                },
                            ]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let workload = Workload::try_from(Object::from(deployment)).expect("must be a workload");
        assert_eq!(workload.kind().to_string(), "Deployment");
        assert_eq!(
            workload.labels(),
            &btreemap! { "app".to_string() => "web".to_string() }
        );
        assert_eq!(
            workload.env(),
            &[("DB".to_string(), "db.ns-0.svc.cluster.local".to_string())]
        );
    }

    #[test]
    fn services_are_unsupported() {
        let err = Workload::try_from(Object::from(Service::default())).expect_err("unsupported");
        assert!(matches!(err, Error::UnsupportedType(Kind::Service)));
        assert!(err.is_skip());
    }
}
