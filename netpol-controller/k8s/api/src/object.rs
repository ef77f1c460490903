use crate::{
    DaemonSet, Deployment, Ingress, NetworkPolicy, ObjectMeta, Pod, Service, StatefulSet,
};
use std::fmt;

/// The kinds of objects the controller watches or writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Pod,
    Service,
    Ingress,
    Deployment,
    StatefulSet,
    DaemonSet,
    NetworkPolicy,
}

/// A cluster object, tagged with its kind.
///
/// This is the representation in which watch events are delivered to the
/// controller and in which objects are handed to the API client for writes.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Pod(Pod),
    Service(Service),
    Ingress(Ingress),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    NetworkPolicy(NetworkPolicy),
}

// === impl Kind ===

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::NetworkPolicy => "NetworkPolicy",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl Object ===

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Pod(_) => Kind::Pod,
            Self::Service(_) => Kind::Service,
            Self::Ingress(_) => Kind::Ingress,
            Self::Deployment(_) => Kind::Deployment,
            Self::StatefulSet(_) => Kind::StatefulSet,
            Self::DaemonSet(_) => Kind::DaemonSet,
            Self::NetworkPolicy(_) => Kind::NetworkPolicy,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Pod(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::Ingress(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::StatefulSet(o) => &o.metadata,
            Self::DaemonSet(o) => &o.metadata,
            Self::NetworkPolicy(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Pod(o) => &mut o.metadata,
            Self::Service(o) => &mut o.metadata,
            Self::Ingress(o) => &mut o.metadata,
            Self::Deployment(o) => &mut o.metadata,
            Self::StatefulSet(o) => &mut o.metadata,
            Self::DaemonSet(o) => &mut o.metadata,
            Self::NetworkPolicy(o) => &mut o.metadata,
        }
    }

    /// The object's name, or an empty string if it is unset.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// The object's namespace, or an empty string if it is unset.
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

macro_rules! impl_from {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Object {
                fn from(obj: $variant) -> Self {
                    Self::$variant(obj)
                }
            }
        )+
    };
}

impl_from!(Pod, Service, Ingress, Deployment, StatefulSet, DaemonSet, NetworkPolicy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_accessors() {
        let obj = Object::from(Pod {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("pod-0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(obj.kind(), Kind::Pod);
        assert_eq!(obj.name(), "pod-0");
        assert_eq!(obj.namespace(), "ns-0");

        let obj = Object::from(Service::default());
        assert_eq!(obj.kind().to_string(), "Service");
        assert_eq!(obj.name(), "");
        assert_eq!(obj.namespace(), "");
    }
}
