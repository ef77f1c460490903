#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
mod object;

pub use self::object::{Kind, Object};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        core::v1::{Container, EnvVar, Pod, PodSpec, PodTemplateSpec, Service},
        networking::v1::{
            Ingress, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
            NetworkPolicyPeer, NetworkPolicySpec,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement, OwnerReference},
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams, Resource, ResourceExt},
    core::ErrorResponse,
    Client, Error,
};

/// The namespace the controller never writes into.
pub const RESERVED_NAMESPACE: &str = "kube-system";
