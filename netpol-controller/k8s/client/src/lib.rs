//! Kubernetes API access for the network policy controller.
//!
//! Every call is bounded by a fixed timeout. API statuses that the engine acts on (a missing
//! object, a create conflict) are surfaced as distinct [`ClientError`] variants; everything else
//! is passed through opaquely.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use k8s_openapi::NamespaceResourceScope;
use netpol_controller_core::{ClientError, ReadObjects, WriteObjects};
use netpol_controller_k8s_api::{
    self as k8s, DaemonSet, DeleteParams, Deployment, Ingress, Kind, ListParams, NetworkPolicy,
    Object, Pod, PostParams, Resource, ResourceExt, Service, StatefulSet,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, future::Future};
use tokio::time;
use tracing::trace;

#[derive(Clone)]
pub struct KubeClient {
    client: k8s::Client,
    timeout: time::Duration,
    field_manager: String,
}

/// A namespaced resource that can be read and written through a typed [`k8s::Api`].
trait Namespaced:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> Namespaced for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug
        + Send
        + Sync
        + 'static
{
}

macro_rules! with_object {
    ($obj:expr, $o:ident => $body:expr) => {
        match $obj {
            Object::Pod($o) => $body,
            Object::Service($o) => $body,
            Object::Ingress($o) => $body,
            Object::Deployment($o) => $body,
            Object::StatefulSet($o) => $body,
            Object::DaemonSet($o) => $body,
            Object::NetworkPolicy($o) => $body,
        }
    };
}

// === impl KubeClient ===

impl KubeClient {
    pub fn new(client: k8s::Client, timeout: time::Duration, field_manager: impl ToString) -> Self {
        Self {
            client,
            timeout,
            field_manager: field_manager.to_string(),
        }
    }

    fn api<K: Namespaced>(&self, namespace: &str) -> k8s::Api<K> {
        k8s::Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Object, ClientError>
    where
        K: Namespaced + Into<Object>,
    {
        let api = self.api::<K>(namespace);
        let obj = call(self.timeout, api.get(name)).await?;
        Ok(obj.into())
    }

    async fn create_namespaced<K: Namespaced>(&self, obj: K) -> Result<(), ClientError> {
        let namespace = obj.namespace().unwrap_or_default();
        trace!(kind = %K::kind(&()), %namespace, name = %obj.name_any(), "Creating");
        let api = self.api::<K>(&namespace);
        call(self.timeout, api.create(&self.post_params(), &obj)).await?;
        Ok(())
    }

    async fn replace_namespaced<K: Namespaced>(&self, obj: K) -> Result<(), ClientError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        trace!(kind = %K::kind(&()), %namespace, %name, "Replacing");
        let api = self.api::<K>(&namespace);
        call(self.timeout, api.replace(&name, &self.post_params(), &obj)).await?;
        Ok(())
    }

    async fn delete_namespaced<K: Namespaced>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        trace!(kind = %K::kind(&()), %namespace, %name, "Deleting");
        let api = self.api::<K>(namespace);
        call(self.timeout, api.delete(name, &DeleteParams::default())).await?;
        Ok(())
    }
}

impl fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("timeout", &self.timeout)
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ReadObjects for KubeClient {
    async fn get_object(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Object, ClientError> {
        match kind {
            Kind::Pod => self.get::<Pod>(namespace, name).await,
            Kind::Service => self.get::<Service>(namespace, name).await,
            Kind::Ingress => self.get::<Ingress>(namespace, name).await,
            Kind::Deployment => self.get::<Deployment>(namespace, name).await,
            Kind::StatefulSet => self.get::<StatefulSet>(namespace, name).await,
            Kind::DaemonSet => self.get::<DaemonSet>(namespace, name).await,
            Kind::NetworkPolicy => self.get::<NetworkPolicy>(namespace, name).await,
        }
    }

    async fn list_policies(&self, namespace: &str) -> Result<Vec<NetworkPolicy>, ClientError> {
        let api = self.api::<NetworkPolicy>(namespace);
        let list = call(self.timeout, api.list(&ListParams::default())).await?;
        Ok(list.items)
    }
}

#[async_trait::async_trait]
impl WriteObjects for KubeClient {
    async fn create(&self, obj: Object) -> Result<(), ClientError> {
        with_object!(obj, o => self.create_namespaced(o).await)
    }

    async fn update(&self, obj: Object) -> Result<(), ClientError> {
        with_object!(obj, o => self.replace_namespaced(o).await)
    }

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClientError> {
        match kind {
            Kind::Pod => self.delete_namespaced::<Pod>(namespace, name).await,
            Kind::Service => self.delete_namespaced::<Service>(namespace, name).await,
            Kind::Ingress => self.delete_namespaced::<Ingress>(namespace, name).await,
            Kind::Deployment => self.delete_namespaced::<Deployment>(namespace, name).await,
            Kind::StatefulSet => self.delete_namespaced::<StatefulSet>(namespace, name).await,
            Kind::DaemonSet => self.delete_namespaced::<DaemonSet>(namespace, name).await,
            Kind::NetworkPolicy => self.delete_namespaced::<NetworkPolicy>(namespace, name).await,
        }
    }
}

/// Runs an API call, failing with [`ClientError::Timeout`] if it does not complete in time.
async fn call<T, F>(timeout: time::Duration, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, k8s::Error>>,
{
    match time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(client_error),
        Err(_) => Err(ClientError::Timeout(timeout)),
    }
}

fn client_error(error: k8s::Error) -> ClientError {
    match error {
        k8s::Error::Api(rsp) if rsp.code == 404 => ClientError::NotFound,
        // Replace conflicts (stale resource versions) share the 409 status but carry the
        // `Conflict` reason.
        k8s::Error::Api(rsp) if rsp.code == 409 && rsp.reason == "AlreadyExists" => {
            ClientError::AlreadyExists
        }
        error => ClientError::Api(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpol_controller_k8s_api::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> k8s::Error {
        k8s::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} test"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn maps_api_statuses() {
        assert!(matches!(
            client_error(api_error(404, "NotFound")),
            ClientError::NotFound
        ));
        assert!(matches!(
            client_error(api_error(409, "AlreadyExists")),
            ClientError::AlreadyExists
        ));
        assert!(matches!(
            client_error(api_error(409, "Conflict")),
            ClientError::Api(_)
        ));
        assert!(matches!(
            client_error(api_error(403, "Forbidden")),
            ClientError::Api(_)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn calls_time_out() {
        let timeout = time::Duration::from_millis(1);
        let res = call::<(), _>(timeout, std::future::pending()).await;
        assert!(matches!(res, Err(ClientError::Timeout(t)) if t == timeout));

        let res = call(timeout, async { Ok::<_, k8s::Error>(7) }).await;
        assert!(matches!(res, Ok(7)));
    }
}
