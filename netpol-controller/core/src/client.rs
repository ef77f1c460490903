use crate::ClientError;
use netpol_controller_k8s_api::{Kind, NetworkPolicy, Object};
use std::sync::Arc;

/// Models read access to cluster objects.
#[async_trait::async_trait]
pub trait ReadObjects: Send + Sync {
    /// Fetches a single object. Fails with [`ClientError::NotFound`] if it does not exist.
    async fn get_object(&self, kind: Kind, namespace: &str, name: &str)
        -> Result<Object, ClientError>;

    /// Lists all network policies in a namespace, in the order returned by the API.
    async fn list_policies(&self, namespace: &str) -> Result<Vec<NetworkPolicy>, ClientError>;
}

/// Models write access to cluster objects.
///
/// Implementations are responsible for mapping an [`Object`] onto its API resource and wire
/// format.
#[async_trait::async_trait]
pub trait WriteObjects: Send + Sync {
    async fn create(&self, obj: Object) -> Result<(), ClientError>;

    async fn update(&self, obj: Object) -> Result<(), ClientError>;

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClientError>;
}

// === impl Arc ===

#[async_trait::async_trait]
impl<T: ReadObjects + ?Sized> ReadObjects for Arc<T> {
    async fn get_object(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Object, ClientError> {
        (**self).get_object(kind, namespace, name).await
    }

    async fn list_policies(&self, namespace: &str) -> Result<Vec<NetworkPolicy>, ClientError> {
        (**self).list_policies(namespace).await
    }
}

#[async_trait::async_trait]
impl<T: WriteObjects + ?Sized> WriteObjects for Arc<T> {
    async fn create(&self, obj: Object) -> Result<(), ClientError> {
        (**self).create(obj).await
    }

    async fn update(&self, obj: Object) -> Result<(), ClientError> {
        (**self).update(obj).await
    }

    async fn delete(&self, kind: Kind, namespace: &str, name: &str) -> Result<(), ClientError> {
        (**self).delete(kind, namespace, name).await
    }
}
