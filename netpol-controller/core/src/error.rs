use netpol_controller_k8s_api::Kind;
use std::{fmt, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} objects are not supported")]
    UnsupportedType(Kind),

    #[error("pod {namespace}/{name} is part of a {owner}")]
    SkippedOwnedPod {
        namespace: String,
        name: String,
        owner: String,
    },

    #[error("a required parameter is empty: {0}")]
    EmptyParam(&'static str),

    #[error("no label sets to merge")]
    EmptyInput,

    #[error("the object has no .cluster.local env vars")]
    NoEnvVars,

    #[error("{kind} {namespace}/{name} does not exist")]
    ResourceNotFound {
        kind: Kind,
        namespace: String,
        name: String,
    },

    #[error("no network policy in namespace {namespace} matches the workload's labels")]
    NotFound { namespace: String },

    #[error("objects in the {0} namespace are not managed")]
    ReservedNamespace(String),

    #[error("failed to get {kind} {namespace}/{name}: {source}")]
    Lookup {
        kind: Kind,
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to list network policies in {namespace}: {source}")]
    List {
        namespace: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to {action} {kind} {namespace}/{name}: {source}")]
    Write {
        action: Action,
        kind: Kind,
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },
}

/// Errors returned by the read and write collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// A mutation issued against the cluster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

// === impl Error ===

impl Error {
    /// Indicates that the event does not concern a managed workload and was
    /// dropped without any work being attempted.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::UnsupportedType(_) | Self::SkippedOwnedPod { .. })
    }

    /// Indicates that a policy create was rejected because the policy exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Write {
                action: Action::Create,
                source: ClientError::AlreadyExists,
                ..
            }
        )
    }
}

// === impl Action ===

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
