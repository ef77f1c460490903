//! Resolves the labels a workload reaches through cluster-local environment variables.

use crate::{ClientError, Error, LabelMultimap, ReadObjects, Workload};
use netpol_controller_k8s_api::{Kind, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Maps an environment variable name to its cluster-local value.
pub type EnvRefs = BTreeMap<String, String>;

static LOCAL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9-]+)\.([a-zA-Z0-9-]+)\.(svc|pod)\.cluster\.local$")
        .expect("cluster-local reference pattern must compile")
});

/// An object referenced as `<name>.<namespace>.{svc,pod}.cluster.local`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalRef<'a> {
    pub kind: Kind,
    pub namespace: &'a str,
    pub name: &'a str,
}

// === impl LocalRef ===

impl<'a> LocalRef<'a> {
    /// Parses a cluster-local reference. The whole value must match.
    pub fn parse(value: &'a str) -> Option<Self> {
        let caps = LOCAL_REF.captures(value)?;
        let kind = match caps.get(3)?.as_str() {
            "pod" => Kind::Pod,
            _ => Kind::Service,
        };
        Some(Self {
            kind,
            name: caps.get(1)?.as_str(),
            namespace: caps.get(2)?.as_str(),
        })
    }
}

/// Collects the workload's environment variables whose values are cluster-local references.
pub fn local_env_refs(workload: &Workload) -> EnvRefs {
    workload
        .env()
        .iter()
        .filter(|(_, value)| LocalRef::parse(value).is_some())
        .cloned()
        .collect()
}

/// Looks up every referenced object and collects its labels: a pod's labels or a service's
/// selector.
///
/// Fails with [`Error::NoEnvVars`] when there are no references and with
/// [`Error::ResourceNotFound`] when a referenced object does not exist (a service without a
/// selector counts as missing).
pub async fn resolve_env_refs<R>(client: &R, refs: &EnvRefs) -> Result<LabelMultimap, Error>
where
    R: ReadObjects + ?Sized,
{
    if refs.is_empty() {
        return Err(Error::NoEnvVars);
    }

    let mut labels = LabelMultimap::default();
    for (var, value) in refs {
        let Some(LocalRef {
            kind,
            namespace,
            name,
        }) = LocalRef::parse(value)
        else {
            continue;
        };
        trace!(%var, %kind, %namespace, %name, "Resolving reference");

        let not_found = || Error::ResourceNotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let obj = match client.get_object(kind, namespace, name).await {
            Ok(obj) => obj,
            Err(ClientError::NotFound) => return Err(not_found()),
            Err(source) => {
                return Err(Error::Lookup {
                    kind,
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    source,
                })
            }
        };

        let found = match obj {
            Object::Pod(pod) => pod.metadata.labels.unwrap_or_default(),
            Object::Service(svc) => {
                let selector = svc.spec.and_then(|s| s.selector).unwrap_or_default();
                if selector.is_empty() {
                    return Err(not_found());
                }
                selector
            }
            obj => return Err(Error::UnsupportedType(obj.kind())),
        };
        labels.extend(LabelMultimap::from(&found));
    }

    Ok(labels)
}

/// Like [`resolve_env_refs`], but treats the absence of references or of a referenced object
/// as "no additional labels".
pub async fn resolve_env_labels<R>(
    client: &R,
    refs: &EnvRefs,
) -> Result<Option<LabelMultimap>, Error>
where
    R: ReadObjects + ?Sized,
{
    match resolve_env_refs(client, refs).await {
        Ok(labels) => Ok(Some(labels)),
        Err(Error::NoEnvVars) => Ok(None),
        Err(error @ Error::ResourceNotFound { .. }) => {
            debug!(%error, "Ignoring unresolvable reference");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}
