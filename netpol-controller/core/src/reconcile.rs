use crate::{
    attribute, labels, policy, Action, ClientError, Error, LabelMultimap, ReadObjects,
    Synthesizer, Workload, WriteObjects, SYNTHESIZED_LABEL,
};
use netpol_controller_k8s_api::{
    labels::Map, Kind, NetworkPolicy, Object, ResourceExt, RESERVED_NAMESPACE,
};
use std::{fmt, sync::Arc};
use tracing::{debug, info, instrument};

/// A lifecycle notification for a watched object.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Add(Object),
    Update { old: Object, new: Object },
    Delete(Object),
}

/// The mutation, if any, that an event produced. Policies are identified by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(String),
    Updated(String),
    Deleted(String),
    Unchanged,
}

/// Keeps one network policy per workload in step with the workload's labels and references.
///
/// The reconciler holds no state between events: every event is handled against the policies
/// currently stored on the cluster.
#[derive(Clone, Debug)]
pub struct Reconciler<C> {
    client: C,
    synth: Synthesizer,
}

// === impl Event ===

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update { .. } => "update",
            Self::Delete(_) => "delete",
        }
    }

    /// The object the event is about; for updates, the new version.
    pub fn object(&self) -> &Object {
        match self {
            Self::Add(obj) | Self::Delete(obj) => obj,
            Self::Update { new, .. } => new,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl Reconciler ===

impl<C> Reconciler<C>
where
    C: ReadObjects + WriteObjects,
{
    pub fn new(client: C, allow: Arc<crate::AllowList>) -> Self {
        Self {
            client,
            synth: Synthesizer::new(allow),
        }
    }

    pub async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        match event {
            Event::Add(obj) => self.on_add(obj).await,
            Event::Update { old, new } => self.on_update(old, new).await,
            Event::Delete(obj) => self.on_delete(obj).await,
        }
    }

    /// Creates the policy for a newly observed workload.
    #[instrument(skip_all, fields(kind = %obj.kind(), namespace = obj.namespace(), name = obj.name()))]
    pub async fn on_add(&self, obj: Object) -> Result<Outcome, Error> {
        let workload = Workload::try_from(obj)?;
        guard_namespace(workload.namespace())?;
        self.add(workload).await
    }

    /// Brings the workload's policy in line with a changed workload.
    ///
    /// Direct label changes replace the policy's selector and peers; reference changes only ever
    /// add peers. The policy is located by the workload's previous labels. If none is found,
    /// the update is handled as an add.
    #[instrument(skip_all, fields(kind = %new.kind(), namespace = new.namespace(), name = new.name()))]
    pub async fn on_update(&self, old: Object, new: Object) -> Result<Outcome, Error> {
        let old = Workload::try_from(old)?;
        let new = Workload::try_from(new)?;
        guard_namespace(new.namespace())?;

        let old_refs = attribute::local_env_refs(&old);
        let new_refs = attribute::local_env_refs(&new);
        let labels_changed = old.labels() != new.labels();
        let refs_changed = old_refs != new_refs;
        if !labels_changed && !refs_changed {
            debug!("Labels and references unchanged");
            return Ok(Outcome::Unchanged);
        }

        let mut np =
            match policy::find_policy_by_labels(&self.client, old.namespace(), old.labels()).await
            {
                Ok(np) => np,
                Err(Error::NotFound { .. }) => {
                    debug!("No policy matches the previous labels; creating one");
                    return self.add(new).await;
                }
                Err(error) => return Err(error),
            };

        if labels_changed {
            debug!(old = ?old.labels(), new = ?new.labels(), "Labels changed");
            let peers = self.synth.build_peers(&LabelMultimap::from(new.labels()))?;
            np = policy::with_pod_selector(np, new.labels());
            np = policy::purge_label_peers(np, &LabelMultimap::from(old.labels()));
            np = policy::extend_peers(np, &peers);
        }

        if refs_changed {
            debug!(old = ?old_refs, new = ?new_refs, "References changed");
            let resolved = attribute::resolve_env_refs(&self.client, &new_refs).await?;
            let target = labels::merge([LabelMultimap::from(new.labels()), resolved])?;
            let peers = self.synth.build_peers(&target)?;
            np = policy::extend_peers(np, &peers);
        }

        let name = np.name_any();
        self.write(Action::Update, np).await?;
        info!(policy = %name, "Updated network policy");
        Ok(Outcome::Updated(name))
    }

    /// Deletes the policy of a removed workload, located by the workload's labels.
    #[instrument(skip_all, fields(kind = %obj.kind(), namespace = obj.namespace(), name = obj.name()))]
    pub async fn on_delete(&self, obj: Object) -> Result<Outcome, Error> {
        let workload = Workload::try_from(obj)?;
        guard_namespace(workload.namespace())?;

        let np =
            policy::find_policy_by_labels(&self.client, workload.namespace(), workload.labels())
                .await?;
        let name = np.name_any();
        self.write(Action::Delete, np).await?;
        info!(policy = %name, "Deleted network policy");
        Ok(Outcome::Deleted(name))
    }

    async fn add(&self, mut workload: Workload) -> Result<Outcome, Error> {
        if workload.labels().is_empty() {
            let labels = synthesized_labels(workload.name(), workload.namespace());
            let obj = workload.relabeled(labels.clone());
            self.client.update(obj).await.map_err(write_error(
                Action::Update,
                workload.kind().as_kind(),
                workload.namespace(),
                workload.name(),
            ))?;
            info!(label = SYNTHESIZED_LABEL, "Labeled workload");
            workload.set_labels(labels);
        }

        let refs = attribute::local_env_refs(&workload);
        let direct = LabelMultimap::from(workload.labels());
        let target = match attribute::resolve_env_labels(&self.client, &refs).await? {
            Some(resolved) => labels::merge([direct, resolved])?,
            None => direct,
        };

        let np = self.synth.new_policy(
            workload.name(),
            workload.namespace(),
            workload.labels(),
            &target,
        )?;
        let name = np.name_any();
        self.write(Action::Create, np).await?;
        info!(policy = %name, "Created network policy");
        Ok(Outcome::Created(name))
    }

    async fn write(&self, action: Action, np: NetworkPolicy) -> Result<(), Error> {
        let namespace = np.namespace().unwrap_or_default();
        let name = np.name_any();
        let res = match action {
            Action::Create => self.client.create(np.into()).await,
            Action::Update => self.client.update(np.into()).await,
            Action::Delete => {
                self.client
                    .delete(Kind::NetworkPolicy, &namespace, &name)
                    .await
            }
        };
        res.map_err(write_error(action, Kind::NetworkPolicy, &namespace, &name))
    }
}

fn guard_namespace(namespace: &str) -> Result<(), Error> {
    if namespace == RESERVED_NAMESPACE {
        return Err(Error::ReservedNamespace(namespace.to_string()));
    }
    Ok(())
}

fn synthesized_labels(name: &str, namespace: &str) -> Map {
    Map::from([(SYNTHESIZED_LABEL.to_string(), format!("{name}-{namespace}"))])
}

fn write_error<'a>(
    action: Action,
    kind: Kind,
    namespace: &'a str,
    name: &'a str,
) -> impl FnOnce(ClientError) -> Error + 'a {
    move |source| Error::Write {
        action,
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    }
}
