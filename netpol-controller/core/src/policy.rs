//! Synthesis and in-place transformation of `NetworkPolicy` objects.
//!
//! Mutations are expressed as functions that take a policy by value and return the transformed
//! policy, so that an update is assembled as a pipeline and only the final value is written.

use crate::{peer, AllowList, Error, LabelMultimap, Peer, ReadObjects};
use netpol_controller_k8s_api::{
    labels::Map, LabelSelector, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
    NetworkPolicyPeer, NetworkPolicySpec, ObjectMeta,
};
use std::sync::Arc;

const POLICY_TYPES: [&str; 2] = ["Ingress", "Egress"];

/// Builds peers and policies, always admitting the allow-listed infrastructure pods.
#[derive(Clone, Debug)]
pub struct Synthesizer {
    allow: Arc<AllowList>,
}

/// The peers to place on ingress and egress rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Peers {
    pub ingress: Vec<Peer>,
    pub egress: Vec<Peer>,
}

/// The deterministic name of the policy synthesized for a workload.
pub fn policy_name(name: &str, namespace: &str) -> String {
    format!("{name}-{namespace}-netpol")
}

// === impl Synthesizer ===

impl Synthesizer {
    pub fn new(allow: Arc<AllowList>) -> Self {
        Self { allow }
    }

    #[cfg(test)]
    pub(crate) fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Returns the allow-list peers followed by one peer per key of `target`.
    pub fn build_peers(&self, target: &LabelMultimap) -> Result<Peers, Error> {
        if target.is_empty() {
            return Err(Error::EmptyParam("target labels"));
        }
        if self.allow.peers().is_empty() {
            return Err(Error::EmptyParam("allow-list peers"));
        }

        let peers = self
            .allow
            .peers()
            .iter()
            .cloned()
            .chain(
                target
                    .iter()
                    .map(|(key, values)| Peer::new(key.clone(), values.iter().cloned())),
            )
            .collect::<Vec<_>>();
        Ok(Peers {
            ingress: peers.clone(),
            egress: peers,
        })
    }

    /// Assembles a policy with a single ingress and a single egress rule, each holding the
    /// full peer list for `target`.
    pub fn new_policy(
        &self,
        name: &str,
        namespace: &str,
        pod_selector: &Map,
        target: &LabelMultimap,
    ) -> Result<NetworkPolicy, Error> {
        if name.is_empty() {
            return Err(Error::EmptyParam("name"));
        }
        if namespace.is_empty() {
            return Err(Error::EmptyParam("namespace"));
        }
        if pod_selector.is_empty() {
            return Err(Error::EmptyParam("pod selector"));
        }
        let Peers { ingress, egress } = self.build_peers(target)?;

        Ok(NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(policy_name(name, namespace)),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector: selector(pod_selector),
                ingress: Some(vec![NetworkPolicyIngressRule {
                    from: Some(ingress.iter().map(Peer::to_k8s).collect()),
                    ..Default::default()
                }]),
                egress: Some(vec![NetworkPolicyEgressRule {
                    to: Some(egress.iter().map(Peer::to_k8s).collect()),
                    ..Default::default()
                }]),
                policy_types: Some(POLICY_TYPES.iter().map(|t| t.to_string()).collect()),
            }),
        })
    }
}

fn selector(labels: &Map) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels.clone()),
        match_expressions: None,
    }
}

/// Replaces the policy's pod selector with an exact match on `labels`.
pub fn with_pod_selector(mut policy: NetworkPolicy, labels: &Map) -> NetworkPolicy {
    policy.spec.get_or_insert_with(Default::default).pod_selector = selector(labels);
    policy
}

/// Appends each new peer to every existing rule that does not already hold an equal peer.
///
/// Rules are never created; a policy without ingress (or egress) rules is left without them.
pub fn extend_peers(mut policy: NetworkPolicy, peers: &Peers) -> NetworkPolicy {
    fn extend(existing: &mut Option<Vec<NetworkPolicyPeer>>, new: &[Peer]) {
        let existing = existing.get_or_insert_with(Vec::new);
        for peer in new {
            if !peer::contains(existing, peer) {
                existing.push(peer.to_k8s());
            }
        }
    }

    if let Some(spec) = policy.spec.as_mut() {
        for rule in spec.ingress.iter_mut().flatten() {
            extend(&mut rule.from, &peers.ingress);
        }
        for rule in spec.egress.iter_mut().flatten() {
            extend(&mut rule.to, &peers.egress);
        }
    }
    policy
}

/// Removes every peer that matches any (key, value) pair of `labels` from the first ingress
/// rule and the first egress rule. Later rules are not modified.
pub fn purge_label_peers(mut policy: NetworkPolicy, labels: &LabelMultimap) -> NetworkPolicy {
    let retain = |peers: &mut Option<Vec<NetworkPolicyPeer>>| {
        if let Some(peers) = peers.as_mut() {
            peers.retain(|p| !peer::intersects(p, labels));
        }
    };

    if let Some(spec) = policy.spec.as_mut() {
        if let Some(rule) = spec.ingress.iter_mut().flatten().next() {
            retain(&mut rule.from);
        }
        if let Some(rule) = spec.egress.iter_mut().flatten().next() {
            retain(&mut rule.to);
        }
    }
    policy
}

/// Returns the first policy in `namespace` with an ingress or egress peer that accepts any of
/// `labels`.
pub async fn find_policy_by_labels<R>(
    client: &R,
    namespace: &str,
    labels: &Map,
) -> Result<NetworkPolicy, Error>
where
    R: ReadObjects + ?Sized,
{
    let policies = client
        .list_policies(namespace)
        .await
        .map_err(|source| Error::List {
            namespace: namespace.to_string(),
            source,
        })?;

    let labels = LabelMultimap::from(labels);
    policies
        .into_iter()
        .find(|policy| matches_labels(policy, &labels))
        .ok_or_else(|| Error::NotFound {
            namespace: namespace.to_string(),
        })
}

fn matches_labels(policy: &NetworkPolicy, labels: &LabelMultimap) -> bool {
    let Some(spec) = policy.spec.as_ref() else {
        return false;
    };
    let ingress = spec
        .ingress
        .iter()
        .flatten()
        .flat_map(|r| r.from.iter().flatten());
    let egress = spec
        .egress
        .iter()
        .flatten()
        .flat_map(|r| r.to.iter().flatten());
    ingress.chain(egress).any(|p| peer::intersects(p, labels))
}

/// Reads the recognizable peers of the first ingress and first egress rules.
#[cfg(test)]
pub(crate) fn first_rule_peers(policy: &NetworkPolicy) -> Peers {
    let read = |peers: Option<&Vec<NetworkPolicyPeer>>| {
        peers
            .into_iter()
            .flatten()
            .filter_map(Peer::from_k8s)
            .collect()
    };
    let spec = policy.spec.as_ref();
    Peers {
        ingress: read(
            spec.and_then(|s| s.ingress.as_ref())
                .and_then(|r| r.first())
                .and_then(|r| r.from.as_ref()),
        ),
        egress: read(
            spec.and_then(|s| s.egress.as_ref())
                .and_then(|r| r.first())
                .and_then(|r| r.to.as_ref()),
        ),
    }
}
