use crate::LabelMultimap;
use netpol_controller_k8s_api::{
    labels::{self, Operator},
    LabelSelector, LabelSelectorRequirement, NetworkPolicyPeer,
};
use std::collections::BTreeSet;

/// A single-key `In` match used as one entry of an ingress or egress rule.
///
/// Two peers are equal when their keys and value sets are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    key: String,
    values: BTreeSet<String>,
}

// === impl Peer ===

impl Peer {
    pub fn new<V: Into<String>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// Reads a peer back from a policy.
    ///
    /// Only peers consisting of a pod selector with exactly one `In` expression (the shape this
    /// controller writes) are recognized.
    pub fn from_k8s(peer: &NetworkPolicyPeer) -> Option<Self> {
        if peer.namespace_selector.is_some() || peer.ip_block.is_some() {
            return None;
        }
        let selector = peer.pod_selector.as_ref()?;
        if selector.match_labels.as_ref().is_some_and(|l| !l.is_empty()) {
            return None;
        }
        match selector.match_expressions.as_deref()? {
            [req] if req.operator.parse::<Operator>() == Ok(Operator::In) => Some(Self::new(
                req.key.clone(),
                req.values.iter().flatten().cloned(),
            )),
            _ => None,
        }
    }

    pub fn to_k8s(&self) -> NetworkPolicyPeer {
        NetworkPolicyPeer {
            pod_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: self.key.clone(),
                    operator: Operator::In.to_string(),
                    values: Some(self.values.iter().cloned().collect()),
                }]),
                match_labels: None,
            }),
            ..Default::default()
        }
    }
}

/// Returns true if any `In` requirement of the peer accepts a (key, value) pair of `labels`.
pub(crate) fn intersects(peer: &NetworkPolicyPeer, labels: &LabelMultimap) -> bool {
    labels::peer_requirements(peer).any(|req| {
        labels.get(&req.key).is_some_and(|values| {
            values
                .iter()
                .any(|v| labels::requirement_accepts(req, &req.key, v))
        })
    })
}

/// Returns true if `peers` already holds a peer structurally equal to `peer`.
pub(crate) fn contains(peers: &[NetworkPolicyPeer], peer: &Peer) -> bool {
    peers
        .iter()
        .any(|p| Peer::from_k8s(p).as_ref() == Some(peer))
}
