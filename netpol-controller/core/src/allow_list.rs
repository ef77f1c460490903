use crate::{LabelMultimap, Peer};
use std::{fmt, str::FromStr};

/// The infrastructure pods every synthesized policy admits, keyed by a descriptive name.
const DEFAULT_LABELS: [(&str, &str, &str); 5] = [
    ("nginx", "app.kubernetes.io/name", "ingress-nginx"),
    ("contour", "app.kubernetes.io/name", "contour"),
    ("traefik", "app.kubernetes.io/name", "traefik"),
    ("haproxy", "app.kubernetes.io/name", "haproxy"),
    ("coredns", "k8s-app", "kube-dns"),
];

/// The set of infrastructure labels that are materialized as peers on every ingress and egress
/// rule.
///
/// The list is built once at startup and never changes; its peers are computed at
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowList {
    peers: Vec<Peer>,
}

/// A single `key=value` allow-list entry, as accepted on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowLabel {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidAllowLabel(String);

// === impl AllowList ===

impl AllowList {
    /// One peer per allow-listed key; entries sharing a key collapse into one peer.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }
}

impl Default for AllowList {
    fn default() -> Self {
        DEFAULT_LABELS
            .iter()
            .map(|&(_, key, value)| AllowLabel {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect()
    }
}

impl FromIterator<AllowLabel> for AllowList {
    fn from_iter<T: IntoIterator<Item = AllowLabel>>(iter: T) -> Self {
        let labels = iter
            .into_iter()
            .map(|AllowLabel { key, value }| (key, value))
            .collect::<LabelMultimap>();
        let peers = labels
            .iter()
            .map(|(key, values)| Peer::new(key.clone(), values.iter().cloned()))
            .collect();
        Self { peers }
    }
}

// === impl AllowLabel ===

impl FromStr for AllowLabel {
    type Err = InvalidAllowLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                Ok(Self {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            _ => Err(InvalidAllowLabel(s.to_string())),
        }
    }
}

impl fmt::Display for InvalidAllowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid allow-list label {:?}: expected key=value", self.0)
    }
}

impl std::error::Error for InvalidAllowLabel {}
