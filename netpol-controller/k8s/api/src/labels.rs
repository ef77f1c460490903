use crate::{LabelSelector, LabelSelectorRequirement, NetworkPolicyPeer};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// An exact-match label set, as found in `metadata.labels` or `matchLabels`.
pub type Map = BTreeMap<String, String>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidOperator(String);

/// Returns the exact-match labels of a selector. Expressions are ignored.
pub fn selector_map(selector: &LabelSelector) -> Map {
    selector.match_labels.clone().unwrap_or_default()
}

/// Iterates over the pod selector requirements of a network policy peer.
pub fn peer_requirements(
    peer: &NetworkPolicyPeer,
) -> impl Iterator<Item = &LabelSelectorRequirement> {
    peer.pod_selector
        .iter()
        .flat_map(|sel| sel.match_expressions.iter().flatten())
}

/// Returns true if the requirement is an `In` requirement for `key` that
/// accepts `value`.
pub fn requirement_accepts(req: &LabelSelectorRequirement, key: &str, value: &str) -> bool {
    req.key == key
        && req.operator.parse::<Operator>() == Ok(Operator::In)
        && req.values.iter().flatten().any(|v| v == value)
}

// === impl Operator ===

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for Operator {
    type Err = InvalidOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            s => Err(InvalidOperator(s.to_string())),
        }
    }
}

impl fmt::Display for InvalidOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid label selector operator: {}", self.0)
    }
}

impl std::error::Error for InvalidOperator {}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn mk_req(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: Some(values.iter().map(ToString::to_string).collect()),
        }
    }

    #[test]
    fn test_requirement_accepts() {
        for (req, key, value, accepts, msg) in [
            (mk_req("app", "In", &["web"]), "app", "web", true, "exact"),
            (
                mk_req("app", "In", &["api", "web"]),
                "app",
                "web",
                true,
                "one of many",
            ),
            (mk_req("app", "In", &["api"]), "app", "web", false, "value"),
            (mk_req("tier", "In", &["web"]), "app", "web", false, "key"),
            (
                mk_req("app", "NotIn", &["web"]),
                "app",
                "web",
                false,
                "operator",
            ),
        ] {
            assert_eq!(requirement_accepts(&req, key, value), accepts, "{}", msg);
        }
    }

    #[test]
    fn peer_requirements_flatten_selector() {
        let peer = NetworkPolicyPeer {
            pod_selector: Some(LabelSelector {
                match_expressions: Some(vec![
                    mk_req("app", "In", &["web"]),
                    mk_req("tier", "In", &["data"]),
                ]),
                match_labels: None,
            }),
            ..Default::default()
        };
        let keys = peer_requirements(&peer)
            .map(|r| r.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["app", "tier"]);

        assert_eq!(peer_requirements(&NetworkPolicyPeer::default()).count(), 0);
    }

    #[test]
    fn selector_map_ignores_expressions() {
        let selector = LabelSelector {
            match_labels: Some(btreemap! { "app".to_string() => "web".to_string() }),
            match_expressions: Some(vec![mk_req("tier", "In", &["data"])]),
        };
        assert_eq!(
            selector_map(&selector),
            btreemap! { "app".to_string() => "web".to_string() }
        );
        assert!(selector_map(&LabelSelector::default()).is_empty());
    }
}
