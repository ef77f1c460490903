//! Network policy controller engine
//!
//! The engine derives a `NetworkPolicy` for each workload (Pod, Deployment, StatefulSet,
//! DaemonSet) from two sources:
//!
//! - the workload's own labels (or, for controllers, its selector's `matchLabels`);
//! - the labels of objects the workload references through environment variables of the form
//!   `<name>.<namespace>.{svc,pod}.cluster.local`.
//!
//! Every synthesized policy admits traffic to and from pods carrying those labels, plus a fixed
//! allow-list of infrastructure pods (ingress controllers and cluster DNS).
//!
//! ```text
//! [ Event ] -> [ Reconciler ] -> [ attribute ] -> [ policy ] -> [ WriteObjects ]
//!                                     |              |
//!                                     +-> [ ReadObjects ] <-+
//! ```
//!
//! The engine keeps no state of its own: policies are located on the cluster by label match
//! whenever an update or delete must be applied.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod allow_list;
pub mod attribute;
mod client;
mod error;
pub mod labels;
mod peer;
pub mod policy;
mod reconcile;
mod workload;


pub use self::{
    allow_list::{AllowLabel, AllowList},
    client::{ReadObjects, WriteObjects},
    error::{Action, ClientError, Error},
    labels::LabelMultimap,
    peer::Peer,
    policy::{Peers, Synthesizer},
    reconcile::{Event, Outcome, Reconciler},
    workload::{Workload, WorkloadKind},
};

/// The label applied to workloads that carry no labels at all, so that their policy has a
/// non-empty pod selector.
pub const SYNTHESIZED_LABEL: &str = "netpol-ctrl";
