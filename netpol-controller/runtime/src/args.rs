use crate::{
    client::KubeClient,
    core::{AllowLabel, AllowList, Reconciler},
    index::{Index, IndexMetrics},
    k8s::{self, Object, Resource},
    Controller, ControllerMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{fmt, sync::Arc};
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "netpol-controller",
    about = "Maintains a NetworkPolicy for every workload"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "netpol=info,warn",
        env = "NETPOL_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Bounds every read and write against the Kubernetes API.
    #[clap(long, default_value = "5000")]
    api_timeout_ms: u64,

    /// Labels of infrastructure pods that every policy admits, as `key=value`.
    ///
    /// When set, replaces the built-in list of ingress controllers and cluster DNS.
    #[clap(
        long = "allow-label",
        env = "NETPOL_CONTROLLER_ALLOW_LABELS",
        value_delimiter = ','
    )]
    allow_labels: Vec<AllowLabel>,

    #[clap(long, default_value = "netpol-controller")]
    field_manager: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            api_timeout_ms,
            allow_labels,
            field_manager,
        } = self;

        let allow = Arc::new(if allow_labels.is_empty() {
            AllowList::default()
        } else {
            allow_labels.into_iter().collect::<AllowList>()
        });

        let mut prom = <Registry>::default();
        let index_metrics = IndexMetrics::register(&mut prom);
        let controller_metrics = ControllerMetrics::register(&mut prom);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        info!(peers = ?allow.peers(), "Admitting infrastructure pods");
        let client = KubeClient::new(
            runtime.client(),
            Duration::from_millis(api_timeout_ms),
            field_manager,
        );
        let reconciler = Arc::new(Reconciler::new(client, allow));
        let workers = Workers {
            reconciler,
            index_metrics,
            controller_metrics,
        };

        // Spawn resource watches, each feeding its own controller.

        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        workers.spawn("pods", pods, runtime.shutdown_handle());

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        workers.spawn("services", services, runtime.shutdown_handle());

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        workers.spawn("ingresses", ingresses, runtime.shutdown_handle());

        let deployments = runtime.watch_all::<k8s::Deployment>(watcher::Config::default());
        workers.spawn("deployments", deployments, runtime.shutdown_handle());

        let statefulsets = runtime.watch_all::<k8s::StatefulSet>(watcher::Config::default());
        workers.spawn("statefulsets", statefulsets, runtime.shutdown_handle());

        let daemonsets = runtime.watch_all::<k8s::DaemonSet>(watcher::Config::default());
        workers.spawn("daemonsets", daemonsets, runtime.shutdown_handle());

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

struct Workers {
    reconciler: Arc<Reconciler<KubeClient>>,
    index_metrics: IndexMetrics,
    controller_metrics: ControllerMetrics,
}

impl Workers {
    fn spawn<T, S>(&self, resource: &'static str, events: S, drain: drain::Watch)
    where
        T: Resource<DynamicType = ()>
            + Clone
            + fmt::Debug
            + Into<Object>
            + Send
            + Sync
            + 'static,
        S: Stream<Item = watcher::Event<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let index = Index::<T>::shared(tx, self.index_metrics.clone());
        tokio::spawn(
            kubert::index::namespaced(index, events).instrument(info_span!("index", %resource)),
        );

        let controller = Controller::new(
            T::kind(&()),
            rx,
            self.reconciler.clone(),
            self.controller_metrics.clone(),
        );
        tokio::spawn(
            controller
                .run(drain)
                .instrument(info_span!("controller", %resource)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_timeout_and_allow_labels() {
        let args = Args::try_parse_from([
            "netpol-controller",
            "--api-timeout-ms=250",
            "--allow-label=app=ingress,k8s-app=kube-dns",
        ])
        .expect("arguments must parse");

        assert_eq!(args.api_timeout_ms, 250);
        assert_eq!(
            args.allow_labels,
            vec![
                AllowLabel {
                    key: "app".to_string(),
                    value: "ingress".to_string(),
                },
                AllowLabel {
                    key: "k8s-app".to_string(),
                    value: "kube-dns".to_string(),
                },
            ]
        );
    }

    #[test]
    fn rejects_the_write_timeout_flag() {
        Args::try_parse_from(["netpol-controller", "--write-timeout-ms=250"])
            .expect_err("only --api-timeout-ms bounds API calls");
    }
}
