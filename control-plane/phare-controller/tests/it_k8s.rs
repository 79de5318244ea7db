// Integration tests that expect a running k8s cluster with the Phare CRD installed.
// Enable via: cargo test -p phare-controller --test it_k8s -- --ignored

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use phare_controller::config::{ControllerConfig, FeaturesConfig, ReconcileConfig};
use phare_controller::crd::{Phare, PharePhase};
use phare_controller::runtime::spawn_controller;

mod common;
use common::{NS, demo_spec, http_service, uniq};

fn test_config() -> ControllerConfig {
    ControllerConfig {
        profile: "dev".into(),
        http_port: 0,
        watch_namespace: Some(NS.into()),
        controller_id: common::CONTROLLER_ID.into(),
        concurrency: 2,
        reconcile: ReconcileConfig::default(),
        features: FeaturesConfig::default(),
    }
    .apply_profile_defaults()
}

async fn wait_for<T, F, Fut>(mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..60 {
        if let Some(v) = probe().await {
            return Some(v);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    None
}

#[test_log::test(tokio::test)]
#[ignore]
async fn creates_workload_and_reports_active() {
    // Pre-conditions:
    // - KUBECONFIG points to a working cluster
    // - Phare CRD applied (cargo run --bin crdgen | kubectl apply -f -)
    // - Namespace "default" exists
    let client = Client::try_default().await.expect("kube client");
    let controller = spawn_controller(client.clone(), test_config());

    let name = uniq("phare-it");
    let mut spec = demo_spec();
    spec.service = Some(http_service("ClusterIP", 80));
    let mut phare = Phare::new(&name, spec);
    phare.metadata.namespace = Some(NS.into());

    let phares: Api<Phare> = Api::namespaced(client.clone(), NS);
    phares
        .create(&PostParams::default(), &phare)
        .await
        .expect("create phare");

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), NS);
    let dep = wait_for(|| async { deployments.get_opt(&name).await.ok().flatten() })
        .await
        .expect("deployment created");
    let owner = dep.owner_references().first().cloned().expect("owner ref");
    assert_eq!(owner.kind, "Phare");
    assert_eq!(owner.name, name);

    let services: Api<Service> = Api::namespaced(client.clone(), NS);
    assert!(services.get_opt(&name).await.expect("get service").is_some());

    let phase = wait_for(|| async {
        phares
            .get_opt(&name)
            .await
            .ok()
            .flatten()
            .and_then(|p| p.status)
            .and_then(|s| s.phase)
            .filter(|p| *p == PharePhase::Active)
    })
    .await;
    assert_eq!(phase, Some(PharePhase::Active));

    phares
        .delete(&name, &DeleteParams::default())
        .await
        .expect("delete phare");
    controller.abort();
}
