use envconfig::Envconfig;
use kube::Client;
use phare_controller::{config::ControllerConfig, init_tracing, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // kube's rustls-tls needs a process-wide crypto provider.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(?e, "CryptoProvider already installed; proceeding");
    }

    let cfg = ControllerConfig::init_from_env()?.apply_profile_defaults();
    info!(?cfg, "Starting phare-controller");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
