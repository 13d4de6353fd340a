use anyhow::Context;
use envconfig::Envconfig;
use kube::Client;
use svc_ingress::{config::ControllerConfig, init_tracing, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let cfg = ControllerConfig::init_from_env()
        .context("cannot read SVC_INGRESS_* environment")?
        .validate()?;
    info!(?cfg, "Starting svc-ingress controller");

    let client = Client::try_default()
        .await
        .context("cannot resolve cluster credentials")?;
    runtime::run_all(client, cfg).await
}
