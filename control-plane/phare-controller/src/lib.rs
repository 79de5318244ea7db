pub mod builders;
pub mod config;
pub mod controller;
pub mod crd;
pub mod kinds;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod web;

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn init_tracing(default_directive: &str) {
    let directive = default_directive
        .parse()
        .or_else(|_| "info".parse());
    let mut filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy();
    if let Ok(directive) = directive {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
