//! WhatsApp Voice Bridge
//!
//! Webhook server that lets a business place and receive WhatsApp voice
//! calls through a hosted telephony platform. The platform does signaling,
//! media and conferencing; this service answers its webhooks with
//! call-control markup and keeps track of live calls and conference rooms.

mod address;
mod models;
mod server;
mod state;

fn main() {
    // Load environment variables (RUST_LOG included)
    dotenvy::dotenv().ok();

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("whatsapp_voice_bridge=info".parse().unwrap()))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_server()) {
        tracing::error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = server::ServerConfig::from_env();

    tracing::info!(
        "Starting WhatsApp voice bridge on port {} (agent: {})",
        config.port,
        config.agent_identity
    );

    server::run_server(config).await
}
