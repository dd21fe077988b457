use realmgate::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RealmgateError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        bind_addr = %config.bind_addr,
        identity = %config.identity.base_url,
        tick_rate_hz = config.tick.tick_rate_hz,
        spawn = %config.default_spawn,
        "starting realmgate"
    );

    let verifier = HttpIdentityClient::new(config.identity.clone())?;
    let server = RealmgateServerBuilder::new().config(config).build(verifier).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
    }
}
