use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = echo_addon::config::load()?;
    let addr = settings.addr();
    let ax = echo_addon::build(settings)?;

    tracing::info!("[echo-addon] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}
