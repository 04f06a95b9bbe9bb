use anyhow::Context;

use stockyard_infra::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockyard_observability::init();

    let settings = Settings::from_env().context("reading settings")?;
    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;

    let app = stockyard_api::app::build_app(&settings).await?;

    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
