//! Trading-card demo service.
//!
//! Configuration comes from `card-api.toml` (optional) and
//! `CARD_API__SECTION__FIELD` environment variables, e.g.
//! `CARD_API__SERVER__PORT=3000`.

mod routes;
mod store;

use kanto::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_dotenv()?
        .with_optional_file("card-api.toml")?
        .with_env_prefix("CARD_API")
        .load()?;

    init_logging(&LogConfig::from(&config.logging))?;
    init_metrics(&MetricsConfig::from(&config.metrics))?;

    let app = routes::build_app(&config)?;
    app.listen(config.server.port, |addr| {
        tracing::info!(addr = %addr, "card-api ready");
    })
    .await?;
    Ok(())
}
