//! HTTP routes.

use std::time::Duration;

use http::StatusCode;
use kanto::config::KantoConfig;
use kanto::prelude::*;
use kanto::telemetry::metrics::scrape;

use crate::store::{CardStore, NewCard};

/// The card store service.
pub const CARDS: ServiceKey<CardStore> = ServiceKey::new("cards");

/// Service name reported by `/health`.
const SERVICE: &str = "card-api";

/// Builds the application from loaded configuration.
pub fn build_app(config: &KantoConfig) -> anyhow::Result<App> {
    let container = ContainerBuilder::new()
        .register_service(CARDS.name(), |_| Ok(CardStore::default()))?
        .build();

    let mut app = App::new()
        .with_container(container)
        .with_config(ServerConfig::from(&config.server));

    app.use_middleware(RequestLogger::new().skip_path(config.metrics.path.clone()))
        .use_middleware(Cors::permissive());

    app.routes(Router::new("/").get("/health", health))?;
    app.routes(
        Router::new("/cards")
            .use_middleware(
                RateLimit::builder()
                    .limit(100)
                    .window(Duration::from_secs(60))
                    .per_ip()
                    .build(),
            )
            .get("/", list_cards)
            .get("/:id", get_card)
            .post("/", create_card)
            .delete("/:id", delete_card),
    )?;

    if config.metrics.enabled && config.metrics.listen_addr.is_none() {
        app.routes(Router::new("/").get(&config.metrics.path, scrape))?;
    }

    Ok(app)
}

async fn health(ctx: Context) -> KantoResult<Response> {
    let cards = ctx.services().resolve(&CARDS)?;
    ctx.json(&serde_json::json!({
        "status": "ok",
        "service": SERVICE,
        "cards": cards.len(),
    }))
}

async fn list_cards(ctx: Context) -> KantoResult<Response> {
    let store = ctx.services().resolve(&CARDS)?;
    let cards = store.list(ctx.query().get("kind"));
    ctx.json(&serde_json::json!({ "total": cards.len(), "cards": cards }))
}

async fn get_card(ctx: Context) -> KantoResult<Response> {
    let store = ctx.services().resolve(&CARDS)?;
    let id = ctx.params().get("id").unwrap_or_default();
    match store.get(id) {
        Some(card) => ctx.json(&card),
        None => Ok(ctx.not_found_with(format!("card {id} not found"))),
    }
}

async fn create_card(ctx: Context) -> KantoResult<Response> {
    let new: NewCard = ctx.json_body()?;
    if new.name.trim().is_empty() {
        return Err(KantoError::bad_request_with_details(
            "invalid card",
            serde_json::json!({ "field": "name", "reason": "must not be empty" }),
        ));
    }
    let store = ctx.services().resolve(&CARDS)?;
    let card = store.insert(new)?;
    tracing::info!(request_id = %ctx.request_id(), card_id = %card.id, "card created");
    ctx.json_with_status(StatusCode::CREATED, &card)
}

async fn delete_card(ctx: Context) -> KantoResult<Response> {
    let store = ctx.services().resolve(&CARDS)?;
    let id = ctx.params().get("id").unwrap_or_default();
    if store.remove(id) {
        Ok(ctx.no_content())
    } else {
        Err(KantoError::not_found(format!("card {id} not found")))
    }
}
