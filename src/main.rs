use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pana_ledger::api::{self, ApiDoc};
use pana_ledger::blockchain::{ChainStore, JsonFileStore, KeyCustody, Ledger, SledStore};
use pana_ledger::config::{NodeSettings, StoreKind};

// Opens the configured store and loads (or creates) the chain from it
fn open_ledger(settings: &NodeSettings) -> anyhow::Result<Ledger> {
    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("creating data directory {}", settings.data_dir.display()))?;

    let store: Arc<dyn ChainStore> = match settings.store {
        StoreKind::Json => {
            let path = settings.data_dir.join("chain.json");
            info!("Using JSON chain file at {}", path.display());
            Arc::new(JsonFileStore::new(path))
        }
        StoreKind::Sled => {
            let path = settings.data_dir.join("ledger.sled");
            info!("Using sled database at {}", path.display());
            Arc::new(SledStore::open(&path).context("opening sled database")?)
        }
    };

    let ledger = Ledger::open(store, settings.ledger).context("loading ledger")?;
    info!(
        "Ledger ready: {} blocks, difficulty {}, mining reward {}",
        ledger.chain().len(),
        ledger.difficulty(),
        ledger.mining_reward()
    );

    Ok(ledger)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = NodeSettings::from_env()?;
    let ledger = web::Data::new(open_ledger(&settings)?);
    let custody = web::Data::new(KeyCustody::new());

    info!("Starting HTTP server at http://{}:{}", settings.host, settings.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .app_data(custody.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
