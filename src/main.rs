use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tracing::info;

use opensplit_ledger::config::{Args, StoreBackend};
use opensplit_ledger::routes::{self, AppState};
use opensplit_ledger::{logging, InMemoryStore, Ledger, MongoStore, Store};

async fn serve<S: Store>(args: &Args, store: Arc<S>) -> anyhow::Result<()> {
    let ledger = Ledger::new(store).with_timeout(args.store_timeout());
    let state = web::Data::new(AppState::new(ledger));

    info!("Listening on {}", args.listen);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .configure(routes::configure::<S>)
    })
    .shutdown_timeout(args.shutdown_timeout_secs)
    .bind(args.listen)?
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    args.validate().map_err(anyhow::Error::msg)?;

    match args.store {
        StoreBackend::Memory => {
            info!("Using the in-memory store; balances are lost on exit");
            serve(&args, Arc::new(InMemoryStore::new())).await?;
        }
        StoreBackend::Mongo => {
            info!("Using MongoDB database '{}'", args.mongodb_db);
            let store = MongoStore::connect(&args.mongodb_uri, &args.mongodb_db)
                .await
                .context("failed to connect to MongoDB")?;
            store
                .create_indexes()
                .await
                .context("failed to create MongoDB indexes")?;
            serve(&args, Arc::new(store)).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}
