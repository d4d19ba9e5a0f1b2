#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod queue;
mod relay;
mod trello;
mod utils;
mod web;

use config::Config;
use web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(workers) = args.workers {
        config.queue.workers = workers.max(1);
    }
    let config = Arc::new(config);
    utils::logging::init_tracing(&config.logging);
    info!("trello relay starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    let trello = Arc::new(trello::TrelloClient::new(&config.trello)?);

    let task_queue = Arc::new(queue::TaskQueue::new(db_manager.task_store(), &config.queue));
    let recovered = task_queue.recover().await?;
    if recovered > 0 {
        info!("recovered {} tasks from a previous run", recovered);
    }

    let dispatcher = Arc::new(relay::EventDispatcher::new(
        relay::EventMatcher::new(db_manager.preference_store()),
        task_queue.clone(),
    ));

    let worker = Arc::new(relay::Worker::new(
        db_manager.as_ref().clone(),
        trello.clone(),
    ));
    let pool = relay::WorkerPool::new(task_queue.clone(), worker, config.queue.workers);

    let web_server = WebServer::new(
        config.clone(),
        db_manager.clone(),
        trello.clone(),
        dispatcher.clone(),
        task_queue.clone(),
    )
    .await?;

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    let worker_handle = tokio::spawn(async move {
        pool.run().await;
    });

    tokio::select! {
        _ = web_handle => {},
        _ = worker_handle => {},
    }

    info!("trello relay shutting down");
    Ok(())
}
