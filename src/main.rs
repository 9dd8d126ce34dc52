use turma_registry::config::Config;
use turma_registry::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let store = Store::connect(&config.database_url).await?;
    log::info!("Opened student registry at {}", config.database_url);

    let app = turma_registry::app(store);
    log::info!("Starting student registry HTTP server on http://{}", config.addr);
    axum::Server::bind(&config.addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
