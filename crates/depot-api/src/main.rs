use depot_core::Config;
use depot_storage::CustomHandlerRegistry;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Compiled-in custom backends register their factories here.
    let custom = CustomHandlerRegistry::new();

    let (_state, router) = depot_api::setup::initialize_app(config.clone(), custom).await?;

    depot_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
