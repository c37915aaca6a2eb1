use banneria::{
    logger::{self, log_config_info, log_startup_info},
    server::{self, AppState},
    Config,
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    logger::init()?;
    if !dotenv_loaded {
        log::warn!("No .env file found, using system environment variables");
    }

    let config = Config::from_env()?;
    config.validate()?;
    log_config_info(&config);

    let state = AppState::from_config(&config).await?;
    log_startup_info(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.port.unwrap_or(server::DEFAULT_PORT),
    );

    server::run(state, &config).await?;
    Ok(())
}
