/// TableViews HTTP server
///
/// Serves view definitions and aggregate queries over per-app in-memory tables.

use tableviews::config::ServerConfig;
use tableviews::server::run_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;

    run_server(&config).await
}
