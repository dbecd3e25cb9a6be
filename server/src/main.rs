use tokio::net::TcpListener;
use todo_server::{AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,todo_server=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::connect(&config.database).await?;

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    todo_server::run(listener, state).await?;
    Ok(())
}
