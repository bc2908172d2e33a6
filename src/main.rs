use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(error) = pnl_feed_client::run().await {
        tracing::error!(%error, "pnl feed exited with error");
        std::process::exit(1);
    }
}
