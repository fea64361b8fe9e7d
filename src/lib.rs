pub mod agent;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod intent;
pub mod models;
pub mod server;
pub mod storage;

use agent::Advisor;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP API Port: {:?}", args.http_port);
    info!("Backend URL: {}", args.backend_url);
    info!("Store Type: {}", args.store_type);
    match args.store_type.to_lowercase().as_str() {
        "file" => info!("Store Path: {}", args.store_path),
        "redis" => info!("Store Redis URL: {}", args.store_redis_url),
        _ => {}
    }
    info!(
        "Cache TTLs (s): recommendations={}, risk_analysis={}, market_trends={}, portfolio={}",
        args.recommendations_ttl_secs,
        args.risk_analysis_ttl_secs,
        args.market_trends_ttl_secs,
        args.portfolio_ttl_secs
    );
    info!("Responses Path: {}", args.responses_path.as_deref().unwrap_or("built-in"));
    info!("Typing Delay (ms): {}..={}", args.typing_delay_min_ms, args.typing_delay_max_ms);
    info!("-------------------------");

    let advisor = Arc::new(Advisor::from_args(&args).await?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, advisor, args.server_api_key.clone(), args.clone());
    server.run().await?;

    Ok(())
}
