pub mod agent;
pub mod models;
pub mod server;
pub mod config;
pub mod context;
pub mod llm;
pub mod cli;
pub mod usage;

use agent::MentorAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Prompts Path: {}", args.prompts_path);
    info!("Guides Path: {}", args.guides_path);
    info!("Usage Store Type: {}", args.usage_store_type);
    if args.usage_store_type.eq_ignore_ascii_case("redis") {
        info!("Usage Redis URL: {}", args.usage_redis_url);
        info!("Usage Redis Prefix: {}", args.usage_redis_prefix);
    }
    info!("Rate Limit: {}/s", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(MentorAgent::new(args.clone()).await?);
    let addr = args.server_addr.clone();
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
