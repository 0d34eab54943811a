pub mod agent;
pub mod models;
pub mod server;
pub mod config;
pub mod llm;
pub mod cli;
pub mod history;
pub mod reasoning;
pub mod session;

use agent::ReasoningAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {:?}", args.http_port);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!(
        "Stage Token Limits: thinker={} critic={} judge={}",
        args.thinker_max_tokens,
        args.critic_max_tokens,
        args.judge_max_tokens
    );
    info!("Include History: {}", args.include_history);
    info!("History Store Type: {}", args.history_type);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("-------------------------");

    let agent = Arc::new(ReasoningAgent::new(&args).await?);

    if let Some(query) = &args.query {
        let message = agent.submit_and_run(query).await?;
        println!("{}", message.content);
        return Ok(());
    }

    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), agent, args.http_port);
    server.run().await?;

    Ok(())
}
