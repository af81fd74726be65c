pub mod analytics;
pub mod cli;
pub mod client;
pub mod config;
pub mod llm;
pub mod models;
pub mod server;
pub mod store;

use analytics::Analytics;
use cli::{ Args, Command, ServeArgs };
use log::info;
use server::{ AppState, Server };
use std::error::Error;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve) => serve_http(serve).await,
        Command::Rewrite(rewrite) => client::terminal::run_rewrite(rewrite).await,
        Command::Languages => {
            client::terminal::print_languages();
            Ok(())
        }
    }
}

async fn serve_http(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let llm_config = args.llm.to_llm_config();

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Chat Model: {}", llm_config.completion_model.as_deref().unwrap_or(llm::DEFAULT_CHAT_MODEL));
    info!("Chat Base URL: {}", llm_config.base_url.as_deref().unwrap_or(llm::DEFAULT_BASE_URL));
    info!("Thinking Budget: {}", llm_config.thinking_budget);
    info!("Chat API Key Set: {}", llm_config.api_key.is_some());
    info!("Log Store Type: {}", args.store.log_store_type);
    info!("Log Write Timeout: {}ms", args.store.log_write_timeout_ms);
    info!("Analytics Enabled: {}", args.analytics.posthog_key.is_some());
    if args.analytics.posthog_key.is_some() {
        info!("Analytics Host: {}", args.analytics.posthog_host);
    }
    info!("-------------------------");

    let state = AppState {
        chat_client: llm::chat::new_client(&llm_config)?,
        message_log: store::initialize_message_log(&args.store)?,
        analytics: Analytics::from_args(&args.analytics)?,
        log_write_timeout: Duration::from_millis(args.store.log_write_timeout_ms),
    };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
