use clap::{ Parser, Subcommand };
use crate::llm::{ LlmConfig, DEFAULT_THINKING_BUDGET };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Speak your mind, be professional", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API server.
    Serve(ServeArgs),
    /// Rewrite a message through a running server.
    Rewrite(RewriteArgs),
    /// List the supported output languages.
    Languages,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    #[command(flatten)]
    pub llm: LlmArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub analytics: AnalyticsArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LlmArgs {
    /// API key for the Gemini API.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    /// Model name for the rewrite (e.g., gemini-2.5-flash-preview-04-17)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Base URL of the Gemini API (e.g., https://generativelanguage.googleapis.com/v1beta)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// Cap on the model's internal reasoning tokens.
    #[arg(long, env = "THINKING_BUDGET", default_value_t = DEFAULT_THINKING_BUDGET)]
    pub thinking_budget: u32,
}

impl LlmArgs {
    pub fn to_llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.chat_api_key.clone().filter(|k| !k.trim().is_empty()),
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
            thinking_budget: self.thinking_budget,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct StoreArgs {
    /// Message log store type (sqlite, redis, memory)
    #[arg(long, env = "LOG_STORE_TYPE", default_value = "sqlite")]
    pub log_store_type: String,

    /// SQLite database file for the message log.
    #[arg(long, env = "LOG_STORE_PATH", default_value = "professionator.db")]
    pub log_store_path: String,

    /// Redis endpoint for the message log (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "LOG_STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub log_store_host: String,

    /// Prefix for Redis message log keys.
    #[arg(long, env = "LOG_REDIS_PREFIX", default_value = "professionator:")]
    pub log_redis_prefix: String,

    /// How long a request waits for the message log write before moving on.
    #[arg(long, env = "LOG_WRITE_TIMEOUT_MS", default_value = "2000")]
    pub log_write_timeout_ms: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyticsArgs {
    /// PostHog project API key. Analytics are disabled when unset.
    #[arg(long, env = "POSTHOG_KEY")]
    pub posthog_key: Option<String>,

    /// PostHog ingestion host.
    #[arg(long, env = "POSTHOG_HOST", default_value = "https://us.i.posthog.com")]
    pub posthog_host: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RewriteArgs {
    /// Message to rewrite. Read from stdin when omitted.
    pub text: Option<String>,

    /// Output language (see `languages`). Server default when omitted.
    #[arg(short, long)]
    pub language: Option<String>,

    /// Base URL of a running professionator server.
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:3000")]
    pub server_url: String,

    #[command(flatten)]
    pub analytics: AnalyticsArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_defaults() {
        let args = Args::try_parse_from(["professionator", "serve", "--log-store-type", "memory"]).unwrap();
        let Command::Serve(serve) = args.command else { panic!("expected serve") };
        assert_eq!(serve.store.log_store_type, "memory");
        assert_eq!(serve.llm.thinking_budget, DEFAULT_THINKING_BUDGET);
        assert!(!serve.enable_tls);
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let args = Args::try_parse_from(["professionator", "serve", "--chat-api-key", " "]).unwrap();
        let Command::Serve(serve) = args.command else { panic!("expected serve") };
        assert!(serve.llm.to_llm_config().api_key.is_none());
    }

    #[test]
    fn parses_rewrite() {
        let args = Args::try_parse_from([
            "professionator", "rewrite", "fix your code", "-l", "Spanish",
        ]).unwrap();
        let Command::Rewrite(rewrite) = args.command else { panic!("expected rewrite") };
        assert_eq!(rewrite.text.as_deref(), Some("fix your code"));
        assert_eq!(rewrite.language.as_deref(), Some("Spanish"));
    }
}
