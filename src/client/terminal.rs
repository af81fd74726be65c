use log::{ info, warn };
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{ ConversationSession, HttpChatApi, Phase, SessionState, ADVISORY };
use crate::analytics::Analytics;
use crate::cli::RewriteArgs;
use crate::config::languages::{ find_language, LANGUAGES };

/// Submits one message to a running server and streams the rewrite to
/// stdout. Progress captions go to stderr so the output can be piped.
pub async fn run_rewrite(args: RewriteArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let language = match args.language.as_deref() {
        Some(name) => {
            let Some(language) = find_language(name) else {
                return Err(format!("unsupported language '{}', see `professionator languages`", name).into());
            };
            Some(language.value.to_string())
        }
        None => None,
    };

    let api = HttpChatApi::new(&args.server_url)?;
    info!("Using rewrite endpoint {}", api.endpoint());
    let analytics = Analytics::from_args(&args.analytics)?;

    let session = ConversationSession::new(Arc::new(api), analytics);
    let mut updates = session.subscribe();
    session.set_input(text)?;
    session.set_language(language)?;
    session.submit()?;

    let mut printer = Printer::default();
    loop {
        let state = updates.borrow_and_update().clone();
        printer.render(&state)?;
        match state.phase() {
            Phase::Success => {
                println!();
                return Ok(());
            }
            Phase::Error => {
                eprintln!("{}", ADVISORY);
                return Err(ADVISORY.into());
            }
            _ => {}
        }
        if updates.changed().await.is_err() {
            warn!("Session closed before the rewrite finished");
            return Err(ADVISORY.into());
        }
    }
}

pub fn print_languages() {
    for language in LANGUAGES {
        if language.value == language.label {
            println!("{}", language.value);
        } else {
            println!("{} ({})", language.value, language.label);
        }
    }
}

/// Tracks what has already been written so each update only prints the
/// new part of the response.
#[derive(Default)]
struct Printer {
    caption: Option<&'static str>,
    printed: usize,
}

impl Printer {
    fn render(&mut self, state: &SessionState) -> std::io::Result<()> {
        if let Some(caption) = state.progress_caption {
            if self.caption != Some(caption) {
                eprintln!("{}", caption);
                self.caption = Some(caption);
            }
        }

        if let Some(response) = state.response() {
            if let Some(delta) = response.get(self.printed..) {
                if !delta.is_empty() {
                    let mut out = std::io::stdout().lock();
                    out.write_all(delta.as_bytes())?;
                    out.flush()?;
                    self.printed = response.len();
                }
            }
        }
        Ok(())
    }
}
