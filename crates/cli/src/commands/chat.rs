use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use sitequote_agent::KeywordExtractor;
use sitequote_core::config::AppConfig;
use sitequote_core::{EstimationService, ImageRef};

use super::CommandResult;

/// Interactive conversation on stdin/stdout. `/image <ref> [caption]`
/// registers a photo, `/quit` ends the session; everything else is a
/// message to the estimator.
pub fn run(config: AppConfig) -> CommandResult {
    match chat_loop(config) {
        Ok(()) => CommandResult::ok("conversation ended"),
        Err(error) => CommandResult::failure("chat", "runtime", format!("{error:#}"), 1),
    }
}

fn chat_loop(config: AppConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building tokio runtime")?;

    let service = EstimationService::new(Arc::new(config), KeywordExtractor::new());
    let session_id = runtime.block_on(async {
        let (session_id, greeting) = service.create_session().await?;
        println!("{greeting}");
        Ok::<_, anyhow::Error>(session_id)
    })?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush().context("flushing prompt")?;

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).context("reading stdin")?;
        if read == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }

        let response = if let Some(rest) = line.strip_prefix("/image ") {
            let (reference, caption) = match rest.trim().split_once(' ') {
                Some((reference, caption)) => {
                    (reference.to_string(), Some(caption.trim().to_string()))
                }
                None => (rest.trim().to_string(), None),
            };
            runtime.block_on(service.process_image(
                &session_id,
                ImageRef(reference),
                caption,
            ))
        } else {
            runtime.block_on(service.process_message(&session_id, line))
        };

        match response {
            Ok((reply, _)) => println!("{reply}"),
            Err(error) => println!("{}", error.user_message()),
        }
    }

    Ok(())
}
