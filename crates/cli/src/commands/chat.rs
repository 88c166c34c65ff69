//! `promptloom chat` — Interactive or single-message chat mode.

use std::io::{BufRead, Write};

use promptloom_config::AppConfig;
use promptloom_core::ConversationTurn;
use promptloom_engine::{ChatEngine, ChatRequest, ChatStreamEvent, PersonaMode};
use tracing::warn;

pub async fn run(
    message: Option<String>,
    knowledge: Vec<String>,
    admin: bool,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let store = super::build_store(&config);
    if let Some(store) = &store {
        store.initialize().await?;

        // Batch load: one bad file warns and moves on, it never aborts the
        // rest of the batch.
        for path in &knowledge {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let source = std::path::Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.clone());
                    match store.add_document(&source, &text).await {
                        Ok(count) => println!("  indexed {source}: {count} chunks"),
                        Err(e) => warn!(path = %path, error = %e, "Failed to index document"),
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "Failed to read document"),
            }
        }
    } else if !knowledge.is_empty() {
        warn!("Retrieval is disabled in config; ignoring --knowledge");
    }

    let engine = super::build_engine(&config, store)?;
    engine.load().await?;

    let mode = if admin {
        PersonaMode::Admin
    } else {
        PersonaMode::Standard
    };

    match message {
        Some(message) => {
            let mut request = ChatRequest::new(message);
            request.mode = mode;
            request.debug = debug;
            stream_reply(&engine, &request).await?;
        }
        None => interactive_loop(&engine, mode, debug).await?,
    }

    Ok(())
}

/// Read lines from stdin, keeping the conversation history across turns.
async fn interactive_loop(
    engine: &ChatEngine,
    mode: PersonaMode,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Promptloom chat — type a message, or 'exit' to quit.\n");

    let stdin = std::io::stdin();
    let mut history: Vec<ConversationTurn> = Vec::new();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let mut request = ChatRequest::new(line);
        request.history = history.clone();
        request.mode = mode;
        request.debug = debug;

        let reply = stream_reply(engine, &request).await?;
        history.push(ConversationTurn::new(line, reply));
    }

    Ok(())
}

/// Stream one reply to stdout; returns the full text.
async fn stream_reply(
    engine: &ChatEngine,
    request: &ChatRequest,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut rx = engine.chat_stream(request).await?;
    let mut reply = String::new();

    while let Some(event) = rx.recv().await {
        match event {
            ChatStreamEvent::Debug { info } => {
                eprintln!("--- assembly debug ---");
                eprintln!("{}", serde_json::to_string_pretty(&info)?);
                eprintln!("----------------------");
            }
            ChatStreamEvent::Token { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
                reply.push_str(&content);
            }
            ChatStreamEvent::Done { sources } => {
                println!();
                if !sources.is_empty() {
                    println!("  [sources: {}]", sources.join(", "));
                }
            }
            ChatStreamEvent::Error { message } => {
                println!();
                return Err(format!("Generation failed: {message}").into());
            }
        }
    }

    Ok(reply.trim().to_string())
}
