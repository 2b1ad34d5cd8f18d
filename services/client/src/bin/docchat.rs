//! services/client/src/bin/docchat.rs

use client_lib::{
    adapters::{http::HttpBackend, storage::JsonFileStore},
    app::{guard::View, App},
    cli::{Repl, HELP},
    config::Config,
    error::ClientError,
};
use docchat_core::ports::KeyValueStore;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs the line editor on its own thread so a blocking `readline` never
/// stalls the runtime. Each prompt sent in yields exactly one result out.
fn spawn_line_reader() -> (std_mpsc::Sender<String>, mpsc::Receiver<rustyline::Result<String>>) {
    let (prompt_tx, prompt_rx) = std_mpsc::channel::<String>();
    let (line_tx, line_rx) = mpsc::channel(1);

    thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.blocking_send(Err(e));
                return;
            }
        };
        while let Ok(prompt) = prompt_rx.recv() {
            let line = editor.readline(&prompt);
            if let Ok(line) = &line {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
            }
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    (prompt_tx, line_rx)
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!(api = %config.api_base_url, "Configuration loaded. Starting client...");

    // --- 2. Open the Persisted State ---
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(config.state_path.clone())?);
    info!(path = %config.state_path.display(), "Persisted state opened");

    // --- 3. Initialize the Backend Adapter ---
    let backend = Arc::new(HttpBackend::new(&config, store.clone())?);

    // --- 4. Build the App & Restore the Session ---
    let app = App::new(backend, store);
    let view = app.start(View::DEFAULT_AUTHENTICATED).await;
    info!(view = view.path(), "Session hydrated");

    let mut repl = Repl::new(app);
    repl.sync_view().await;

    // --- 5. Run the REPL ---
    println!("docchat, connected to {}", config.api_base_url);
    println!("{}", HELP);
    let (prompts, mut lines) = spawn_line_reader();
    loop {
        if prompts.send(repl.prompt()).is_err() {
            break;
        }
        let line = match lines.recv().await {
            Some(Ok(line)) => line,
            Some(Err(ReadlineError::Interrupted)) => {
                println!("Ctrl-C. Type 'quit' to exit.");
                continue;
            }
            Some(Err(ReadlineError::Eof)) | None => break,
            Some(Err(e)) => {
                warn!(error = %e, "Terminal input failed");
                repl.shutdown().await;
                return Err(e.into());
            }
        };

        let output = repl.handle_line(&line).await;
        for line in &output.lines {
            println!("{}", line);
        }
        if output.quit {
            break;
        }
    }

    repl.shutdown().await;
    info!("Client stopped.");
    Ok(())
}
