// src/main.rs

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    thread,
};

use anyhow::Context;
use crossbeam::channel::{self, select, Receiver};
use maxify::{
    config::AppConfig,
    events::Event,
    router::{RawRequest, Router},
    utils::is_elevated,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn, Level};

/// A request line: `{ "id": ..., "channel": ..., "payload": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    #[serde(flatten)]
    request: RawRequest,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outbound {
    Response { id: Value, response: Value },
    Event { event: Event },
}

fn init_tracing() {
    // stdout carries the protocol, so logs go to stderr.
    #[cfg(debug_assertions)]
    {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str())),
            )
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }
}

fn write_line(out: &mut impl Write, message: &Outbound) -> io::Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Owns stdout. Runs until every response sender is gone, then flushes any
/// events still queued.
fn writer_loop(responses: Receiver<Outbound>, events: Receiver<Event>) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    loop {
        let message = select! {
            recv(responses) -> message => match message {
                Ok(message) => message,
                Err(_) => break,
            },
            recv(events) -> event => match event {
                Ok(event) => Outbound::Event { event },
                Err(_) => continue,
            },
        };
        if let Err(e) = write_line(&mut out, &message) {
            error!("Failed to write to stdout: {}", e);
            return;
        }
    }
    for event in events.try_iter() {
        if write_line(&mut out, &Outbound::Event { event }).is_err() {
            return;
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Maxify core starting (interpreter {}, scratch dir {})",
        config.bridge.interpreter.program,
        config.bridge.scratch_dir.display()
    );
    if cfg!(windows) && !is_elevated() {
        warn!("Not running as administrator; most tweaks will fail.");
    }

    let (event_sender, event_receiver) = channel::unbounded::<Event>();
    let (response_sender, response_receiver) = channel::unbounded::<Outbound>();
    let router = Arc::new(Router::new(&config, event_sender));
    router.bridge().sweep();

    let writer = thread::spawn(move || writer_loop(response_receiver, event_receiver));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                let response = json!({ "success": false, "error": format!("Invalid request: {}", e) });
                let _ = response_sender.send(Outbound::Response {
                    id: Value::Null,
                    response,
                });
                continue;
            }
        };

        // Requests may block for minutes (installs), so each gets a thread.
        let router = Arc::clone(&router);
        let responses = response_sender.clone();
        thread::spawn(move || {
            let response = router.handle(envelope.request);
            if responses
                .send(Outbound::Response {
                    id: envelope.id,
                    response,
                })
                .is_err()
            {
                debug!("Writer is gone, dropping response");
            }
        });
    }

    debug!("stdin closed, shutting down");
    router.shutdown();
    drop(response_sender);
    if writer.join().is_err() {
        error!("Writer thread panicked");
    }
    Ok(())
}
