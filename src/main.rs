// Session recorder entry point.
//
// Startup sequence:
// 1. Load config
// 2. Initialize tracing (log to file, not terminal)
// 3. Build the HTTP metrics service
// 4. Start the recording session (fetch roster, seed the first player)
// 5. Run the console event loop until the operator quits
//
// The loop multiplexes three sources: operator commands from stdin,
// improvement-lookup completions, and session notifications.

use session_recorder::api::HttpMetricsService;
use session_recorder::config;
use session_recorder::console::{self, Command, HELP_TEXT};
use session_recorder::draft::validate;
use session_recorder::metric::PLACEHOLDER;
use session_recorder::persist::SaveOutcome;
use session_recorder::session::{
    FinishOutcome, NavOutcome, RecordingSession, SessionOptions, SessionStatus,
};

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing (log to file, not terminal)
    init_tracing(&config.log.file)?;
    info!("Session recorder starting up");

    let session_id = std::env::args()
        .nth(1)
        .context("usage: recorder <session-id>")?;

    // 3. Build the HTTP metrics service
    let service = Arc::new(HttpMetricsService::new(
        &config.api.base_url,
        config.api.token.clone(),
    ));
    info!("Using metrics backend at {}", config.api.base_url);

    // 4. Start the recording session
    let options = SessionOptions {
        settle: config.settle(),
        save_timeout: config.save_timeout(),
    };
    let (events_tx, mut events_rx) = mpsc::channel(256);
    let (mut session, mut improvement_rx) =
        RecordingSession::start(service, &session_id, options, events_tx)
            .await
            .context("failed to start recording session")?;

    println!(
        "Recording session {session_id}: {} players. Type `help` for commands.",
        session.roster().len()
    );
    print_active(&session);

    // 5. Console event loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match console::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        dispatch(&mut session, command).await;
                        if session.status() == SessionStatus::Completed {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
            Some(event) = improvement_rx.recv() => {
                session.handle_improvement(event).await;
            }
            // Outcomes are printed from the dispatch return values; the
            // notification stream just needs draining so the session never
            // blocks on a full channel.
            Some(_event) = events_rx.recv() => {}
        }
    }

    info!("Session recorder shut down cleanly");
    Ok(())
}

async fn dispatch(session: &mut RecordingSession, command: Command) {
    match command {
        Command::Nav(req) => match session.navigate(req).await {
            NavOutcome::Moved { save, .. } => {
                if let Some(outcome) = save.filter(|o| !o.is_persisted()) {
                    print_save_outcome(&outcome);
                }
                print_active(session);
            }
            NavOutcome::Blocked => println!(
                "cannot leave this player: remove zero or `{PLACEHOLDER}` values first"
            ),
            NavOutcome::Busy => println!("still saving, try again in a moment"),
            NavOutcome::NoOp => println!("already there"),
        },
        Command::Set { metric, value } => {
            if !session.set_value(&metric, value) {
                println!("no metric `{metric}` on this form");
            }
        }
        Command::Note { metric, text } => {
            if !session.set_note(&metric, text) {
                println!("no metric `{metric}` on this form");
            }
        }
        Command::Save => match session.save().await {
            Some(outcome) => print_save_outcome(&outcome),
            None => println!("still saving, try again in a moment"),
        },
        Command::Status => print_status(session),
        Command::Finish => match session.finish().await {
            FinishOutcome::Finished { completed: true, .. } => {
                println!("session completed");
            }
            FinishOutcome::Finished { completed: false, .. } => {
                println!("completion call failed; the session is still open on the backend");
            }
            FinishOutcome::NotReady => {
                println!("not ready: every player needs at least one valid recorded metric");
            }
            FinishOutcome::Busy => println!("still saving, try again in a moment"),
        },
        Command::Help => println!("{HELP_TEXT}"),
        Command::Quit => unreachable!("handled by the caller"),
    }
}

fn print_active(session: &RecordingSession) {
    let player = session.active_player();
    let summary = session.form_summary();
    println!(
        "[{}/{}] {} -- {}/{} metrics recorded",
        session.active_index() + 1,
        session.roster().len(),
        player.name,
        summary.completed,
        summary.total,
    );
}

fn print_status(session: &RecordingSession) {
    print_active(session);
    let store = session.store();
    for def in store.definitions() {
        let entry = store.draft(&def.id);
        let value = entry.map(|e| e.value.as_str()).unwrap_or("");
        let shown = if value.is_empty() { "-" } else { value };
        let mut line = format!("  {:<12} {:>8} {}", def.id, shown, def.unit);
        if let Some(slot) = session.improvement(&def.id) {
            line.push_str(&format!("  {}", format_improvement(slot)));
        }
        if let Some(note) = entry.map(|e| e.note.trim()).filter(|n| !n.is_empty()) {
            line.push_str(&format!("  ({note})"));
        }
        println!("{line}");
    }
    let done: usize = session
        .roster()
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            if *i == session.active_index() {
                validate::has_entered_values(store) && validate::all_entries_valid(store)
            } else {
                entry.has_recorded_metrics
            }
        })
        .count();
    println!("session: {done}/{} players complete", session.roster().len());
}

fn format_improvement(slot: &session_recorder::improvement::ImprovementSlot) -> String {
    use session_recorder::improvement::ImprovementSlot;
    match slot {
        ImprovementSlot::Resolved(entry) => {
            let arrow = if entry.is_improvement { "up" } else { "down" };
            format!(
                "{arrow} {:+.2} ({:+.1}%) vs {}",
                entry.raw_delta, entry.percentage, entry.previous_value
            )
        }
        ImprovementSlot::NoBaseline => "first record".to_string(),
    }
}

fn print_save_outcome(outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Saved => println!("saved"),
        SaveOutcome::NoChanges => println!("nothing to save"),
        SaveOutcome::ZeroValues => {
            println!("not saved: remove zero or `{PLACEHOLDER}` values first")
        }
        SaveOutcome::Failed(message) => println!("save failed: {message}"),
        SaveOutcome::TimedOut => println!("save timed out; the backend may be unreachable"),
    }
}

/// Initialize tracing to log to a file (keeps the console clean for the
/// operator prompt).
fn init_tracing(file: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join(file))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("session_recorder=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
