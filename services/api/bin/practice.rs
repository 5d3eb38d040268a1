//! Terminal trainer: practice one scenario from the command line.
//!
//! Type a response and press enter. `/reset` starts the scenario over,
//! `/audio` toggles speech and `/quit` exits.

use anyhow::Context;
use clap::Parser;
use sparc_api::{
    audio::FileAudioOutput,
    config::{Config, ResponseMode},
    state::AppState,
};
use sparc_core::{
    scenario::{DEFAULT_SCENARIO_ID, Scenario},
    session::{MessageSnapshot, SessionOrchestrator},
    speech::AudioOutput,
};
use std::{io::Write, path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Practice a SPARC-P scenario in the terminal")]
struct Args {
    /// Scenario to practice.
    #[arg(short, long, default_value = DEFAULT_SCENARIO_ID)]
    scenario: String,

    /// Use canned persona replies instead of the chat backend.
    #[arg(long)]
    scripted: bool,

    /// Save spoken replies into this directory.
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// List the available scenarios and exit.
    #[arg(long)]
    list: bool,
}

fn print_message(message: &MessageSnapshot, speaker: &str) {
    println!("\n{speaker}: {}", message.content);
    if let Some(tags) = &message.clear_components {
        for tag in tags {
            println!("  [C-LEAR {tag}: {}]", tag.description());
        }
    }
}

async fn start(orchestrator: &SessionOrchestrator, scenario: &Arc<Scenario>) {
    orchestrator.select_scenario(scenario.clone()).await;
    if let Some(greeting) = orchestrator.snapshot().await.messages.first() {
        print_message(greeting, &scenario.persona.name);
    }
}

fn prompt() -> std::io::Result<()> {
    print!("\nyou> ");
    std::io::stdout().flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if args.scripted {
        config.response_mode = ResponseMode::Scripted;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.to_string()))
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::from_config(config)?;

    if args.list {
        for scenario in state.scenarios.list_scenarios() {
            println!(
                "{:<20} {:?}  {} ({})",
                scenario.id, scenario.difficulty, scenario.title, scenario.persona.name
            );
        }
        return Ok(());
    }

    let scenario = state.scenarios.get_scenario(&args.scenario)?;
    let output = args
        .audio_dir
        .map(|dir| Arc::new(FileAudioOutput::new(dir)) as Arc<dyn AudioOutput>);
    let orchestrator = state.orchestrator(output);

    println!("{}: {}", scenario.title, scenario.description);
    println!("Commands: /reset, /audio, /quit");
    start(&orchestrator, &scenario).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/reset" => {
                let released = orchestrator.reset().await;
                println!("Session reset ({released} audio clips released).");
                start(&orchestrator, &scenario).await;
            }
            "/audio" => {
                let enabled = orchestrator.toggle_audio().await;
                println!("Audio {}.", if enabled { "on" } else { "off" });
            }
            "" => {}
            text => {
                if let Some(outcome) = orchestrator.submit_user_turn(text).await {
                    let snapshot = orchestrator.snapshot().await;
                    let reply = outcome
                        .reply_id
                        .and_then(|id| snapshot.messages.iter().find(|m| m.id == id));
                    if let Some(reply) = reply {
                        print_message(reply, &scenario.persona.name);
                    }
                }
            }
        }
        prompt()?;
    }

    orchestrator.settle_audio().await;
    orchestrator.shutdown().await;
    Ok(())
}
