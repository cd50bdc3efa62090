//! # grasp
//!
//! Command-line front end: manage saved configs, run a config against a
//! meeting fed from a JSON-lines transcript, and read back the meeting chat.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

use grasp_core::ids::{ConfigId, MeetingId};
use grasp_core::transcript::TranscriptEvent;
use grasp_engine::{EngineSettings, GraspEngine, IngestOutcome};
use grasp_llm::{AnthropicConfig, AnthropicInvoker};
use grasp_store::{ChatRepo, ConfigRepo, Database};
use grasp_telemetry::{init_telemetry, TelemetryConfig};

/// Grasp meeting orchestration.
#[derive(Parser, Debug)]
#[command(name = "grasp", about = "Scheduled AI interventions for live meetings")]
struct Cli {
    /// Path to the `SQLite` database.
    #[arg(long, env = "GRASP_DB", global = true)]
    db: Option<PathBuf>,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, default_value = "info", global = true)]
    log_level: Level,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and save a config file.
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// List saved configs.
    List,
    /// Print a saved config.
    Show { id: String },
    /// Run save-time and bind-time checks on a config file without saving it.
    Check {
        #[arg(long)]
        file: PathBuf,
    },
    /// Bind a saved config to a meeting and feed it transcript events.
    Run {
        #[arg(long)]
        config: String,
        #[arg(long)]
        meeting: String,
        /// JSON-lines transcript events. Reads stdin when omitted.
        #[arg(long)]
        events: Option<PathBuf>,
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Per-invocation model timeout.
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
    /// Print a meeting's chat entries as JSON lines.
    Chat {
        #[arg(long)]
        meeting: String,
    },
}

impl Cli {
    fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(Self::default_db_path)
    }

    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".grasp").join("grasp.db")
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        json: cli.json_logs,
        ..TelemetryConfig::default()
    })?;

    let db_path = cli.db_path();
    match cli.command {
        Command::Check { file } => {
            let nodes = GraspEngine::check_config(&read_source(&file)?)?;
            println!("ok: {} nodes", nodes.len());
        }
        Command::Save { name, file } => {
            let (configs, _) = open_repos(&db_path)?;
            let config = configs.create(&name, &read_source(&file)?)?;
            println!("{}", config.id);
        }
        Command::List => {
            let (configs, _) = open_repos(&db_path)?;
            for config in configs.list()? {
                println!(
                    "{}\t{}\t{}\t{} nodes",
                    config.id,
                    config.name,
                    config.updated_at.to_rfc3339(),
                    config.nodes.len()
                );
            }
        }
        Command::Show { id } => {
            let (configs, _) = open_repos(&db_path)?;
            let config = configs.read(&ConfigId::from_raw(id))?;
            println!("id:      {}", config.id);
            println!("name:    {}", config.name);
            println!("created: {}", config.created_at.to_rfc3339());
            for node in &config.nodes {
                match node.output.note_tag() {
                    Some(tag) => println!("node:    {} every {}s -> note '{}'", node.node_id, node.interval_sec, tag),
                    None => println!("node:    {} every {}s -> chat", node.node_id, node.interval_sec),
                }
            }
            println!("---\n{}", config.source);
        }
        Command::Chat { meeting } => {
            let (_, chat) = open_repos(&db_path)?;
            for (_, entry) in chat.list(&MeetingId::from_raw(meeting), None)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Command::Run {
            config,
            meeting,
            events,
            api_key,
            model,
            timeout_secs,
        } => {
            let Some(api_key) = api_key else {
                bail!("ANTHROPIC_API_KEY is not set");
            };
            let mut llm = AnthropicConfig::new(SecretString::from(api_key));
            if let Some(model) = model {
                llm.model = model;
            }
            let invoker = AnthropicInvoker::new(llm)?;
            let (configs, chat) = open_repos(&db_path)?;
            info!(model = invoker.model(), "model invoker ready");

            let settings = EngineSettings {
                invoke_timeout: Duration::from_secs(timeout_secs),
                ..EngineSettings::default()
            };
            let engine = GraspEngine::new(configs, Arc::new(invoker), Arc::new(chat), settings);
            run(&engine, MeetingId::from_raw(meeting), ConfigId::from_raw(config), events).await?;
        }
    }
    Ok(())
}

fn open_repos(db_path: &Path) -> Result<(ConfigRepo, ChatRepo)> {
    ensure_parent_dir(db_path)?;
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    info!(path = %db_path.display(), "database opened");
    Ok((ConfigRepo::new(db.clone()), ChatRepo::new(db)))
}

async fn run(
    engine: &GraspEngine,
    meeting: MeetingId,
    config: ConfigId,
    events: Option<PathBuf>,
) -> Result<()> {
    engine.bind(&meeting, &config).await?;

    let feed = async {
        match &events {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                feed_events(engine, &meeting, BufReader::new(file)).await
            }
            None => feed_events(engine, &meeting, BufReader::new(tokio::io::stdin())).await,
        }
    };

    tokio::select! {
        result = feed => {
            let accepted = result?;
            info!(accepted, "transcript input finished, nodes keep running until ctrl+c");
            tokio::signal::ctrl_c().await.context("Failed to listen for ctrl+c")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl+c")?;
        }
    }

    info!("shutting down");
    engine.end_meeting(&meeting).await;
    engine.shutdown().await;
    Ok(())
}

/// Ingest one event per line. Lines for other meetings and malformed lines
/// are logged and skipped. Returns how many entries were appended.
async fn feed_events<R: AsyncBufRead + Unpin>(
    engine: &GraspEngine,
    meeting: &MeetingId,
    reader: R,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut accepted = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read transcript input")? {
        if line.trim().is_empty() {
            continue;
        }
        let event: TranscriptEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping unreadable transcript line");
                continue;
            }
        };
        if &event.meeting_id != meeting {
            warn!(meeting_id = %event.meeting_id, "skipping event for another meeting");
            continue;
        }
        match engine.ingest(event) {
            Ok(IngestOutcome::Appended { .. }) => accepted += 1,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "transcript event rejected"),
        }
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grasp_llm::MockInvoker;

    #[test]
    fn cli_run_defaults() {
        let cli = Cli::parse_from([
            "grasp", "run", "--config", "cfg_1", "--meeting", "m1", "--api-key", "k",
        ]);
        let Command::Run {
            events,
            timeout_secs,
            model,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(events, None);
        assert_eq!(timeout_secs, 30);
        assert_eq!(model, None);
        assert_eq!(cli.log_level, Level::INFO);
        assert!(!cli.json_logs);
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["grasp", "list", "--db", "/tmp/g.db", "--log-level", "debug", "--json-logs"]);
        assert_eq!(cli.db_path(), PathBuf::from("/tmp/g.db"));
        assert_eq!(cli.log_level, Level::DEBUG);
        assert!(cli.json_logs);
    }

    #[test]
    fn cli_save_requires_name_and_file() {
        assert!(Cli::try_parse_from(["grasp", "save", "--name", "x"]).is_err());
        let cli = Cli::parse_from(["grasp", "save", "--name", "x", "--file", "c.yaml"]);
        assert!(matches!(cli.command, Command::Save { .. }));
    }

    #[test]
    fn default_db_path_is_under_home() {
        assert!(Cli::default_db_path().ends_with(".grasp/grasp.db"));
    }

    #[tokio::test]
    async fn feed_skips_bad_lines_and_other_meetings() {
        let db = Database::in_memory().unwrap();
        let engine = GraspEngine::new(
            ConfigRepo::new(db.clone()),
            Arc::new(MockInvoker::new(vec![])),
            Arc::new(ChatRepo::new(db)),
            EngineSettings::default(),
        );
        let meeting = MeetingId::from_raw("m1");
        let input = concat!(
            r#"{"meetingId":"m1","speakerId":"u1","text":"hello","isFinal":true,"timestamp":1000}"#, "\n",
            "not json\n",
            "\n",
            r#"{"meetingId":"m2","speakerId":"u1","text":"elsewhere","isFinal":true,"timestamp":1000}"#, "\n",
            r#"{"meetingId":"m1","speakerId":"u2","text":"Hello","isFinal":true,"timestamp":1500}"#, "\n",
            r#"{"meetingId":"m1","speakerId":"u2","text":"partial","isFinal":false,"timestamp":2000}"#, "\n",
            r#"{"meetingId":"m1","speakerId":"","text":"no speaker","isFinal":true,"timestamp":3000}"#, "\n",
            r#"{"meetingId":"m1","speakerId":"u1","text":"next topic","isFinal":true,"timestamp":4000}"#, "\n",
        );

        let accepted = feed_events(&engine, &meeting, BufReader::new(input.as_bytes()))
            .await
            .unwrap();
        assert_eq!(accepted, 2);
        assert_eq!(engine.context(&meeting).unwrap().window.len(), 2);
        assert!(engine.context(&MeetingId::from_raw("m2")).is_none());
    }
}
