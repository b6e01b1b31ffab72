//! Trip client - terminal front end for the multi-agent trip planner
//!
//! CLI entry point for planning sessions and backend checks.

use std::fs;
use std::path::Path;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info, warn};

use tripclient::agents::ROSTER;
use tripclient::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use tripclient::config::Config;
use tripclient::connection::{ConnectionStatus, WsTransport};
use tripclient::controller::{ControllerHandle, ControllerSettings, SessionController};
use tripclient::protocol::{Answers, Itinerary, Question};
use tripclient::render::{ProgressPrinter, itinerary_lines, question_lines, roster_lines};
use tripclient::session::Phase;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(base_url = %config.server.base_url, "Trip client loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan { query, output } => cmd_plan(&config, &query, output.as_deref()).await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Roster { format } => cmd_roster(format),
    }
}

/// Run one planning session to completion
async fn cmd_plan(config: &Config, query: &str, output: Option<&Path>) -> Result<()> {
    debug!(%query, ?output, "cmd_plan: called");
    let settings = ControllerSettings::from_config(config)?;
    let endpoint = settings.connection.endpoint.clone();
    let transport = WsTransport::new(config.connection.connect_timeout());
    let controller = SessionController::new(Box::new(transport), settings);
    let handle = controller.handle();
    let task = tokio::spawn(controller.run());

    println!("{} {}", "Planning:".bold(), query);
    let outcome = tokio::select! {
        result = drive_plan(&handle, config, &endpoint, query) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted by user");
            Err(eyre!("Interrupted"))
        }
    };

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Controller already stopped");
    }
    if let Err(e) = task.await {
        warn!(error = %e, "Controller task failed");
    }

    let (itinerary, elapsed) = outcome?;
    println!();
    for line in itinerary_lines(&itinerary, &elapsed) {
        println!("{}", line);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&itinerary).context("Failed to serialize itinerary")?;
        fs::write(path, json).context(format!("Failed to write {}", path.display()))?;
        println!("Itinerary written to {}", path.display());
    }
    Ok(())
}

/// Follow published views until the run finishes, prompting for answers
async fn drive_plan(handle: &ControllerHandle, config: &Config, endpoint: &str, query: &str) -> Result<(Itinerary, String)> {
    let timeout = config.connection.connect_timeout();
    tokio::time::timeout(timeout, handle.wait_for(|v| v.is_connected()))
        .await
        .map_err(|_| eyre!("Cannot reach the planning service at {} within {:?}", endpoint, timeout))??;

    let transition = handle.start_planning(query).await?;
    if let Some(reason) = transition.rejected {
        return Err(eyre!("{}", reason));
    }

    let mut views = handle.subscribe();
    let mut printer = ProgressPrinter::new();
    let mut answered_round = 0;

    loop {
        let view = views.borrow_and_update().clone();
        for line in printer.update(&view) {
            println!("{}", line);
        }

        if let Some(error) = &view.error {
            return Err(eyre!("Planning failed: {}", error));
        }
        if view.connection == ConnectionStatus::Disconnected {
            return Err(eyre!("Connection to the planning service was lost"));
        }

        if view.phase == Phase::Result {
            let elapsed = view.elapsed_display();
            let itinerary = view
                .itinerary
                .ok_or_else(|| eyre!("Planning finished without an itinerary"))?;
            return Ok((itinerary, elapsed));
        }

        // One prompt per question set, even when two sets arrive back to back
        if view.awaiting_answers(answered_round) {
            let answers = prompt_answers(view.questions.clone()).await?;
            let transition = handle.submit_answers(answers).await?;
            if let Some(reason) = transition.rejected {
                println!("{}", reason.to_string().yellow());
                handle.dismiss_error().await?;
                // Requests are handled in order, so the dismissal is published by now
                handle.snapshot().await?;
                continue;
            }
            answered_round = view.question_round;
        }

        views
            .changed()
            .await
            .map_err(|_| eyre!("Session controller stopped"))?;
    }
}

/// Ask each question on the terminal
async fn prompt_answers(questions: Vec<Question>) -> Result<Answers> {
    tokio::task::spawn_blocking(move || {
        let mut rl = DefaultEditor::new().map_err(|e| eyre!("Failed to initialize readline: {}", e))?;
        let mut answers = Answers::new();
        println!();
        for question in &questions {
            for line in question_lines(question) {
                println!("{}", line);
            }
            let prompt = if question.required {
                format!("{} ", ">".bright_green())
            } else {
                format!("{} ", "(optional) >".bright_green())
            };
            match rl.readline(&prompt) {
                Ok(line) => answers.insert(question.id.clone(), question.resolve_reply(&line)),
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Err(eyre!("Interrupted")),
                Err(e) => return Err(eyre!("Readline error: {}", e)),
            }
        }
        println!();
        Ok(answers)
    })
    .await
    .context("Prompt task failed")?
}

/// Query the backend's health and cache endpoints
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let client = reqwest::Client::builder()
        .timeout(config.connection.connect_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let health = fetch_json(&client, config, "/health").await;
    let cache = fetch_json(&client, config, "/cache/stats").await;

    if format == OutputFormat::Json {
        let report = serde_json::json!({
            "base-url": config.server.base_url,
            "health": health.as_ref().ok(),
            "cache": cache.as_ref().ok(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return health.map(|_| ());
    }

    println!("{} {}", "Server:".bold(), config.server.base_url);
    match &health {
        Ok(body) => {
            let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("unknown");
            let version = body.get("version").and_then(|s| s.as_str()).unwrap_or("?");
            println!("  Health: {} (version {})", status.green(), version);
        }
        Err(e) => println!("  Health: {} ({})", "unreachable".red(), e),
    }
    match &cache {
        Ok(body) => {
            let items = body.get("item_count").and_then(|v| v.as_u64()).unwrap_or(0);
            let bytes = body.get("size_bytes").and_then(|v| v.as_u64()).unwrap_or(0);
            println!("  Cache:  {} items, {} bytes", items, bytes);
        }
        Err(e) => println!("  Cache:  {} ({})", "unavailable".yellow(), e),
    }
    health.map(|_| ())
}

async fn fetch_json(client: &reqwest::Client, config: &Config, path: &str) -> Result<serde_json::Value> {
    let url = config.http_url(path)?;
    debug!(%url, "fetch_json: called");
    let response = client
        .get(url.clone())
        .send()
        .await
        .context(format!("GET {} failed", url))?
        .error_for_status()
        .context(format!("GET {} returned an error", url))?;
    response.json().await.context(format!("GET {} returned invalid JSON", url))
}

fn cmd_roster(format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_roster: called");
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(ROSTER)?),
        OutputFormat::Text => {
            for line in roster_lines(ROSTER) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}
