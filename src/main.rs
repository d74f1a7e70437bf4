use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use boostgate::boost::{
    BoostRequest, ClassifiedResponse, LoopState, Orchestrator, ResultContent, classify,
};
use boostgate::config::GatewayConfig;
use boostgate::llm::{ClientPool, StreamChunk, ToolDescriptor};
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use cli::commands::{Commands, RequestArgs};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boostgate")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("boostgate.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn load_request(args: &RequestArgs, stream: bool) -> Result<BoostRequest> {
    let mut request = match (&args.file, &args.text) {
        (Some(path), _) => {
            let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse request JSON")?
        }
        (None, Some(text)) => BoostRequest::new(args.model.clone()).with_user_message(text.clone()),
        (None, None) => eyre::bail!("Either --file or request text is required"),
    };

    if let Some(path) = &args.tools {
        let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        request.tools = serde_json::from_str::<Vec<ToolDescriptor>>(&content).context("Failed to parse tools JSON")?;
    }
    if stream {
        request.stream = true;
    }
    Ok(request)
}

async fn run_application(cli: &Cli, config: GatewayConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { request, stream } => handle_run_command(request, *stream, config).await,
        Commands::Prompt { request } => handle_prompt_command(request, &config),
        Commands::Classify { file } => handle_classify_command(file.as_ref()),
        Commands::Config => handle_config_command(&config),
    }
}

async fn handle_run_command(args: &RequestArgs, stream: bool, config: GatewayConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let request = load_request(args, stream)?;
    info!("Running request for model {}", request.model);

    let pool = ClientPool::new();
    let orchestrator = Orchestrator::from_config(config, &pool).context("Failed to build clients")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling request");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator
        .execute(request, cancel)
        .await
        .context("Request failed")?;

    let source = result.source;
    let detail = result.detail.clone();
    let attempts = result.planning_attempts;
    let tool_calls = result.tool_calls.clone();

    match result.content {
        ResultContent::Text(text) => println!("{}", text),
        ResultContent::Stream(mut handle) => {
            let mut stdout = io::stdout();
            while let Some(chunk) = handle.recv().await {
                match chunk {
                    StreamChunk::Text(text) => {
                        print!("{}", text);
                        stdout.flush().context("Failed to flush stdout")?;
                    }
                    StreamChunk::ToolCallStart { name, .. } => println!("\n{} {}", "tool call:".cyan(), name),
                    StreamChunk::Error(message) => println!("\n{} {}", "stream error:".red(), message),
                    StreamChunk::Done => break,
                    _ => {}
                }
            }
            println!();
        }
    }

    for call in &tool_calls {
        println!("{} {} {}", "tool call:".cyan(), call.name, call.input);
    }
    println!(
        "{} {} ({} planning attempt(s))",
        "source:".green(),
        source,
        attempts
    );
    if let Some(detail) = detail {
        println!("{} {}", "detail:".yellow(), detail);
    }
    Ok(())
}

fn handle_prompt_command(args: &RequestArgs, config: &GatewayConfig) -> Result<()> {
    let request = load_request(args, false)?;
    let template = boostgate::boost::WrapperTemplate::from_config(config.boost.wrapper_template.as_deref())?;
    let state = LoopState::new(config.boost.max_iterations);
    println!("{}", template.render(&state, &request));
    Ok(())
}

fn handle_classify_command(file: Option<&PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let classified = classify(&text);
    println!("{} {}", "kind:".green(), classified.kind());
    match classified {
        ClassifiedResponse::Summary(summary) => println!("{}", summary),
        ClassifiedResponse::Guidance { analysis, guidance } => {
            if let Some(analysis) = analysis {
                println!("{}\n{}\n", "analysis:".cyan(), analysis);
            }
            println!("{}\n{}", "guidance:".cyan(), guidance);
        }
        ClassifiedResponse::Other(_) => println!("{}", "no SUMMARY or GUIDANCE section".yellow()),
    }
    Ok(())
}

fn handle_config_command(config: &GatewayConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(&config.redacted()).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = GatewayConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime
        .block_on(run_application(&cli, config))
        .context("Application failed")?;

    Ok(())
}
