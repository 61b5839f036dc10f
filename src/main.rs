use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use postcraft::chat::{self, ChatSession};
use postcraft::constants::{API_KEY_ENV, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, MODEL_ENV};
use postcraft::{GenerationClient, GenerationError};

// Define the command-line interface structure using clap
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = API_KEY_ENV,
        hide_env_values = true,
        help = "API key for the completions provider."
    )]
    api_key: Option<String>,

    #[arg(
        long,
        global = true,
        env = MODEL_ENV,
        default_value = DEFAULT_MODEL,
        help = "Model used to generate posts."
    )]
    model: String,

    #[arg(
        long,
        global = true,
        help = "Base URL of an OpenAI-compatible API (falls back to $OPENAI_BASE_URL)."
    )]
    base_url: Option<String>,

    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Request timeout in seconds."
    )]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start an interactive post-writing session (the default).
    Chat {
        #[arg(long, help = "Skip the provider connectivity check at startup.")]
        skip_check: bool,
        #[arg(
            long,
            default_value = ".",
            help = "Directory where saved posts are written."
        )]
        save_dir: PathBuf,
    },
    /// Generate a single post from an idea and print it.
    Generate {
        #[arg(required = true, help = "The idea for the post.")]
        idea: Vec<String>,
        #[arg(short, long, help = "Also save the post to <OUTPUT>.txt.")]
        output: Option<String>,
        #[arg(long, help = "Print the post as JSON instead of text.")]
        json: bool,
    },
    /// Check that the provider is reachable with the configured key.
    Check,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Chat { .. } => "chat",
            Commands::Generate { .. } => "generate",
            Commands::Check => "check",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for OPENAI_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Logs go to stderr so the session transcript on stdout stays clean.
    // Reads log level from RUST_LOG (e.g. RUST_LOG=postcraft=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:?}");
            eprintln!("\nCritical error: {e:#}");
            eprintln!("If the problem persists, run again with RUST_LOG=debug.");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let client = configure(&cli);
    let command = cli.command.unwrap_or(Commands::Chat {
        skip_check: false,
        save_dir: PathBuf::from("."),
    });

    info!(command = command.name(), model = %cli.model, "postcraft starting");

    if matches!(command, Commands::Chat { .. }) {
        println!("{}", chat::WELCOME);
    }

    let client = match client {
        Ok(client) => client,
        Err(err) => {
            print_configuration_error(&err);
            return Ok(ExitCode::FAILURE);
        }
    };

    until_interrupted(execute(&client, command)).await
}

async fn execute(client: &GenerationClient, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Chat {
            skip_check,
            save_dir,
        } => run_chat(client, skip_check, save_dir).await,
        Commands::Generate { idea, output, json } => {
            run_generate(client, &idea.join(" "), output, json).await
        }
        Commands::Check => run_check(client).await,
    }
}

/// Drives `task` to completion, exiting with status 0 if Ctrl-C arrives first.
async fn until_interrupted<F: Future>(task: F) -> F::Output {
    tokio::select! {
        output = task => output,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, exiting");
            println!("\n\nInterrupted. Exiting...");
            // A pending stdin read would keep the runtime from shutting down.
            std::process::exit(0);
        }
    }
}

fn configure(cli: &Cli) -> Result<GenerationClient, GenerationError> {
    let client = GenerationClient::configure(cli.api_key.as_deref(), &cli.model)?
        .with_timeout(Duration::from_secs(cli.timeout))?;
    Ok(match &cli.base_url {
        Some(base_url) => client.with_base_url(base_url.as_str()),
        None => client,
    })
}

fn print_configuration_error(err: &GenerationError) {
    let rule = "=".repeat(70);
    eprintln!("\n{rule}");
    eprintln!("ERROR: {err}");
    eprintln!("{rule}");
    eprintln!("\nTo use postcraft you need an API key:\n");
    eprintln!("  1. Create a file named '.env' in this directory");
    eprintln!("  2. Add the following line to it:");
    eprintln!("       {API_KEY_ENV}=your_api_key_here");
    eprintln!("\nYou can create an API key at https://platform.openai.com/api-keys");
    eprintln!("\n{rule}\n");
}

async fn run_chat(
    client: &GenerationClient,
    skip_check: bool,
    save_dir: PathBuf,
) -> Result<ExitCode> {
    if !skip_check {
        println!("Checking the connection to the provider...");
        if let Err(err) = client.check_availability().await {
            chat::write_failure(&mut io::stderr(), &err)?;
            eprintln!("\nCould not start the chatbot. Check your configuration.");
            return Ok(ExitCode::FAILURE);
        }
        println!("Connection established.");
    }
    println!("Using model: {}\n", client.model());
    println!("Ready to write posts! Describe your first idea.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut session = ChatSession::new(client, stdin, io::stdout(), save_dir);

    session.run().await.context("Chat session failed")?;

    Ok(ExitCode::SUCCESS)
}

async fn run_check(client: &GenerationClient) -> Result<ExitCode> {
    match client.check_availability().await {
        Ok(()) => {
            println!(
                "Provider reachable at {} using model {}.",
                client.base_url(),
                client.model()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            chat::write_failure(&mut io::stderr(), &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_generate(
    client: &GenerationClient,
    idea: &str,
    output: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let post = match client.generate(idea).await {
        Ok(post) => post,
        Err(err) => {
            chat::write_failure(&mut io::stderr(), &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&post).context("Failed to serialize post")?
        );
    } else {
        print!("{post}");
    }

    if let Some(name) = output {
        let path = chat::save_post(&post, Path::new("."), &name)?;
        eprintln!("Post saved to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}
