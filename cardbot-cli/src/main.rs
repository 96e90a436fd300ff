use anyhow::{Context, Result};
use cardbot_core::config::{CheckpointBackend, Config, StorageMode};
use cardbot_core::{Assistant, Message, Role};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cardbot")]
#[command(about = "Chat with a business card assistant backed by a knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Files or directories to index before running the command
    #[arg(short, long = "knowledge", global = true)]
    knowledge: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(short, long, help = "Overwrite an existing file")]
        force: bool,
    },

    #[command(about = "Ask a single question on a thread")]
    Ask {
        #[arg(short, long, default_value = "default")]
        thread: String,

        #[arg(help = "Question for the assistant")]
        message: String,
    },

    #[command(about = "Interactive chat on a thread")]
    Chat {
        #[arg(short, long, default_value = "default")]
        thread: String,
    },

    #[command(about = "Print the stored conversation of a thread")]
    History {
        #[arg(short, long, default_value = "default")]
        thread: String,
    },

    #[command(about = "Delete the stored conversation of a thread")]
    Forget {
        #[arg(short, long, default_value = "default")]
        thread: String,
    },

    #[command(about = "Index files or directories into the knowledge base")]
    Index {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    #[command(about = "List indexed sources")]
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cardbot_core=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Show => show_config(&cli.config),
        Commands::Init { force } => init_config(&cli.config, force),
        Commands::Ask { thread, message } => {
            let assistant = open_assistant(&cli.config, &cli.knowledge).await?;
            ask(&assistant, &thread, &message).await
        }
        Commands::Chat { thread } => {
            let assistant = open_assistant(&cli.config, &cli.knowledge).await?;
            chat(&assistant, &thread).await
        }
        Commands::History { thread } => {
            let assistant = open_assistant(&cli.config, &cli.knowledge).await?;
            show_history(&assistant, &thread).await
        }
        Commands::Forget { thread } => {
            let assistant = open_assistant(&cli.config, &cli.knowledge).await?;
            assistant.forget(&thread).await?;
            println!("{} Forgot thread {}", "✓".green().bold(), thread.cyan());
            Ok(())
        }
        Commands::Index { paths } => {
            let mut all = cli.knowledge;
            all.extend(paths);
            let assistant = open_assistant(&cli.config, &all).await?;
            if assistant.config().storage.storage_mode == StorageMode::Memory {
                println!(
                    "{}",
                    "Vector store is in memory; the index is discarded on exit.".yellow()
                );
            }
            Ok(())
        }
        Commands::Sources => {
            let assistant = open_assistant(&cli.config, &cli.knowledge).await?;
            list_sources(&assistant).await
        }
    }
}

/// Loads the config file if present, then applies environment overrides.
fn load_config(config_path: &Path) -> Result<Config> {
    let config = if config_path.exists() {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };
    Ok(config.apply_env_overrides())
}

async fn open_assistant(config_path: &Path, knowledge: &[PathBuf]) -> Result<Assistant> {
    let config = load_config(config_path)?;
    let assistant = Assistant::from_config(config).await?;

    for path in knowledge {
        let files = assistant
            .knowledge_base()
            .index_path(path)
            .await
            .with_context(|| format!("Failed to index {}", path.display()))?;
        println!(
            "{} Indexed {} file(s) from {}",
            "→".blue(),
            files,
            path.display()
        );
    }

    Ok(assistant)
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:          {}", config.llm.model.cyan());
    println!("  Base URL:       {}", config.llm.base_url);
    println!("  Temperature:    {}", config.llm.temperature);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Embedding Model: {}", config.rag.embedding_model.cyan());
    println!("  Embedding Dim:   {}", config.rag.embedding_dim);
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Top K:           {}", config.rag.top_k);
    println!();
    println!("{}", "Storage:".bold());
    match &config.storage.storage_mode {
        StorageMode::Memory => println!("  Vector DB:       memory"),
        StorageMode::Grpc { url } => println!("  Vector DB:       qdrant at {}", url),
    }
    println!("  Collection:      {}", config.storage.vector_db.collection_name);
    println!();
    println!("{}", "Checkpoints:".bold());
    match &config.checkpoint.backend {
        CheckpointBackend::Memory => println!("  Backend:         memory"),
        CheckpointBackend::Redis { url } => println!("  Backend:         redis at {}", url),
    }
    println!("  TTL:             {} min", config.checkpoint.ttl_minutes);
    println!("  Refresh on read: {}", config.checkpoint.refresh_on_read);

    Ok(())
}

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let content = serde_yaml::to_string(&Config::default())
        .context("Failed to serialize config")?;
    std::fs::write(config_path, content)
        .context("Failed to write config file")?;

    println!(
        "{} Wrote default config to {}",
        "✓".green().bold(),
        config_path.display().to_string().cyan()
    );
    Ok(())
}

async fn ask(assistant: &Assistant, thread: &str, message: &str) -> Result<()> {
    let reply = assistant.run(thread, vec![Message::user(message)]).await?;
    println!("{}", reply);
    Ok(())
}

async fn chat(assistant: &Assistant, thread: &str) -> Result<()> {
    println!(
        "{} Chatting on thread {} ({} to leave)",
        "→".blue(),
        thread.cyan(),
        "exit".bold()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{} ", "You:".bold().green());
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let input = line?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match assistant.run(thread, vec![Message::user(input)]).await {
            Ok(reply) => println!("{} {}\n", "AI:".bold().cyan(), reply),
            Err(e) => eprintln!("{} {:#}\n", "Error:".red().bold(), e),
        }
    }

    Ok(())
}

async fn show_history(assistant: &Assistant, thread: &str) -> Result<()> {
    let messages = assistant.history(thread).await?;
    if messages.is_empty() {
        println!("{}", format!("No stored conversation for thread {}", thread).yellow());
        return Ok(());
    }

    for message in messages {
        let label = match message.role {
            Role::User => "User:".bold().green(),
            Role::Assistant => "AI:".bold().cyan(),
            Role::System => "System:".bold().dimmed(),
        };
        println!("{} {}\n", label, message.content);
    }
    Ok(())
}

async fn list_sources(assistant: &Assistant) -> Result<()> {
    let sources = assistant.knowledge_base().sources().await?;
    if sources.is_empty() {
        println!("{}", "Knowledge base is empty. Index files with 'cardbot index <path>'".yellow());
        return Ok(());
    }

    println!("{}", "Indexed sources:".bold().green());
    for source in sources {
        println!("  {} {}", "•".cyan(), source);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "cardbot", "-k", "docs", "ask", "--thread", "t1", "What do you do?",
        ])
        .unwrap();

        assert_eq!(cli.knowledge, vec![PathBuf::from("docs")]);
        match cli.command {
            Commands::Ask { thread, message } => {
                assert_eq!(thread, "t1");
                assert_eq!(message, "What do you do?");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_index_requires_paths() {
        assert!(Cli::try_parse_from(["cardbot", "index"]).is_err());
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Path::new("definitely/not/here.yaml")).unwrap();
        assert_eq!(config.rag.top_k, 4);
    }
}
