//! Genie CLI: inspect dialogue states and simulate dialogues against fixture data.
//!
//! Subcommands: `context` (tags and phrases of a state), `simulate` (play a
//! script through the policy).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genie::phrases::PhraseLoader;
use genie::policy::{ContextCache, ContextInfo, get_context_phrases_for_state, tag_context_for_agent};
use genie::simulator::{FixtureDb, ScriptedInterface, SimulatedExecutor, load_script};
use genie::thingtalk::DialogueState;
use genie::{DialoguePolicy, PolicyConfig, StartMode, Thingpedia};

#[derive(Parser, Debug)]
#[command(name = "genie")]
#[command(about = "Inspect and simulate Genie transaction dialogues")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Function library (YAML)
    #[arg(short, long, value_name = "PATH")]
    library: PathBuf,

    /// Extra directories to load phrase files from
    #[arg(short, long, value_name = "DIR")]
    phrases: Vec<PathBuf>,

    /// Policy configuration (YAML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the context tags and phrases of a dialogue state
    Context {
        /// Dialogue state (JSON)
        state: PathBuf,
    },
    /// Play a user script through the policy against a fixture database
    Simulate {
        /// User script (YAML list of steps)
        script: PathBuf,

        /// Fixture database (YAML)
        #[arg(long, value_name = "PATH")]
        db: PathBuf,

        /// The user speaks first
        #[arg(long)]
        no_welcome: bool,

        /// Seed for phrase sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Print the final dialogue state as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "genie=debug" } else { "genie=info" };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PolicyConfig> {
    match path {
        Some(path) => PolicyConfig::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(PolicyConfig::default()),
    }
}

fn load_library(args: &Args, config: &PolicyConfig) -> Result<Thingpedia> {
    let mut loader = PhraseLoader::new();
    for path in config.phrases.search_paths.iter().chain(&args.phrases) {
        loader.add_search_path(path);
    }
    Thingpedia::load(&args.library, &loader).with_context(|| format!("loading library {}", args.library.display()))
}

fn print_context(state_path: &Path, library: &Thingpedia) -> Result<()> {
    let content =
        std::fs::read_to_string(state_path).with_context(|| format!("reading state {}", state_path.display()))?;
    let state: DialogueState = serde_json::from_str(&content)?;

    let ctx = ContextInfo::get(&state)?;
    let tags = tag_context_for_agent(&ctx)?;
    let phrases = get_context_phrases_for_state(Some(&state), library)?;
    let output = serde_json::json!({
        "state": state.to_string(),
        "tags": tags,
        "phrases": phrases,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn simulate(
    script_path: &Path,
    db_path: &Path,
    library: Thingpedia,
    config: PolicyConfig,
    json: bool,
) -> Result<()> {
    let content =
        std::fs::read_to_string(script_path).with_context(|| format!("reading script {}", script_path.display()))?;
    let commands = load_script(&content, &library)?;
    let db = FixtureDb::load(db_path).with_context(|| format!("loading fixtures {}", db_path.display()))?;
    let interface = ScriptedInterface::new(commands, SimulatedExecutor::new(db));

    let mut policy = DialoguePolicy::new(Arc::new(library), config)?;
    let last = policy.run(&interface).await?;

    for reply in interface.replies() {
        println!("A: {}  [{}{}]", reply.utterance, reply.dialogue_act, if reply.end { ", end" } else { "" });
    }
    if json {
        if let Some(state) = last {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    ContextCache::global().set_capacity(config.cache_capacity);
    tracing::debug!(capacity = config.cache_capacity, "context cache configured");
    let library = load_library(&args, &config)?;

    match &args.cmd {
        Command::Context { state } => print_context(state, &library),
        Command::Simulate {
            script,
            db,
            no_welcome,
            seed,
            json,
        } => {
            if *no_welcome {
                config.start_mode = StartMode::NoWelcome;
            }
            if seed.is_some() {
                config.seed = *seed;
            }
            simulate(script, db, library, config, *json).await
        }
    }
}
