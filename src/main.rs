// ============================================================================
// File: src/main.rs
// Entry point and CLI handling
// ============================================================================

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use cutverse::config::Config;
use cutverse::llm_client::{HttpInferenceClient, InferenceClient};
use cutverse::models::{LanguagePreference, ToolFamily, ToolResponse};
use cutverse::orchestrator::{RenderStyle, ToolClients, ToolOrchestrator};
use cutverse::prompts::LEVELS;
use cutverse::throttle::{should_fire, AdThrottle, BrowserLauncher, FileCounterStore, NoopLauncher, PromoLauncher};
use cutverse::transcoder::{validate_wav, AudioFile, FfmpegTranscoder};

/// Command-line arguments for the toolkit
#[derive(Parser, Debug)]
#[command(name = "cutverse")]
#[command(about = "AI-assisted grammar, math, music and audio tools", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print formatted text as HTML instead of terminal styling
    #[arg(long, global = true)]
    html: bool,

    /// Print the raw result envelope as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grammar rules, corrections, explanations and exercises
    Grammar {
        #[command(subcommand)]
        action: GrammarAction,
    },
    /// Math solving, concepts and practice problems
    Math {
        #[command(subcommand)]
        action: MathAction,
    },
    /// Generate music from a description
    Music {
        prompt: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate an image from a description
    Image {
        prompt: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a WAV file to MP3
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or reset the ad counter
    Ads {
        #[command(subcommand)]
        action: AdsAction,
    },
}

#[derive(Subcommand, Debug)]
enum GrammarAction {
    /// Explain a grammar rule
    Rule { text: String },
    /// Correct a piece of text
    Correct { text: String },
    /// Explain the grammar of a sentence
    Explain { text: String },
    /// Generate an exercise on a topic
    Exercise {
        topic: String,
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(LEVELS))]
        level: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MathAction {
    /// Solve a problem step by step
    Solve {
        text: String,
        #[arg(long, value_enum, default_value_t = LanguagePreference::Auto)]
        language: LanguagePreference,
    },
    /// Explain a concept
    Concept {
        text: String,
        #[arg(long, value_enum, default_value_t = LanguagePreference::Auto)]
        language: LanguagePreference,
    },
    /// Generate practice problems on a topic
    Practice {
        topic: String,
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(LEVELS))]
        level: Option<String>,
        #[arg(long, value_enum, default_value_t = LanguagePreference::Auto)]
        language: LanguagePreference,
    },
    /// Short answer with brief working
    Quick { text: String },
}

#[derive(Subcommand, Debug)]
enum AdsAction {
    /// Show the current counter
    Status,
    /// Clear the persisted counter
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let needs_credentials = matches!(
        args.command,
        Command::Grammar { .. } | Command::Math { .. } | Command::Music { .. } | Command::Image { .. }
    );
    let config = Config::load(&args.config, !needs_credentials)?;
    if needs_credentials {
        config.validate()?;
    }
    debug!("loaded configuration from {}", args.config.display());

    let throttle = Arc::new(AdThrottle::new(Box::new(FileCounterStore::new(
        config.counter_path(),
    ))));

    let style = if args.html || args.json {
        RenderStyle::Html
    } else {
        RenderStyle::Terminal
    };
    let orchestrator = build_orchestrator(&config, Arc::clone(&throttle))?.with_style(style);

    let (response, media_target) = match args.command {
        Command::Ads { action } => return run_ads(&action, &throttle, &config),
        Command::Grammar { action } => {
            let response = match action {
                GrammarAction::Rule { text } => {
                    with_spinner("Looking up the rule", orchestrator.grammar_rule(&text)).await
                }
                GrammarAction::Correct { text } => {
                    with_spinner("Correcting", orchestrator.correct_grammar(&text)).await
                }
                GrammarAction::Explain { text } => {
                    with_spinner("Explaining", orchestrator.explain_grammar(&text)).await
                }
                GrammarAction::Exercise { topic, level } => {
                    with_spinner(
                        "Writing the exercise",
                        orchestrator.grammar_exercise(&topic, level.as_deref()),
                    )
                    .await
                }
            };
            (response, None)
        }
        Command::Math { action } => {
            let response = match action {
                MathAction::Solve { text, language } => {
                    with_spinner("Solving", orchestrator.solve_math(&text, language)).await
                }
                MathAction::Concept { text, language } => {
                    with_spinner("Explaining", orchestrator.explain_math_concept(&text, language))
                        .await
                }
                MathAction::Practice { topic, level, language } => {
                    with_spinner(
                        "Writing problems",
                        orchestrator.math_practice(&topic, level.as_deref(), language),
                    )
                    .await
                }
                MathAction::Quick { text } => {
                    with_spinner("Solving", orchestrator.quick_math_solve(&text)).await
                }
            };
            (response, None)
        }
        Command::Music { prompt, output } => {
            let response = with_spinner("Composing", orchestrator.generate_music(&prompt)).await;
            (response, Some(output.unwrap_or_else(|| PathBuf::from("music.wav"))))
        }
        Command::Image { prompt, output } => {
            let response = with_spinner("Painting", orchestrator.generate_image(&prompt)).await;
            (response, Some(output.unwrap_or_else(|| PathBuf::from("image.png"))))
        }
        Command::Convert { input, output } => {
            let target = output.unwrap_or_else(|| input.with_extension("mp3"));
            let response = match read_wav(&input) {
                Ok(file) => with_spinner("Converting", orchestrator.convert_wav_to_mp3(&file)).await,
                Err(response) => response,
            };
            (response, Some(target))
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    if !response.success {
        if !args.json {
            eprintln!("{} {}", "✗".red().bold(), response.error.as_deref().unwrap_or("Unknown error").red());
        }
        std::process::exit(1);
    }

    match media_target {
        Some(path) => save_media(&orchestrator, &response.result, &path)?,
        None if !args.json => println!("{}", response.result),
        None => {}
    }

    if let Some(language) = response.language {
        debug!("answered in {}", language.name());
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_orchestrator(config: &Config, throttle: Arc<AdThrottle>) -> Result<ToolOrchestrator> {
    let client_for = |family: ToolFamily| -> Result<Arc<dyn InferenceClient>> {
        Ok(Arc::new(HttpInferenceClient::new(
            config.api_base_url.clone(),
            config.api_key(family).to_string(),
            config.request_timeout(),
        )?))
    };
    let clients = ToolClients {
        grammar: client_for(ToolFamily::Grammar)?,
        math: client_for(ToolFamily::Math)?,
        media: client_for(ToolFamily::Media)?,
    };

    let launcher: Box<dyn PromoLauncher> = if config.promotions_enabled {
        Box::new(BrowserLauncher)
    } else {
        Box::new(NoopLauncher)
    };

    Ok(ToolOrchestrator::new(
        config,
        clients,
        throttle,
        launcher,
        Box::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
    ))
}

/// Checks type and size from metadata before pulling the file into memory.
fn read_wav(path: &Path) -> std::result::Result<AudioFile, ToolResponse> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let size = fs::metadata(path)
        .map_err(|e| ToolResponse::failed(format!("Could not read {}: {}", path.display(), e)))?
        .len();
    validate_wav(&name, None, size).map_err(ToolResponse::failed)?;

    let bytes = fs::read(path)
        .map_err(|e| ToolResponse::failed(format!("Could not read {}: {}", path.display(), e)))?;
    Ok(AudioFile {
        name,
        mime: None,
        bytes,
    })
}

fn save_media(orchestrator: &ToolOrchestrator, uri: &str, path: &Path) -> Result<()> {
    if uri.starts_with("http") {
        println!("{} Media available at: {}", "✓".green().bold(), uri.bright_cyan());
        return Ok(());
    }
    let bytes = orchestrator
        .blobs()
        .resolve_bytes(uri)
        .ok_or_else(|| anyhow::anyhow!("Could not decode media returned by the model"))?;
    fs::write(path, &bytes)?;
    println!(
        "{} Saved {} bytes to: {}",
        "✓".green().bold(),
        bytes.len(),
        path.display().to_string().bright_cyan()
    );
    Ok(())
}

fn run_ads(action: &AdsAction, throttle: &AdThrottle, config: &Config) -> Result<()> {
    match action {
        AdsAction::Status => {
            let state = throttle.peek();
            let next = state.click_count + 1;
            println!("{}: {}", "Generations".green().bold(), state.click_count);
            println!("{}: {}", "Counting since".green().bold(), state.last_reset.format("%Y-%m-%d %H:%M:%S UTC"));
            println!(
                "{}: {}",
                "Next call opens link".green().bold(),
                if should_fire(next) { "yes" } else { "no" }
            );
            println!("{}: {}", "Link".green().bold(), config.ad_link.bright_cyan());
        }
        AdsAction::Reset => {
            throttle.reset()?;
            println!("{} Ad counter reset", "✓".green().bold());
        }
    }
    Ok(())
}

/// Shows a spinner on stderr while `work` is outstanding.
async fn with_spinner<F>(message: &str, work: F) -> ToolResponse
where
    F: Future<Output = ToolResponse>,
{
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("{}...", message));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let response = work.await;
    spinner.finish_and_clear();
    response
}
