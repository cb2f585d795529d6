//! eulai command-line host
//!
//! Run with: cargo run -p eulai -- analyze terms.html --model ./model.gguf

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eulai::analysis::{AnalysisSink, BlockOutcome, HtmlPage, RenderedBlock};
use eulai::ingestion::{Extractor, HtmlDocument, NoiseFilter, Segmenter};
use eulai::providers::{LlmRuntime, OllamaRuntime};
use eulai::session::open_source;
use eulai::types::{Chunk, Extraction, Severity};
use eulai::{EulaiConfig, Orchestrator, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "eulai", version, about = "Analyze terms of service with a local LLM")]
struct Cli {
    /// Configuration file (defaults to the user config when present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the text extracted from a document
    Extract {
        /// HTML (.html/.htm) or plain text file
        file: PathBuf,
    },
    /// Print the chunks a document is split into
    Chunks {
        file: PathBuf,
        /// Maximum chunk size in characters
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Run the full analysis against a local Ollama server
    Analyze {
        file: PathBuf,
        /// Model file path or http(s) URL
        #[arg(long, short)]
        model: String,
        /// Print rendered HTML blocks instead of a findings list
        #[arg(long)]
        html: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eulai=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Extract { file } => {
            let extraction = read_document(&file, &config)?;
            if !extraction.valid {
                anyhow::bail!("could not extract text from {}", file.display());
            }
            println!("{}", extraction.text);
        }
        Command::Chunks { file, max_chars } => {
            let extraction = read_document(&file, &config)?;
            let mut segmentation = config.segmentation.clone();
            if let Some(max) = max_chars {
                segmentation.max_chunk_chars = max;
            }
            let segmenter = Segmenter::from_config(&segmentation)?;

            for chunk in segmenter.split(&extraction.text) {
                println!(
                    "{}",
                    style(format!("── {} ({} chars)", chunk.label(), chunk.char_len())).bold()
                );
                println!("{}\n", chunk.content);
            }
        }
        Command::Analyze { file, model, html } => analyze(&file, &model, html, config).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EulaiConfig> {
    if let Some(path) = path {
        return EulaiConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }
    match EulaiConfig::default_path() {
        Some(path) if path.exists() => Ok(EulaiConfig::from_file(&path)?),
        _ => Ok(EulaiConfig::default()),
    }
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

fn read_document(path: &Path, config: &EulaiConfig) -> anyhow::Result<Extraction> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    if is_html(path) {
        let document = HtmlDocument::parse(&raw);
        if let Some(title) = document.title() {
            tracing::info!("Document: {}", title);
        }
        let extractor = Extractor::new(NoiseFilter::from_config(&config.extraction));
        Ok(extractor.extract(&document.to_tree()))
    } else {
        Ok(Extraction::new(eulai::ingestion::normalize(&raw)))
    }
}

async fn analyze(file: &Path, model: &str, html: bool, config: EulaiConfig) -> anyhow::Result<()> {
    let llm = config.llm.clone();
    let factory = Arc::new(move || -> eulai::Result<Box<dyn LlmRuntime>> {
        Ok(Box::new(OllamaRuntime::new(&llm)?))
    });

    let session = Arc::new(SessionManager::spawn(factory, config.session.clone()));
    let source = open_source(model, config.session.frame_size)
        .await
        .with_context(|| format!("opening model {}", model))?;
    let orchestrator = Orchestrator::new(session, &config)?.with_model_source(source);

    let sink = CliSink::new(html);
    let report = if is_html(file) {
        let markup = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let extractor = Extractor::new(NoiseFilter::from_config(&config.extraction));
        orchestrator
            .analyze_page(&HtmlPage::with_extractor(markup, extractor), &sink)
            .await?
    } else {
        let extraction = read_document(file, &config)?;
        orchestrator.analyze_page(&extraction, &sink).await?
    };
    sink.bar.finish_and_clear();

    println!(
        "\n{} blocks analyzed, {} failed, {} findings",
        report.total_chunks,
        report.failed,
        report.findings.len()
    );
    for severity in Severity::ALL {
        let count = report.findings.iter().filter(|f| f.severity == severity).count();
        if count > 0 {
            println!("  {} {}", severity_style(severity).apply_to(severity), count);
        }
    }
    Ok(())
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Blocker => Style::new().red().bold(),
        Severity::Bad => Style::new().yellow().bold(),
        Severity::Good => Style::new().green().bold(),
        Severity::Neutral => Style::new().cyan(),
    }
}

/// Terminal sink: progress bar plus per-block output once a block settles
struct CliSink {
    bar: ProgressBar,
    html: bool,
    latest: Mutex<HashMap<usize, String>>,
}

impl CliSink {
    fn new(html: bool) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self {
            bar,
            html,
            latest: Mutex::new(HashMap::new()),
        }
    }
}

impl AnalysisSink for CliSink {
    fn progress(&self, message: &str, percent: u8) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn notice(&self, message: &str) {
        self.bar.println(style(message).yellow().to_string());
    }

    fn block_started(&self, chunk: &Chunk) {
        tracing::debug!("{}: {} chars", chunk.label(), chunk.char_len());
    }

    fn block_updated(&self, index: usize, block: &RenderedBlock) {
        self.latest.lock().insert(index, block.html.clone());
    }

    fn block_finished(&self, index: usize, outcome: &BlockOutcome) {
        let header = style(format!("── Block {}", index + 1)).bold().to_string();
        self.bar.println(header);

        if self.html {
            if let Some(html) = self.latest.lock().remove(&index) {
                self.bar.println(html);
            }
            return;
        }

        match outcome {
            BlockOutcome::Findings { parsed } => {
                if parsed.format_warning {
                    self.bar.println(
                        style("  Non-standard format detected - Free interpretation")
                            .dim()
                            .to_string(),
                    );
                }
                for finding in parsed.findings() {
                    let tag = severity_style(finding.severity)
                        .apply_to(format!("[{}]", finding.severity));
                    let mut line = format!("  {} {}", tag, finding.title);
                    if !finding.explanation.is_empty() {
                        line.push_str(&format!(": {}", finding.explanation));
                    }
                    self.bar.println(line);
                }
            }
            BlockOutcome::Empty => self
                .bar
                .println(style("  No significant clauses found.").dim().italic().to_string()),
            BlockOutcome::Failed { error } => self
                .bar
                .println(style(format!("  Error during analysis: {}", error)).red().to_string()),
        }
    }
}
