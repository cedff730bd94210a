use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use repolens_answer::llm::LlmClient;
use repolens_answer::Answer;
use repolens_core::{BoundaryMode, LensConfig, OutputFormat, QueryResult, DEFAULT_CONFIG_FILE};
use repolens_index::ingest::ingest_tree_with_progress;
use repolens_index::{EvaluationReport, IndexStats, IngestReport, VectorStore};

const SNIPPET_CHARS: usize = 240;

#[derive(Parser)]
#[command(
    name = "repolens",
    version,
    about = "Index a repository's docs and code, then search it and ask questions about it",
    long_about = "repolens chunks a repository's documentation and source code, embeds the chunks,\n\
                  and keeps them in a local SQLite index for similarity search and question answering.\n\n\
                  Examples:\n  \
                    repolens ingest .                        Index the current directory\n  \
                    repolens query 'token refresh'           Show the nearest chunks\n  \
                    repolens ask 'How is auth wired up?'     Answer from retrieved context\n  \
                    repolens eval questions.csv -k 5         Measure retrieval precision@k\n  \
                    repolens init                            Write a .repolens.toml template"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .repolens.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Index database path (overrides config and REPOLENS_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Collection name inside the index (overrides config and REPOLENS_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store every doc and code file under a directory
    #[command(long_about = "Chunk, embed and store every doc and code file under a directory.\n\n\
        Files are classified by extension. Docs are split at markdown headings, code at\n\
        top-level definitions, and anything too long is cut into overlapping windows.\n\
        Re-running overwrites each file's chunks in place.\n\n\
        Examples:\n  repolens ingest .\n  repolens ingest ../service --batch-size 64 --syntax")]
    Ingest {
        /// Directory to index (default: current directory)
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Chunks per store write
        #[arg(long)]
        batch_size: Option<usize>,

        /// Cut code at tree-sitter definitions instead of the regex heuristic
        #[arg(long)]
        syntax: bool,
    },
    /// Show the chunks nearest to a query
    Query {
        /// Free-text query
        text: String,

        /// Number of chunks to return
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Answer a question from retrieved context
    #[command(long_about = "Answer a question from retrieved context.\n\n\
        Retrieves the k nearest chunks and sends them with the question to the\n\
        configured OpenAI-compatible chat endpoint ([llm] in .repolens.toml).\n\n\
        Examples:\n  repolens ask 'Where are migrations defined?'\n  repolens ask 'How do I add a provider?' -k 8 --format markdown")]
    Ask {
        /// Natural-language question
        question: String,

        /// Number of chunks to use as context
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Score retrieval with precision@k over a labeled CSV
    #[command(long_about = "Score retrieval with precision@k over a labeled CSV.\n\n\
        The CSV needs `question` and `relevant_keywords` columns. Keywords are\n\
        '|'-separated; a question counts as a hit when any retrieved path\n\
        contains any keyword, ignoring case.\n\n\
        Example:\n  repolens eval eval/questions.csv -k 5 --format json")]
    Eval {
        /// CSV file of questions
        csv: PathBuf,

        /// Chunks retrieved per question
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show what the index holds
    Stats,
    /// Create a default .repolens.toml configuration file
    #[command(long_about = "Create a default .repolens.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .repolens.toml already exists unless --force is given.")]
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# repolens configuration

[embedding]
# Provider: "openai", "voyage", "ollama" or "hash" (offline, for smoke tests)
provider = "openai"
# model = "text-embedding-3-small"
# api_key = "sk-..."            # or OPENAI_API_KEY / VOYAGE_API_KEY
# base_url = "https://api.openai.com/v1"
# Vector width of the hash provider
dimensions = 384
timeout_secs = 60

[index]
path = ".repolens/index.db"
collection = "default"

[ingest]
max_chars = 1200
overlap = 200
batch_size = 256
# doc_extensions = ["md", "rst", "txt"]
# code_extensions = ["py", "js", "ts", "rs", "go", "java"]
# ignore_dirs = [".git", "node_modules", "dist", "build", "target"]
respect_gitignore = false
max_file_size = 1048576
# "regex" or "syntax" (tree-sitter)
code_boundaries = "regex"

[llm]
# "openai" or "ollama"
provider = "openai"
model = "gpt-4o-mini"
# api_key = "sk-..."            # or OPENAI_API_KEY
# base_url = "http://localhost:11434"
temperature = 0.2
timeout_secs = 120

[retrieval]
k = 5
"#;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(
            "warn,repolens=debug,repolens_core=debug,repolens_walk=debug,\
             repolens_index=debug,repolens_answer=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<LensConfig> {
    let mut config = LensConfig::load(cli.config.as_deref())?;
    if let Some(index) = &cli.index {
        config.index.path = index.clone();
    }
    if let Some(collection) = &cli.collection {
        config.index.collection = collection.clone();
    }
    Ok(config)
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}…")
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_ingest(report: &IngestReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Markdown => {
            println!("# Ingestion\n");
            println!("| files indexed | files skipped | chunks written | added | pruned | total |");
            println!("|---|---|---|---|---|---|");
            println!(
                "| {} | {} | {} | {} | {} | {} |",
                report.paths.len(),
                report.files_skipped,
                report.chunks_written,
                report.added,
                report.pruned,
                report.total
            );
        }
        OutputFormat::Text => {
            println!(
                "Indexed {} files ({} chunks written, {} new, {} skipped, {} stale slots pruned)",
                report.paths.len(),
                report.chunks_written,
                report.added,
                report.files_skipped,
                report.pruned
            );
            println!("Collection now holds {} chunks", report.total);
        }
    }
    Ok(())
}

fn print_query(result: &QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Markdown => {
            if result.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            println!("# Results\n");
            for (i, hit) in result.iter().enumerate() {
                let lang = if hit.lang().is_empty() { "text" } else { hit.lang() };
                println!(
                    "## {}. `{}` (distance {:.3})\n\n```{lang}\n{}\n```\n",
                    i + 1,
                    hit.path(),
                    hit.distance,
                    hit.text
                );
            }
        }
        OutputFormat::Text => {
            if result.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (i, hit) in result.iter().enumerate() {
                println!("{}. {} (distance {:.3})", i + 1, hit.path(), hit.distance);
                println!("   {}", snippet(&hit.text));
            }
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(answer)?,
        OutputFormat::Markdown => {
            println!("{}\n", answer.text);
            if !answer.contexts.is_empty() {
                println!("## Sources\n");
                for ctx in &answer.contexts {
                    println!("- `{}` (score {:.3})", ctx.path(), ctx.score);
                }
            }
        }
        OutputFormat::Text => {
            println!("{}", answer.text);
            if !answer.contexts.is_empty() {
                println!("\nSources:");
                for ctx in &answer.contexts {
                    println!("  {} (score {:.3})", ctx.path(), ctx.score);
                }
            }
        }
    }
    Ok(())
}

fn print_eval(report: &EvaluationReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Markdown => {
            println!(
                "# precision@{}: {:.3} ({}/{})\n",
                report.k,
                report.precision,
                report.hits,
                report.details.len()
            );
            println!("| hit | question | retrieved |");
            println!("|---|---|---|");
            for d in &report.details {
                println!(
                    "| {} | {} | {} |",
                    if d.hit { "yes" } else { "no" },
                    d.question.replace('|', "\\|"),
                    d.retrieved_paths.join(", ")
                );
            }
        }
        OutputFormat::Text => {
            for d in &report.details {
                println!("[{}] {}", if d.hit { "hit " } else { "miss" }, d.question);
                for path in &d.retrieved_paths {
                    println!("       {path}");
                }
            }
            println!(
                "precision@{}: {:.3} ({}/{})",
                report.k,
                report.precision,
                report.hits,
                report.details.len()
            );
        }
    }
    Ok(())
}

fn print_stats(stats: &IndexStats, format: OutputFormat) -> Result<()> {
    let dimensions = stats
        .dimensions
        .map_or_else(|| "unset".to_string(), |d| d.to_string());
    match format {
        OutputFormat::Json => print_json(stats)?,
        OutputFormat::Markdown => {
            println!("| collection | chunks | files | dimensions | size (bytes) |");
            println!("|---|---|---|---|---|");
            println!(
                "| {} | {} | {} | {dimensions} | {} |",
                stats.collection, stats.total_chunks, stats.total_files, stats.index_size_bytes
            );
        }
        OutputFormat::Text => {
            println!("Collection: {}", stats.collection);
            println!("Chunks:     {}", stats.total_chunks);
            println!("Files:      {}", stats.total_files);
            println!("Dimensions: {dimensions}");
            println!("Index size: {} bytes", stats.index_size_bytes);
        }
    }
    Ok(())
}

fn progress_bar() -> indicatif::ProgressBar {
    if !std::io::stderr().is_terminal() {
        return indicatif::ProgressBar::hidden();
    }
    let pb = indicatif::ProgressBar::new(0);
    let style = indicatif::ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        miette::bail!(miette::miette!(
            help = "pass --force to overwrite it",
            "{} already exists",
            path.display()
        ));
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .into_diagnostic()
        .wrap_err(format!("writing {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Init { force } => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            write_default_config(path, force)?;
            println!("Created {DEFAULT_CONFIG_FILE} with default configuration");
            return Ok(());
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "repolens", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let mut config = load_config(&cli)?;
    tracing::debug!(
        provider = %config.embedding.provider,
        index = %config.index.path.display(),
        collection = %config.index.collection,
        "configuration loaded"
    );

    match cli.command {
        Command::Ingest {
            ref root,
            batch_size,
            syntax,
        } => {
            if let Some(batch_size) = batch_size {
                config.ingest.batch_size = batch_size;
            }
            if syntax {
                config.ingest.code_boundaries = BoundaryMode::Syntax;
            }
            config.validate()?;

            let store = VectorStore::from_config(&config)?;
            let pb = progress_bar();
            let report = ingest_tree_with_progress(root, &config.ingest, &store, |p| {
                pb.set_length(p.total as u64);
                pb.set_position(p.position as u64);
                pb.set_message(p.path.to_string());
            })
            .await
            .inspect_err(|_| pb.abandon_with_message("failed"))?;
            pb.finish_and_clear();
            print_ingest(&report, cli.format)?;
        }
        Command::Query { ref text, k } => {
            let store = VectorStore::from_config(&config)?;
            let result = store.query(text, k.unwrap_or(config.retrieval.k)).await?;
            print_query(&result, cli.format)?;
        }
        Command::Ask { ref question, k } => {
            let store = VectorStore::from_config(&config)?;
            let client = LlmClient::new(&config.llm)?;
            let answer = repolens_answer::answer_question(
                &store,
                &client,
                question,
                k.unwrap_or(config.retrieval.k),
            )
            .await?;
            print_answer(&answer, cli.format)?;
        }
        Command::Eval { ref csv, k } => {
            let queries = repolens_index::eval::load_queries(csv)?;
            let store = VectorStore::from_config(&config)?;
            let report =
                repolens_index::eval::evaluate_store(&store, &queries, k.unwrap_or(config.retrieval.k))
                    .await?;
            print_eval(&report, cli.format)?;
        }
        Command::Stats => {
            let store = VectorStore::from_config(&config)?;
            print_stats(&store.stats()?, cli.format)?;
        }
        Command::Init { .. } | Command::Completions { .. } => {}
    }

    Ok(())
}
