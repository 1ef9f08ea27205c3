//! kbctl CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use kbctl::{
    client::{ApiClient, Corpus},
    commands::{
        cmd_chunk_delete, cmd_chunks_show, cmd_delete, cmd_edit, cmd_init, cmd_list, cmd_pdf_url,
        cmd_pdf_view, cmd_pull, cmd_push, cmd_query, cmd_sessions, cmd_show, cmd_status,
        cmd_upload, cmd_watch, print_answer, print_chunk_delete_report, print_chunks_view,
        print_delete_outcome, print_document, print_edit_report, print_knowledge_list,
        print_pdf_link, print_pdf_page, print_pull_report, print_save_report, print_sessions,
        print_status, print_upload_outcome, ChunkDeleteOptions, DeleteOptions, EditOptions,
        InitOptions, ListOptions, PdfUrlOptions, PdfViewOptions, PullOptions, PushOptions,
        QueryOptions, ShowOptions, UploadOptions, WatchOptions,
    },
    config::Config,
    error::Result,
    progress::LogWriterFactory,
    session::SessionStore,
    types::ModelType,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kbctl")]
#[command(version, about = "Admin console for the document knowledge base", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Document corpus to target: enterprise or general
    #[arg(long, global = true, default_value = "enterprise")]
    corpus: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init {
        /// Base directory for config and edit sessions
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,

        /// Write defaults without prompting
        #[arg(long)]
        non_interactive: bool,

        /// Accept the default for every prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Manage knowledge documents
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Review and edit extracted chunks
    Chunks {
        #[command(subcommand)]
        action: ChunksAction,
    },

    /// Ask the knowledge base a question
    Query {
        /// Question text
        text: Vec<String>,

        /// Model override: cloud or local
        #[arg(long)]
        model: Option<String>,

        /// Answer without corpus retrieval
        #[arg(long)]
        no_retrieval: bool,

        /// Transcribe the question with the configured voice command
        #[arg(long)]
        voice: bool,
    },

    /// Work with stored PDFs
    Pdf {
        #[command(subcommand)]
        action: PdfAction,
    },

    /// Show configuration and backend status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// List documents
    List {
        /// Listing page, 1-based
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Filter by file name substring
        #[arg(long)]
        title: Option<String>,

        /// Filter by department
        #[arg(long)]
        department: Option<String>,
    },

    /// Show one document
    Show {
        /// Document id
        id: i64,
    },

    /// Upload a document
    Upload {
        /// File to upload
        file: PathBuf,

        /// Department the document belongs to
        #[arg(long)]
        department: Option<String>,

        /// Author id, defaults to the configured one
        #[arg(long)]
        author: Option<i64>,

        /// Inline text stored with the upload
        #[arg(long)]
        content: Option<String>,

        /// Return immediately instead of polling processing status
        #[arg(long)]
        no_wait: bool,
    },

    /// Delete a document
    Delete {
        /// Document id
        id: i64,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Re-render the listing every poll interval until Ctrl+C
    Watch {
        /// Listing page to watch, 1-based
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[derive(Subcommand)]
enum ChunksAction {
    /// Download a document's chunks into a local edit session
    Pull {
        /// Document id
        id: i64,
    },

    /// Show the staged chunks
    Show {
        /// Document id
        id: i64,

        /// Case-insensitive content filter
        #[arg(long)]
        search: Option<String>,
    },

    /// Stage new content for one chunk
    Edit {
        /// Document id
        id: i64,

        /// Chunk id within the document
        chunk_id: String,

        /// New content inline
        #[arg(long)]
        content: Option<String>,

        /// Read new content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Edit the content in $EDITOR
        #[arg(long)]
        editor: bool,
    },

    /// Delete one chunk on the backend
    Delete {
        /// Chunk id
        chunk_id: String,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Save every staged chunk back to the backend
    Push {
        /// Document id
        id: i64,
    },

    /// List staged edit sessions
    Sessions,
}

#[derive(Subcommand)]
enum PdfAction {
    /// Print the media URL of a stored PDF
    Url {
        /// Stored file name, e.g. report.pdf
        title: String,

        /// Page for the #page=N fragment
        #[arg(long)]
        page: Option<i64>,
    },

    /// Show one page's text in the terminal
    View {
        /// Stored file name, e.g. report.pdf
        title: String,

        /// Page to show, 1-based
        #[arg(long)]
        page: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli);
    }

    // Handle completions command (doesn't need config or client)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "kbctl", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let client = ApiClient::new(&config)?;
    let store = SessionStore::new(&config.paths.sessions_dir);
    let corpus: Corpus = cli.corpus.parse()?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Knowledge { action } => match action {
            KnowledgeAction::List {
                page,
                title,
                department,
            } => {
                let options = ListOptions {
                    corpus,
                    page,
                    title,
                    department,
                };
                let list = cmd_list(&config, &client, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&list)?);
                } else {
                    print_knowledge_list(&list);
                }
            }

            KnowledgeAction::Show { id } => {
                let document = cmd_show(&client, corpus, id).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                } else {
                    print_document(&document);
                }
            }

            KnowledgeAction::Upload {
                file,
                department,
                author,
                content,
                no_wait,
            } => {
                let options = UploadOptions {
                    corpus,
                    file,
                    department,
                    author,
                    content,
                    wait: !no_wait,
                };
                let outcome = cmd_upload(&config, &client, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_upload_outcome(&outcome);
                }
            }

            KnowledgeAction::Delete { id, yes } => {
                let options = DeleteOptions { corpus, id, yes };
                let outcome = cmd_delete(&config, &client, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_delete_outcome(&outcome);
                }
            }

            KnowledgeAction::Watch { page } => {
                let options = WatchOptions { corpus, page };
                cmd_watch(&config, &client, &options).await?;
            }
        },

        Commands::Chunks { action } => match action {
            ChunksAction::Pull { id } => {
                let options = PullOptions { corpus, id };
                let report = cmd_pull(&client, &store, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_pull_report(&report);
                }
            }

            ChunksAction::Show { id, search } => {
                let options = ShowOptions { corpus, id, search };
                let view = cmd_chunks_show(&client, &store, &options)?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                } else {
                    print_chunks_view(&view);
                }
            }

            ChunksAction::Edit {
                id,
                chunk_id,
                content,
                file,
                editor,
            } => {
                let options = EditOptions {
                    corpus,
                    id,
                    chunk_id,
                    content,
                    file,
                    editor,
                };
                let report = cmd_edit(&store, &options)?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_edit_report(&report);
                }
            }

            ChunksAction::Delete { chunk_id, yes } => {
                let options = ChunkDeleteOptions {
                    corpus,
                    chunk_id,
                    yes,
                };
                let report = cmd_chunk_delete(&client, &store, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_chunk_delete_report(&report);
                }
            }

            ChunksAction::Push { id } => {
                let options = PushOptions { corpus, id };
                let report = cmd_push(&config, &client, &store, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_save_report(&report);
                }
            }

            ChunksAction::Sessions => {
                let rows = cmd_sessions(&store)?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    print_sessions(&rows);
                }
            }
        },

        Commands::Query {
            text,
            model,
            no_retrieval,
            voice,
        } => {
            let joined = text.join(" ");
            let options = QueryOptions {
                corpus,
                text: if joined.trim().is_empty() {
                    None
                } else {
                    Some(joined)
                },
                model: model.map(|m| m.parse::<ModelType>()).transpose()?,
                no_retrieval,
                voice,
            };
            let answer = cmd_query(&config, &client, &options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }

        Commands::Pdf { action } => match action {
            PdfAction::Url { title, page } => {
                let options = PdfUrlOptions { title, page };
                let link = cmd_pdf_url(&client, &options)?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&link)?);
                } else {
                    print_pdf_link(&link);
                }
            }

            PdfAction::View { title, page } => {
                let options = PdfViewOptions { title, page };
                let view = cmd_pdf_view(&client, &options).await?;

                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                } else {
                    print_pdf_page(&view);
                }
            }
        },

        Commands::Status => {
            let status = cmd_status(&config, &client, &store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init {
        base_dir,
        force,
        non_interactive,
        yes,
    } = cli.command
    else {
        unreachable!()
    };

    // Get the base directory: if the user specifies a config file, use its
    // parent dir. Otherwise use --base-dir or the default.
    let (base_dir, config_path) = if let Some(path) = cli.config {
        let base = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir);
        let config = if path.extension().map_or(false, |e| e == "toml") {
            path // User specified a .toml file
        } else {
            path.join("config.toml") // User specified a directory
        };
        (base, config)
    } else {
        let base = base_dir.unwrap_or_else(Config::default_base_dir);
        (base.clone(), base.join("config.toml"))
    };

    cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
        non_interactive,
        yes,
    })
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'kbctl init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
