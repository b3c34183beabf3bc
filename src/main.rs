#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::significant_drop_tightening
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use remotefs::config::Settings;
use remotefs::logging::{self, LogFormat};
use remotefs::model::{BatchConfig, BatchItem, CreateDirRequest, DeleteRequest, FileContent, ListRequest, ReadRequest, WriteRequest};
use remotefs::{
    BatchEngine, ConnectionDescriptor, FileEncoding, FileOps, FilterKind, ObjectType, ProtocolConnectors, ServerParams,
    WalkRequest,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in a directory
    List {
        /// Server descriptor as JSON, or @file containing it
        #[arg(short, long)]
        server: String,

        #[arg(default_value = "/")]
        path: String,

        /// None, Exact, Contains, Wildcard or Regex
        #[arg(short, long, default_value = "None", value_parser = enum_arg::<FilterKind>)]
        filter: FilterKind,

        #[arg(short, long, default_value = "")]
        pattern: String,

        /// Files, Directories or Both
        #[arg(short, long, default_value = "Files", value_parser = enum_arg::<ObjectType>)]
        object_type: ObjectType,
    },

    /// Read a file and print its content
    Read {
        #[arg(short, long)]
        server: String,
        path: String,
        file: String,
        #[arg(short, long, default_value = "UTF-8", value_parser = enum_arg::<FileEncoding>)]
        encoding: FileEncoding,
    },

    /// Write text or a local file to the server
    Write {
        #[arg(short, long)]
        server: String,
        path: String,
        file: String,

        /// Text content to write
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        text: Option<String>,

        /// Local file whose bytes are written as-is
        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(short, long, default_value = "UTF-8", value_parser = enum_arg::<FileEncoding>)]
        encoding: FileEncoding,

        #[arg(long)]
        overwrite: bool,
    },

    /// Create a directory
    Mkdir {
        #[arg(short, long)]
        server: String,
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Delete a file
    Delete {
        #[arg(short, long)]
        server: String,
        path: String,
        file: String,
    },

    /// Copy a file between servers
    Copy(TransferArgs),

    /// Copy a file between servers, then delete the source
    Move(TransferArgs),

    /// Recursively list matching files
    Walk {
        #[arg(short, long)]
        server: String,
        #[arg(default_value = "/")]
        path: String,
        #[arg(short, long, default_value = "None", value_parser = enum_arg::<FilterKind>)]
        filter: FilterKind,
        #[arg(short, long, default_value = "")]
        pattern: String,
        #[arg(short, long, default_value_t = 0)]
        max_depth: u32,
        /// Relative subdirectories to skip (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
        #[arg(long)]
        stop_on_first: bool,
    },

    /// Run a batch transfer described by a JSON file
    Batch {
        /// File with {"config": {...}, "items": [...]}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show or change CLI settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(clap::Args)]
struct TransferArgs {
    /// Source server descriptor
    #[arg(long)]
    from: String,
    /// Destination server descriptor
    #[arg(long)]
    to: String,
    source_path: String,
    source_file: String,
    destination_path: String,
    destination_file: String,
    #[arg(long, default_value = "UTF-8", value_parser = enum_arg::<FileEncoding>)]
    source_encoding: FileEncoding,
    #[arg(long, default_value = "UTF-8", value_parser = enum_arg::<FileEncoding>)]
    destination_encoding: FileEncoding,
    #[arg(long)]
    overwrite: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Print the settings file location
    Path,
    /// Change one setting
    Set { key: String, value: String },
}

#[derive(Deserialize)]
struct BatchFile {
    #[serde(default)]
    config: BatchConfig,
    #[serde(default)]
    items: Vec<BatchItem>,
}

/// Parses enum arguments by their serialized names, so the CLI accepts the
/// same spellings as JSON input.
fn enum_arg<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|e| e.to_string())
}

fn load_server(raw: &str, settings: &Settings) -> Result<ConnectionDescriptor> {
    let json = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading server descriptor {path}"))?,
        None => raw.to_string(),
    };
    ServerParams::json(json)
        .resolve_with_defaults(settings.default_retries, settings.default_retry_delay_ms)
        .context("resolving server descriptor")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn transfer_requests(args: &TransferArgs) -> (ReadRequest, WriteRequest) {
    let source = ReadRequest::new(args.source_path.clone(), args.source_file.clone()).encoding(args.source_encoding);
    let destination = WriteRequest::new(
        args.destination_path.clone(),
        args.destination_file.clone(),
        FileContent::default(),
    )
    .encoding(args.destination_encoding)
    .overwrite(args.overwrite);
    (source, destination)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    logging::init(
        cli.log_level.as_deref().unwrap_or(&settings.log_level),
        cli.log_format.unwrap_or(settings.log_format),
    );

    let ops = FileOps::with_capacity(Arc::new(ProtocolConnectors), settings.connector_pool_capacity);

    match cli.command {
        Commands::List {
            server,
            path,
            filter,
            pattern,
            object_type,
        } => {
            let server = load_server(&server, &settings)?;
            let request = ListRequest::new(path).filtered(filter, pattern).object_type(object_type);
            print_json(&ops.list(&request, &server).await?)?;
        }
        Commands::Read {
            server,
            path,
            file,
            encoding,
        } => {
            let server = load_server(&server, &settings)?;
            let request = ReadRequest::new(path, file).encoding(encoding);
            print_json(&ops.read(&request, &server).await?)?;
        }
        Commands::Write {
            server,
            path,
            file,
            text,
            input,
            encoding,
            overwrite,
        } => {
            let server = load_server(&server, &settings)?;
            let content = match (text, input) {
                (Some(text), _) => FileContent::Text(text),
                (None, Some(input)) => FileContent::Bytes(
                    std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?,
                ),
                (None, None) => FileContent::default(),
            };
            let request = WriteRequest::new(path, file, content)
                .encoding(encoding)
                .overwrite(overwrite);
            print_json(&ops.write(&request, &server).await?)?;
        }
        Commands::Mkdir {
            server,
            path,
            recursive,
        } => {
            let server = load_server(&server, &settings)?;
            print_json(&ops.create_dir(&CreateDirRequest::new(path, recursive), &server).await?)?;
        }
        Commands::Delete { server, path, file } => {
            let server = load_server(&server, &settings)?;
            print_json(&ops.delete(&DeleteRequest::new(path, file), &server).await?)?;
        }
        Commands::Copy(args) => {
            let from = load_server(&args.from, &settings)?;
            let to = load_server(&args.to, &settings)?;
            let (source, destination) = transfer_requests(&args);
            print_json(&ops.copy(&source, &from, &destination, &to).await?)?;
        }
        Commands::Move(args) => {
            let from = load_server(&args.from, &settings)?;
            let to = load_server(&args.to, &settings)?;
            let (source, destination) = transfer_requests(&args);
            print_json(&ops.move_file(&source, &from, &destination, &to).await?)?;
        }
        Commands::Walk {
            server,
            path,
            filter,
            pattern,
            max_depth,
            exclude,
            stop_on_first,
        } => {
            let server = load_server(&server, &settings)?;
            let request = WalkRequest {
                path,
                filter,
                pattern,
                max_depth,
                exclude,
                stop_on_first,
            };
            print_json(&ops.walk(&request, &server).await?)?;
        }
        Commands::Batch { file } => {
            let content =
                std::fs::read_to_string(&file).with_context(|| format!("reading batch file {}", file.display()))?;
            let batch: BatchFile = serde_json::from_str(&content).context("parsing batch file")?;

            let engine = BatchEngine::new(ops)
                .with_pacing(settings.batch_pacing())
                .with_retry_defaults(settings.default_retries, settings.default_retry_delay_ms);
            let results = engine.run(&batch.config, &batch.items).await.context("batch run aborted")?;
            print_json(&results)?;
        }
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => print_json(&settings)?,
            Some(ConfigAction::Path) => match Settings::settings_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("no configuration directory on this platform"),
            },
            Some(ConfigAction::Set { key, value }) => {
                settings.set(&key, &value)?;
                let path = settings.save()?;
                tracing::info!(path = %path.display(), key = %key, "setting saved");
                print_json(&settings)?;
            }
        },
    }

    Ok(())
}
