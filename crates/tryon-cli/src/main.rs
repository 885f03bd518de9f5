use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info, Level};
use tryon_contracts::{
    CredentialGate, CredentialState, CredentialStore, EventSink, JsonlEventLog, TryOnError,
};
use tryon_engine::{build_session, source_from_arg, TryOnConfig, TryOnSession};

#[derive(Debug, Parser)]
#[command(name = "tryon-rs", version, about = "Virtual try-on from the command line")]
struct Cli {
    /// Log more to stderr (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dress the target photo in the garment and write the result image.
    Run(RunArgs),
    /// Print the garment description only.
    Describe(DescribeArgs),
    /// Manage the stored API key.
    Key(KeyArgs),
}

#[derive(Debug, Parser)]
struct ModelArgs {
    #[arg(long)]
    description_model: Option<String>,
    #[arg(long)]
    edit_model: Option<String>,
    /// Continue with a generic label when the description call fails.
    #[arg(long)]
    describe_fallback: bool,
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Garment image: http(s) URL, data URL or local file.
    #[arg(long)]
    garment: String,
    /// Person photo: http(s) URL, data URL or local file.
    #[arg(long)]
    target: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    #[arg(long)]
    garment: String,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[command(subcommand)]
    action: KeyAction,
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { value: String },
    Status,
    Clear,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tryon-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = TryOnConfig::from_env();
    match cli.command {
        Command::Run(args) => runtime()?.block_on(run_try_on(args, config)),
        Command::Describe(args) => runtime()?.block_on(run_describe(args, config)),
        Command::Key(args) => run_key(args.action, &config),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn apply_model_args(mut config: TryOnConfig, models: ModelArgs) -> TryOnConfig {
    if let Some(model) = models.description_model {
        config.description_model = model;
    }
    if let Some(model) = models.edit_model {
        config.edit_model = model;
    }
    config.describe_fallback |= models.describe_fallback;
    config
}

async fn run_try_on(args: RunArgs, config: TryOnConfig) -> Result<i32> {
    let config = apply_model_args(config, args.models);
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();
    let events: Arc<dyn EventSink> = Arc::new(JsonlEventLog::new(&events_path, &session_id));
    info!(%session_id, events = %events_path.display(), "starting try-on");

    let garment = source_from_arg(&args.garment).await?;
    let target = source_from_arg(&args.target).await?;
    let mut session = build_session(&config, Some(events))?;

    let model_text = match session.run(&garment, &target).await {
        Ok(result) => result.source_text.clone(),
        Err(err) => return Ok(report_failure(&err)),
    };
    let path = write_current_result(&session, &args.out)?;
    println!("result: {}", path.display());
    if let Some(text) = model_text {
        println!("model: {text}");
    }
    Ok(0)
}

async fn run_describe(args: DescribeArgs, config: TryOnConfig) -> Result<i32> {
    let config = apply_model_args(config, args.models);
    let garment = source_from_arg(&args.garment).await?;
    let session = build_session(&config, None)?;
    match session.describe(&garment).await {
        Ok(description) => {
            if description.degraded {
                eprintln!("description unavailable, using '{}'", description.label);
            }
            println!("{}", description.label);
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn report_failure(err: &TryOnError) -> i32 {
    eprintln!("try-on failed ({}): {err}", err.kind());
    match err {
        TryOnError::MissingCredential => {
            eprintln!("set GEMINI_API_KEY or run `tryon-rs key set <value>`");
            3
        }
        _ => 2,
    }
}

fn write_current_result(session: &TryOnSession, out_dir: &Path) -> Result<PathBuf> {
    let Some(blob) = session.current_blob() else {
        bail!("result image is no longer available");
    };
    let path = out_dir.join(format!(
        "result-{}.{}",
        unix_epoch_millis(),
        extension_for_mime(&blob.mime_type)
    ));
    fs::write(&path, &blob.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    match image::load_from_memory(&blob.bytes) {
        Ok(decoded) => debug!(
            width = decoded.width(),
            height = decoded.height(),
            "wrote result image"
        ),
        Err(err) => debug!("result image is not decodable locally: {err}"),
    }
    Ok(path)
}

fn run_key(action: KeyAction, config: &TryOnConfig) -> Result<i32> {
    let Some(store_path) = config.credential_store_path.clone() else {
        bail!("no credential store path; set TRYON_CREDENTIAL_STORE or HOME");
    };
    let mut gate = CredentialGate::from_environment(Some(CredentialStore::new(store_path)));
    match action {
        KeyAction::Set { value } => {
            gate.set_credential(&value)?;
            println!("stored key {}", mask_secret(gate.credential().expose()));
        }
        KeyAction::Status => match gate.state() {
            CredentialState::HasCredential => println!(
                "key {} ({:?})",
                mask_secret(gate.credential().expose()),
                gate.origin()
            ),
            CredentialState::NoCredential => println!("no key configured"),
        },
        KeyAction::Clear => {
            if gate.clear_stored()? {
                println!("stored key removed");
            } else {
                println!("no stored key");
            }
        }
    }
    Ok(0)
}

fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "*".repeat(count.max(4));
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn unix_epoch_millis() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
