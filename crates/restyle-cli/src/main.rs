mod comparator;
mod uploader;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use restyle_contracts::chat::{parse_input, CHAT_HELP_COMMANDS};
use restyle_contracts::events::EventWriter;
use restyle_contracts::media::{extension_for_mime, ImagePayload};
use restyle_contracts::session::{Message, SessionSnapshot};
use restyle_contracts::styles::StyleCatalog;
use restyle_engine::{
    default_gateway_registry, DesignGateway, DesignStudio, GatewayConfig, Outcome, RejectReason,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "restyle", version, about = "AI room restyling from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: upload, pick a style, then chat.
    Chat(ChatArgs),
    /// List the decor styles.
    Styles,
    /// Restyle one photo and write the result.
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct GatewayArgs {
    #[arg(long, default_value = "gemini")]
    gateway: String,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct RenderArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    style: String,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    gateway: GatewayArgs,
}

impl GatewayArgs {
    fn config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::from_env();
        if let Some(model) = non_empty(self.image_model.as_deref()) {
            config.image_model = model;
        }
        if let Some(model) = non_empty(self.text_model.as_deref()) {
            config.text_model = model;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_s = timeout;
        }
        config
    }

    fn gateway(&self) -> Result<Arc<dyn DesignGateway>> {
        let registry = default_gateway_registry(&self.config());
        registry.get(self.gateway.trim()).with_context(|| {
            format!(
                "unknown gateway '{}' (available: {})",
                self.gateway,
                registry.names().join(", ")
            )
        })
    }

    fn events(&self) -> EventWriter {
        let session_id = Uuid::new_v4().to_string();
        match &self.events {
            Some(path) => EventWriter::to_file(path, session_id),
            None => EventWriter::discard(session_id),
        }
    }

    fn studio(&self) -> Result<DesignStudio> {
        DesignStudio::new(self.gateway()?, self.events())
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("restyle error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Styles => {
            for line in style_lines(&StyleCatalog::default()) {
                println!("{line}");
            }
            Ok(0)
        }
        Command::Render(args) => run_render(args),
    }
}

fn run_render(args: RenderArgs) -> Result<i32> {
    let studio = args.gateway.studio()?;
    let image = uploader::load_image(&args.image)?;
    studio.submit_image(image)?;

    let style = resolve_style_name(&StyleCatalog::default(), &args.style);
    let outcome = studio.select_style(&style)?;
    let snapshot = studio.snapshot()?;
    match (outcome, snapshot.generated_image.as_ref()) {
        (Outcome::Completed, Some(generated)) => {
            let path = save_image(generated, &args.out)?;
            println!("{style}: wrote {}", path.display());
            Ok(0)
        }
        _ => {
            let reason = snapshot
                .last_error
                .unwrap_or_else(|| outcome_notice(outcome).unwrap_or_default());
            bail!("{style} render failed: {reason}")
        }
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let studio = args.gateway.studio()?;
    let catalog = StyleCatalog::default();
    let mut view = TranscriptView::default();

    println!(
        "Restyle chat started ({} gateway). Type /help for commands.",
        studio.gateway_name()
    );
    if let Some(path) = &args.image {
        upload(&studio, path, &mut view)?;
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_input(input);
        match intent.action.as_str() {
            "noop" => continue,
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "list_styles" => {
                for line in style_lines(&catalog) {
                    println!("{line}");
                }
            }
            "upload" => match value_as_non_empty_string(intent.command_args.get("path")) {
                Some(path) => upload(&studio, Path::new(&path), &mut view)?,
                None => println!("/upload requires a path"),
            },
            "select_style" => match value_as_non_empty_string(intent.command_args.get("style")) {
                Some(query) => {
                    let style = resolve_style_name(&catalog, &query);
                    println!("Reimagining your room in the {style} style...");
                    let outcome = studio.select_style(&style)?;
                    if outcome == Outcome::Completed {
                        view.reset();
                    }
                    report(outcome, &studio.snapshot()?);
                }
                None => println!("/style requires a name or number (see /styles)"),
            },
            "compare" => {
                let position = intent
                    .command_args
                    .get("position")
                    .and_then(Value::as_f64);
                let path = value_as_non_empty_string(intent.command_args.get("path"));
                match (position, path) {
                    (Some(position), Some(path)) => {
                        compare(&studio.snapshot()?, position, Path::new(&path))?
                    }
                    _ => println!("/compare requires a position (0-100) and an output path"),
                }
            }
            "save" => match value_as_non_empty_string(intent.command_args.get("path")) {
                Some(path) => match studio.snapshot()?.generated_image {
                    Some(generated) => {
                        let written = save_image(&generated, Path::new(&path))?;
                        println!("Saved {}", written.display());
                    }
                    None => println!("Nothing generated yet; pick a style first."),
                },
                None => println!("/save requires a path"),
            },
            "status" => {
                let status = studio.snapshot()?.status_json();
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            "quit" => break,
            "unknown" => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
            "message" => {
                let text = intent.message.unwrap_or_default();
                let outcome = studio.send_message(&text)?;
                report(outcome, &studio.snapshot()?);
            }
            other => println!("Unhandled action: {other}"),
        }

        for line in view.pending_lines(&studio.snapshot()?) {
            println!("{line}");
        }
        if let Some(failure) = studio.take_event_failure() {
            eprintln!("restyle warning: event log write failed ({failure})");
        }
    }
    Ok(())
}

fn upload(studio: &DesignStudio, path: &Path, view: &mut TranscriptView) -> Result<()> {
    let image = match uploader::load_image(path) {
        Ok(image) => image,
        Err(err) => {
            println!("Upload failed: {err:#}");
            return Ok(());
        }
    };
    let bytes = image.len();
    let outcome = studio.submit_image(image)?;
    if outcome == Outcome::Completed {
        view.reset();
        println!(
            "Uploaded {} ({bytes} bytes). Pick a style with /style <name|number>.",
            path.display()
        );
    }
    report(outcome, &studio.snapshot()?);
    Ok(())
}

fn compare(snapshot: &SessionSnapshot, position: f64, out: &Path) -> Result<()> {
    let (Some(original), Some(generated)) = (&snapshot.original_image, &snapshot.generated_image)
    else {
        println!("Nothing to compare yet; upload a photo and pick a style first.");
        return Ok(());
    };
    let position = comparator::clamp_position(position);
    comparator::write_comparison(original, generated, position, out)?;
    println!("Wrote before/after at {position}% to {}", out.display());
    Ok(())
}

fn report(outcome: Outcome, snapshot: &SessionSnapshot) {
    if let Some(notice) = outcome_notice(outcome) {
        println!("{notice}");
    }
    if outcome == Outcome::Failed {
        if let Some(banner) = error_banner(snapshot) {
            println!("{banner}");
        }
    }
}

fn outcome_notice(outcome: Outcome) -> Option<String> {
    let notice = match outcome {
        Outcome::Completed | Outcome::Failed => return None,
        Outcome::Superseded => "A newer upload replaced the photo; that result was discarded.",
        Outcome::Rejected(RejectReason::NotAnImage) => "Only image files can be uploaded.",
        Outcome::Rejected(RejectReason::NoImage) => "Upload a room photo first (/upload <path>).",
        Outcome::Rejected(RejectReason::NoGeneratedImage) => {
            "Pick a style first (/style <name|number>)."
        }
        Outcome::Rejected(RejectReason::EmptyMessage) => return None,
        Outcome::Rejected(RejectReason::Busy) => "Still working on the previous request.",
    };
    Some(notice.to_string())
}

fn error_banner(snapshot: &SessionSnapshot) -> Option<String> {
    snapshot
        .last_error
        .as_deref()
        .map(|error| format!("[error] {error}"))
}

/// Prints each transcript message once.
#[derive(Debug, Default)]
struct TranscriptView {
    shown: usize,
}

impl TranscriptView {
    /// Call when the transcript was replaced rather than extended.
    fn reset(&mut self) {
        self.shown = 0;
    }

    fn pending_lines(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        if snapshot.transcript.len() < self.shown {
            self.shown = 0;
        }
        let lines = snapshot.transcript[self.shown..]
            .iter()
            .flat_map(render_message)
            .collect();
        self.shown = snapshot.transcript.len();
        lines
    }
}

fn render_message(message: &Message) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", message.sender.as_str(), message.text)];
    if let Some(products) = &message.products {
        if products.is_empty() {
            lines.push("  (no items found)".to_string());
        }
        for product in products {
            lines.push(format!(
                "  - {} ({}) {}",
                product.item_name, product.price, product.url
            ));
        }
    }
    lines
}

fn style_lines(catalog: &StyleCatalog) -> Vec<String> {
    catalog
        .list()
        .enumerate()
        .map(|(idx, style)| format!("{:>2}. {:<20} {}", idx + 1, style.name, style.image_url))
        .collect()
}

/// Catalog name for a number or case-insensitive name; anything else is
/// used verbatim.
fn resolve_style_name(catalog: &StyleCatalog, query: &str) -> String {
    catalog
        .resolve(query)
        .map(|style| style.name.clone())
        .unwrap_or_else(|| query.trim().to_string())
}

/// Writes the image, adding an extension matching its content type when the
/// path has none.
fn save_image(image: &ImagePayload, path: &Path) -> Result<PathBuf> {
    let path = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(extension_for_mime(&image.mime_type))
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, &image.bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    non_empty(value.and_then(Value::as_str))
}
