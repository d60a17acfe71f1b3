use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use imagebridge_contracts::chat::{ChatMessage, ContentPart};
use imagebridge_contracts::regions::TextRegion;
use imagebridge_engine::codec;
use imagebridge_engine::config::{OcrBackendKind, OcrConfig, ProviderConfig};
use imagebridge_engine::{
    ContentGenerator, EditRequest, GenerateOptions, ImageEditor, NormalizedResponse, OcrRefiner,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "imagebridge", version, about = "Image edit, vision chat and OCR refinement")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// One-shot text or vision chat.
    Chat(ChatArgs),
    /// Masked image edit.
    Edit(EditArgs),
    /// Re-read OCR regions against their source image.
    Refine(RefineArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    prompt: String,
    /// Images attached after the prompt, in order.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    json: bool,
    /// Where to write the image if the model answers with one.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    mask: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Local,
    Remote,
}

#[derive(Debug, Parser)]
struct RefineArgs {
    #[arg(long)]
    regions: PathBuf,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    #[arg(long)]
    endpoint: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagebridge error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => run_chat(args),
        Command::Edit(args) => run_edit(args),
        Command::Refine(args) => run_refine(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let config = match (args.model.as_deref(), args.images.is_empty()) {
        (Some(model), _) => ProviderConfig::from_env(Some(model))?,
        (None, true) => ProviderConfig::text()?,
        (None, false) => ProviderConfig::vision()?,
    };
    let generator = ContentGenerator::from_config(config)?;
    let messages = chat_messages(args.system.as_deref(), &args.prompt, &args.images)?;
    let mut options = GenerateOptions::default();
    if let Some(temperature) = args.temperature {
        options = options.with_temperature(temperature);
    }
    if args.json {
        options = options.json();
    }

    match generator.generate(messages, &options)? {
        NormalizedResponse::Text(text) => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}")?;
            Ok(0)
        }
        NormalizedResponse::Image(image) => {
            let Some(out) = args.out else {
                bail!("{} answered with an image; pass --out to save it", generator.model());
            };
            image.to_raster()?.save(&out).with_context(|| {
                format!("failed writing image {}", out.display())
            })?;
            info!(path = %out.display(), "saved generated image");
            Ok(0)
        }
        NormalizedResponse::Empty => {
            eprintln!("{} returned an empty response", generator.model());
            Ok(2)
        }
    }
}

fn chat_messages(system: Option<&str>, prompt: &str, images: &[PathBuf]) -> Result<Vec<ChatMessage>> {
    let mut parts = vec![ContentPart::text(prompt)];
    for path in images {
        parts.push(image_part(path)?);
    }
    let mut messages = Vec::new();
    if let Some(system) = system.map(str::trim).filter(|value| !value.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user_parts(parts));
    Ok(messages)
}

/// Re-encodes the file as PNG so every attachment travels losslessly.
fn image_part(path: &Path) -> Result<ContentPart> {
    let image = load_image(path)?;
    Ok(codec::encode(&image)?.to_content_part())
}

fn load_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("failed reading image {}", path.display()))
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let config = match args.model.as_deref() {
        Some(model) => ProviderConfig::from_env(Some(model))?,
        None => ProviderConfig::vision()?,
    };
    let request = EditRequest {
        base_image: load_image(&args.image)?,
        mask: load_image(&args.mask)?,
        prompt: args.prompt,
        model_id: config.model_id.clone(),
    };
    let editor = ImageEditor::from_config(config)?;
    let edited = editor.edit(&request)?;
    edited
        .save(&args.out)
        .with_context(|| format!("failed writing image {}", args.out.display()))?;
    info!(path = %args.out.display(), model = %request.model_id, "saved edited image");
    Ok(0)
}

fn run_refine(args: RefineArgs) -> Result<i32> {
    let mut config = OcrConfig::from_env()?;
    if let Some(backend) = args.backend {
        config.backend = match backend {
            BackendArg::Local => OcrBackendKind::Local,
            BackendArg::Remote => OcrBackendKind::Remote,
        };
    }
    if args.endpoint.is_some() {
        config.endpoint = args.endpoint;
    }
    let refiner = build_refiner(&config)?;
    let regions = read_regions(&args.regions)?;
    let image = load_image(&args.image)?;
    let refined = refiner.refine(&regions, &image);

    let rendered = serde_json::to_string_pretty(&refined)?;
    match args.out {
        Some(path) => fs::write(&path, format!("{rendered}\n"))
            .with_context(|| format!("failed writing {}", path.display()))?,
        None => writeln!(io::stdout().lock(), "{rendered}")?,
    }
    Ok(0)
}

/// This binary links no in-process OCR model, so only the remote backend
/// can do any work.
fn build_refiner(config: &OcrConfig) -> Result<OcrRefiner> {
    if config.backend == OcrBackendKind::Local {
        bail!(
            "no local OCR model available for '{}'; use --backend remote with --endpoint or DEEPSEEK_OCR_ENDPOINT",
            config.model_id
        );
    }
    Ok(OcrRefiner::from_config(config, None))
}

fn read_regions(path: &Path) -> Result<Vec<TextRegion>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading regions {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid regions JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{build_refiner, chat_messages, image_part, read_regions, Cli, Command};
    use clap::Parser;
    use image::{Rgb, RgbImage};
    use imagebridge_contracts::chat::{ChatRole, ContentPart, MessageContent};
    use imagebridge_engine::config::OcrConfig;
    use std::fs;

    #[test]
    fn edit_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "imagebridge",
            "edit",
            "--image",
            "in.png",
            "--mask",
            "mask.png",
            "--prompt",
            "remove the sign",
            "--model",
            "gpt-image-1",
            "--out",
            "out.png",
        ])
        .unwrap();
        let Command::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.model.as_deref(), Some("gpt-image-1"));
        assert_eq!(args.prompt, "remove the sign");
    }

    #[test]
    fn chat_accepts_repeated_images() {
        let cli = Cli::try_parse_from([
            "imagebridge",
            "chat",
            "--prompt",
            "compare",
            "--image",
            "a.png",
            "--image",
            "b.png",
            "--json",
        ])
        .unwrap();
        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.images.len(), 2);
        assert!(args.json);
    }

    #[test]
    fn text_only_chat_collapses_to_string_content() {
        let messages = chat_messages(Some("be brief"), "hello", &[]).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].content, MessageContent::Text("hello".to_string()));
    }

    #[test]
    fn image_attachments_become_png_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.bmp");
        RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])).save(&path).unwrap();

        let part = image_part(&path).unwrap();
        let ContentPart::ImageUrl { image_url } = part else {
            panic!("expected image part");
        };
        assert!(image_url.url.starts_with("data:image/png;base64,"));

        let messages = chat_messages(None, "what is it", &[path]).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0].content, MessageContent::Parts(parts) if parts.len() == 2));
    }

    #[test]
    fn regions_file_round_trips_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        fs::write(
            &path,
            r#"[{"vertices":[{"x":0,"y":0},{"x":4,"y":0},{"x":4,"y":2}],"text":"hi","score":0.9}]"#,
        )
        .unwrap();
        let regions = read_regions(&path).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text(), "hi");
        assert_eq!(regions[0].extra.get("score"), Some(&serde_json::json!(0.9)));
    }

    #[test]
    fn missing_regions_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_regions(&dir.path().join("nope.json")).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn local_backend_is_refused_up_front() {
        let err = build_refiner(&OcrConfig::default()).err().expect("local refused");
        let message = format!("{err:#}");
        assert!(message.contains("no local OCR model available"));
        assert!(message.contains("--backend remote"));
    }

    #[test]
    fn remote_backend_builds_a_refiner() {
        let config = OcrConfig::remote(Some("http://127.0.0.1:9/ocr".to_string()));
        let refiner = build_refiner(&config).unwrap();
        assert_eq!(refiner.engine_name(), "remote");
    }
}
