use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use tracing::{debug, info};

use crate::imaging::{ImageAsset, ImageResource, PreviewRegistry};
use crate::llm::media::{extension_for_mime_type, split_data_uri};
use crate::pose::{GeneratedItem, Quality, MAX_IMAGE_COUNT, MIN_IMAGE_COUNT};
use crate::state::AppState;

const ACCEPTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateArgs {
    pub character: PathBuf,
    pub pose_reference: Option<PathBuf>,
    pub references: Vec<PathBuf>,
    pub prompt: String,
    pub image_count: usize,
    pub quality: Quality,
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Generate(GenerateArgs),
}

pub fn usage() -> &'static str {
    "Usage: pose-studio --character <image> [--pose <image>] [--reference <image>]... [--prompt <text>] [--count <1-4>] [--quality <Standard|High|Ultra>] [--out-dir <dir>]\n\nAccepted images: png, jpg/jpeg, webp. GEMINI_API_KEY must be set in the environment or .env."
}

fn accepted_image_path(flag: &str, value: &str) -> Result<PathBuf> {
    let path = PathBuf::from(value);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        bail!("Unsupported image for {flag}: {value} (expected png, jpg, jpeg or webp)");
    }
    Ok(path)
}

fn parse_image_count(value: &str) -> Result<usize> {
    let count = value
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow!("Invalid --count value: {value}"))?;
    if !(MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&count) {
        bail!("--count must be between {MIN_IMAGE_COUNT} and {MAX_IMAGE_COUNT}, got {count}");
    }
    Ok(count)
}

pub fn parse_cli_args(args: &[String]) -> Result<CliCommand> {
    let mut character: Option<PathBuf> = None;
    let mut pose_reference = None;
    let mut references = Vec::new();
    let mut prompt = String::new();
    let mut image_count = MIN_IMAGE_COUNT;
    let mut quality = Quality::default();
    let mut out_dir = None;

    let mut index = 1;
    while index < args.len() {
        let flag = args[index].as_str();
        if matches!(flag, "--help" | "-h") {
            return Ok(CliCommand::Help);
        }
        index += 1;
        let value = args
            .get(index)
            .ok_or_else(|| anyhow!("Missing value for {flag}\n{}", usage()))?;
        match flag {
            "--character" | "-c" => character = Some(accepted_image_path(flag, value)?),
            "--pose" | "-p" => pose_reference = Some(accepted_image_path(flag, value)?),
            "--reference" | "-r" => references.push(accepted_image_path(flag, value)?),
            "--prompt" => prompt = value.clone(),
            "--count" | "-n" => image_count = parse_image_count(value)?,
            "--quality" | "-q" => quality = Quality::parse(value),
            "--out-dir" | "-o" => out_dir = Some(PathBuf::from(value)),
            other => bail!("Unknown argument: {other}\n{}", usage()),
        }
        index += 1;
    }

    let character =
        character.ok_or_else(|| anyhow!("--character is required\n{}", usage()))?;

    Ok(CliCommand::Generate(GenerateArgs {
        character,
        pose_reference,
        references,
        prompt,
        image_count,
        quality,
        out_dir,
    }))
}

fn asset_for(path: &Path, registry: &PreviewRegistry) -> ImageAsset {
    let asset = ImageAsset::with_preview(ImageResource::from_path(path), registry);
    debug!(
        "Preview {} -> {}",
        asset.preview_url().unwrap_or_default(),
        path.display()
    );
    asset
}

/// Replays the command line as the user events a form would emit.
pub fn apply_to_state(args: &GenerateArgs, state: &mut AppState, registry: &PreviewRegistry) {
    state.select_character_image(asset_for(&args.character, registry));
    if let Some(pose) = &args.pose_reference {
        state.select_pose_reference_image(asset_for(pose, registry));
    }
    for reference in &args.references {
        state.add_reference_image(asset_for(reference, registry));
    }
    state.set_prompt(args.prompt.as_str());
    state.set_image_count(args.image_count);
    state.set_quality(args.quality);
}

/// Writes each generated image as `generated-pose-<n>.<ext>` under `out_dir`.
pub async fn write_results(items: &[GeneratedItem], out_dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(image) = item.image.as_deref() else {
            continue;
        };
        let (mime_type, payload) = split_data_uri(image)
            .ok_or_else(|| anyhow!("Generated image {} is not a data URI", index + 1))?;
        let bytes = general_purpose::STANDARD
            .decode(payload)
            .with_context(|| format!("Generated image {} has invalid base64", index + 1))?;
        let path = out_dir.join(format!(
            "generated-pose-{}.{}",
            index + 1,
            extension_for_mime_type(mime_type)
        ));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        written.push(path);
    }
    Ok(written)
}
