use anyhow::{anyhow, bail};
use dotenvy::dotenv;
use tracing::{error, info};

use pose_studio::cli::{apply_to_state, parse_cli_args, usage, write_results, CliCommand};
use pose_studio::config::CONFIG;
use pose_studio::imaging::PreviewRegistry;
use pose_studio::llm::GeminiClient;
use pose_studio::pose::GenerationOrchestrator;
use pose_studio::state::AppState;
use pose_studio::utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let args = match parse_cli_args(&args)? {
        CliCommand::Help => {
            println!("{}", usage());
            return Ok(());
        }
        CliCommand::Generate(args) => args,
    };

    let _guards = init_logging();

    let registry = PreviewRegistry::new();
    let mut state = AppState::new(registry.clone());
    apply_to_state(&args, &mut state, &registry);
    if !state.can_generate() {
        bail!("Nothing to generate: a character image is required.");
    }
    info!(
        "Starting pose-studio (model={}, count={}, quality={}, references={}, previews={})",
        CONFIG.gemini_image_model,
        state.options().image_count,
        state.options().quality,
        state.references().len(),
        registry.live_count()
    );

    let orchestrator = GenerationOrchestrator::new(GeminiClient::from_config());
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| CONFIG.output_dir.clone());

    state.generate(&orchestrator).await;

    if let Some(message) = state.state().error() {
        error!("{}", message);
        return Err(anyhow!(message.to_string()));
    }
    let items = state
        .state()
        .results()
        .ok_or_else(|| anyhow!("Generation ended without a result: {:?}", state.state()))?;

    let written = write_results(items, &out_dir).await?;
    for (path, item) in written.iter().zip(items.iter()) {
        match item.caption.as_deref() {
            Some(caption) => println!("{}\t{}", path.display(), caption.trim()),
            None => println!("{}", path.display()),
        }
    }
    Ok(())
}
