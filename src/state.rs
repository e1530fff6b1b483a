use tracing::{info, warn};

use crate::error::StudioError;
use crate::imaging::{
    encode_image, estimate_for_request, EncodedImage, ImageAsset, ImageResource, PreviewRegistry,
};
use crate::llm::GenerationService;
use crate::pose::orchestrator::clamp_image_count;
use crate::pose::{build_pose_request, GeneratedItem, GenerationOrchestrator, Quality};
use crate::utils::timing::ActionTimer;

/// What the UI shows. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Failed(String),
    Succeeded(Vec<GeneratedItem>),
}

impl RequestState {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RequestState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn results(&self) -> Option<&[GeneratedItem]> {
        match self {
            RequestState::Succeeded(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub prompt: String,
    pub image_count: usize,
    pub quality: Quality,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            image_count: 1,
            quality: Quality::High,
        }
    }
}

/// Inputs captured when a generate action starts. Later edits to the
/// controller do not reach a job that is already running.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    character: ImageResource,
    pose_reference: Option<ImageResource>,
    references: Vec<ImageResource>,
    options: GenerationOptions,
    registry: PreviewRegistry,
}

impl GenerationJob {
    pub async fn run<S: GenerationService>(
        &self,
        orchestrator: &GenerationOrchestrator<S>,
    ) -> Result<Vec<GeneratedItem>, StudioError> {
        let aspect_ratio = estimate_for_request(
            &self.character,
            self.pose_reference.as_ref(),
            &self.registry,
        )
        .await;

        let character = encode_image(&self.character).await?;
        let pose_reference = match &self.pose_reference {
            Some(resource) => Some(encode_image(resource).await?),
            None => None,
        };
        let mut references: Vec<EncodedImage> = Vec::with_capacity(self.references.len());
        for resource in &self.references {
            references.push(encode_image(resource).await?);
        }

        let request = build_pose_request(
            &character,
            pose_reference.as_ref(),
            &references,
            &self.options.prompt,
            self.options.quality,
            &aspect_ratio,
        );
        orchestrator.generate(request, self.options.image_count).await
    }
}

/// Owns the user's selections and the request state, and moves the state
/// between idle, loading, failed and succeeded.
pub struct AppState {
    registry: PreviewRegistry,
    character: Option<ImageAsset>,
    pose_reference: Option<ImageAsset>,
    references: Vec<ImageAsset>,
    options: GenerationOptions,
    request: RequestState,
    timer: Option<ActionTimer>,
}

impl AppState {
    pub fn new(registry: PreviewRegistry) -> Self {
        AppState {
            registry,
            character: None,
            pose_reference: None,
            references: Vec::new(),
            options: GenerationOptions::default(),
            request: RequestState::Idle,
            timer: None,
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.request
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn references(&self) -> &[ImageAsset] {
        &self.references
    }

    pub fn can_generate(&self) -> bool {
        self.character.is_some() && !self.request.is_loading()
    }

    pub fn select_character_image(&mut self, asset: ImageAsset) {
        info!("Character image selected: {}", asset.resource().name());
        self.character = Some(asset);
    }

    pub fn select_pose_reference_image(&mut self, asset: ImageAsset) {
        info!("Pose reference image selected: {}", asset.resource().name());
        self.pose_reference = Some(asset);
    }

    pub fn clear_pose_reference_image(&mut self) {
        self.pose_reference = None;
    }

    pub fn add_reference_image(&mut self, asset: ImageAsset) {
        info!(
            "Reference image {} added: {}",
            self.references.len() + 1,
            asset.resource().name()
        );
        self.references.push(asset);
    }

    pub fn remove_reference_image(&mut self, index: usize) -> Result<(), StudioError> {
        if index >= self.references.len() {
            return Err(StudioError::ReferenceIndexOutOfRange {
                index,
                len: self.references.len(),
            });
        }
        let removed = self.references.remove(index);
        info!("Reference image removed: {}", removed.resource().name());
        Ok(())
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.options.prompt = prompt.into();
    }

    pub fn set_image_count(&mut self, count: usize) {
        let clamped = clamp_image_count(count);
        if clamped != count {
            warn!("Image count {} is out of range; using {}.", count, clamped);
        }
        self.options.image_count = clamped;
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.options.quality = quality;
    }

    /// Validates input and enters the loading state.
    ///
    /// Without a character image the state becomes failed immediately and no
    /// job is produced. While loading, re-submission is refused and the state
    /// is left alone.
    pub fn begin_generate(&mut self) -> Result<GenerationJob, StudioError> {
        if self.request.is_loading() {
            return Err(StudioError::AlreadyLoading);
        }
        let Some(character) = &self.character else {
            let err = StudioError::MissingCharacterImage;
            warn!("Generate rejected: {}", err);
            self.request = RequestState::Failed(err.to_string());
            return Err(err);
        };

        let job = GenerationJob {
            character: character.resource().clone(),
            pose_reference: self
                .pose_reference
                .as_ref()
                .map(|asset| asset.resource().clone()),
            references: self
                .references
                .iter()
                .map(|asset| asset.resource().clone())
                .collect(),
            options: self.options.clone(),
            registry: self.registry.clone(),
        };

        self.request = RequestState::Loading;
        self.timer = Some(ActionTimer::start(
            "generate",
            job.options.image_count,
            job.references.len(),
            job.pose_reference.is_some(),
        ));
        Ok(job)
    }

    /// Settles the loading state with the job's outcome.
    pub fn complete(&mut self, outcome: Result<Vec<GeneratedItem>, StudioError>) {
        if !self.request.is_loading() {
            warn!("Ignoring generation outcome: no generation is in progress.");
            return;
        }
        let mut timer = self.timer.take();
        match outcome {
            Ok(items) => {
                info!("Generation finished with {} image(s)", items.len());
                if let Some(timer) = timer.as_mut() {
                    timer.complete("success", None);
                }
                self.request = RequestState::Succeeded(items);
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Generation failed: {}", message);
                if let Some(timer) = timer.as_mut() {
                    timer.complete("error", Some(&message));
                }
                self.request = RequestState::Failed(message);
            }
        }
    }

    pub async fn generate<S: GenerationService>(
        &mut self,
        orchestrator: &GenerationOrchestrator<S>,
    ) -> &RequestState {
        if let Ok(job) = self.begin_generate() {
            let outcome = job.run(orchestrator).await;
            self.complete(outcome);
        }
        &self.request
    }
}
