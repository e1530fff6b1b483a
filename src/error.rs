/// Failures a generate action can end in, plus the controller's own refusals.
///
/// The `Display` text is what the user sees in the failed state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StudioError {
    #[error("Please upload a character image to begin.")]
    MissingCharacterImage,
    #[error("Could not calculate image aspect ratio: {0}")]
    Decode(String),
    #[error("Failed to read image '{name}': {reason}")]
    Encode { name: String, reason: String },
    #[error("Failed to generate pose(s): {0}")]
    GenerationFailed(String),
    #[error(
        "Failed to generate pose(s): API did not return any images. This could be due to a safety policy violation or an issue with the prompt."
    )]
    GenerationEmpty,
    #[error("A generation is already in progress.")]
    AlreadyLoading,
    #[error("No reference image at position {index} (have {len}).")]
    ReferenceIndexOutOfRange { index: usize, len: usize },
}
