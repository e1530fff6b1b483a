pub mod orchestrator;
pub mod request;

pub use orchestrator::{GeneratedItem, GenerationOrchestrator, MAX_IMAGE_COUNT, MIN_IMAGE_COUNT};
pub use request::{build_pose_request, Quality};
