pub mod aspect;
pub mod asset;
pub mod encoder;
pub mod preview;

pub use aspect::estimate_for_request;
pub use asset::{ImageAsset, ImageResource};
pub use encoder::{encode_image, EncodedImage};
pub use preview::PreviewRegistry;
