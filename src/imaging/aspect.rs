use std::io::Cursor;

use image::metadata::Orientation;
use image::{ImageDecoder, ImageReader};
use tracing::{debug, warn};

use crate::error::StudioError;
use crate::imaging::asset::ImageResource;
use crate::imaging::preview::PreviewRegistry;

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

fn gcd(a: u32, b: u32) -> u32 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

/// Reduces `width:height` to lowest terms.
pub fn reduce_ratio(width: u32, height: u32) -> Result<String, StudioError> {
    if width == 0 || height == 0 {
        return Err(StudioError::Decode(format!(
            "degenerate image dimensions {width}x{height}"
        )));
    }
    let divisor = gcd(width, height);
    Ok(format!("{}:{}", width / divisor, height / divisor))
}

/// Dimensions as displayed: quarter-turn orientations swap width and height.
fn oriented_dimensions(width: u32, height: u32, orientation: Orientation) -> (u32, u32) {
    match orientation {
        Orientation::Rotate90
        | Orientation::Rotate270
        | Orientation::Rotate90FlipH
        | Orientation::Rotate270FlipH => (height, width),
        _ => (width, height),
    }
}

fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), StudioError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| StudioError::Decode(err.to_string()))?
        .into_decoder()
        .map_err(|err| StudioError::Decode(err.to_string()))?;
    let (width, height) = decoder.dimensions();
    let orientation = decoder.orientation().unwrap_or_else(|err| {
        debug!("Ignoring unreadable orientation metadata: {}", err);
        Orientation::NoTransforms
    });
    Ok(oriented_dimensions(width, height, orientation))
}

/// Decodes the image header and returns its aspect ratio in lowest terms.
///
/// A temporary handle is held in `registry` for the duration of the decode;
/// it is released on every return path.
pub async fn estimate_aspect_ratio(
    resource: &ImageResource,
    registry: &PreviewRegistry,
) -> Result<String, StudioError> {
    let _decode_handle = registry.acquire(resource.name());

    let bytes = resource
        .read()
        .await
        .map_err(|err| StudioError::Decode(format!("{}: {}", resource.name(), err)))?;
    let (width, height) = tokio::task::spawn_blocking(move || decode_dimensions(&bytes))
        .await
        .map_err(|err| StudioError::Decode(err.to_string()))??;

    let ratio = reduce_ratio(width, height)?;
    debug!(
        "Aspect ratio of {} is {} ({}x{})",
        resource.name(),
        ratio,
        width,
        height
    );
    Ok(ratio)
}

/// Ratio for a generate action: the pose reference wins over the character
/// image. Any failure falls back to 1:1.
pub async fn estimate_for_request(
    character: &ImageResource,
    pose_reference: Option<&ImageResource>,
    registry: &PreviewRegistry,
) -> String {
    let source = pose_reference.unwrap_or(character);
    match estimate_aspect_ratio(source, registry).await {
        Ok(ratio) => ratio,
        Err(err) => {
            warn!(
                "{} (source={}); falling back to {}.",
                err,
                source.name(),
                DEFAULT_ASPECT_RATIO
            );
            DEFAULT_ASPECT_RATIO.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use image::{DynamicImage, GrayImage, ImageFormat};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::new(width, height))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn png_resource(name: &str, width: u32, height: u32) -> ImageResource {
        ImageResource::from_bytes(name, png_bytes(width, height), Some("image/png"))
    }

    #[test]
    fn reduces_common_dimensions() {
        assert_eq!(reduce_ratio(1920, 1080).unwrap(), "16:9");
        assert_eq!(reduce_ratio(500, 500).unwrap(), "1:1");
        assert_eq!(reduce_ratio(640, 480).unwrap(), "4:3");
        assert_eq!(reduce_ratio(1080, 1350).unwrap(), "4:5");
        assert_eq!(reduce_ratio(7, 3).unwrap(), "7:3");
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert_eq!(oriented_dimensions(4000, 3000, Orientation::Rotate90), (3000, 4000));
        assert_eq!(oriented_dimensions(4000, 3000, Orientation::Rotate270FlipH), (3000, 4000));
        assert_eq!(oriented_dimensions(4000, 3000, Orientation::Rotate180), (4000, 3000));
        assert_eq!(oriented_dimensions(4000, 3000, Orientation::FlipHorizontal), (4000, 3000));
        assert_eq!(oriented_dimensions(4000, 3000, Orientation::NoTransforms), (4000, 3000));

        let (width, height) = oriented_dimensions(4000, 3000, Orientation::Rotate90);
        assert_eq!(reduce_ratio(width, height).unwrap(), "3:4");
    }

    #[test]
    fn decodes_unrotated_png_dimensions() {
        assert_eq!(decode_dimensions(&png_bytes(640, 480)).unwrap(), (640, 480));
        assert!(matches!(
            decode_dimensions(b"not an image"),
            Err(StudioError::Decode(_))
        ));
    }

    #[test]
    fn degenerate_dimensions_are_decode_errors() {
        assert!(matches!(reduce_ratio(0, 0), Err(StudioError::Decode(_))));
        assert!(matches!(reduce_ratio(0, 10), Err(StudioError::Decode(_))));
    }

    #[tokio::test]
    async fn estimates_from_decoded_header_and_releases_handle() {
        let registry = PreviewRegistry::new();
        let resource = png_resource("wide.png", 640, 480);
        let ratio = estimate_aspect_ratio(&resource, &registry).await.unwrap();
        assert_eq!(ratio, "4:3");
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn undecodable_input_fails_and_still_releases_handle() {
        let registry = PreviewRegistry::new();
        let resource = ImageResource::from_bytes("junk.png", b"not an image".to_vec(), None);
        let result = estimate_aspect_ratio(&resource, &registry).await;
        assert!(matches!(result, Err(StudioError::Decode(_))));
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn pose_reference_takes_precedence() {
        let registry = PreviewRegistry::new();
        let character = png_resource("hero.png", 500, 500);
        let pose = png_resource("pose.png", 90, 160);
        assert_eq!(
            estimate_for_request(&character, Some(&pose), &registry).await,
            "9:16"
        );
        assert_eq!(estimate_for_request(&character, None, &registry).await, "1:1");
    }

    #[tokio::test]
    async fn falls_back_to_square_when_nothing_decodes() {
        let registry = PreviewRegistry::new();
        let character = ImageResource::from_bytes("hero.png", b"garbage".to_vec(), None);
        let pose = ImageResource::from_path("/missing/pose.png");
        assert_eq!(
            estimate_for_request(&character, Some(&pose), &registry).await,
            DEFAULT_ASPECT_RATIO
        );
        assert_eq!(
            estimate_for_request(&character, None, &registry).await,
            DEFAULT_ASPECT_RATIO
        );

        let wide_character = png_resource("hero.png", 1920, 1080);
        assert_eq!(
            estimate_for_request(&wide_character, Some(&pose), &registry).await,
            DEFAULT_ASPECT_RATIO
        );
        assert_eq!(registry.live_count(), 0);
    }
}
