use std::path::Path;

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

/// Media type a browser would declare for a file with this extension.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

pub fn extension_for_mime_type(mime_type: &str) -> &'static str {
    match normalize_image_mime_type(mime_type).as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" | "image/heif" => "heic",
        _ => "png",
    }
}

pub fn to_data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Splits `data:<type>;base64,<payload>` into its media type and payload.
/// Returns `None` for anything that is not a base64 data URI.
pub fn split_data_uri(value: &str) -> Option<(&str, &str)> {
    let rest = value.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    Some((mime_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_and_heic_signatures() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I'];
        assert_eq!(detect_mime_type(&png).as_deref(), Some("image/png"));

        let mut heic = vec![0, 0, 0, 0x18];
        heic.extend_from_slice(b"ftypheic");
        heic.extend_from_slice(&[0; 8]);
        assert_eq!(detect_mime_type(&heic).as_deref(), Some("image/heic"));

        assert_eq!(detect_mime_type(b"plain text here"), None);
    }

    #[test]
    fn extension_mapping_matches_uploader_types() {
        assert_eq!(mime_type_for_path(Path::new("hero.JPG")), Some("image/jpeg"));
        assert_eq!(mime_type_for_path(Path::new("pose.webp")), Some("image/webp"));
        assert_eq!(mime_type_for_path(Path::new("notes.txt")), None);
        assert_eq!(mime_type_for_path(Path::new("no_extension")), None);
    }

    #[test]
    fn data_uri_round_trips_through_split() {
        let uri = to_data_uri("image/png", "iVBORw0KGgo=");
        assert_eq!(uri, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(split_data_uri(&uri), Some(("image/png", "iVBORw0KGgo=")));
        assert_eq!(split_data_uri("data:text/plain,hello"), None);
        assert_eq!(split_data_uri("iVBORw0KGgo="), None);
    }

    #[test]
    fn output_extension_follows_media_type() {
        assert_eq!(extension_for_mime_type("image/jpg"), "jpg");
        assert_eq!(extension_for_mime_type("image/png"), "png");
        assert_eq!(extension_for_mime_type("image/unknown"), "png");
    }
}
