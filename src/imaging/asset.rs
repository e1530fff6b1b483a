use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};

use crate::imaging::preview::{PreviewHandle, PreviewRegistry};
use crate::llm::media::{mime_type_for_path, split_data_uri};

#[derive(Debug)]
enum ResourceSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

#[derive(Debug)]
struct ResourceInner {
    name: String,
    declared_type: Option<String>,
    source: ResourceSource,
}

/// Handle to the bytes of a user-selected image. Clones share the source;
/// file contents are read on demand, never cached.
#[derive(Debug, Clone)]
pub struct ImageResource {
    inner: Arc<ResourceInner>,
}

impl ImageResource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let declared_type = mime_type_for_path(&path).map(str::to_string);
        Self {
            inner: Arc::new(ResourceInner {
                name,
                declared_type,
                source: ResourceSource::File(path),
            }),
        }
    }

    pub fn from_bytes(name: &str, bytes: Vec<u8>, declared_type: Option<&str>) -> Self {
        let declared_type = declared_type
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string);
        Self {
            inner: Arc::new(ResourceInner {
                name: name.to_string(),
                declared_type,
                source: ResourceSource::Memory(bytes),
            }),
        }
    }

    /// Builds an in-memory resource from `data:<type>;base64,<payload>`.
    pub fn from_data_uri(name: &str, uri: &str) -> Result<Self> {
        let (mime_type, payload) =
            split_data_uri(uri).ok_or_else(|| anyhow!("'{name}' is not a base64 data URI"))?;
        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .with_context(|| format!("'{name}' carries invalid base64 data"))?;
        Ok(Self::from_bytes(name, bytes, Some(mime_type)))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.inner.declared_type.as_deref()
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        match &self.inner.source {
            ResourceSource::File(path) => tokio::fs::read(path).await,
            ResourceSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A selected image together with the preview the UI layer made for it.
/// Dropping the asset releases the preview.
#[derive(Debug)]
pub struct ImageAsset {
    resource: ImageResource,
    preview: Option<PreviewHandle>,
}

impl ImageAsset {
    pub fn new(resource: ImageResource) -> Self {
        Self {
            resource,
            preview: None,
        }
    }

    pub fn with_preview(resource: ImageResource, registry: &PreviewRegistry) -> Self {
        let preview = registry.acquire(resource.name());
        Self {
            resource,
            preview: Some(preview),
        }
    }

    pub fn resource(&self) -> &ImageResource {
        &self.resource
    }

    pub fn preview_url(&self) -> Option<String> {
        self.preview.as_ref().map(PreviewHandle::url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resources_declare_type_from_extension() {
        let resource = ImageResource::from_path("/tmp/characters/knight.jpeg");
        assert_eq!(resource.name(), "knight.jpeg");
        assert_eq!(resource.declared_type(), Some("image/jpeg"));

        let unknown = ImageResource::from_path("/tmp/characters/knight.bin");
        assert_eq!(unknown.declared_type(), None);
    }

    #[test]
    fn data_uri_resources_strip_the_prefix() {
        let resource =
            ImageResource::from_data_uri("inline", "data:image/jpg;base64,aGVsbG8=").unwrap();
        assert_eq!(resource.declared_type(), Some("image/jpg"));

        assert!(ImageResource::from_data_uri("bad", "aGVsbG8=").is_err());
        assert!(ImageResource::from_data_uri("bad", "data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn reading_memory_and_missing_files() {
        let resource = ImageResource::from_bytes("inline.png", vec![1, 2, 3], Some("image/png"));
        assert_eq!(resource.read().await.unwrap(), vec![1, 2, 3]);

        let missing = ImageResource::from_path("/definitely/not/here.png");
        assert!(missing.read().await.is_err());
    }

    #[test]
    fn asset_preview_lives_as_long_as_the_asset() {
        let registry = PreviewRegistry::new();
        let asset = ImageAsset::with_preview(
            ImageResource::from_bytes("hero.png", Vec::new(), Some("image/png")),
            &registry,
        );
        let url = asset.preview_url().unwrap();
        assert_eq!(registry.resolve(&url).as_deref(), Some("hero.png"));
        drop(asset);
        assert_eq!(registry.live_count(), 0);
    }
}
