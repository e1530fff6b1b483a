use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::imaging::EncodedImage;

pub const POSE_PRIORITY_DIRECTIVE: &str = "PRIORITY ONE: Replicate the exact pose from the provided pose reference image. The final character's posture, limb positions, and angle must precisely match the reference pose. This is the most critical instruction. ";
pub const BACKGROUND_DIRECTIVE: &str = "Place the character on a solid white background. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Standard,
    #[default]
    High,
    Ultra,
}

impl Quality {
    /// Case-insensitive; anything unrecognised is Ultra.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Quality::Standard,
            "high" => Quality::High,
            _ => Quality::Ultra,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Standard => "Standard",
            Quality::High => "High",
            Quality::Ultra => "Ultra",
        }
    }

    pub fn instructions(self, aspect_ratio: &str) -> String {
        let aspect_ratio_text = format!("an image with a {aspect_ratio} aspect ratio");
        match self {
            Quality::Standard => format!(
                "The output must be a clear, good quality, {aspect_ratio_text} with simple, clean lighting."
            ),
            Quality::High => format!(
                "The output must be a high-resolution, detailed, {aspect_ratio_text} with professional studio lighting. The focus should be sharp."
            ),
            Quality::Ultra => format!(
                "The output must be a photorealistic, ultra-detailed, 8k resolution, {aspect_ratio_text}. The lighting should be cinematic and dramatic, highlighting the character's form and texture. The focus must be razor-sharp. Colors must be rich and perfectly balanced."
            ),
        }
    }
}

impl FromStr for Quality {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Quality::parse(value))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

impl RequestPart {
    fn image(image: &EncodedImage) -> Self {
        RequestPart::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

/// Body of one `generateContent` call, in the Gemini wire shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    contents: [RequestContent; 1],
    generation_config: GenerationConfig,
}

impl GenerationRequest {
    fn from_parts(parts: Vec<RequestPart>) -> Self {
        GenerationRequest {
            contents: [RequestContent { role: "user", parts }],
            generation_config: GenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
            },
        }
    }

    pub fn parts(&self) -> &[RequestPart] {
        &self.contents[0].parts
    }

    pub fn image_count(&self) -> usize {
        self.parts()
            .iter()
            .filter(|part| matches!(part, RequestPart::InlineData { .. }))
            .count()
    }

    pub fn instruction(&self) -> Option<&str> {
        match self.parts().last() {
            Some(RequestPart::Text { text }) => Some(text),
            _ => None,
        }
    }
}

pub fn build_instruction(
    has_pose_reference: bool,
    prompt: &str,
    quality: Quality,
    aspect_ratio: &str,
) -> String {
    let mut instruction = String::new();

    if has_pose_reference {
        instruction.push_str(POSE_PRIORITY_DIRECTIVE);
    }

    let prompt = prompt.trim();
    if !prompt.is_empty() {
        instruction.push_str(prompt);
        instruction.push_str(". ");
    }

    instruction.push_str(BACKGROUND_DIRECTIVE);
    instruction.push_str(&quality.instructions(aspect_ratio));
    instruction
}

/// Images go first (character, pose reference, extra references in order);
/// the synthesized instruction is always the final part.
pub fn build_pose_request(
    character: &EncodedImage,
    pose_reference: Option<&EncodedImage>,
    references: &[EncodedImage],
    prompt: &str,
    quality: Quality,
    aspect_ratio: &str,
) -> GenerationRequest {
    let mut parts = Vec::with_capacity(references.len() + 3);
    parts.push(RequestPart::image(character));
    if let Some(pose) = pose_reference {
        parts.push(RequestPart::image(pose));
    }
    parts.extend(references.iter().map(RequestPart::image));
    parts.push(RequestPart::Text {
        text: build_instruction(pose_reference.is_some(), prompt, quality, aspect_ratio),
    });

    GenerationRequest::from_parts(parts)
}
