use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::StudioError;
use crate::llm::gemini::{GeminiPart, GeminiResponse, GenerationService};
use crate::llm::media::to_data_uri;
use crate::pose::request::GenerationRequest;

pub const MIN_IMAGE_COUNT: usize = 1;
pub const MAX_IMAGE_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratedItem {
    /// `data:<type>;base64,<payload>`
    pub image: Option<String>,
    pub caption: Option<String>,
}

pub fn clamp_image_count(count: usize) -> usize {
    count.clamp(MIN_IMAGE_COUNT, MAX_IMAGE_COUNT)
}

/// First inline image and first non-blank text of a response.
pub fn extract_generated_item(response: &GeminiResponse) -> GeneratedItem {
    let mut item = GeneratedItem::default();
    for part in response.first_candidate_parts() {
        match part {
            GeminiPart::InlineData { inline_data }
                if item.image.is_none()
                    && inline_data.mime_type.starts_with("image/")
                    && !inline_data.data.is_empty() =>
            {
                item.image = Some(to_data_uri(&inline_data.mime_type, &inline_data.data));
            }
            GeminiPart::Text { text } if item.caption.is_none() && !text.trim().is_empty() => {
                item.caption = Some(text.clone());
            }
            _ => {}
        }
    }
    item
}

/// Reduces per-call outcomes (in submission order) to the surfaced list.
///
/// A failed call counts as a call without an image. The batch only fails
/// with the underlying message when every call failed.
fn aggregate(outcomes: Vec<Result<GeminiResponse, String>>) -> Result<Vec<GeneratedItem>, StudioError> {
    let total = outcomes.len();
    let mut items = Vec::with_capacity(total);
    let mut first_error = None;
    let mut answered = 0usize;

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(response) => {
                answered += 1;
                let item = extract_generated_item(&response);
                if item.image.is_some() {
                    items.push(item);
                } else {
                    info!(
                        "Generation {}/{} returned no image (caption={:?})",
                        index + 1,
                        total,
                        item.caption
                    );
                }
            }
            Err(message) => {
                warn!("Generation {}/{} failed: {}", index + 1, total, message);
                first_error.get_or_insert(message);
            }
        }
    }

    if !items.is_empty() {
        return Ok(items);
    }
    match first_error {
        Some(message) if answered == 0 => Err(StudioError::GenerationFailed(message)),
        _ => Err(StudioError::GenerationEmpty),
    }
}

/// Fans one request out to N identical service calls and waits for all.
pub struct GenerationOrchestrator<S> {
    service: Arc<S>,
}

impl<S: GenerationService> GenerationOrchestrator<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
        image_count: usize,
    ) -> Result<Vec<GeneratedItem>, StudioError> {
        let count = clamp_image_count(image_count);
        let request = Arc::new(request);
        info!(
            "Requesting {} generation(s) from {} with {} image part(s)",
            count,
            self.service.model(),
            request.image_count()
        );

        let mut tasks = JoinSet::new();
        for index in 0..count {
            let service = Arc::clone(&self.service);
            let request = Arc::clone(&request);
            tasks.spawn(async move {
                let outcome = service
                    .generate_content(&request)
                    .await
                    .map_err(|err| format!("{err:#}"));
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Result<GeminiResponse, String>> = (0..count)
            .map(|_| Err("generation task did not complete".to_string()))
            .collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(err) => warn!("Generation task aborted: {}", err),
            }
        }

        aggregate(outcomes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::Barrier;

    use crate::imaging::EncodedImage;
    use crate::pose::request::{build_pose_request, Quality};

    pub(crate) fn image_response(data: &str, caption: Option<&str>) -> GeminiResponse {
        let mut parts = Vec::new();
        if let Some(caption) = caption {
            parts.push(json!({ "text": caption }));
        }
        parts.push(json!({ "inlineData": { "mimeType": "image/png", "data": data } }));
        serde_json::from_value(json!({ "candidates": [{ "content": { "parts": parts } }] }))
            .unwrap()
    }

    pub(crate) fn text_only_response(text: &str) -> GeminiResponse {
        serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        }))
        .unwrap()
    }

    /// Replays scripted outcomes; once exhausted it answers with empty responses.
    pub(crate) struct ScriptedService {
        script: Mutex<VecDeque<Result<GeminiResponse, String>>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerationRequest>>,
        delays: Mutex<VecDeque<Duration>>,
        barrier: Option<Barrier>,
    }

    impl ScriptedService {
        pub(crate) fn new(script: Vec<Result<GeminiResponse, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                delays: Mutex::new(VecDeque::new()),
                barrier: None,
            }
        }

        /// Every call blocks until `parties` calls are in flight at once.
        pub(crate) fn concurrent(parties: usize, script: Vec<Result<GeminiResponse, String>>) -> Self {
            Self {
                barrier: Some(Barrier::new(parties)),
                ..Self::new(script)
            }
        }

        /// The n-th call to start waits `delays[n]` before answering.
        pub(crate) fn delayed(
            delays: Vec<Duration>,
            script: Vec<Result<GeminiResponse, String>>,
        ) -> Self {
            Self {
                delays: Mutex::new(delays.into()),
                ..Self::new(script)
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().clone()
        }
    }

    impl GenerationService for ScriptedService {
        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn generate_content(&self, request: &GenerationRequest) -> anyhow::Result<GeminiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            let next = self.script.lock().pop_front();
            let delay = self.delays.lock().pop_front();
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match next {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Ok(GeminiResponse::default()),
            }
        }
    }

    fn sample_request() -> GenerationRequest {
        build_pose_request(
            &EncodedImage {
                base64: "Q0hBUg==".to_string(),
                mime_type: "image/png".to_string(),
            },
            None,
            &[],
            "",
            Quality::High,
            "1:1",
        )
    }

    #[test]
    fn extraction_takes_first_image_and_first_text() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "  " },
                { "text": "A knight kneeling." },
                { "inlineData": { "mimeType": "image/jpeg", "data": "FIRST" } },
                { "text": "Second caption" },
                { "inlineData": { "mimeType": "image/png", "data": "SECOND" } }
            ] } }]
        }))
        .unwrap();
        let item = extract_generated_item(&response);
        assert_eq!(item.image.as_deref(), Some("data:image/jpeg;base64,FIRST"));
        assert_eq!(item.caption.as_deref(), Some("A knight kneeling."));

        let empty = extract_generated_item(&GeminiResponse::default());
        assert_eq!(empty, GeneratedItem::default());
    }

    #[test]
    fn aggregation_keeps_submission_order_and_drops_imageless_items() {
        let items = aggregate(vec![
            Ok(image_response("ONE", Some("first"))),
            Ok(text_only_response("I can't draw that.")),
            Err("connection reset".to_string()),
            Ok(image_response("FOUR", None)),
        ])
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].image.as_deref(), Some("data:image/png;base64,ONE"));
        assert_eq!(items[0].caption.as_deref(), Some("first"));
        assert_eq!(items[1].image.as_deref(), Some("data:image/png;base64,FOUR"));
    }

    #[test]
    fn aggregation_distinguishes_failed_from_empty() {
        let failed = aggregate(vec![
            Err("status 403: API key not valid".to_string()),
            Err("timeout".to_string()),
        ]);
        assert_eq!(
            failed,
            Err(StudioError::GenerationFailed(
                "status 403: API key not valid".to_string()
            ))
        );

        let empty = aggregate(vec![
            Ok(text_only_response("blocked")),
            Err("timeout".to_string()),
        ]);
        assert_eq!(empty, Err(StudioError::GenerationEmpty));
    }

    #[tokio::test]
    async fn three_calls_two_images() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::new(vec![
            Ok(image_response("A", None)),
            Ok(text_only_response("no image for you")),
            Ok(image_response("C", None)),
        ]));
        let items = orchestrator.generate(sample_request(), 3).await.unwrap();
        assert_eq!(orchestrator.service().calls(), 3);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.image.is_some()));
    }

    #[tokio::test]
    async fn zero_images_is_an_empty_generation() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::new(vec![
            Ok(text_only_response("policy")),
            Ok(GeminiResponse::default()),
            Ok(text_only_response("policy")),
        ]));
        let result = orchestrator.generate(sample_request(), 3).await;
        assert_eq!(result, Err(StudioError::GenerationEmpty));
        assert_eq!(orchestrator.service().calls(), 3);
    }

    #[tokio::test]
    async fn transport_failures_are_wrapped() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::new(vec![Err(
            "Gemini request failed: dns error".to_string(),
        )]));
        let err = orchestrator.generate(sample_request(), 1).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to generate pose(s): Gemini request failed: dns error"
        );
    }

    #[tokio::test]
    async fn calls_are_in_flight_together_with_identical_payloads() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::concurrent(
            4,
            (0..4).map(|i| Ok(image_response(&format!("IMG{i}"), None))).collect(),
        ));
        let items = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.generate(sample_request(), 4),
        )
        .await
        .expect("calls were not issued concurrently")
        .unwrap();
        assert_eq!(items.len(), 4);

        let requests = orchestrator.service().requests();
        assert_eq!(requests.len(), 4);
        let first = serde_json::to_value(&requests[0]).unwrap();
        for request in &requests[1..] {
            assert_eq!(serde_json::to_value(request).unwrap(), first);
        }
    }

    #[tokio::test]
    async fn results_follow_submission_order_not_completion_order() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::delayed(
            (0..4u64).map(|i| Duration::from_millis((3 - i) * 30)).collect(),
            (0..4).map(|i| Ok(image_response(&format!("I{i}"), None))).collect(),
        ));
        let items = orchestrator.generate(sample_request(), 4).await.unwrap();
        let images: Vec<&str> = items
            .iter()
            .filter_map(|item| item.image.as_deref())
            .collect();
        assert_eq!(
            images,
            vec![
                "data:image/png;base64,I0",
                "data:image/png;base64,I1",
                "data:image/png;base64,I2",
                "data:image/png;base64,I3",
            ]
        );
    }

    #[tokio::test]
    async fn image_count_is_clamped() {
        let orchestrator = GenerationOrchestrator::new(ScriptedService::new(
            (0..6).map(|_| Ok(image_response("X", None))).collect(),
        ));
        let items = orchestrator.generate(sample_request(), 9).await.unwrap();
        assert_eq!(items.len(), MAX_IMAGE_COUNT);

        let single = GenerationOrchestrator::new(ScriptedService::new(vec![Ok(image_response(
            "X", None,
        ))]));
        assert_eq!(single.generate(sample_request(), 0).await.unwrap().len(), 1);
        assert_eq!(single.service().calls(), 1);
    }
}
