use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};
use tryon_contracts::prompt::{
    garment_label, DESCRIPTION_INSTRUCTION, FALLBACK_GARMENT_LABEL, GARMENT_IMAGE_LABEL,
    TARGET_IMAGE_LABEL,
};
use tryon_contracts::{
    build_prompt, to_inline_part, Credential, EventSink, ImageSource, InlinePart,
    RequestLifecycleState, SessionEvent, TryOnError,
};

use crate::config::TryOnConfig;
use crate::extract::extract_images;
use crate::normalize::Normalizer;
use crate::results::{RenderableResult, ResultStore};
use crate::service::{GenerationService, InferenceRequest, Modality, RequestPart};

/// Garment description and whether it is the degraded fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarmentDescription {
    pub label: String,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub description_model: String,
    pub edit_model: String,
    pub describe_fallback: bool,
}

impl OrchestratorOptions {
    pub fn from_config(config: &TryOnConfig) -> Self {
        Self {
            description_model: config.description_model.clone(),
            edit_model: config.edit_model.clone(),
            describe_fallback: config.describe_fallback,
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&TryOnConfig::default())
    }
}

/// Runs describe-then-edit against the generation service.
///
/// At most one [`run_try_on`](Self::run_try_on) executes at a time; a second
/// call made while one is in flight is rejected with
/// [`TryOnError::AlreadyRunning`].
pub struct TryOnOrchestrator {
    service: Arc<dyn GenerationService>,
    normalizer: Normalizer,
    results: ResultStore,
    options: OrchestratorOptions,
    events: Option<Arc<dyn EventSink>>,
    in_flight: AtomicBool,
    state: Mutex<RequestLifecycleState>,
}

impl TryOnOrchestrator {
    pub fn new(
        service: Arc<dyn GenerationService>,
        normalizer: Normalizer,
        results: ResultStore,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            service,
            normalizer,
            results,
            options,
            events: None,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(RequestLifecycleState::Idle),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> RequestLifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    #[instrument(skip_all, fields(garment = garment.kind(), target = target.kind()))]
    pub async fn run_try_on(
        &self,
        garment: &ImageSource,
        target: &ImageSource,
        credential: &Credential,
    ) -> Result<RenderableResult, TryOnError> {
        if credential.is_empty() {
            self.transition(RequestLifecycleState::AwaitingCredential);
            return Err(TryOnError::MissingCredential);
        }
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            return Err(TryOnError::AlreadyRunning);
        };

        self.transition(RequestLifecycleState::Running);
        let outcome = self.execute(garment, target, credential).await;
        match &outcome {
            Ok(result) => {
                info!(display_url = %result.display_url, "try-on succeeded");
                self.transition(RequestLifecycleState::Succeeded);
            }
            Err(err) => {
                warn!(kind = err.kind(), "try-on failed: {err}");
                self.emit(SessionEvent::TryOnFailed {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
                self.transition(RequestLifecycleState::Failed);
            }
        }
        outcome
    }

    /// Description call on its own; shares the single-flight guard.
    pub async fn describe_garment(
        &self,
        garment: &ImageSource,
        credential: &Credential,
    ) -> Result<GarmentDescription, TryOnError> {
        if credential.is_empty() {
            return Err(TryOnError::MissingCredential);
        }
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            return Err(TryOnError::AlreadyRunning);
        };
        let garment_part = self.inline_part("garment", garment).await?;
        self.describe(&garment_part, credential).await
    }

    async fn execute(
        &self,
        garment: &ImageSource,
        target: &ImageSource,
        credential: &Credential,
    ) -> Result<RenderableResult, TryOnError> {
        let garment_part = self.inline_part("garment", garment).await?;
        let description = self.describe(&garment_part, credential).await?;
        self.emit(SessionEvent::DescriptionReady {
            description: description.label.clone(),
            degraded: description.degraded,
        });

        let prompt = build_prompt(&description.label);
        let target_part = self.inline_part("target", target).await?;
        let request = InferenceRequest::new(
            self.options.edit_model.clone(),
            vec![
                RequestPart::text(GARMENT_IMAGE_LABEL),
                RequestPart::inline(garment_part),
                RequestPart::text(TARGET_IMAGE_LABEL),
                RequestPart::inline(target_part),
                RequestPart::text(prompt),
            ],
        )
        .with_modalities(&[Modality::Text, Modality::Image]);

        let response = self
            .service
            .generate_content(&request, credential)
            .await
            .map_err(|err| TryOnError::EditService(err.to_string()))?;

        let mut images = extract_images(&response, &self.results);
        if images.is_empty() {
            return Err(TryOnError::NoImageReturned);
        }
        let primary = images.remove(0);
        for extra in &images {
            self.results.revoke(&extra.display_url);
        }
        self.emit(SessionEvent::TryOnSucceeded {
            display_url: primary.display_url.clone(),
            mime_type: primary.mime_type.clone(),
            images: images.len() + 1,
            model_text: primary.source_text.clone(),
        });
        Ok(primary)
    }

    async fn describe(
        &self,
        garment_part: &InlinePart,
        credential: &Credential,
    ) -> Result<GarmentDescription, TryOnError> {
        let request = InferenceRequest::new(
            self.options.description_model.clone(),
            vec![
                RequestPart::text(DESCRIPTION_INSTRUCTION),
                RequestPart::inline(garment_part.clone()),
            ],
        );
        match self.service.generate_content(&request, credential).await {
            Ok(response) => {
                let text = response.text().unwrap_or_default();
                let label = garment_label(&text).to_string();
                debug!(%label, "garment described");
                Ok(GarmentDescription {
                    label,
                    degraded: false,
                })
            }
            Err(err) if self.options.describe_fallback => {
                warn!("description failed, continuing with generic label: {err}");
                Ok(GarmentDescription {
                    label: FALLBACK_GARMENT_LABEL.to_string(),
                    degraded: true,
                })
            }
            Err(err) => Err(TryOnError::DescriptionService(err.to_string())),
        }
    }

    async fn inline_part(
        &self,
        role: &str,
        source: &ImageSource,
    ) -> Result<InlinePart, TryOnError> {
        let blob = self.normalizer.normalize(source).await?;
        if blob.is_empty() {
            return Err(TryOnError::EmptyImage {
                role: role.to_string(),
            });
        }
        Ok(to_inline_part(&blob))
    }

    fn transition(&self, next: RequestLifecycleState) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            self.emit(SessionEvent::StateChanged {
                from: previous,
                to: next,
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.record(&event);
        }
    }
}

/// Holds the in-flight flag; clears it on drop so every exit path releases it.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
