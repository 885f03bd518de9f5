//! Two-stage virtual try-on pipeline: normalize both images, describe the
//! garment, then ask the image model to dress the target in it.

pub mod config;
pub mod extract;
pub mod normalize;
pub mod orchestrator;
pub mod results;
pub mod service;
pub mod session;

pub use config::TryOnConfig;
pub use extract::extract_images;
pub use normalize::{
    load_image_file, source_from_arg, FetchedImage, HttpImageFetcher, ImageFetcher, Normalizer,
};
pub use orchestrator::{GarmentDescription, OrchestratorOptions, TryOnOrchestrator};
pub use results::{RenderableResult, ResultStore};
pub use service::{
    GeminiClient, GenerationService, InferenceRequest, InferenceResult, Modality, RequestPart,
    ServiceError,
};
pub use session::TryOnSession;

use std::sync::Arc;

use tryon_contracts::{CredentialGate, CredentialStore, EventSink, TryOnError};

/// Wires the Gemini client, anonymous image fetcher and credential gate
/// from `config`.
pub fn build_session(
    config: &TryOnConfig,
    events: Option<Arc<dyn EventSink>>,
) -> Result<TryOnSession, TryOnError> {
    let fetcher = HttpImageFetcher::new(config.request_timeout)?;
    let mut orchestrator = TryOnOrchestrator::new(
        Arc::new(GeminiClient::from_config(config)),
        Normalizer::new(Arc::new(fetcher)),
        ResultStore::new(),
        OrchestratorOptions::from_config(config),
    );
    if let Some(events) = events {
        orchestrator = orchestrator.with_events(events);
    }
    let store = config.credential_store_path.clone().map(CredentialStore::new);
    Ok(TryOnSession::new(
        CredentialGate::from_environment(store),
        orchestrator,
    ))
}
