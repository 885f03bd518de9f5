use tryon_contracts::{
    CanonicalBlob, CredentialGate, ImageSource, RequestLifecycleState, TryOnError,
};

use crate::orchestrator::{GarmentDescription, TryOnOrchestrator};
use crate::results::RenderableResult;

/// Credential gate, orchestrator and the result currently on display.
///
/// Holding the current result here is what releases object URLs: a newer
/// run, or [`discard_current`](Self::discard_current), revokes the old one.
pub struct TryOnSession {
    gate: CredentialGate,
    orchestrator: TryOnOrchestrator,
    current: Option<RenderableResult>,
}

impl TryOnSession {
    pub fn new(gate: CredentialGate, orchestrator: TryOnOrchestrator) -> Self {
        Self {
            gate,
            orchestrator,
            current: None,
        }
    }

    pub fn set_credential(&mut self, raw: &str) -> Result<(), TryOnError> {
        self.gate.set_credential(raw)
    }

    pub fn state(&self) -> RequestLifecycleState {
        self.orchestrator.state()
    }

    pub fn orchestrator(&self) -> &TryOnOrchestrator {
        &self.orchestrator
    }

    pub fn current(&self) -> Option<&RenderableResult> {
        self.current.as_ref()
    }

    /// Bytes of the current result.
    pub fn current_blob(&self) -> Option<CanonicalBlob> {
        let current = self.current.as_ref()?;
        self.orchestrator.results().resolve(&current.display_url)
    }

    pub async fn run(
        &mut self,
        garment: &ImageSource,
        target: &ImageSource,
    ) -> Result<&RenderableResult, TryOnError> {
        let credential = self.gate.credential().clone();
        if !credential.is_empty() {
            self.discard_current();
        }
        let result = self
            .orchestrator
            .run_try_on(garment, target, &credential)
            .await?;
        Ok(self.current.insert(result))
    }

    pub async fn describe(&self, garment: &ImageSource) -> Result<GarmentDescription, TryOnError> {
        let credential = self.gate.require_credential()?;
        self.orchestrator.describe_garment(garment, credential).await
    }

    pub fn discard_current(&mut self) {
        if let Some(previous) = self.current.take() {
            self.orchestrator.results().revoke(&previous.display_url);
        }
    }
}

impl Drop for TryOnSession {
    fn drop(&mut self) {
        self.discard_current();
    }
}
