use serde::{Deserialize, Serialize};

/// Presentation-facing state of the try-on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLifecycleState {
    #[default]
    Idle,
    AwaitingCredential,
    Running,
    Succeeded,
    Failed,
}

impl RequestLifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestLifecycleState::Idle => "idle",
            RequestLifecycleState::AwaitingCredential => "awaiting_credential",
            RequestLifecycleState::Running => "running",
            RequestLifecycleState::Succeeded => "succeeded",
            RequestLifecycleState::Failed => "failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RequestLifecycleState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestLifecycleState::Succeeded | RequestLifecycleState::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RequestLifecycleState;

    #[test]
    fn serde_tags_match_as_str() -> anyhow::Result<()> {
        for state in [
            RequestLifecycleState::Idle,
            RequestLifecycleState::AwaitingCredential,
            RequestLifecycleState::Running,
            RequestLifecycleState::Succeeded,
            RequestLifecycleState::Failed,
        ] {
            assert_eq!(serde_json::to_value(state)?, state.as_str());
        }
        Ok(())
    }

    #[test]
    fn terminal_states() {
        assert!(RequestLifecycleState::Failed.is_terminal());
        assert!(RequestLifecycleState::Succeeded.is_terminal());
        assert!(!RequestLifecycleState::Running.is_terminal());
        assert!(RequestLifecycleState::Running.is_running());
        assert_eq!(RequestLifecycleState::default(), RequestLifecycleState::Idle);
    }
}
