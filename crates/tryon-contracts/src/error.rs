use thiserror::Error;

/// Failure taxonomy for a try-on run.
///
/// `Display` text is what the presentation layer shows verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryOnError {
    #[error("image download failed: {0}")]
    Fetch(String),

    #[error("invalid data URL: {0}")]
    Format(String),

    #[error("unrecognized image source: {0}")]
    UnsupportedSource(String),

    #[error("{role} image is empty")]
    EmptyImage { role: String },

    #[error("GEMINI_API_KEY not set")]
    MissingCredential,

    #[error("a try-on request is already running")]
    AlreadyRunning,

    #[error("garment description failed: {0}")]
    DescriptionService(String),

    #[error("garment edit failed: {0}")]
    EditService(String),

    #[error("the model returned no images")]
    NoImageReturned,

    #[error("credential store error: {0}")]
    Store(String),

    #[error("{0}")]
    Unknown(String),
}

impl TryOnError {
    /// Stable snake_case tag used in lifecycle events.
    pub fn kind(&self) -> &'static str {
        match self {
            TryOnError::Fetch(_) => "fetch",
            TryOnError::Format(_) => "format",
            TryOnError::UnsupportedSource(_) => "unsupported_source",
            TryOnError::EmptyImage { .. } => "empty_image",
            TryOnError::MissingCredential => "missing_credential",
            TryOnError::AlreadyRunning => "already_running",
            TryOnError::DescriptionService(_) => "description_service",
            TryOnError::EditService(_) => "edit_service",
            TryOnError::NoImageReturned => "no_image_returned",
            TryOnError::Store(_) => "store",
            TryOnError::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TryOnError;

    #[test]
    fn display_text_is_human_readable() {
        assert_eq!(
            TryOnError::EmptyImage {
                role: "garment".to_string()
            }
            .to_string(),
            "garment image is empty"
        );
        assert_eq!(
            TryOnError::Fetch("status 404".to_string()).to_string(),
            "image download failed: status 404"
        );
        assert_eq!(
            TryOnError::NoImageReturned.to_string(),
            "the model returned no images"
        );
    }

    #[test]
    fn kinds_are_distinct_tags() {
        assert_eq!(TryOnError::MissingCredential.kind(), "missing_credential");
        assert_eq!(
            TryOnError::UnsupportedSource(String::new()).kind(),
            "unsupported_source"
        );
        assert_eq!(TryOnError::Unknown(String::new()).kind(), "unknown");
    }
}
