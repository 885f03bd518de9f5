//! Data model, pure transforms and local state for the try-on pipeline.
//!
//! Nothing in this crate performs network I/O; the engine crate layers the
//! remote fetch and generation calls on top.

pub mod credentials;
pub mod encoding;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod prompt;
pub mod source;

pub use credentials::{Credential, CredentialGate, CredentialState, CredentialStore};
pub use encoding::{encode_chunked, to_inline_part, InlinePart};
pub use error::TryOnError;
pub use events::{EventSink, JsonlEventLog, MemoryEventLog, SessionEvent};
pub use lifecycle::RequestLifecycleState;
pub use prompt::build_prompt;
pub use source::{decode_data_url, CanonicalBlob, ImageSource};
