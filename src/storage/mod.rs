pub mod backend;
pub mod envelope;
pub mod local;

pub use backend::{FileBackend, KeyValueBackend, MemoryBackend};
pub use envelope::{Decoded, ENVELOPE_VERSION, VersionedRecord};
pub use local::{
    AUTH_TOKEN_KEY, LocalStore, NAMESPACE_PREFIX, ONBOARDING_COMPLETE_KEY, PROFILE_KEY,
    SESSIONS_KEY,
};
