mod ephemeral;
mod error;
mod metrics;
mod models;
mod repository;

// Publicly expose the Metrics abstraction
pub use metrics::{Metrics, MetricsPtr};

// Publicly expose storage abstractions
pub use ephemeral::{EphemeralStore, EphemeralStorePtr};
pub use repository::{Repository, RepositoryPtr};

pub use error::{AuthError, AuthResult};
pub use models::{
    BlacklistEntry, ChallengePurpose, DeviceInfo, NewUser, OAuthAccount, OAuthStateToken,
    PasskeyChallenge, PasskeyCredential, RefreshTokenRecord, RevocationReason, Session,
    TrustedDevice, User, UserId,
};
