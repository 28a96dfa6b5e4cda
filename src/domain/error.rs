use thiserror::Error;

/// Failures of the credential and session lifecycle.
///
/// The first group are authentication-boundary failures. They are collapsed
/// into one uniform "unauthenticated" response at the HTTP edge so callers
/// learn nothing about which check rejected them.
#[derive(Debug, Error)]
pub enum AuthError {
    // ---
    #[error("no credential presented")]
    MissingCredential,

    #[error("invalid token")]
    InvalidToken,

    #[error("token revoked")]
    TokenRevoked,

    #[error("wrong token kind")]
    WrongTokenKind,

    // ---
    #[error("refresh token rotation failed")]
    RotationError,

    #[error("passkey counter did not advance (stored={stored}, presented={presented})")]
    ReplayDetected { stored: i64, presented: i64 },

    #[error("invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("second factor verification failed")]
    SecondFactorFailed,

    #[error("second factor code required")]
    SecondFactorRequired,

    #[error("second factor already enabled")]
    SecondFactorAlreadyEnabled,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("challenge not found or expired")]
    InvalidChallenge,

    #[error("unknown passkey credential")]
    UnknownCredential,

    #[error("identifier already registered")]
    IdentifierTaken,

    #[error("password does not meet minimum requirements")]
    WeakPassword,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("signing secret misconfigured: {0}")]
    SecretMisconfigured(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl AuthError {
    // ---
    /// True for failures that must be reported as a plain "unauthenticated".
    pub fn is_authentication_failure(&self) -> bool {
        // ---
        matches!(
            self,
            AuthError::MissingCredential
                | AuthError::InvalidToken
                | AuthError::TokenRevoked
                | AuthError::WrongTokenKind
        )
    }

    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        // ---
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidToken
            | AuthError::TokenRevoked
            | AuthError::WrongTokenKind => "unauthenticated",
            AuthError::RotationError => "rotation_failed",
            AuthError::ReplayDetected { .. } => "replay_detected",
            AuthError::InvalidOAuthState => "invalid_oauth_state",
            AuthError::SecondFactorFailed => "second_factor_failed",
            AuthError::SecondFactorRequired => "second_factor_required",
            AuthError::SecondFactorAlreadyEnabled => "second_factor_already_enabled",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidChallenge => "invalid_challenge",
            AuthError::UnknownCredential => "unknown_credential",
            AuthError::IdentifierTaken => "identifier_taken",
            AuthError::WeakPassword => "weak_password",
            AuthError::NotFound(_) => "not_found",
            AuthError::SecretMisconfigured(_) => "secret_misconfigured",
            AuthError::Persistence(_) => "persistence_error",
        }
    }
}

/// Result alias used by the auth services.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
