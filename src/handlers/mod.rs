// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod auth;
mod devices;
mod health;
mod metrics;
mod middleware;
mod oauth;
mod passkeys;
mod root;
mod second_factor;
mod sessions;
mod shared_types;

// Core handlers
pub use health::health_check;
pub use metrics::metrics_handler;
pub use root::root_handler;

// Request middleware
pub use middleware::{require_auth, track_metrics};

// Response helpers
pub use shared_types::{
    device_from_headers, ClientAddress, CountResponse, ErrorResponse, SuccessResponse,
};

// Password flows
pub use auth::{login, logout, refresh, register};

// Session and trusted-device management
pub use devices::{list_devices, revoke_all_devices, revoke_device};
pub use sessions::{list_sessions, revoke_all_sessions, revoke_session, session_stats};

// Second factor
pub mod totp {
    pub use super::second_factor::{disable, enable, setup, verify};
}

// Passkeys
pub mod passkey {
    pub use super::passkeys::{
        delete_credential, list_credentials, login, login_challenge, register, register_challenge,
    };
}

// OAuth
pub use oauth::{callback as oauth_callback, init as oauth_init};
