//! Bearer token authentication.
//!
//! - [`jwks`] fetches the identity provider's published key set
//! - [`key_cache`] holds the current set and refreshes it on unknown key ids
//! - [`jwt`] validates a token against the cached keys
//! - [`gate`] extracts the bearer credential and drives validation

pub mod claims;
pub mod gate;
pub mod jwks;
pub mod jwt;
pub mod key_cache;
pub mod keys;

pub use claims::Principal;
pub use gate::{bearer_token, AuthGate};
pub use jwks::{FetchError, JwksFetcher, KeySource};
pub use jwt::{AuthError, TokenValidator, ValidationOutcome};
pub use key_cache::{CacheError, KeySetCache};
pub use keys::{KeyFamily, KeySet, SigningKey};
