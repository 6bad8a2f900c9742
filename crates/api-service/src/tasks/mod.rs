//! Background tasks for the API service.
//!
//! # Tasks
//!
//! - `key_refresh` - Periodic key set refresh

pub mod key_refresh;

pub use key_refresh::start_key_refresh;
