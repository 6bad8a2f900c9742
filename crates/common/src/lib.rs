//! Common utilities and types shared across the API service crates.

#![warn(clippy::pedantic)]

/// Module for JWT structure utilities (decoding, claims, constants)
pub mod jwt;
