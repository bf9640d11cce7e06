//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Datetimes are serialised as RFC 3339 strings.
//! - References to other entities are plain integer IDs.

pub mod admin;
pub mod answer;
pub mod auth;
pub mod my_polls;
pub mod poll;
pub mod question;
pub mod session;
