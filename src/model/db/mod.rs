//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - Object IDs and datetimes are serialised in MongoDB's own format.
//! - Poll, question, answer and variant IDs are plain integers.

pub mod admin;
pub mod anonymous_user;
pub mod answer;
pub mod poll;
pub mod question;
pub mod validation;
