use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// Counter ID for poll IDs.
pub const POLL_ID_COUNTER_ID: &str = "poll_id";
/// Counter ID for question IDs.
pub const QUESTION_ID_COUNTER_ID: &str = "question_id";
/// Counter ID for answer IDs.
pub const ANSWER_ID_COUNTER_ID: &str = "answer_id";
/// Counter ID for answer variant IDs.
pub const VARIANT_ID_COUNTER_ID: &str = "variant_id";

/// A counter object used to implement auto-increment fields.
///
/// Counters are never touched inside a transaction: an aborted transaction
/// just leaves a gap in the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically allocate the next value of the counter with the given ID.
    ///
    /// Missing counters are created on first use, so the first value handed
    /// out is always 1.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to allocate from counter {id}"),
                )
            })?;
        Ok(counter.next)
    }
}
