use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    ClientSession,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::poll::PollId,
    mongodb::{u32_id_filter, Coll},
};

/// Core poll data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PollCore {
    /// Poll name.
    pub name: String,
    /// Poll description.
    pub description: String,
    /// When the poll was created. Never changes.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_date: DateTime<Utc>,
    /// When the poll ends.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,
    /// Whether the poll is listed publicly.
    pub is_active: bool,
}

/// A poll from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "_id")]
    pub id: PollId,
    #[serde(flatten)]
    pub poll: PollCore,
}

impl Deref for Poll {
    type Target = PollCore;

    fn deref(&self) -> &Self::Target {
        &self.poll
    }
}

impl DerefMut for Poll {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.poll
    }
}

impl Poll {
    /// Write to the poll inside `session`, failing with NOT_FOUND if it does not exist.
    ///
    /// Transactions that add questions to a poll take this lock, so they
    /// write-conflict with a concurrent delete of the same poll.
    pub async fn lock(
        polls: &Coll<Poll>,
        poll_id: PollId,
        session: &mut ClientSession,
    ) -> Result<()> {
        let update = doc! {
            "$inc": { "question_writes": 1 }
        };
        let result = polls
            .update_one_with_session(u32_id_filter(poll_id), update, None, session)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Poll {poll_id}")));
        }
        Ok(())
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::{Duration, SubsecRound};

    use super::*;

    impl PollCore {
        pub fn example() -> Self {
            // BSON datetimes have millisecond precision.
            let now = Utc::now().trunc_subsecs(3);
            Self {
                name: "Favourite colours".to_string(),
                description: "Tell us which colours you like".to_string(),
                start_date: now,
                end_date: now + Duration::days(7),
                is_active: true,
            }
        }
    }
}
