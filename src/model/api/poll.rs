use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::poll::PollId,
    db::poll::{Poll, PollCore},
};

pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// A poll as received on create and full update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    /// Poll name.
    pub name: String,
    /// Poll description.
    #[serde(default)]
    pub description: String,
    /// When the poll ends. Must be in the future.
    pub end_date: DateTime<Utc>,
    /// Whether the poll is listed publicly.
    #[serde(default)]
    pub is_active: bool,
}

impl PollSpec {
    /// Check every field, given the current time.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        validate_end_date(self.end_date, now)
    }

    /// Convert into a poll that starts at `start_date`.
    pub fn into_poll(self, start_date: DateTime<Utc>) -> PollCore {
        PollCore {
            name: self.name,
            description: self.description,
            start_date: stored_precision(start_date),
            end_date: stored_precision(self.end_date),
            is_active: self.is_active,
        }
    }
}

/// A partial poll update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl PollPatch {
    /// Validate the present fields and write them into `poll`.
    ///
    /// `poll` is untouched if any field is invalid.
    pub fn apply(self, poll: &mut PollCore, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(end_date) = self.end_date {
            validate_end_date(end_date, now)?;
        }

        if let Some(name) = self.name {
            poll.name = name;
        }
        if let Some(description) = self.description {
            poll.description = description;
        }
        if let Some(end_date) = self.end_date {
            poll.end_date = stored_precision(end_date);
        }
        if let Some(is_active) = self.is_active {
            poll.is_active = is_active;
        }
        Ok(())
    }
}

/// BSON datetimes have millisecond precision.
fn stored_precision(date: DateTime<Utc>) -> DateTime<Utc> {
    date.trunc_subsecs(3)
}

fn validate_name(name: &str) -> Result<()> {
    let length = name.chars().count();
    if length == 0 || length > MAX_NAME_LENGTH {
        return Err(Error::field(
            "name",
            format!("Poll name must be between 1 and {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(Error::field(
            "description",
            format!("Poll description must be at most {MAX_DESCRIPTION_LENGTH} characters"),
        ));
    }
    Ok(())
}

fn validate_end_date(end_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if end_date <= now {
        return Err(Error::field(
            "end_date",
            "The end date must be in the future",
        ));
    }
    Ok(())
}

/// An API-friendly poll description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDescription {
    pub id: PollId,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

impl From<Poll> for PollDescription {
    fn from(poll: Poll) -> Self {
        Self {
            id: poll.id,
            name: poll.poll.name,
            description: poll.poll.description,
            start_date: poll.poll.start_date,
            end_date: poll.poll.end_date,
            is_active: poll.poll.is_active,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl PollSpec {
        pub fn example() -> Self {
            Self {
                name: "Favourite colours".to_string(),
                description: "Tell us which colours you like".to_string(),
                end_date: Utc::now() + Duration::days(7),
                is_active: true,
            }
        }

        pub fn inactive_example() -> Self {
            Self {
                name: "Favourite numbers".to_string(),
                is_active: false,
                ..Self::example()
            }
        }
    }
}
