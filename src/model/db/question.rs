use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::common::poll::{PollId, QuestionId, QuestionType};

/// Core question data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct QuestionCore {
    /// The poll this question belongs to.
    pub poll_id: PollId,
    /// Question text.
    pub text: String,
    /// What kind of answer the question takes.
    #[serde(rename = "type")]
    pub kind: QuestionType,
}

/// A question from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl DerefMut for Question {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.question
    }
}
