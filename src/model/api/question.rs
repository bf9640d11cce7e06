use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::poll::{PollId, QuestionId, QuestionType},
    db::question::{Question, QuestionCore},
};

pub const MAX_TEXT_LENGTH: usize = 1024;

/// A question as received on create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// The poll the question belongs to.
    pub poll: PollId,
    /// Question text.
    pub text: String,
    /// What kind of answer the question takes.
    #[serde(rename = "type")]
    pub kind: QuestionType,
}

impl QuestionSpec {
    pub fn validate(&self) -> Result<()> {
        validate_text(&self.text)
    }
}

impl From<QuestionSpec> for QuestionCore {
    fn from(spec: QuestionSpec) -> Self {
        Self {
            poll_id: spec.poll,
            text: spec.text,
            kind: spec.kind,
        }
    }
}

/// A full question update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionUpdate {
    #[serde(flatten)]
    pub question: QuestionSpec,
    /// Delete every existing answer to the question as part of the update.
    #[serde(default)]
    pub reset_answers: bool,
}

/// A partial question update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionPatch {
    pub poll: Option<PollId>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<QuestionType>,
    /// Delete every existing answer to the question as part of the update.
    #[serde(default)]
    pub reset_answers: bool,
}

impl QuestionPatch {
    /// Produce the patched version of `question`, validating the present fields.
    pub fn patched(self, question: &QuestionCore) -> Result<QuestionCore> {
        if let Some(text) = &self.text {
            validate_text(text)?;
        }
        Ok(QuestionCore {
            poll_id: self.poll.unwrap_or(question.poll_id),
            text: self.text.unwrap_or_else(|| question.text.clone()),
            kind: self.kind.unwrap_or(question.kind),
        })
    }
}

fn validate_text(text: &str) -> Result<()> {
    let length = text.chars().count();
    if length == 0 || length > MAX_TEXT_LENGTH {
        return Err(Error::field(
            "text",
            format!("Question text must be between 1 and {MAX_TEXT_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// An API-friendly question description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDescription {
    pub id: QuestionId,
    pub poll: PollId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
}

impl From<Question> for QuestionDescription {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            poll: question.question.poll_id,
            text: question.question.text,
            kind: question.question.kind,
        }
    }
}
