use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::poll::{AnswerId, OptionValue, QuestionId, QuestionType};

pub const MAX_TEXT_ANSWER_LENGTH: usize = 512;

/// An answer to a `TEXT` question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAnswer {
    pub question: QuestionId,
    pub answer: String,
}

/// An answer to a `SINGLE` question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleAnswer {
    pub question: QuestionId,
    pub answer: OptionValue,
}

/// An answer to a `MULTI` question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAnswer {
    pub question: QuestionId,
    pub answer_data: Vec<OptionValue>,
}

/// The value of an answer as the API sees it: the text, the option, or the options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Single(OptionValue),
    Multi(Vec<OptionValue>),
}

impl AnswerValue {
    /// The kind of question this value answers.
    pub fn kind(&self) -> QuestionType {
        match self {
            Self::Text(_) => QuestionType::Text,
            Self::Single(_) => QuestionType::Single,
            Self::Multi(_) => QuestionType::Multi,
        }
    }

    /// Check the value on its own, before anything touches the database.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Text(text) if text.chars().count() > MAX_TEXT_ANSWER_LENGTH => Err(Error::field(
                "answer",
                format!("Text answers must be at most {MAX_TEXT_ANSWER_LENGTH} characters"),
            )),
            Self::Multi(values) => {
                let mut seen = HashSet::with_capacity(values.len());
                if values.iter().all(|value| seen.insert(value)) {
                    Ok(())
                } else {
                    Err(Error::field("answer_data", "Option values must be unique"))
                }
            }
            _ => Ok(()),
        }
    }
}

/// A submitted answer of any kind.
#[derive(Debug, Clone)]
pub struct Submission {
    pub question: QuestionId,
    pub value: AnswerValue,
}

impl From<TextAnswer> for Submission {
    fn from(answer: TextAnswer) -> Self {
        Self {
            question: answer.question,
            value: AnswerValue::Text(answer.answer),
        }
    }
}

impl From<SingleAnswer> for Submission {
    fn from(answer: SingleAnswer) -> Self {
        Self {
            question: answer.question,
            value: AnswerValue::Single(answer.answer),
        }
    }
}

impl From<MultiAnswer> for Submission {
    fn from(answer: MultiAnswer) -> Self {
        Self {
            question: answer.question,
            value: AnswerValue::Multi(answer.answer_data),
        }
    }
}

/// A stored answer, as returned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDescription {
    pub id: AnswerId,
    pub question: QuestionId,
    pub answer_data: AnswerValue,
}
