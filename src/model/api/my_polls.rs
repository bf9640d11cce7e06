use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::answer::AnswerValue,
    common::poll::{AnswerId, OptionValue, PollId, QuestionId, QuestionType, VariantId},
    db::{
        answer::{Answer, AnswerData},
        poll::Poll,
        question::Question,
    },
};

/// A poll the caller has answered, with only the questions they answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyPoll {
    pub id: PollId,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(rename = "question")]
    pub questions: Vec<MyQuestion>,
}

/// An answered question, carrying the caller's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyQuestion {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub answer: MyAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyAnswer {
    pub id: AnswerId,
    pub answer_data: AnswerValue,
}

impl AnswerData {
    /// Convert a stored answer into its API value, looking up variant IDs in `variants`.
    ///
    /// Variant IDs missing from `variants` are dropped.
    pub fn to_value(&self, variants: &HashMap<VariantId, OptionValue>) -> AnswerValue {
        match self {
            Self::Text(text) => AnswerValue::Text(text.clone()),
            Self::Single(value) => AnswerValue::Single(*value),
            Self::Multi(ids) => AnswerValue::Multi(
                ids.iter()
                    .filter_map(|id| variants.get(id).copied())
                    .collect(),
            ),
        }
    }
}

/// Build the "my polls" listing from one user's answers, the questions they
/// answer and the polls those belong to.
///
/// Polls without any answered question are left out, as are questions the
/// user has not answered. Polls and questions are ordered by ID.
pub fn assemble_my_polls(
    polls: Vec<Poll>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    variants: &HashMap<VariantId, OptionValue>,
) -> Vec<MyPoll> {
    let mut answers: HashMap<QuestionId, Answer> = answers
        .into_iter()
        .map(|answer| (answer.question_id, answer))
        .collect();

    let mut by_poll: BTreeMap<PollId, Vec<MyQuestion>> = BTreeMap::new();
    for question in questions {
        let Some(answer) = answers.remove(&question.id) else {
            continue;
        };
        by_poll
            .entry(question.poll_id)
            .or_default()
            .push(MyQuestion {
                id: question.id,
                text: question.question.text,
                kind: question.question.kind,
                answer: MyAnswer {
                    id: answer.id,
                    answer_data: answer.answer.answer.to_value(variants),
                },
            });
    }

    let mut my_polls: Vec<MyPoll> = polls
        .into_iter()
        .filter_map(|poll| {
            let mut questions = by_poll.remove(&poll.id)?;
            questions.sort_by_key(|question| question.id);
            Some(MyPoll {
                id: poll.id,
                name: poll.poll.name,
                description: poll.poll.description,
                start_date: poll.poll.start_date,
                end_date: poll.poll.end_date,
                questions,
            })
        })
        .collect();
    my_polls.sort_by_key(|poll| poll.id);
    my_polls
}
