use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;

use mongodb::{bson::doc, ClientSession};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::poll::{AnswerId, OptionValue, QuestionId, QuestionType, VariantId},
    mongodb::{Coll, Counter, Id, VARIANT_ID_COUNTER_ID},
};

/// A stored answer value, tagged with the kind of question it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum AnswerData {
    /// Free text.
    Text(String),
    /// The chosen option.
    Single(OptionValue),
    /// Links to the [`AnswerVariant`]s that were chosen.
    Multi(Vec<VariantId>),
}

impl AnswerData {
    /// The kind of question this answer belongs to.
    pub fn kind(&self) -> QuestionType {
        match self {
            Self::Text(_) => QuestionType::Text,
            Self::Single(_) => QuestionType::Single,
            Self::Multi(_) => QuestionType::Multi,
        }
    }
}

/// Core answer data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCore {
    pub question_id: QuestionId,
    pub user_id: Id,
    pub answer: AnswerData,
}

/// An answer from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id")]
    pub id: AnswerId,
    #[serde(flatten)]
    pub answer: AnswerCore,
}

impl Deref for Answer {
    type Target = AnswerCore;

    fn deref(&self) -> &Self::Target {
        &self.answer
    }
}

impl Answer {
    /// Delete every answer to any of the given questions.
    pub async fn delete_for_questions(
        answers: &Coll<Answer>,
        question_ids: &[QuestionId],
        session: &mut ClientSession,
    ) -> Result<u64> {
        let filter = doc! { "question_id": { "$in": question_ids.to_vec() } };
        let result = answers
            .delete_many_with_session(filter, None, session)
            .await?;
        Ok(result.deleted_count)
    }

    /// Does the given question have any answers at all?
    pub async fn exist_for_question(
        answers: &Coll<Answer>,
        question_id: QuestionId,
        session: &mut ClientSession,
    ) -> Result<bool> {
        let count = answers
            .count_documents_with_session(doc! { "question_id": question_id }, None, session)
            .await?;
        Ok(count > 0)
    }
}

/// A shared option code. Codes are global, not scoped per question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerVariant {
    #[serde(rename = "_id")]
    pub id: VariantId,
    pub variant: OptionValue,
}

impl AnswerVariant {
    /// Resolve option values to variant IDs, inserting the values that have
    /// never been seen before. The returned IDs are in the same order as `values`.
    ///
    /// `values` must be pairwise distinct.
    pub async fn resolve(
        variants: &Coll<AnswerVariant>,
        counters: &Coll<Counter>,
        values: &[OptionValue],
        session: &mut ClientSession,
    ) -> Result<Vec<VariantId>> {
        let wanted: Vec<i32> = values.iter().copied().map(i32::from).collect();
        let mut known: HashMap<OptionValue, VariantId> = variants
            .find_with_session(doc! { "variant": { "$in": wanted } }, None, session)
            .await?
            .stream(session)
            .map_ok(|v| (v.variant, v.id))
            .try_collect()
            .await?;

        let missing: BTreeSet<OptionValue> = values
            .iter()
            .copied()
            .filter(|value| !known.contains_key(value))
            .collect();
        if !missing.is_empty() {
            let mut new_variants = Vec::with_capacity(missing.len());
            for variant in missing {
                let id = Counter::next(counters, VARIANT_ID_COUNTER_ID).await?;
                new_variants.push(AnswerVariant { id, variant });
            }
            variants
                .insert_many_with_session(&new_variants, None, session)
                .await?;
            known.extend(new_variants.into_iter().map(|v| (v.variant, v.id)));
        }

        Ok(values.iter().map(|value| known[value]).collect())
    }

    /// Look up the option values for the given variant IDs.
    pub async fn values_by_id(
        variants: &Coll<AnswerVariant>,
        ids: impl IntoIterator<Item = VariantId>,
    ) -> Result<HashMap<VariantId, OptionValue>> {
        let ids: Vec<VariantId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let values = variants
            .find(doc! { "_id": { "$in": ids } }, None)
            .await?
            .map_ok(|v| (v.id, v.variant))
            .try_collect()
            .await?;
        Ok(values)
    }
}


#[cfg(test)]
mod tests {
    use mongodb::bson::{from_document, to_document};

    use super::*;

    #[test]
    fn tagged_layout() {
        let answer = Answer {
            id: 1,
            answer: AnswerCore {
                question_id: 2,
                user_id: Id::new(),
                answer: AnswerData::Multi(vec![3, 7]),
            },
        };
        let doc = to_document(&answer).unwrap();
        let tagged = doc.get_document("answer").unwrap();
        assert_eq!(tagged.get_str("type").unwrap(), "MULTI");
        assert_eq!(tagged.get_array("data").unwrap().len(), 2);

        let back: Answer = from_document(doc).unwrap();
        assert_eq!(back, answer);
    }

    #[test]
    fn kinds() {
        assert_eq!(AnswerData::Text("x".into()).kind(), QuestionType::Text);
        assert_eq!(AnswerData::Single(1).kind(), QuestionType::Single);
        assert_eq!(AnswerData::Multi(vec![]).kind(), QuestionType::Multi);
    }
}
