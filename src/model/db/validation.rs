//! Rules every stored answer must satisfy.
//!
//! Each check runs once without a session, before anything is persisted for
//! the submission, and again inside the transaction that inserts the answer.

use mongodb::{bson::doc, ClientSession};

use crate::error::{Error, Result};
use crate::model::{
    common::poll::{QuestionId, QuestionType},
    db::{answer::Answer, question::Question},
    mongodb::{u32_id_filter, Coll, Id},
};

pub const ALREADY_ANSWERED: &str = "You have already answered this question";

/// Fail if `user_id` has already answered `question_id`.
pub async fn assert_not_already_answered(
    answers: &Coll<Answer>,
    question_id: QuestionId,
    user_id: Id,
    session: Option<&mut ClientSession>,
) -> Result<()> {
    let filter = doc! {
        "question_id": question_id,
        "user_id": user_id,
    };
    let existing = match session {
        Some(session) => answers.find_one_with_session(filter, None, session).await?,
        None => answers.find_one(filter, None).await?,
    };
    if existing.is_some() {
        return Err(Error::field("question", ALREADY_ANSWERED));
    }
    Ok(())
}

/// Fail if `question_id` does not exist, or takes a different kind of answer.
///
/// Returns the question on success.
pub async fn assert_answer_type_matches(
    questions: &Coll<Question>,
    expected: QuestionType,
    question_id: QuestionId,
    session: Option<&mut ClientSession>,
) -> Result<Question> {
    let filter = u32_id_filter(question_id);
    let question = match session {
        Some(session) => questions.find_one_with_session(filter, None, session).await?,
        None => questions.find_one(filter, None).await?,
    }
    .ok_or_else(|| Error::not_found(format!("Question {question_id}")))?;

    if question.kind != expected {
        return Err(Error::field(
            "question",
            format!(
                "Question {question_id} takes {} answers, not {expected}",
                question.kind
            ),
        ));
    }
    Ok(question)
}

#[cfg(test)]
mod tests {
    use mongodb::Client as MongoClient;
    use rocket::{http::Status, local::asynchronous::Client};

    use super::*;
    use crate::model::db::{
        answer::{AnswerCore, AnswerData},
        question::QuestionCore,
    };

    async fn start_session(client: &MongoClient) -> ClientSession {
        client.start_session(None).await.unwrap()
    }

    #[backend_test]
    async fn type_must_match(client: Client, questions: Coll<Question>) {
        let db_client = client.rocket().state::<MongoClient>().unwrap();
        let mut session = start_session(db_client).await;

        questions
            .insert_one(
                Question {
                    id: 1,
                    question: QuestionCore::example(1, QuestionType::Single),
                },
                None,
            )
            .await
            .unwrap();

        let question = assert_answer_type_matches(&questions, QuestionType::Single, 1, Some(&mut session))
            .await
            .unwrap();
        assert_eq!(question.id, 1);

        let err = assert_answer_type_matches(&questions, QuestionType::Text, 1, Some(&mut session))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);

        let err = assert_answer_type_matches(&questions, QuestionType::Single, 2, Some(&mut session))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);

        // Same rules outside a transaction.
        let err = assert_answer_type_matches(&questions, QuestionType::Multi, 1, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        let err = assert_answer_type_matches(&questions, QuestionType::Single, 2, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
    }

    #[backend_test]
    async fn only_one_answer(client: Client, answers: Coll<Answer>) {
        let db_client = client.rocket().state::<MongoClient>().unwrap();
        let mut session = start_session(db_client).await;
        let user = Id::new();

        assert_not_already_answered(&answers, 1, user, Some(&mut session))
            .await
            .unwrap();

        answers
            .insert_one(
                Answer {
                    id: 1,
                    answer: AnswerCore {
                        question_id: 1,
                        user_id: user,
                        answer: AnswerData::Single(4),
                    },
                },
                None,
            )
            .await
            .unwrap();

        let err = assert_not_already_answered(&answers, 1, user, Some(&mut session))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ALREADY_ANSWERED);
        let err = assert_not_already_answered(&answers, 1, user, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ALREADY_ANSWERED);

        // Other users and other questions are unaffected.
        assert_not_already_answered(&answers, 1, Id::new(), Some(&mut session))
            .await
            .unwrap();
        assert_not_already_answered(&answers, 2, user, Some(&mut session))
            .await
            .unwrap();
    }
}
