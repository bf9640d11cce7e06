use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            question::{QuestionDescription, QuestionPatch, QuestionSpec, QuestionUpdate},
        },
        common::poll::QuestionId,
        db::{
            admin::Admin,
            answer::Answer,
            poll::Poll,
            question::{Question, QuestionCore},
        },
        mongodb::{u32_id_filter, Coll, Counter, QUESTION_ID_COUNTER_ID},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_questions,
        create_question,
        get_question,
        update_question,
        patch_question,
        delete_question,
    ]
}

async fn find_question(questions: &Coll<Question>, question_id: QuestionId) -> Result<Question> {
    questions
        .find_one(u32_id_filter(question_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {question_id}")))
}

#[get("/questions")]
async fn list_questions(
    _token: AuthToken<Admin>,
    questions: Coll<Question>,
) -> Result<Json<Vec<QuestionDescription>>> {
    let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
    let questions = questions
        .find(None, options)
        .await?
        .map_ok(QuestionDescription::from)
        .try_collect()
        .await?;
    Ok(Json(questions))
}

#[post("/questions", data = "<spec>", format = "json")]
async fn create_question(
    _token: AuthToken<Admin>,
    spec: Json<QuestionSpec>,
    polls: Coll<Poll>,
    questions: Coll<Question>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<(Status, Json<QuestionDescription>)> {
    spec.validate()?;

    let question = Question {
        id: Counter::next(&counters, QUESTION_ID_COUNTER_ID).await?,
        question: spec.0.into(),
    };

    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    Poll::lock(&polls, question.poll_id, &mut session).await?;
    questions
        .insert_one_with_session(&question, None, &mut session)
        .await?;
    session.commit_transaction().await?;
    info!("Created question {} in poll {}", question.id, question.poll_id);

    Ok((Status::Created, Json(question.into())))
}

#[get("/questions/<question_id>")]
async fn get_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    questions: Coll<Question>,
) -> Result<Json<QuestionDescription>> {
    let question = find_question(&questions, question_id).await?;
    Ok(Json(question.into()))
}

#[put("/questions/<question_id>", data = "<update>", format = "json")]
async fn update_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    update: Json<QuestionUpdate>,
    polls: Coll<Poll>,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    db_client: &State<Client>,
) -> Result<Json<QuestionDescription>> {
    let QuestionUpdate {
        question,
        reset_answers,
    } = update.0;
    question.validate()?;

    let question = Question {
        id: question_id,
        question: question.into(),
    };
    replace_question(&question, reset_answers, &polls, &questions, &answers, db_client).await?;
    Ok(Json(question.into()))
}

#[patch("/questions/<question_id>", data = "<patch>", format = "json")]
async fn patch_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    patch: Json<QuestionPatch>,
    polls: Coll<Poll>,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    db_client: &State<Client>,
) -> Result<Json<QuestionDescription>> {
    let existing = find_question(&questions, question_id).await?;
    let reset_answers = patch.reset_answers;
    let question = Question {
        id: question_id,
        question: patch.0.patched(&existing)?,
    };
    replace_question(&question, reset_answers, &polls, &questions, &answers, db_client).await?;
    Ok(Json(question.into()))
}

/// Replace a stored question, optionally deleting all of its answers, in one transaction.
///
/// Changing the question's type is only allowed if it has no answers left
/// afterwards, so stored answers always match their question.
async fn replace_question(
    question: &Question,
    reset_answers: bool,
    polls: &Coll<Poll>,
    questions: &Coll<Question>,
    answers: &Coll<Answer>,
    db_client: &Client,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    Poll::lock(polls, question.poll_id, &mut session).await?;

    let existing: QuestionCore = questions
        .find_one_with_session(u32_id_filter(question.id), None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {}", question.id)))?
        .question;

    if reset_answers {
        let deleted = Answer::delete_for_questions(answers, &[question.id], &mut session).await?;
        info!("Reset {deleted} answers to question {}", question.id);
    } else if existing.kind != question.kind
        && Answer::exist_for_question(answers, question.id, &mut session).await?
    {
        return Err(Error::field(
            "type",
            format!(
                "Question {} already has {} answers; set reset_answers to change its type",
                question.id, existing.kind
            ),
        ));
    }

    questions
        .replace_one_with_session(u32_id_filter(question.id), question, None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(())
}

#[delete("/questions/<question_id>")]
async fn delete_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    db_client: &State<Client>,
) -> Result<Status> {
    // Atomically delete the question and its answers.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let result = questions
        .delete_one_with_session(u32_id_filter(question_id), None, &mut session)
        .await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found(format!("Question {question_id}")));
    }
    let deleted = Answer::delete_for_questions(&answers, &[question_id], &mut session).await?;

    session.commit_transaction().await?;
    info!("Deleted question {question_id} and {deleted} answers");

    Ok(Status::NoContent)
}
