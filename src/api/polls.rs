use std::collections::HashSet;

use chrono::Utc;
use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            my_polls::{assemble_my_polls, MyPoll},
            poll::{PollDescription, PollPatch, PollSpec},
            session::AnonymousSession,
        },
        common::poll::{PollId, QuestionId},
        db::{
            admin::Admin,
            anonymous_user::AnonymousUser,
            answer::{Answer, AnswerData, AnswerVariant},
            poll::Poll,
            question::Question,
        },
        mongodb::{u32_id_filter, Coll, Counter, POLL_ID_COUNTER_ID},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_polls,
        create_poll,
        get_poll,
        update_poll,
        patch_poll,
        delete_poll,
        active_polls,
        my_polls,
    ]
}

fn by_id() -> FindOptions {
    FindOptions::builder().sort(doc! { "_id": 1 }).build()
}

async fn find_poll(polls: &Coll<Poll>, poll_id: PollId) -> Result<Poll> {
    polls
        .find_one(u32_id_filter(poll_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {poll_id}")))
}

#[get("/polls")]
async fn list_polls(
    _token: AuthToken<Admin>,
    polls: Coll<Poll>,
) -> Result<Json<Vec<PollDescription>>> {
    let polls = polls
        .find(None, by_id())
        .await?
        .map_ok(PollDescription::from)
        .try_collect()
        .await?;
    Ok(Json(polls))
}

#[post("/polls", data = "<spec>", format = "json")]
async fn create_poll(
    _token: AuthToken<Admin>,
    spec: Json<PollSpec>,
    polls: Coll<Poll>,
    counters: Coll<Counter>,
) -> Result<(Status, Json<PollDescription>)> {
    let now = Utc::now();
    spec.validate(now)?;

    let poll = Poll {
        id: Counter::next(&counters, POLL_ID_COUNTER_ID).await?,
        poll: spec.0.into_poll(now),
    };
    polls.insert_one(&poll, None).await?;
    info!("Created poll {}", poll.id);

    Ok((Status::Created, Json(poll.into())))
}

#[get("/polls/<poll_id>")]
async fn get_poll(
    _token: AuthToken<Admin>,
    poll_id: PollId,
    polls: Coll<Poll>,
) -> Result<Json<PollDescription>> {
    let poll = find_poll(&polls, poll_id).await?;
    Ok(Json(poll.into()))
}

#[put("/polls/<poll_id>", data = "<spec>", format = "json")]
async fn update_poll(
    _token: AuthToken<Admin>,
    poll_id: PollId,
    spec: Json<PollSpec>,
    polls: Coll<Poll>,
) -> Result<Json<PollDescription>> {
    let existing = find_poll(&polls, poll_id).await?;
    spec.validate(Utc::now())?;

    // The start date is fixed at creation.
    let poll = Poll {
        id: poll_id,
        poll: spec.0.into_poll(existing.start_date),
    };
    replace_poll(&polls, &poll).await?;
    Ok(Json(poll.into()))
}

#[patch("/polls/<poll_id>", data = "<patch>", format = "json")]
async fn patch_poll(
    _token: AuthToken<Admin>,
    poll_id: PollId,
    patch: Json<PollPatch>,
    polls: Coll<Poll>,
) -> Result<Json<PollDescription>> {
    let mut poll = find_poll(&polls, poll_id).await?;
    patch.0.apply(&mut poll, Utc::now())?;
    replace_poll(&polls, &poll).await?;
    Ok(Json(poll.into()))
}

async fn replace_poll(polls: &Coll<Poll>, poll: &Poll) -> Result<()> {
    let result = polls
        .replace_one(u32_id_filter(poll.id), poll, None)
        .await?;
    if result.matched_count == 0 {
        // Deleted since we read it.
        return Err(Error::not_found(format!("Poll {}", poll.id)));
    }
    Ok(())
}

#[delete("/polls/<poll_id>")]
async fn delete_poll(
    _token: AuthToken<Admin>,
    poll_id: PollId,
    polls: Coll<Poll>,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    db_client: &State<Client>,
) -> Result<Status> {
    // Atomically delete the poll, its questions, and all their answers.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let result = polls
        .delete_one_with_session(u32_id_filter(poll_id), None, &mut session)
        .await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found(format!("Poll {poll_id}")));
    }

    let question_ids: Vec<QuestionId> = questions
        .find_with_session(doc! { "poll_id": poll_id }, None, &mut session)
        .await?
        .stream(&mut session)
        .map_ok(|question| question.id)
        .try_collect()
        .await?;
    let deleted_answers =
        Answer::delete_for_questions(&answers, &question_ids, &mut session).await?;
    questions
        .delete_many_with_session(doc! { "poll_id": poll_id }, None, &mut session)
        .await?;

    session.commit_transaction().await?;
    info!(
        "Deleted poll {poll_id} with {} questions and {deleted_answers} answers",
        question_ids.len()
    );

    Ok(Status::NoContent)
}

#[get("/polls/active")]
async fn active_polls(polls: Coll<Poll>) -> Result<Json<Vec<PollDescription>>> {
    let polls = polls
        .find(doc! { "is_active": true }, by_id())
        .await?
        .map_ok(PollDescription::from)
        .try_collect()
        .await?;
    Ok(Json(polls))
}

#[get("/polls/my")]
async fn my_polls(
    session: AnonymousSession,
    users: Coll<AnonymousUser>,
    polls: Coll<Poll>,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    variants: Coll<AnswerVariant>,
) -> Result<Json<Vec<MyPoll>>> {
    let Some(user) = AnonymousUser::find(&users, session.key()).await? else {
        return Ok(Json(Vec::new()));
    };

    let answers: Vec<Answer> = answers
        .find(doc! { "user_id": user.id }, None)
        .await?
        .try_collect()
        .await?;
    let question_ids: Vec<QuestionId> = answers.iter().map(|answer| answer.question_id).collect();
    let questions: Vec<Question> = questions
        .find(doc! { "_id": { "$in": question_ids } }, None)
        .await?
        .try_collect()
        .await?;
    let poll_ids: Vec<PollId> = questions
        .iter()
        .map(|question| question.poll_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let polls: Vec<Poll> = polls
        .find(doc! { "_id": { "$in": poll_ids } }, None)
        .await?
        .try_collect()
        .await?;

    let variant_ids = answers.iter().flat_map(|answer| match &answer.answer.answer {
        AnswerData::Multi(ids) => ids.clone(),
        _ => Vec::new(),
    });
    let variants = AnswerVariant::values_by_id(&variants, variant_ids).await?;

    Ok(Json(assemble_my_polls(polls, questions, answers, &variants)))
}
