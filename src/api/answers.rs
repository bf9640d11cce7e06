use mongodb::{Client, ClientSession, Database};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            answer::{
                AnswerDescription, AnswerValue, MultiAnswer, SingleAnswer, Submission, TextAnswer,
            },
            session::AnonymousSession,
        },
        db::{
            anonymous_user::AnonymousUser,
            answer::{Answer, AnswerCore, AnswerData, AnswerVariant},
            question::Question,
            validation::{assert_answer_type_matches, assert_not_already_answered, ALREADY_ANSWERED},
        },
        mongodb::{
            is_duplicate_key_error, is_transient_transaction_error, Coll, Counter, Id,
            ANSWER_ID_COUNTER_ID,
        },
    },
};

/// How many times an answer transaction is attempted before giving up.
const MAX_TRANSACTION_ATTEMPTS: usize = 5;

pub fn routes() -> Vec<Route> {
    routes![answer_text, answer_single, answer_multi]
}

/// Everything needed to store an answer.
struct AnswerStore {
    users: Coll<AnonymousUser>,
    questions: Coll<Question>,
    answers: Coll<Answer>,
    variants: Coll<AnswerVariant>,
    counters: Coll<Counter>,
    db_client: Client,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AnswerStore {
    type Error = ();

    /// Gather the answer collections and the database client from the managed state.
    ///
    /// Panics iff the [`Database`] or [`Client`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        let db_client = req.guard::<&State<Client>>().await.unwrap();
        request::Outcome::Success(AnswerStore {
            users: Coll::from_db(db),
            questions: Coll::from_db(db),
            answers: Coll::from_db(db),
            variants: Coll::from_db(db),
            counters: Coll::from_db(db),
            db_client: db_client.inner().clone(),
        })
    }
}

#[post("/answers/text", data = "<answer>", format = "json")]
async fn answer_text(
    answer: Json<TextAnswer>,
    session: AnonymousSession,
    store: AnswerStore,
) -> Result<(Status, Json<AnswerDescription>)> {
    store.submit(answer.0.into(), &session).await
}

#[post("/answers/single", data = "<answer>", format = "json")]
async fn answer_single(
    answer: Json<SingleAnswer>,
    session: AnonymousSession,
    store: AnswerStore,
) -> Result<(Status, Json<AnswerDescription>)> {
    store.submit(answer.0.into(), &session).await
}

#[post("/answers/multi", data = "<answer>", format = "json")]
async fn answer_multi(
    answer: Json<MultiAnswer>,
    session: AnonymousSession,
    store: AnswerStore,
) -> Result<(Status, Json<AnswerDescription>)> {
    store.submit(answer.0.into(), &session).await
}

impl AnswerStore {
    /// Validate and store a submission for the caller's anonymous user.
    async fn submit(
        &self,
        submission: Submission,
        session: &AnonymousSession,
    ) -> Result<(Status, Json<AnswerDescription>)> {
        // Nothing is persisted for a submission until these checks pass.
        submission.value.validate()?;
        assert_answer_type_matches(
            &self.questions,
            submission.value.kind(),
            submission.question,
            None,
        )
        .await?;
        if let Some(user) = AnonymousUser::find(&self.users, session.key()).await? {
            assert_not_already_answered(&self.answers, submission.question, user.id, None)
                .await?;
        }

        let user = AnonymousUser::get_or_create(&self.users, session.key()).await?;
        let answer_id = Counter::next(&self.counters, ANSWER_ID_COUNTER_ID).await?;

        let mut attempt = 1;
        loop {
            match self.try_submit(&submission, user.id, answer_id).await {
                Err(Error::Db(err))
                    if is_transient_transaction_error(&err)
                        && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    warn!("Answer transaction attempt {attempt} failed, retrying: {err}");
                    attempt += 1;
                }
                Err(Error::Db(err)) if is_duplicate_key_error(&err) => {
                    // Lost a race with a concurrent answer from the same user.
                    return Err(Error::field("question", ALREADY_ANSWERED));
                }
                Err(err) => return Err(err),
                Ok(()) => break,
            }
        }

        info!(
            "Stored {} answer {answer_id} to question {}",
            submission.value.kind(),
            submission.question
        );
        let description = AnswerDescription {
            id: answer_id,
            question: submission.question,
            answer_data: submission.value,
        };
        Ok((Status::Created, Json(description)))
    }

    /// One attempt at the check-and-insert transaction.
    async fn try_submit(&self, submission: &Submission, user_id: Id, answer_id: u32) -> Result<()> {
        let mut session = self.db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        assert_answer_type_matches(
            &self.questions,
            submission.value.kind(),
            submission.question,
            Some(&mut session),
        )
        .await?;
        assert_not_already_answered(
            &self.answers,
            submission.question,
            user_id,
            Some(&mut session),
        )
        .await?;

        let answer = Answer {
            id: answer_id,
            answer: AnswerCore {
                question_id: submission.question,
                user_id,
                answer: self.stored_data(&submission.value, &mut session).await?,
            },
        };
        self.answers
            .insert_one_with_session(&answer, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(())
    }

    async fn stored_data(
        &self,
        value: &AnswerValue,
        session: &mut ClientSession,
    ) -> Result<AnswerData> {
        let data = match value {
            AnswerValue::Text(text) => AnswerData::Text(text.clone()),
            AnswerValue::Single(option) => AnswerData::Single(*option),
            AnswerValue::Multi(options) => AnswerData::Multi(
                AnswerVariant::resolve(&self.variants, &self.counters, options, session).await?,
            ),
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use rocket::{
        futures::TryStreamExt,
        http::{ContentType, Cookie, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use crate::api::test_helpers::{create_poll_for_spec, create_question, parse};
    use crate::model::{
        api::{
            my_polls::MyPoll, poll::PollSpec, question::QuestionDescription,
            session::SESSION_COOKIE,
        },
        common::poll::{PollId, QuestionType},
    };

    use super::*;

    async fn post_answer<'c>(
        client: &'c Client,
        session_key: &str,
        path: &'static str,
        body: Value,
    ) -> LocalResponse<'c> {
        client
            .post(path)
            .private_cookie(Cookie::new(SESSION_COOKIE, session_key.to_string()))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    async fn my_polls(client: &Client, session_key: &str) -> Vec<MyPoll> {
        let response = client
            .get("/api/v1/polls/my")
            .private_cookie(Cookie::new(SESSION_COOKIE, session_key.to_string()))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        parse(response).await
    }

    async fn poll_with(client: &Client, kinds: &[QuestionType]) -> (PollId, Vec<QuestionDescription>) {
        let poll = create_poll_for_spec(client, &PollSpec::example()).await;
        let mut questions = Vec::new();
        for kind in kinds {
            questions.push(create_question(client, poll.id, *kind).await);
        }
        (poll.id, questions)
    }

    #[backend_test(admin)]
    async fn answer_each_kind(client: Client) {
        let (_, questions) = poll_with(
            &client,
            &[QuestionType::Text, QuestionType::Single, QuestionType::Multi],
        )
        .await;

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/text",
            json!({"question": questions[0].id, "answer": "blue"}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        let text: AnswerDescription = parse(response).await;
        assert_eq!(text.question, questions[0].id);
        assert_eq!(text.answer_data, AnswerValue::Text("blue".into()));

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/single",
            json!({"question": questions[1].id, "answer": 3}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        let single: AnswerDescription = parse(response).await;
        assert_eq!(single.answer_data, AnswerValue::Single(3));

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/multi",
            json!({"question": questions[2].id, "answer_data": [1, 2, 4]}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        let multi: AnswerDescription = parse(response).await;
        assert_eq!(multi.answer_data, AnswerValue::Multi(vec![1, 2, 4]));

        assert!(text.id < single.id && single.id < multi.id);
    }

    #[backend_test(admin)]
    async fn double_answer_rejected(client: Client, answers: Coll<Answer>) {
        let (_, questions) = poll_with(&client, &[QuestionType::Single]).await;
        let body = json!({"question": questions[0].id, "answer": 1});

        let response = post_answer(&client, "alice", "/api/v1/answers/single", body.clone()).await;
        assert_eq!(Status::Created, response.status());

        let response = post_answer(&client, "alice", "/api/v1/answers/single", body.clone()).await;
        assert_eq!(Status::BadRequest, response.status());
        let error: Value = parse(response).await;
        assert_eq!(error["error"], ALREADY_ANSWERED);

        // Someone else may still answer.
        let response = post_answer(&client, "bob", "/api/v1/answers/single", body).await;
        assert_eq!(Status::Created, response.status());
        assert_eq!(answers.count_documents(None, None).await.unwrap(), 2);
    }

    #[backend_test(admin)]
    async fn kind_mismatch_rejected(client: Client, answers: Coll<Answer>) {
        let (_, questions) = poll_with(&client, &[QuestionType::Text]).await;

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/single",
            json!({"question": questions[0].id, "answer": 1}),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/multi",
            json!({"question": questions[0].id, "answer_data": [1]}),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());

        // Unknown questions.
        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/text",
            json!({"question": 999, "answer": "hi"}),
        )
        .await;
        assert_eq!(Status::NotFound, response.status());

        assert_eq!(answers.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test(admin)]
    async fn duplicate_options_rejected_before_storing(
        client: Client,
        answers: Coll<Answer>,
        variants: Coll<AnswerVariant>,
    ) {
        let (_, questions) = poll_with(&client, &[QuestionType::Multi]).await;

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/multi",
            json!({"question": questions[0].id, "answer_data": [5, 6, 5]}),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());
        let error: Value = parse(response).await;
        assert_eq!(error["field"], "answer_data");

        assert_eq!(answers.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(variants.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test(admin)]
    async fn multi_answers_share_variants(client: Client, variants: Coll<AnswerVariant>) {
        let (_, questions) = poll_with(&client, &[QuestionType::Multi, QuestionType::Multi]).await;

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/multi",
            json!({"question": questions[0].id, "answer_data": [1, 2]}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        assert_eq!(variants.count_documents(None, None).await.unwrap(), 2);

        // Option codes are global: only 3 is new.
        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/multi",
            json!({"question": questions[1].id, "answer_data": [3, 2]}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
        let stored: Vec<AnswerVariant> = variants
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let mut values: Vec<_> = stored.iter().map(|v| v.variant).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3]);

        // The stored answer links to the variants, and reads back as the same set.
        let mine = my_polls(&client, "alice").await;
        let mut answered: Vec<Vec<u16>> = mine[0]
            .questions
            .iter()
            .map(|question| match &question.answer.answer_data {
                AnswerValue::Multi(values) => {
                    let mut values = values.clone();
                    values.sort_unstable();
                    values
                }
                other => panic!("unexpected answer {other:?}"),
            })
            .collect();
        answered.sort();
        assert_eq!(answered, vec![vec![1, 2], vec![2, 3]]);
    }

    #[backend_test(admin)]
    async fn my_polls_per_session(client: Client) {
        let (first_poll, first) =
            poll_with(&client, &[QuestionType::Text, QuestionType::Single]).await;
        let (_, second) = poll_with(&client, &[QuestionType::Single]).await;

        post_answer(
            &client,
            "alice",
            "/api/v1/answers/text",
            json!({"question": first[0].id, "answer": "blue"}),
        )
        .await;
        post_answer(
            &client,
            "bob",
            "/api/v1/answers/single",
            json!({"question": second[0].id, "answer": 2}),
        )
        .await;

        // Alice answered one question of the first poll.
        let alice = my_polls(&client, "alice").await;
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, first_poll);
        assert_eq!(alice[0].questions.len(), 1);
        assert_eq!(alice[0].questions[0].id, first[0].id);
        assert_eq!(
            alice[0].questions[0].answer.answer_data,
            AnswerValue::Text("blue".into())
        );

        // Bob only sees the second poll.
        let bob = my_polls(&client, "bob").await;
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].questions[0].id, second[0].id);

        // Strangers see nothing.
        assert!(my_polls(&client, "carol").await.is_empty());
    }

    #[backend_test(admin)]
    async fn reset_answers_clears_my_polls(client: Client) {
        let (poll_id, questions) = poll_with(&client, &[QuestionType::Single]).await;
        let question = &questions[0];
        post_answer(
            &client,
            "alice",
            "/api/v1/answers/single",
            json!({"question": question.id, "answer": 1}),
        )
        .await;
        assert_eq!(my_polls(&client, "alice").await.len(), 1);

        let response = client
            .put(format!("/api/v1/questions/{}", question.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "poll": poll_id,
                    "text": question.text,
                    "type": "SINGLE",
                    "reset_answers": true,
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(my_polls(&client, "alice").await.is_empty());

        // The question can be answered again.
        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/single",
            json!({"question": question.id, "answer": 2}),
        )
        .await;
        assert_eq!(Status::Created, response.status());
    }

    #[backend_test(admin)]
    async fn session_cookie_is_created(client: Client, users: Coll<AnonymousUser>) {
        let (_, questions) = poll_with(&client, &[QuestionType::Text]).await;
        assert!(client.cookies().get_private(SESSION_COOKIE).is_none());

        let response = client
            .post(uri!("/api/v1", answer_text))
            .header(ContentType::JSON)
            .body(json!({"question": questions[0].id, "answer": "hello"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let cookie = client.cookies().get_private(SESSION_COOKIE).unwrap();
        let user = users
            .find_one(doc! { "session_key": cookie.value() }, None)
            .await
            .unwrap();
        assert!(user.is_some());

        // The cookie is reused from now on.
        let response = client
            .post(uri!("/api/v1", answer_text))
            .header(ContentType::JSON)
            .body(json!({"question": questions[0].id, "answer": "again"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test(admin)]
    async fn text_answer_length(client: Client) {
        let (_, questions) = poll_with(&client, &[QuestionType::Text]).await;
        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/text",
            json!({"question": questions[0].id, "answer": "x".repeat(513)}),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn rejected_answers_persist_nothing(
        client: Client,
        users: Coll<AnonymousUser>,
        counters: Coll<Counter>,
    ) {
        let (_, questions) = poll_with(&client, &[QuestionType::Text]).await;

        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/text",
            json!({"question": 999, "answer": "hi"}),
        )
        .await;
        assert_eq!(Status::NotFound, response.status());
        let response = post_answer(
            &client,
            "alice",
            "/api/v1/answers/single",
            json!({"question": questions[0].id, "answer": 1}),
        )
        .await;
        assert_eq!(Status::BadRequest, response.status());

        assert_eq!(users.count_documents(None, None).await.unwrap(), 0);
        let answer_counter = doc! { "_id": ANSWER_ID_COUNTER_ID };
        assert_eq!(
            counters.count_documents(answer_counter, None).await.unwrap(),
            0
        );

        // A repeated answer uses up no answer id.
        let body = json!({"question": questions[0].id, "answer": "hi"});
        let response = post_answer(&client, "alice", "/api/v1/answers/text", body.clone()).await;
        let first: AnswerDescription = parse(response).await;
        assert_eq!(first.id, 1);
        let response = post_answer(&client, "alice", "/api/v1/answers/text", body.clone()).await;
        assert_eq!(Status::BadRequest, response.status());
        let response = post_answer(&client, "bob", "/api/v1/answers/text", body).await;
        let second: AnswerDescription = parse(response).await;
        assert_eq!(second.id, 2);
    }

    #[backend_test(admin)]
    async fn concurrent_answers_store_one(client: Client, answers: Coll<Answer>) {
        let (_, questions) = poll_with(&client, &[QuestionType::Single]).await;
        let body = json!({"question": questions[0].id, "answer": 1});

        let (first, second) = rocket::tokio::join!(
            post_answer(&client, "alice", "/api/v1/answers/single", body.clone()),
            post_answer(&client, "alice", "/api/v1/answers/single", body.clone()),
        );
        let statuses = [first.status(), second.status()];
        assert_eq!(
            statuses.iter().filter(|s| **s == Status::Created).count(),
            1,
            "{statuses:?}"
        );

        let rejected = if first.status() == Status::Created {
            second
        } else {
            first
        };
        assert_eq!(Status::BadRequest, rejected.status());
        let error: Value = parse(rejected).await;
        assert_eq!(error["error"], ALREADY_ANSWERED);

        assert_eq!(answers.count_documents(None, None).await.unwrap(), 1);
    }
}
