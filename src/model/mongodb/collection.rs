use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    admin::{Admin, NewAdmin},
    anonymous_user::AnonymousUser,
    answer::{Answer, AnswerVariant},
    poll::Poll,
    question::Question,
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Admin collections
const ADMINS: &str = "admins";
impl MongoCollection for Admin {
    const NAME: &'static str = ADMINS;
}
impl MongoCollection for NewAdmin {
    const NAME: &'static str = ADMINS;
}

impl MongoCollection for AnonymousUser {
    const NAME: &'static str = "anonymous_users";
}

impl MongoCollection for Poll {
    const NAME: &'static str = "polls";
}

impl MongoCollection for Question {
    const NAME: &'static str = "questions";
}

impl MongoCollection for Answer {
    const NAME: &'static str = "answers";
}

impl MongoCollection for AnswerVariant {
    const NAME: &'static str = "answer_variants";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Admin collection.
    let admin_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique.clone())
        .build();
    Coll::<Admin>::from_db(db)
        .create_index(admin_index, None)
        .await?;

    // Anonymous users are looked up, and created, by session key.
    let session_index = IndexModel::builder()
        .keys(doc! {"session_key": 1})
        .options(unique.clone())
        .build();
    Coll::<AnonymousUser>::from_db(db)
        .create_index(session_index, None)
        .await?;

    // Questions by poll, for cascades.
    let question_index = IndexModel::builder().keys(doc! {"poll_id": 1}).build();
    Coll::<Question>::from_db(db)
        .create_index(question_index, None)
        .await?;

    // At most one answer per question per user.
    let answers = Coll::<Answer>::from_db(db);
    let answer_index = IndexModel::builder()
        .keys(doc! {"question_id": 1, "user_id": 1})
        .options(unique.clone())
        .build();
    let user_index = IndexModel::builder().keys(doc! {"user_id": 1}).build();
    answers
        .create_indexes([answer_index, user_index], None)
        .await?;

    // Option codes are shared across all questions.
    let variant_index = IndexModel::builder()
        .keys(doc! {"variant": 1})
        .options(unique)
        .build();
    Coll::<AnswerVariant>::from_db(db)
        .create_index(variant_index, None)
        .await?;

    Ok(())
}
