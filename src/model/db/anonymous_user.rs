use std::ops::Deref;

use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{is_duplicate_key_error, Coll, Id};

/// Core anonymous respondent data: just the opaque session key that identifies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousUserCore {
    pub session_key: String,
}

/// An anonymous user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousUser {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: AnonymousUserCore,
}

impl Deref for AnonymousUser {
    type Target = AnonymousUserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl AnonymousUser {
    /// Find the user for this session key, if they have ever answered anything.
    pub async fn find(users: &Coll<AnonymousUser>, session_key: &str) -> Result<Option<Self>> {
        let user = users
            .find_one(doc! { "session_key": session_key }, None)
            .await?;
        Ok(user)
    }

    /// Atomically get the user for this session key, creating them if needed.
    ///
    /// The unique index on `session_key` makes concurrent first requests
    /// converge on a single user: the loser of an upsert race sees a
    /// duplicate key error and simply reads the winner's document.
    pub async fn get_or_create(users: &Coll<AnonymousUser>, session_key: &str) -> Result<Self> {
        let filter = doc! { "session_key": session_key };
        let update = doc! {
            "$setOnInsert": { "session_key": session_key }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let user = match users
            .find_one_and_update(filter.clone(), update, options)
            .await
        {
            Ok(user) => user,
            Err(e) if is_duplicate_key_error(&e) => users.find_one(filter, None).await?,
            Err(e) => return Err(e.into()),
        };

        user.ok_or_else(|| {
            Error::Status(
                Status::InternalServerError,
                format!("Failed to create anonymous user for session {session_key}"),
            )
        })
    }
}
