use serde::de::DeserializeOwned;

use crate::model::{
    db::admin::Admin,
    mongodb::{Id, MongoCollection},
};

/// A user of our application that can hold an [`super::AuthToken`].
///
/// The token guard checks the user still exists in this type's collection.
pub trait User: MongoCollection + DeserializeOwned + Unpin + Send + Sync {
    /// Get the user's ID.
    fn id(&self) -> Id;
}

impl User for Admin {
    fn id(&self) -> Id {
        self.id
    }
}
