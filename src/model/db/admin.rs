use std::ops::{Deref, DerefMut};

use mongodb::{bson::doc, error::Error as DbError};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::admin::AdminCredentials,
    mongodb::{Coll, Id},
};

/// Username of the administrator created when the database has none.
pub const DEFAULT_ADMIN_USERNAME: &str = "testadmin";
/// Initial password of the default administrator. Change it after first login.
pub const DEFAULT_ADMIN_PASSWORD: &str = "testadmin";

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    ///
    /// A malformed stored hash never verifies.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

/// Ensure at least one admin exists, creating the default one if not.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(admins: &Coll<NewAdmin>) -> Result<(), DbError> {
    if admins.count_documents(None, None).await? > 0 {
        return Ok(());
    }

    let credentials = AdminCredentials {
        username: DEFAULT_ADMIN_USERNAME.to_string(),
        password: DEFAULT_ADMIN_PASSWORD.to_string(),
    };
    let admin = NewAdmin::try_from(credentials).expect("Default admin credentials are valid");
    admins.insert_one(admin, None).await?;
    warn!("No admins found, created default admin '{DEFAULT_ADMIN_USERNAME}'");
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl AdminCore {
        /// The admin that [`AdminCredentials::example`] logs in as.
        pub fn example() -> Self {
            Self::try_from(AdminCredentials::example()).unwrap()
        }
    }
}
