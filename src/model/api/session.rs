use rand::{distributions::Alphanumeric, Rng};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};

use crate::config::Config;

pub const SESSION_COOKIE: &str = "sessionid";
pub const SESSION_KEY_LENGTH: usize = 32;

/// The opaque key identifying an anonymous respondent's browser session.
///
/// Read from the private session cookie; if there is none, a fresh key is
/// generated and the cookie set on the response.
#[derive(Debug, Clone)]
pub struct AnonymousSession {
    key: String,
}

impl AnonymousSession {
    fn generate() -> Self {
        let key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_KEY_LENGTH)
            .map(char::from)
            .collect();
        Self { key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn into_cookie(self, config: &Config) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, self.key)
            .max_age(Duration::seconds(config.session_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AnonymousSession {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cookies = req.cookies();
        if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
            return Outcome::Success(Self {
                key: cookie.value().to_string(),
            });
        }

        let config = match req.guard::<&State<Config>>().await {
            Outcome::Success(config) => config,
            _ => return Outcome::Failure((Status::InternalServerError, ())),
        };
        let session = Self::generate();
        debug!("Starting new anonymous session");
        cookies.add_private(session.clone().into_cookie(config));
        Outcome::Success(session)
    }
}
