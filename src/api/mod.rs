use rocket::Route;

mod answers;
pub mod auth;
mod polls;
mod questions;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(polls::routes());
    routes.extend(questions::routes());
    routes.extend(answers::routes());
    routes
}
