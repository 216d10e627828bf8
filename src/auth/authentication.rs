use rocket::Request;
use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use tracing::Instrument;

use super::{Accounts, Admin, Principal};

pub const SESSION_COOKIE: &str = "session_token";

async fn resolve_principal(request: &Request<'_>) -> Result<Principal, Status> {
    let token = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string());

    let accounts = match request.rocket().state::<Accounts>() {
        Some(accounts) => accounts,
        _ => {
            tracing::error!("Account service not found in managed state");
            return Err(Status::InternalServerError);
        }
    };

    accounts
        .current_principal(token.as_deref())
        .await
        .map_err(|e| e.to_status_with_log("Resolving request principal"))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let resolved = request
            .local_cache_async(async {
                resolve_principal(request)
                    .instrument(tracing::info_span!("principal_guard"))
                    .await
            })
            .await;

        match resolved {
            Ok(principal) => {
                if let Some(user) = principal.user() {
                    tracing::debug!(username = %user.username, role = %user.role.as_str(), "User authenticated via session token");
                }
                Outcome::Success(principal.clone())
            }
            Err(status) => Outcome::Error((*status, ())),
        }
    }
}

/// Request guard for catalog administration routes. Anyone else gets a 403,
/// which the `forbidden` catcher turns into the not-found redirect.
pub struct AdminUser(pub Admin);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let principal = try_outcome!(request.guard::<Principal>().await);

        match principal.require_admin() {
            Ok(admin) => Outcome::Success(AdminUser(admin)),
            Err(err) => {
                err.log_and_record(&format!("Admin guard on {}", request.uri()));
                Outcome::Error((Status::Forbidden, ()))
            }
        }
    }
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Redirect {
    tracing::warn!("Forbidden access attempt");
    Redirect::to(uri!("/404"))
}
