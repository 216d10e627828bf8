use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket_dyn_templates::{Template, context};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::routes::Page;
use crate::validation::{FormErrors, ValidateForm};

use super::{Accounts, Principal, SESSION_COOKIE};

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+$").unwrap());

#[derive(FromForm, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(FromForm, Validate)]
pub struct RegisterForm {
    #[validate(
        length(min = 1, max = 64, message = "Username must be between 1 and 64 characters"),
        regex(path = *USERNAME_REGEX, message = "Username cannot contain spaces")
    )]
    username: String,
    #[validate(length(min = 1, max = 128, message = "Password must be between 1 and 128 characters"))]
    password: String,
}

fn login_page(principal: &Principal, username: &str, errors: &FormErrors) -> Template {
    Template::render(
        "login",
        context! {
            title: "Login",
            viewer: principal.viewer(),
            username: username,
            errors: errors,
        },
    )
}

fn register_page(principal: &Principal, username: &str, errors: &FormErrors) -> Template {
    Template::render(
        "register",
        context! {
            title: "Register",
            viewer: principal.viewer(),
            username: username,
            errors: errors,
        },
    )
}

#[get("/login")]
pub fn login(principal: Principal) -> Template {
    login_page(&principal, "", &FormErrors::default())
}

#[instrument(skip_all, fields(username = %form.username))]
#[post("/login", data = "<form>")]
pub async fn process_login(
    principal: Principal,
    form: Form<LoginForm>,
    accounts: &State<Accounts>,
    cookies: &CookieJar<'_>,
) -> Page {
    if let Err(errors) = form.validate_form() {
        return Page::Rejected(Custom(
            Status::UnprocessableEntity,
            login_page(&principal, &form.username, &errors),
        ));
    }

    match accounts.login(&form.username, &form.password).await {
        Ok(session) => {
            let previous = cookies
                .get_private(SESSION_COOKIE)
                .map(|c| c.value().to_string());
            if let Err(e) = accounts.logout(previous.as_deref()).await {
                return Page::Failed(e);
            }

            let max_age = rocket::time::Duration::seconds(accounts.session_ttl().num_seconds());
            cookies.add_private(
                Cookie::build((SESSION_COOKIE, session.token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(max_age),
            );
            info!(user_id = session.user.id, "Login successful");
            Page::Redirect(Redirect::to("/"))
        }
        Err(AppError::Authentication(msg)) => {
            let errors = FormErrors::with_error("form", &msg);
            Page::Rejected(Custom(
                Status::Unauthorized,
                login_page(&principal, &form.username, &errors),
            ))
        }
        Err(e) => Page::Failed(e),
    }
}

#[get("/register")]
pub fn register(principal: Principal) -> Template {
    register_page(&principal, "", &FormErrors::default())
}

#[instrument(skip_all, fields(username = %form.username))]
#[post("/register", data = "<form>")]
pub async fn process_register(
    principal: Principal,
    form: Form<RegisterForm>,
    accounts: &State<Accounts>,
) -> Page {
    if let Err(errors) = form.validate_form() {
        return Page::Rejected(Custom(
            Status::UnprocessableEntity,
            register_page(&principal, &form.username, &errors),
        ));
    }

    match accounts.register(&form.username, &form.password).await {
        Ok(_) => Page::Redirect(Redirect::to(uri!(login))),
        Err(AppError::Conflict(msg)) => {
            let errors = FormErrors::with_error("username", &msg);
            Page::Rejected(Custom(
                Status::Conflict,
                register_page(&principal, &form.username, &errors),
            ))
        }
        Err(e) => Page::Failed(e),
    }
}

#[get("/logout")]
pub async fn logout(cookies: &CookieJar<'_>, accounts: &State<Accounts>) -> Result<Redirect, AppError> {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string());

    accounts.logout(token.as_deref()).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Ok(Redirect::to("/"))
}
