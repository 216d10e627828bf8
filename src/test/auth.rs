#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::http::{ContentType, Cookie, Status};

    use crate::auth::{Accounts, Principal, Role, SESSION_COOKIE};
    use crate::error::AppError;
    use crate::test::test_db::TestDbBuilder;
    use crate::test::test_utils::{
        STANDARD_PASSWORD, create_standard_test_db, login_test_user, setup_test_client,
    };

    #[rocket::async_test]
    async fn test_register_twice_is_conflict() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let accounts = Accounts::new(test_db.pool.clone(), Duration::hours(1));

        let user = accounts.register("bob", "secret").await.expect("First registration");
        assert_eq!(user.role, Role::Customer);

        let second = accounts.register("bob", "other").await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(test_db.count_users_named("bob").await, 1);
    }

    #[rocket::async_test]
    async fn test_usernames_are_case_sensitive() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let accounts = Accounts::new(test_db.pool.clone(), Duration::hours(1));

        accounts.register("Alice", "pw1").await.unwrap();
        accounts.register("alice", "pw1").await.unwrap();

        assert_eq!(test_db.count("users").await, 2);
        assert!(accounts.login("ALICE", "pw1").await.is_err());
    }

    #[rocket::async_test]
    async fn test_login_failures_are_indistinguishable() {
        let test_db = TestDbBuilder::new().customer("carol").build().await.unwrap();
        let accounts = Accounts::new(test_db.pool.clone(), Duration::hours(1));

        let wrong_password = accounts.login("carol", "nope").await.unwrap_err();
        let unknown_user = accounts.login("nobody", "nope").await.unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, AppError::Authentication(_)));
        assert_eq!(test_db.count("user_sessions").await, 0);
    }

    #[rocket::async_test]
    async fn test_login_session_resolves_to_user() {
        let test_db = TestDbBuilder::new().admin("dave").build().await.unwrap();
        let accounts = Accounts::new(test_db.pool.clone(), Duration::hours(2));

        let session = accounts.login("dave", STANDARD_PASSWORD).await.unwrap();
        let principal = accounts.current_principal(Some(&session.token)).await.unwrap();

        assert_eq!(principal.user().map(|u| u.username.as_str()), Some("dave"));
        assert_eq!(principal.role(), Some(Role::Admin));

        accounts.logout(Some(&session.token)).await.unwrap();
        let after = accounts.current_principal(Some(&session.token)).await.unwrap();
        assert_eq!(after, Principal::Anonymous);
    }

    #[rocket::async_test]
    async fn test_logout_without_session_succeeds() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let accounts = Accounts::new(test_db.pool.clone(), Duration::hours(1));

        assert!(accounts.logout(None).await.is_ok());
        assert!(accounts.logout(Some("never-issued")).await.is_ok());
    }

    #[rocket::async_test]
    async fn test_register_and_login_flow() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/register")
            .header(ContentType::Form)
            .body("username=alice&password=pw1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/login"));

        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body("username=alice&password=pw1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/"));
        assert!(response.cookies().get_private(SESSION_COOKIE).is_some());
        assert_eq!(test_db.count_sessions_for("alice").await, 1);

        let body = client.get("/").dispatch().await.into_string().await.unwrap();
        assert!(body.contains("alice"));
        assert!(body.contains("Log out"));

        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body("username=alice&password=wrong")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body = response.into_string().await.unwrap();
        assert!(body.contains("Invalid username or password"));
        assert_eq!(test_db.count_sessions_for("alice").await, 1);
    }

    #[rocket::async_test]
    async fn test_register_duplicate_renders_conflict() {
        let test_db = TestDbBuilder::new().customer("erin").build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/register")
            .header(ContentType::Form)
            .body("username=erin&password=anything")
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
        let body = response.into_string().await.unwrap();
        assert!(body.contains("already registered"));
        assert_eq!(test_db.count_users_named("erin").await, 1);
    }

    #[rocket::async_test]
    async fn test_register_rejects_invalid_username() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/register")
            .header(ContentType::Form)
            .body("username=two+words&password=pw1")
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body = response.into_string().await.unwrap();
        assert!(body.contains("Username cannot contain spaces"));
        assert_eq!(test_db.count("users").await, 0);
    }

    #[rocket::async_test]
    async fn test_logout_clears_session() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "customer_user", STANDARD_PASSWORD).await;
        assert_eq!(test_db.count_sessions_for("customer_user").await, 1);

        let response = client.get("/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/"));
        assert_eq!(test_db.count_sessions_for("customer_user").await, 0);

        let body = client.get("/").dispatch().await.into_string().await.unwrap();
        assert!(body.contains("Log in"));
    }

    #[rocket::async_test]
    async fn test_login_again_replaces_previous_session() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "customer_user", STANDARD_PASSWORD).await;
        login_test_user(&client, "customer_user", STANDARD_PASSWORD).await;
        assert_eq!(test_db.count_sessions_for("customer_user").await, 1);

        login_test_user(&client, "admin_user", STANDARD_PASSWORD).await;
        assert_eq!(test_db.count_sessions_for("customer_user").await, 0);
        assert_eq!(test_db.count_sessions_for("admin_user").await, 1);

        let response = client.get("/add_product").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_logout_when_anonymous_redirects() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
    }

    #[rocket::async_test]
    async fn test_forged_session_cookie_is_anonymous() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let forged_cookie = Cookie::build((SESSION_COOKIE, "fake_token")).build();
        let response = client
            .get("/add_product")
            .private_cookie(forged_cookie)
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/404"));
    }
}
