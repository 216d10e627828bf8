pub mod test_db {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};

    use crate::auth::{Principal, Role, User};
    use crate::catalog::repository::{insert_category, insert_product};
    use crate::db::insert_user;
    use crate::error::AppError;
    use crate::models::ProductInput;
    use crate::telemetry::init_test_tracing;

    pub const STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        categories: Vec<String>,
        products: Vec<TestProduct>,
    }

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestProduct {
        pub name: String,
        pub price: f64,
        pub category: String,
        pub image: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn customer(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::Customer,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn admin(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn category(mut self, name: &str) -> Self {
            self.categories.push(name.to_string());
            self
        }

        /// Adds a product in `category`, which must also be added with
        /// [`TestDbBuilder::category`].
        pub fn product(mut self, name: &str, price: f64, category: &str, image: &str) -> Self {
            self.products.push(TestProduct {
                name: name.to_string(),
                price,
                category: category.to_string(),
                image: image.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_tracing();

            // One connection that never closes, so the in-memory database
            // lives as long as the pool.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_ids = HashMap::new();
            for user in &self.users {
                let hash = bcrypt::hash(&user.password, bcrypt::MIN_COST)?;
                let id = insert_user(&pool, &user.username, &hash, user.role).await?;
                user_ids.insert(user.username.clone(), id);
            }

            let mut category_ids = HashMap::new();
            for name in &self.categories {
                let id = insert_category(&pool, name).await?;
                category_ids.insert(name.clone(), id);
            }

            let mut product_ids = HashMap::new();
            for product in &self.products {
                let category_id = *category_ids.get(&product.category).ok_or_else(|| {
                    AppError::Internal(format!("unknown test category {}", product.category))
                })?;
                let input = ProductInput {
                    name: product.name.clone(),
                    price: product.price,
                    category_id,
                };
                let id = insert_product(&pool, &input, &product.image).await?;
                product_ids.insert(product.name.clone(), id);
            }

            let upload_dir =
                std::env::temp_dir().join(format!("shop-catalog-test-{}", uuid::Uuid::new_v4()));

            Ok(TestDb {
                pool,
                upload_dir,
                user_ids,
                category_ids,
                product_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub upload_dir: PathBuf,
        user_ids: HashMap<String, i64>,
        category_ids: HashMap<String, i64>,
        product_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> i64 {
            self.user_ids[username]
        }

        pub fn category_id(&self, name: &str) -> i64 {
            self.category_ids[name]
        }

        pub fn product_id(&self, name: &str) -> i64 {
            self.product_ids[name]
        }

        pub fn upload_path(&self, file_name: &str) -> PathBuf {
            self.upload_dir.join(file_name)
        }

        pub fn upload_dir(&self) -> &Path {
            &self.upload_dir
        }

        /// The principal a logged in `username` would act as.
        pub fn principal(&self, username: &str, role: Role) -> Principal {
            Principal::User(User {
                id: self.user_id(username),
                username: username.to_string(),
                role,
            })
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .expect("count rows")
        }

        pub async fn count_users_named(&self, username: &str) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .expect("count users")
        }

        pub async fn count_sessions_for(&self, username: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM user_sessions s JOIN users u ON u.id = s.user_id
                 WHERE u.username = ?",
            )
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .expect("count sessions")
        }
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.upload_dir);
        }
    }

    /// Shop with one admin, one customer, two categories and three products.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user")
            .customer("customer_user")
            .category("Clothing")
            .category("Shoes")
            .product("Red Shirt", 19.99, "Clothing", "red-shirt.png")
            .product("Blue shirting fabric", 7.5, "Clothing", "fabric.png")
            .product("Pants", 35.0, "Clothing", "pants.png")
            .build()
            .await
            .expect("Failed to build standard test database")
    }
}

pub mod test_utils {
    use rocket::figment::Figment;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    use crate::init_rocket;

    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder, create_standard_test_db};

    const BOUNDARY: &str = "X-SHOP-CATALOG-TEST-BOUNDARY";

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with(test_db, |figment| figment).await
    }

    /// Like [`setup_test_client`], with `configure` applied to the figment
    /// last.
    pub async fn setup_test_client_with(
        test_db: TestDb,
        configure: impl FnOnce(Figment) -> Figment,
    ) -> (Client, TestDb) {
        let figment = rocket::Config::figment()
            .merge(("template_dir", concat!(env!("CARGO_MANIFEST_DIR"), "/templates")))
            .merge(("upload_dir", test_db.upload_dir().to_path_buf()))
            .merge(("session_ttl_hours", 1));
        let figment = configure(figment);

        let rocket = init_rocket(figment, test_db.pool.clone()).expect("valid rocket instance");
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    /// Logs in through the form; the tracked client keeps the session cookie.
    pub async fn login_test_user(client: &Client, username: &str, password: &str) {
        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body(format!("username={}&password={}", username, password))
            .dispatch()
            .await;

        assert_eq!(
            response.status(),
            Status::SeeOther,
            "login as {} should redirect",
            username
        );
    }

    pub struct UploadFile<'a> {
        pub field: &'a str,
        pub file_name: &'a str,
        pub bytes: &'a [u8],
    }

    /// Encodes a `multipart/form-data` body from text fields and files.
    pub fn multipart_body(fields: &[(&str, &str)], files: &[UploadFile<'_>]) -> (ContentType, Vec<u8>) {
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        for file in files {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    file.field, file.file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
            body.extend_from_slice(file.bytes);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let content_type =
            ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY));
        (content_type, body)
    }
}
