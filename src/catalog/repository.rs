//! Product and category queries. Every function takes the executor it should
//! run on, so callers decide whether it runs inside a transaction.

use sqlx::{Executor, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{Product, ProductCategory, ProductInput};

const PRODUCT_COLUMNS: &str = "id, name, price, img, category_id";

#[instrument(skip(executor))]
pub async fn all_products<'e, E>(executor: E) -> Result<Vec<Product>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting all products");
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
    ))
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[instrument(skip(executor))]
pub async fn products_in_price_range<'e, E>(
    executor: E,
    min_price: f64,
    max_price: f64,
) -> Result<Vec<Product>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting products by price range");
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE price BETWEEN ? AND ?
         ORDER BY id"
    ))
    .bind(min_price)
    .bind(max_price)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Case-insensitive substring match on the product name. `instr` keeps `%`
/// and `_` in the needle literal.
#[instrument(skip(executor))]
pub async fn products_matching_name<'e, E>(
    executor: E,
    needle: &str,
) -> Result<Vec<Product>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Searching products by name");
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE instr(lower(name), lower(?)) > 0
         ORDER BY id"
    ))
    .bind(needle)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[instrument(skip(executor))]
pub async fn products_in_category<'e, E>(
    executor: E,
    category_id: i64,
) -> Result<Vec<Product>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting products by category");
    let rows = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE category_id = ?
         ORDER BY id"
    ))
    .bind(category_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[instrument(skip(executor))]
pub async fn find_product<'e, E>(executor: E, id: i64) -> Result<Option<Product>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching product by ID");
    let row = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

#[instrument(skip(executor))]
pub async fn insert_product<'e, E>(
    executor: E,
    input: &ProductInput,
    image: &str,
) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Creating product");
    let res = sqlx::query(
        "INSERT INTO products (name, price, img, category_id)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(input.price)
    .bind(image)
    .bind(input.category_id)
    .execute(executor)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Overwrites every field of the product. Returns the number of rows touched.
#[instrument(skip(executor))]
pub async fn update_product<'e, E>(
    executor: E,
    id: i64,
    input: &ProductInput,
    image: &str,
) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Updating product");
    let res = sqlx::query(
        "UPDATE products
         SET name = ?, price = ?, img = ?, category_id = ?
         WHERE id = ?",
    )
    .bind(&input.name)
    .bind(input.price)
    .bind(image)
    .bind(input.category_id)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_product<'e, E>(executor: E, id: i64) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Deleting product");
    let res = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn all_categories<'e, E>(executor: E) -> Result<Vec<ProductCategory>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting all categories");
    let rows = sqlx::query_as::<_, ProductCategory>(
        "SELECT id, name FROM product_categories ORDER BY name",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[instrument(skip(executor))]
pub async fn find_category<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<ProductCategory>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching category by ID");
    let row =
        sqlx::query_as::<_, ProductCategory>("SELECT id, name FROM product_categories WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?;

    Ok(row)
}

#[instrument(skip(executor))]
pub async fn insert_category<'e, E>(executor: E, name: &str) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Creating category");
    let res = sqlx::query("INSERT INTO product_categories (name) VALUES (?)")
        .bind(name)
        .execute(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Category '{}' already exists", name))
            }
            other => AppError::Database(other),
        })?;

    Ok(res.last_insert_rowid())
}
