use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::Admin;
use crate::error::AppError;
use crate::models::{Product, ProductCategory, ProductInput};

use super::images::{ImageSource, ImageStore};
use super::repository;

/// Browsing and administration of the product catalog.
pub struct Catalog {
    pool: Pool<Sqlite>,
    images: ImageStore,
}

impl Catalog {
    pub fn new(pool: Pool<Sqlite>, images: ImageStore) -> Self {
        Self { pool, images }
    }

    /// Lists products, filtered to `min_price..=max_price` only when both
    /// bounds are given. A lone bound is ignored.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        min_price: Option<f64>,
        max_price: Option<f64>,
    ) -> Result<Vec<Product>, AppError> {
        match (min_price, max_price) {
            (Some(min), Some(max)) => {
                repository::products_in_price_range(&self.pool, min, max).await
            }
            _ => repository::all_products(&self.pool).await,
        }
    }

    pub async fn search(&self, needle: &str) -> Result<Vec<Product>, AppError> {
        repository::products_matching_name(&self.pool, needle).await
    }

    pub async fn by_category(&self, category_id: i64) -> Result<Vec<Product>, AppError> {
        repository::products_in_category(&self.pool, category_id).await
    }

    pub async fn get(&self, product_id: i64) -> Result<Product, AppError> {
        repository::find_product(&self.pool, product_id)
            .await?
            .ok_or_else(|| product_not_found(product_id))
    }

    pub async fn list_categories(&self) -> Result<Vec<ProductCategory>, AppError> {
        repository::all_categories(&self.pool).await
    }

    pub async fn get_category(&self, category_id: i64) -> Result<ProductCategory, AppError> {
        repository::find_category(&self.pool, category_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Category with id {} not found", category_id))
            })
    }

    pub async fn create_category(&self, name: &str) -> Result<ProductCategory, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "Category name cannot be empty".to_string(),
            ));
        }
        let id = repository::insert_category(&self.pool, name).await?;
        info!(category_id = id, "category_created");
        Ok(ProductCategory {
            id,
            name: name.to_string(),
        })
    }

    /// Inserts the product and stores its image. The row is only committed
    /// once the image has been written.
    #[instrument(skip(self, image), fields(admin_id = admin.user_id()))]
    pub async fn create(
        &self,
        admin: &Admin,
        input: &ProductInput,
        image: &mut dyn ImageSource,
    ) -> Result<Product, AppError> {
        validate_input(input)?;
        if image.is_empty() {
            return Err(AppError::Validation("An image is required".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        ensure_category(&mut tx, input.category_id).await?;

        let file_name = self.images.store(image).await?;
        let id = repository::insert_product(&mut *tx, input, &file_name).await?;
        tx.commit().await?;

        info!(product_id = id, "product_created");
        Ok(Product {
            id,
            name: input.name.clone(),
            price: input.price,
            image: file_name,
            category_id: input.category_id,
        })
    }

    /// Replaces name, price and category. The image changes only when a
    /// non-empty upload is supplied.
    #[instrument(skip(self, image), fields(admin_id = admin.user_id()))]
    pub async fn update(
        &self,
        admin: &Admin,
        product_id: i64,
        input: &ProductInput,
        image: Option<&mut dyn ImageSource>,
    ) -> Result<Product, AppError> {
        validate_input(input)?;

        let mut tx = self.pool.begin().await?;
        let existing = repository::find_product(&mut *tx, product_id)
            .await?
            .ok_or_else(|| product_not_found(product_id))?;
        ensure_category(&mut tx, input.category_id).await?;

        let file_name = match image {
            Some(image) if !image.is_empty() => self.images.store(image).await?,
            _ => existing.image,
        };

        repository::update_product(&mut *tx, product_id, input, &file_name).await?;
        tx.commit().await?;

        info!(product_id, "product_updated");
        Ok(Product {
            id: product_id,
            name: input.name.clone(),
            price: input.price,
            image: file_name,
            category_id: input.category_id,
        })
    }

    /// Removes the product row. Its image file stays in the image directory.
    #[instrument(skip(self), fields(admin_id = admin.user_id()))]
    pub async fn delete(&self, admin: &Admin, product_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let removed = repository::delete_product(&mut *tx, product_id).await?;
        if removed == 0 {
            return Err(product_not_found(product_id));
        }
        tx.commit().await?;

        info!(product_id, "product_deleted");
        Ok(())
    }
}

fn product_not_found(product_id: i64) -> AppError {
    AppError::NotFound(format!("Product with id {} not found", product_id))
}

fn validate_input(input: &ProductInput) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if !input.price.is_finite() {
        return Err(AppError::Validation("Price must be a number".to_string()));
    }
    Ok(())
}

async fn ensure_category(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    category_id: i64,
) -> Result<(), AppError> {
    match repository::find_category(&mut **tx, category_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::Validation(format!(
            "Category {} does not exist",
            category_id
        ))),
    }
}
