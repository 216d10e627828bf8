use serde::Serialize;
use validator::Validate;

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    #[sqlx(rename = "img")]
    pub image: String,
    pub category_id: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
}

/// Every editable field of a product except its image.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    pub category_id: i64,
}
