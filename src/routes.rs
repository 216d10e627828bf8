use rocket::State;
use rocket::form::error::ErrorKind;
use rocket::form::{self, Context, Contextual, Form};
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::Request;
use rocket_dyn_templates::{Template, context};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::auth::{AdminUser, Principal};
use crate::catalog::{Catalog, ImageSource};
use crate::error::AppError;
use crate::models::{Product, ProductInput};
use crate::validation::{FormErrors, ValidateForm};

/// What a page handler can answer with.
#[derive(Responder)]
pub enum Page {
    Redirect(Redirect),
    Rejected(Custom<Template>),
    Failed(AppError),
}

#[get("/?<min_price>&<max_price>")]
pub async fn index(
    min_price: Option<f64>,
    max_price: Option<f64>,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    let products = catalog.list(min_price, max_price).await?;
    let categories = catalog.list_categories().await?;

    Ok(Template::render(
        "index",
        context! {
            title: "Products",
            viewer: principal.viewer(),
            products: products,
            categories: categories,
            min_price: min_price,
            max_price: max_price,
        },
    ))
}

#[get("/product/<product_id>")]
pub async fn view_product(
    product_id: i64,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    let product = catalog.get(product_id).await?;
    let category = match catalog.get_category(product.category_id).await {
        Ok(category) => Some(category),
        Err(AppError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    Ok(Template::render(
        "product",
        context! {
            title: product.name.clone(),
            viewer: principal.viewer(),
            product: product,
            category: category,
        },
    ))
}

#[get("/search/<name>")]
pub async fn search(
    name: &str,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    let products = catalog.search(name).await?;

    Ok(Template::render(
        "search",
        context! {
            title: format!("Search: {}", name),
            viewer: principal.viewer(),
            query: name,
            products: products,
        },
    ))
}

#[get("/search?<q>")]
pub fn search_box(q: Option<&str>) -> Redirect {
    match q.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => Redirect::to(uri!(search(q))),
        None => Redirect::to(uri!(index(_, _))),
    }
}

#[get("/category/<category_id>")]
pub async fn category(
    category_id: i64,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    let products = catalog.by_category(category_id).await?;
    let categories = catalog.list_categories().await?;
    let current = categories.iter().find(|c| c.id == category_id).cloned();

    Ok(Template::render(
        "index",
        context! {
            title: current.as_ref().map(|c| c.name.clone()).unwrap_or_else(|| "Products".to_string()),
            viewer: principal.viewer(),
            products: products,
            categories: categories,
            current_category: current,
        },
    ))
}

#[derive(FromForm)]
pub struct ProductForm<'r> {
    name: String,
    price: f64,
    category_id: i64,
    image: form::Result<'r, TempFile<'r>>,
}

impl<'r> ProductForm<'r> {
    fn input(&self) -> ProductInput {
        ProductInput {
            name: self.name.trim().to_string(),
            price: self.price,
            category_id: self.category_id,
        }
    }

    /// The uploaded image, `None` when the field was left out. An upload
    /// Rocket refused, such as one over the size limit, is a form error.
    fn image(&mut self) -> Result<Option<&mut TempFile<'r>>, FormErrors> {
        match &mut self.image {
            Ok(file) => Ok(Some(file)),
            Err(errors) if errors.iter().all(|e| matches!(e.kind, ErrorKind::Missing)) => Ok(None),
            Err(errors) => Err(FormErrors::from_form_errors(errors.iter(), "image")),
        }
    }
}

/// Values shown in the product form's fields.
#[derive(Default, Serialize)]
struct ProductFields {
    name: String,
    price: String,
    category_id: Option<i64>,
}

impl From<&ProductInput> for ProductFields {
    fn from(input: &ProductInput) -> Self {
        Self {
            name: input.name.clone(),
            price: input.price.to_string(),
            category_id: Some(input.category_id),
        }
    }
}

impl ProductFields {
    /// What the user typed, for a submission that did not parse.
    fn submitted(context: &Context<'_>) -> Self {
        Self {
            name: context.field_value("name").unwrap_or_default().to_string(),
            price: context.field_value("price").unwrap_or_default().to_string(),
            category_id: context.field_value("category_id").and_then(|v| v.parse().ok()),
        }
    }
}

async fn render_product_form(
    catalog: &Catalog,
    principal: &Principal,
    template: &'static str,
    product_id: Option<i64>,
    fields: &ProductFields,
    errors: &FormErrors,
) -> Result<Template, AppError> {
    let categories = catalog.list_categories().await?;

    Ok(Template::render(
        template,
        context! {
            title: if product_id.is_some() { "Edit product" } else { "Add product" },
            viewer: principal.viewer(),
            categories: categories,
            product_id: product_id,
            name: &fields.name,
            price: &fields.price,
            category_id: fields.category_id,
            errors: errors,
        },
    ))
}

async fn reject_product_form(
    catalog: &Catalog,
    principal: &Principal,
    template: &'static str,
    product_id: Option<i64>,
    fields: &ProductFields,
    errors: FormErrors,
) -> Page {
    match render_product_form(catalog, principal, template, product_id, fields, &errors).await {
        Ok(page) => Page::Rejected(Custom(Status::UnprocessableEntity, page)),
        Err(e) => Page::Failed(e),
    }
}

/// Re-renders a submission Rocket could not parse, with its errors inline.
async fn reject_unparsed_form(
    catalog: &Catalog,
    principal: &Principal,
    template: &'static str,
    product_id: Option<i64>,
    context: &Context<'_>,
) -> Page {
    let errors = FormErrors::from_form_errors(context.errors(), "form");
    warn!(?errors, "Product form did not parse");
    let fields = ProductFields::submitted(context);
    reject_product_form(catalog, principal, template, product_id, &fields, errors).await
}

#[get("/add_product")]
pub async fn add_product_form(
    _admin: AdminUser,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    render_product_form(
        catalog,
        &principal,
        "add_product",
        None,
        &ProductFields::default(),
        &FormErrors::default(),
    )
    .await
}

#[instrument(skip_all)]
#[post("/add_product", data = "<form>")]
pub async fn add_product(
    admin: AdminUser,
    principal: Principal,
    form: Form<Contextual<'_, ProductForm<'_>>>,
    catalog: &State<Catalog>,
) -> Page {
    let Contextual { value, context } = form.into_inner();
    let Some(mut form) = value else {
        return reject_unparsed_form(catalog, &principal, "add_product", None, &context).await;
    };

    let input = form.input();
    let fields = ProductFields::from(&input);
    if let Err(errors) = input.validate_form() {
        return reject_product_form(catalog, &principal, "add_product", None, &fields, errors)
            .await;
    }

    let image = match form.image() {
        Ok(Some(image)) => image,
        Ok(None) => {
            let errors = FormErrors::with_error("image", "An image is required");
            return reject_product_form(catalog, &principal, "add_product", None, &fields, errors)
                .await;
        }
        Err(errors) => {
            return reject_product_form(catalog, &principal, "add_product", None, &fields, errors)
                .await;
        }
    };

    match catalog.create(&admin.0, &input, image).await {
        Ok(product) => {
            info!(product_id = product.id, "Product added");
            Page::Redirect(Redirect::to(uri!(index(_, _))))
        }
        Err(e) => match FormErrors::from_app_error(e, "form") {
            Ok(errors) => {
                reject_product_form(catalog, &principal, "add_product", None, &fields, errors)
                    .await
            }
            Err(e) => Page::Failed(e),
        },
    }
}

#[get("/edit_product/<product_id>")]
pub async fn edit_product_form(
    product_id: i64,
    _admin: AdminUser,
    principal: Principal,
    catalog: &State<Catalog>,
) -> Result<Template, AppError> {
    let product: Product = catalog.get(product_id).await?;
    let categories = catalog.list_categories().await?;
    Ok(Template::render(
        "edit_product",
        context! {
            title: "Edit product",
            viewer: principal.viewer(),
            categories: categories,
            product_id: product_id,
            name: product.name,
            price: product.price,
            category_id: product.category_id,
            image: product.image,
            errors: FormErrors::default(),
        },
    ))
}

#[instrument(skip_all, fields(product_id = product_id))]
#[post("/edit_product/<product_id>", data = "<form>")]
pub async fn edit_product(
    product_id: i64,
    admin: AdminUser,
    principal: Principal,
    form: Form<Contextual<'_, ProductForm<'_>>>,
    catalog: &State<Catalog>,
) -> Page {
    let template = "edit_product";
    let Contextual { value, context } = form.into_inner();
    let Some(mut form) = value else {
        return reject_unparsed_form(catalog, &principal, template, Some(product_id), &context)
            .await;
    };

    let input = form.input();
    let fields = ProductFields::from(&input);
    if let Err(errors) = input.validate_form() {
        return reject_product_form(catalog, &principal, template, Some(product_id), &fields, errors)
            .await;
    }

    let image = match form.image() {
        Ok(image) => image.map(|f| f as &mut dyn ImageSource),
        Err(errors) => {
            return reject_product_form(
                catalog,
                &principal,
                template,
                Some(product_id),
                &fields,
                errors,
            )
            .await;
        }
    };

    match catalog.update(&admin.0, product_id, &input, image).await {
        Ok(_) => Page::Redirect(Redirect::to(uri!(index(_, _)))),
        Err(e) => match FormErrors::from_app_error(e, "form") {
            Ok(errors) => {
                reject_product_form(
                    catalog,
                    &principal,
                    template,
                    Some(product_id),
                    &fields,
                    errors,
                )
                .await
            }
            Err(e) => Page::Failed(e),
        },
    }
}

#[get("/delete_product/<product_id>")]
pub async fn delete_product(
    product_id: i64,
    admin: AdminUser,
    catalog: &State<Catalog>,
) -> Result<Redirect, AppError> {
    catalog.delete(&admin.0, product_id).await?;
    Ok(Redirect::to(uri!(index(_, _))))
}

#[get("/404")]
pub async fn page_not_found(principal: Principal) -> Custom<Template> {
    Custom(Status::NotFound, not_found_page(&principal))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

fn not_found_page(principal: &Principal) -> Template {
    Template::render(
        "404",
        context! {
            title: "Page not found",
            viewer: principal.viewer(),
        },
    )
}

async fn request_principal(req: &Request<'_>) -> Principal {
    req.guard::<Principal>()
        .await
        .succeeded()
        .unwrap_or(Principal::Anonymous)
}

#[catch(404)]
pub async fn not_found(req: &Request<'_>) -> Template {
    let principal = request_principal(req).await;
    not_found_page(&principal)
}

#[catch(413)]
pub async fn payload_too_large(req: &Request<'_>) -> Template {
    let principal = request_principal(req).await;
    Template::render(
        "error",
        context! {
            title: "Upload too large",
            viewer: principal.viewer(),
            message: "The submitted data is larger than this site accepts.",
        },
    )
}

#[catch(422)]
pub async fn unprocessable(req: &Request<'_>) -> Template {
    let principal = request_principal(req).await;
    Template::render(
        "error",
        context! {
            title: "Invalid request",
            viewer: principal.viewer(),
            message: "The submitted data could not be understood.",
        },
    )
}

#[catch(500)]
pub async fn internal_error(req: &Request<'_>) -> Template {
    let principal = request_principal(req).await;
    Template::render(
        "error",
        context! {
            title: "Something went wrong",
            viewer: principal.viewer(),
            message: "An unexpected error occurred. Please try again later.",
        },
    )
}
