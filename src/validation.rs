use rocket::data::ByteUnit;
use rocket::form::error::ErrorKind;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;
use validator::Validate;

use crate::error::AppError;

/// Field name to messages, rendered inline on the form that was submitted.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self(errors)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Folds a service error into form errors, for the kinds a user can fix
    /// by editing the form. Anything else stays an `AppError`.
    pub fn from_app_error(err: AppError, field: &str) -> Result<Self, AppError> {
        match err {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Authentication(msg) => {
                tracing::warn!(message = %msg, field = %field, "Form rejected");
                Ok(Self::with_error(field, &msg))
            }
            other => Err(other),
        }
    }

    /// Folds the errors Rocket raised while parsing a form. Errors that
    /// carry no field name are filed under `field`.
    pub fn from_form_errors<'a, 'v: 'a>(
        errors: impl IntoIterator<Item = &'a rocket::form::Error<'v>>,
        field: &str,
    ) -> Self {
        let mut error_map: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for error in errors {
            let name = error
                .name
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_else(|| field.to_string());
            error_map
                .entry(name)
                .or_default()
                .push(form_error_message(&error.kind));
        }

        Self(error_map)
    }
}

fn form_error_message(kind: &ErrorKind<'_>) -> String {
    match kind {
        ErrorKind::Missing => "This field is required".to_string(),
        ErrorKind::Int(_) | ErrorKind::Float(_) => "Must be a number".to_string(),
        ErrorKind::InvalidLength { max: Some(max), .. } => {
            format!("Must be at most {}", ByteUnit::from(*max))
        }
        other => other.to_string(),
    }
}

impl From<validator::ValidationErrors> for FormErrors {
    #[instrument]
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut error_map = BTreeMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Self(error_map)
    }
}

pub trait ValidateForm {
    fn validate_form(&self) -> Result<(), FormErrors>;
}

impl<T: Validate> ValidateForm for T {
    fn validate_form(&self) -> Result<(), FormErrors> {
        self.validate().map_err(FormErrors::from)
    }
}
