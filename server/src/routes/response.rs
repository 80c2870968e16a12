use serde::Serialize;

use crate::pagination::Pagination;
use crate::recipe::Recipe;

/// The success envelope: `{success: true, message?, data?}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Envelope {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Envelope {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Envelope {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// A page of recipes plus its pagination metadata.
#[derive(Debug, Serialize)]
pub struct RecipeListing {
    pub recipes: Vec<Recipe>,
    pub pagination: Pagination,
}

/// Build info served on the admin health endpoint.
#[derive(Debug, Serialize)]
pub struct Healthz<'a> {
    pub service: &'a str,
    pub revision: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub version: &'a str,
}
