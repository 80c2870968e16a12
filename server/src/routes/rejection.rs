use serde::Serialize;
use warp::reject;

use crate::errors::{BackendError, FieldError};

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            success: false,
            context: self.context.clone(),
            message: format!("{}", self.error),
            errors: self.error.field_errors().map(|e| e.to_vec()),
        }
    }
}

impl reject::Reject for Rejection {}

/// The error envelope: `{success: false, operation, message, errors?}`.
#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    pub(crate) success: bool,
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errors: Option<Vec<FieldError>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Context {
    Auth,
    List,
    Popular,
    Retrieve { id: String },
    Create,
    Update { id: String },
    Delete { id: String },
    Rate { id: String },
    MyRecipes,
    AddFavorite { id: String },
    RemoveFavorite { id: String },
    Favorites,
}

impl Context {
    pub fn auth() -> Context {
        Context::Auth
    }

    pub fn list() -> Context {
        Context::List
    }

    pub fn popular() -> Context {
        Context::Popular
    }

    pub fn retrieve(id: String) -> Context {
        Context::Retrieve { id }
    }

    pub fn create() -> Context {
        Context::Create
    }

    pub fn update(id: String) -> Context {
        Context::Update { id }
    }

    pub fn delete(id: String) -> Context {
        Context::Delete { id }
    }

    pub fn rate(id: String) -> Context {
        Context::Rate { id }
    }

    pub fn my_recipes() -> Context {
        Context::MyRecipes
    }

    pub fn add_favorite(id: String) -> Context {
        Context::AddFavorite { id }
    }

    pub fn remove_favorite(id: String) -> Context {
        Context::RemoveFavorite { id }
    }

    pub fn favorites() -> Context {
        Context::Favorites
    }
}
