use uuid::Uuid;
use warp::{reject, Filter};

use super::rejection::{Context, Rejection};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::user::AuthenticatedUser;

const BEARER_PREFIX: &str = "Bearer ";

/// Resolves the caller from a bearer session token, rejecting with an
/// authentication error otherwise. Sessions are issued elsewhere; this
/// backend only looks them up.
pub fn authenticate<O: Clone + Send + Sync + 'static>(
    environment: Environment<O>,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = reject::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let environment = environment.clone();

        async move {
            let error_handler = |e: BackendError| Rejection::new(Context::auth(), e);

            let token = header
                .as_deref()
                .and_then(bearer_token)
                .ok_or(BackendError::MissingCredentials)
                .map_err(error_handler)?;

            let token = Uuid::parse_str(token)
                .map_err(|_| BackendError::InvalidSession)
                .map_err(error_handler)?;

            let user = environment
                .db
                .lookup_session(&token)
                .await
                .map_err(error_handler)?
                .ok_or(BackendError::InvalidSession)
                .map_err(error_handler)?;

            Ok::<_, reject::Rejection>(user)
        }
    })
}

fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix(BEARER_PREFIX).map(str::trim)
}
