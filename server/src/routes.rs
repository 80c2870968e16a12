use std::sync::Arc;

use log::{error, Logger};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod auth;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum form data size to accept. This should be enforced by
/// the HTTP gateway, so on the Rust side it’s set to an unreasonably
/// large number.
const MAX_CONTENT_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    if let Some(e) = rej.find::<BodyDeserializeError>() {
        error!(logger, "Malformed request body"; "error" => %e);

        return Ok(with_status(
            json(&serde_json::json!({
                "success": false,
                "message": "Malformed request body",
            })),
            StatusCode::BAD_REQUEST,
        ));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        BadRequest
        | Validation { .. }
        | InvalidId(..)
        | PartsMissing
        | MalformedFormSubmission
        | MalformedRecipeMetadata { .. } => StatusCode::BAD_REQUEST,
        MissingCredentials | InvalidSession => StatusCode::UNAUTHORIZED,
        Forbidden => StatusCode::FORBIDDEN,
        NotFound(..) => StatusCode::NOT_FOUND,
        DuplicateFavorite | DuplicateKey { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body, delete, get as g, path as p, path::param as par, post, put, query};

    use super::{auth, handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name<O: Clone + Send + Sync + 'static>(environment: Environment<O>) -> Route {
            let r = environment.urls.recipes_path.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
    (authenticated $name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name<O: Clone + Send + Sync + 'static>(environment: Environment<O>) -> Route {
            let r = environment.urls.recipes_path.clone();
            let session = auth::authenticate(environment.clone());

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and(session)
                .and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_list_route => list, rt; query::<q::ListQuery>(), end(), g());
    route!(make_popular_route => popular, rt; p("popular"), query::<q::PopularQuery>(), end(), g());
    route!(make_retrieve_route => retrieve, rt; par::<String>(), end(), g());
    route!(authenticated make_create_route => create, rt; end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(authenticated make_update_route => update, rt; par::<String>(), end(), put(), form().max_length(MAX_CONTENT_LENGTH));
    route!(authenticated make_delete_route => delete, rt; par::<String>(), end(), delete());
    route!(authenticated make_rate_route => rate, rt; par::<String>(), p("rate"), end(), post(), body::json());
    route!(authenticated make_my_recipes_route => my_recipes, rt; p("user"), p("my-recipes"), query::<q::PageQuery>(), end(), g());
    route!(authenticated make_add_favorite_route => add_favorite, rt; par::<String>(), p("favorite"), end(), post());
    route!(authenticated make_remove_favorite_route => remove_favorite, rt; par::<String>(), p("favorite"), end(), delete());
    route!(authenticated make_favorites_route => favorites, rt; p("user"), p("favorites"), query::<q::PageQuery>(), end(), g());
}
