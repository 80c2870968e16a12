use std::time::{Duration, Instant};

use log::{debug, warn};
use uuid::Uuid;
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::{Environment, SafeStore};
use crate::errors::BackendError;
use crate::io::{self, ImageUpload};
use crate::pagination::{PageRequest, Pagination};
use crate::recipe::{self, Rating, RecipeDetail, RecipeDraft};
use crate::routes::{
    query::{ListQuery, PageQuery, PopularQuery, RateRequest},
    rejection::{Context, Rejection},
    response::{Envelope, RecipeListing},
};
use crate::user::AuthenticatedUser;

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn list<O: SafeStore>(environment: Environment<O>, query: ListQuery) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::list(), e);

        let page = PageRequest::resolve(query.page, query.limit, environment.config.page_size);
        let (sort, order) = query.sort();

        debug!(environment.logger, "Listing recipes..."; "page" => page.page, "limit" => page.limit);

        let result = environment
            .db
            .list_recipes(query.filter(), sort, order, page)
            .await
            .map_err(error_handler)?;

        let listing = RecipeListing {
            pagination: Pagination::new(page, result.total),
            recipes: result.recipes,
        };

        json(&Envelope::data(listing))
    }
}

pub async fn popular<O: SafeStore>(
    environment: Environment<O>,
    query: PopularQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::popular(), e);

        let limit = match query.limit {
            Some(limit) if limit >= 1 => limit.min(environment.config.popular_page_size),
            _ => environment.config.popular_page_size,
        };

        let recipes = environment
            .db
            .popular_recipes(i64::from(limit))
            .await
            .map_err(error_handler)?;

        json(&Envelope::data(recipes))
    }
}

pub async fn retrieve<O: SafeStore>(environment: Environment<O>, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        debug!(environment.logger, "Retrieving recipe..."; "id" => format!("{}", &id));

        let recipe = environment
            .db
            .retrieve_recipe(&id)
            .await
            .map_err(&error_handler)?
            .ok_or(BackendError::NotFound("recipe"))
            .map_err(&error_handler)?;

        json(&Envelope::data(recipe))
    }
}

pub async fn create<O: SafeStore + 'static>(
    environment: Environment<O>,
    content: FormData,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create(), e);

        debug!(environment.logger, "Parsing submission..."; "user" => format!("{}", user.id));
        let submission = io::parse_submission(content).await.map_err(&error_handler)?;

        let draft = parse_draft(&submission.metadata).map_err(&error_handler)?;
        draft.validate().map_err(&error_handler)?;

        let image = match submission.image {
            Some(upload) => save_image(&environment, upload).await.map_err(&error_handler)?,
            None => String::new(),
        };

        debug!(environment.logger, "Writing recipe to database...");
        let id = environment
            .db
            .insert_recipe(&user.id, draft, image)
            .await
            .map_err(&error_handler)?;

        let recipe = load_recipe(&environment, &id).await.map_err(&error_handler)?;

        Box::new(with_header(
            with_status(
                json(&Envelope::with_message("Recipe created successfully", recipe)),
                StatusCode::CREATED,
            ),
            "location",
            environment.urls.recipe(&id).as_str(),
        )) as Box<dyn Reply>
    }
}

pub async fn update<O: SafeStore + 'static>(
    environment: Environment<O>,
    id: String,
    content: FormData,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        let existing = load_owned_recipe(&environment, &id, &user)
            .await
            .map_err(&error_handler)?;

        let submission = io::parse_submission(content).await.map_err(&error_handler)?;
        let draft = parse_draft(&submission.metadata).map_err(&error_handler)?;
        draft.validate().map_err(&error_handler)?;

        let replacement = match submission.image {
            Some(upload) => Some(save_image(&environment, upload).await.map_err(&error_handler)?),
            None => None,
        };

        debug!(environment.logger, "Updating recipe..."; "id" => format!("{}", &id));
        environment
            .db
            .update_recipe(&id, draft, replacement.clone())
            .await
            .map_err(&error_handler)?;

        if replacement.is_some() {
            delete_image(&environment, &existing.image).await;
        };

        let recipe = load_recipe(&environment, &id).await.map_err(&error_handler)?;

        json(&Envelope::with_message("Recipe updated successfully", recipe))
    }
}

pub async fn delete<O: SafeStore>(
    environment: Environment<O>,
    id: String,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        let existing = load_owned_recipe(&environment, &id, &user)
            .await
            .map_err(&error_handler)?;

        debug!(environment.logger, "Deleting recipe..."; "id" => format!("{}", &id));
        environment
            .db
            .delete_recipe(&id)
            .await
            .map_err(&error_handler)?;

        delete_image(&environment, &existing.image).await;

        json(&Envelope::message("Recipe deleted successfully"))
    }
}

pub async fn rate<O: SafeStore>(
    environment: Environment<O>,
    id: String,
    body: RateRequest,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::rate(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        recipe::validate_rating(body.rating, body.comment.as_deref()).map_err(&error_handler)?;

        // whole-document read-modify-write: concurrent raters on the
        // same recipe resolve as last write wins
        let mut ratings = environment
            .db
            .retrieve_ratings(&id)
            .await
            .map_err(&error_handler)?
            .ok_or(BackendError::NotFound("recipe"))
            .map_err(&error_handler)?;

        recipe::upsert_rating(
            &mut ratings,
            Rating {
                user: user.id,
                rating: body.rating,
                comment: body.comment,
            },
        );

        let (average, total) = recipe::rating_summary(&ratings);

        debug!(environment.logger, "Storing rating..."; "id" => format!("{}", &id), "average" => average, "total" => total);
        environment
            .db
            .store_ratings(&id, ratings, average, total)
            .await
            .map_err(&error_handler)?;

        let recipe = load_recipe(&environment, &id).await.map_err(&error_handler)?;

        json(&Envelope::with_message("Rating saved", recipe))
    }
}

pub async fn my_recipes<O: SafeStore>(
    environment: Environment<O>,
    query: PageQuery,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::my_recipes(), e);

        let page = PageRequest::resolve(query.page, query.limit, environment.config.page_size);

        let result = environment
            .db
            .recipes_by_author(&user.id, page)
            .await
            .map_err(error_handler)?;

        let listing = RecipeListing {
            pagination: Pagination::new(page, result.total),
            recipes: result.recipes,
        };

        json(&Envelope::data(listing))
    }
}

pub async fn add_favorite<O: SafeStore>(
    environment: Environment<O>,
    id: String,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::add_favorite(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;

        let exists = environment
            .db
            .recipe_exists(&id)
            .await
            .map_err(&error_handler)?;

        if !exists {
            return Err(error_handler(BackendError::NotFound("recipe")).into());
        };

        let mut favorites = environment
            .db
            .retrieve_favorites(&user.id)
            .await
            .map_err(&error_handler)?;

        if favorites.contains(&id) {
            return Err(error_handler(BackendError::DuplicateFavorite).into());
        };

        favorites.push(id);

        environment
            .db
            .store_favorites(&user.id, favorites)
            .await
            .map_err(&error_handler)?;

        json(&Envelope::message("Added to favorites"))
    }
}

pub async fn remove_favorite<O: SafeStore>(
    environment: Environment<O>,
    id: String,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::remove_favorite(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;

        // removal is idempotent: filtering out an absent id is a no-op
        let mut favorites = environment
            .db
            .retrieve_favorites(&user.id)
            .await
            .map_err(&error_handler)?;

        favorites.retain(|f| *f != id);

        environment
            .db
            .store_favorites(&user.id, favorites)
            .await
            .map_err(&error_handler)?;

        json(&Envelope::message("Removed from favorites"))
    }
}

pub async fn favorites<O: SafeStore>(
    environment: Environment<O>,
    query: PageQuery,
    user: AuthenticatedUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::favorites(), e);

        let page = PageRequest::resolve(query.page, query.limit, environment.config.page_size);

        let favorites = environment
            .db
            .retrieve_favorites(&user.id)
            .await
            .map_err(&error_handler)?;

        let result = environment
            .db
            .favorite_recipes(favorites, page)
            .await
            .map_err(&error_handler)?;

        let listing = RecipeListing {
            pagination: Pagination::new(page, result.total),
            recipes: result.recipes,
        };

        json(&Envelope::data(listing))
    }
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_owned()))
}

fn parse_draft(metadata: &[u8]) -> Result<RecipeDraft, BackendError> {
    serde_json::from_slice(metadata).map_err(|source| BackendError::MalformedRecipeMetadata { source })
}

async fn load_recipe<O: SafeStore>(
    environment: &Environment<O>,
    id: &Uuid,
) -> Result<RecipeDetail, BackendError> {
    environment
        .db
        .retrieve_recipe(id)
        .await?
        .ok_or(BackendError::NotFound("recipe"))
}

/// Loads a recipe and checks that the caller owns it.
async fn load_owned_recipe<O: SafeStore>(
    environment: &Environment<O>,
    id: &Uuid,
    user: &AuthenticatedUser,
) -> Result<RecipeDetail, BackendError> {
    let recipe = load_recipe(environment, id).await?;

    if recipe.author.id != user.id {
        return Err(BackendError::Forbidden);
    }

    Ok(recipe)
}

async fn save_image<O: SafeStore>(
    environment: &Environment<O>,
    upload: ImageUpload,
) -> Result<String, BackendError> {
    let key = format!("{}.{}", Uuid::new_v4(), upload.extension);

    debug!(environment.logger, "Saving image..."; "key" => &key);
    environment.store.save(&key, upload.data).await?;

    Ok(environment.urls.media_file(&key))
}

/// Removes a stored image, logging failures instead of surfacing them:
/// the document mutation has already been persisted.
async fn delete_image<O: SafeStore>(environment: &Environment<O>, path: &str) {
    let key = match environment.urls.media_key(path) {
        Some(key) => key,
        None => return,
    };

    if let Err(e) = environment.store.delete(key).await {
        warn!(environment.logger, "Failed to delete image: {}", e; "key" => key);
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
