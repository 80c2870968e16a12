use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

use backend::db::{Db, RecipeFilter, RecipePage, SortKey, SortOrder};
use backend::environment::{Config, Environment};
use backend::errors::{BackendError, StoreError};
use backend::pagination::PageRequest;
use backend::recipe::{
    self, CookingTime, Difficulty, DietType, Ingredient, InstructionStep, PopulatedRating, Rating,
    RatingUser, Recipe, RecipeDetail, RecipeDraft, Times,
};
use backend::routes;
use backend::store::Store;
use backend::urls::Urls;
use backend::user::{AuthenticatedUser, Author};
use log::initialize_logger;

const PAGE_SIZE: u32 = 10;
const POPULAR_PAGE_SIZE: u32 = 6;

#[derive(Default)]
struct MemoryDb {
    recipes: RwLock<Vec<Recipe>>,
    sessions: RwLock<HashMap<Uuid, AuthenticatedUser>>,
    favorites: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl MemoryDb {
    fn add_session(&self, user: &Author) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions.write().unwrap().insert(
            token,
            AuthenticatedUser {
                id: user.id,
                username: user.username.clone(),
            },
        );
        token
    }

    fn add_recipe(&self, author: &Author, title: &str, is_public: bool) -> Uuid {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        self.recipes.write().unwrap().push(Recipe {
            id,
            author: author.clone(),
            title: title.to_owned(),
            description: "A test recipe.".to_owned(),
            servings: 2,
            difficulty: Difficulty::Easy,
            cuisine: "Test".to_owned(),
            diet_type: DietType::Vegetarian,
            calories: Some(300),
            image: String::new(),
            is_public,
            cooking_time: CookingTime { prep: 5, cook: 10 },
            ingredients: vec![Ingredient {
                name: "Salt".to_owned(),
                quantity: "1".to_owned(),
                unit: "tsp".to_owned(),
            }],
            instructions: vec![InstructionStep {
                step_number: 1,
                instruction: "Mix.".to_owned(),
            }],
            tags: vec![],
            nutritional_info: None,
            ratings: vec![],
            average_rating: 0.0,
            total_ratings: 0,
            times: Times {
                created_at: now,
                updated_at: now,
            },
        });

        id
    }

    fn tweak(&self, id: &Uuid, f: impl FnOnce(&mut Recipe)) {
        let mut recipes = self.recipes.write().unwrap();
        let recipe = recipes.iter_mut().find(|r| r.id == *id).unwrap();
        f(recipe);
    }

    fn detail(&self, recipe: &Recipe) -> RecipeDetail {
        let ratings = recipe
            .ratings
            .iter()
            .map(|r| PopulatedRating {
                user: RatingUser {
                    id: r.user,
                    username: "rater".to_owned(),
                    profile_image: String::new(),
                },
                rating: r.rating,
                comment: r.comment.clone(),
            })
            .collect();

        Recipe {
            id: recipe.id,
            author: recipe.author.clone(),
            title: recipe.title.clone(),
            description: recipe.description.clone(),
            servings: recipe.servings,
            difficulty: recipe.difficulty,
            cuisine: recipe.cuisine.clone(),
            diet_type: recipe.diet_type,
            calories: recipe.calories,
            image: recipe.image.clone(),
            is_public: recipe.is_public,
            cooking_time: recipe.cooking_time,
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            tags: recipe.tags.clone(),
            nutritional_info: recipe.nutritional_info.clone(),
            ratings,
            average_rating: recipe.average_rating,
            total_ratings: recipe.total_ratings,
            times: recipe.times,
        }
    }

    fn page(mut recipes: Vec<Recipe>, page: PageRequest) -> RecipePage {
        let total = recipes.len() as i64;
        let start = (page.offset() as usize).min(recipes.len());
        let end = (start + page.limit as usize).min(recipes.len());
        recipes = recipes[start..end].to_vec();

        RecipePage { recipes, total }
    }
}

fn matches_filter(recipe: &Recipe, filter: &RecipeFilter) -> bool {
    if let Some(cuisine) = &filter.cuisine {
        if recipe.cuisine != *cuisine {
            return false;
        }
    }

    if let Some(diet_type) = &filter.diet_type {
        if recipe.diet_type.as_str() != diet_type {
            return false;
        }
    }

    if let Some(difficulty) = &filter.difficulty {
        if recipe.difficulty.as_str() != difficulty {
            return false;
        }
    }

    if let Some(min_rating) = filter.min_rating {
        if recipe.average_rating < min_rating {
            return false;
        }
    }

    if let Some(max_calories) = filter.max_calories {
        if !recipe.calories.map_or(false, |c| c <= max_calories) {
            return false;
        }
    }

    if let Some(max_time) = filter.max_time {
        if recipe.cooking_time.total() > max_time {
            return false;
        }
    }

    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let mut haystacks = vec![recipe.title.to_lowercase(), recipe.description.to_lowercase()];
        haystacks.extend(recipe.ingredients.iter().map(|i| i.name.to_lowercase()));
        haystacks.extend(recipe.tags.iter().map(|t| t.to_lowercase()));

        if !haystacks.iter().any(|h| h.contains(&needle)) {
            return false;
        }
    }

    true
}

fn sort_recipes(recipes: &mut [Recipe], sort: SortKey, order: SortOrder) {
    recipes.sort_by(|a, b| {
        let ordering = match sort {
            SortKey::CreatedAt => a.times.created_at.cmp(&b.times.created_at),
            SortKey::Title => a.title.cmp(&b.title),
            SortKey::AverageRating => a
                .average_rating
                .partial_cmp(&b.average_rating)
                .unwrap_or(std::cmp::Ordering::Equal),
            SortKey::Calories => a.calories.cmp(&b.calories),
            SortKey::TotalTime => a.cooking_time.total().cmp(&b.cooking_time.total()),
        };

        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

impl Db for MemoryDb {
    fn insert_recipe(
        &self,
        author: &Uuid,
        draft: RecipeDraft,
        image: String,
    ) -> BoxFuture<Result<Uuid, BackendError>> {
        let author = Author {
            id: *author,
            username: "author".to_owned(),
            first_name: "A".to_owned(),
            last_name: "B".to_owned(),
            profile_image: String::new(),
            bio: None,
        };
        let id = self.add_recipe(&author, &draft.title, draft.is_public);

        {
            let mut recipes = self.recipes.write().unwrap();
            let recipe = recipes.iter_mut().find(|r| r.id == id).unwrap();
            recipe.image = image;
        }

        async move { Ok(id) }.boxed()
    }

    fn retrieve_recipe(&self, id: &Uuid) -> BoxFuture<Result<Option<RecipeDetail>, BackendError>> {
        let detail = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == *id)
            .map(|r| self.detail(r));

        async move { Ok(detail) }.boxed()
    }

    fn list_recipes(
        &self,
        filter: RecipeFilter,
        sort: SortKey,
        order: SortOrder,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>> {
        let mut public: Vec<Recipe> = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.is_public && matches_filter(r, &filter))
            .cloned()
            .collect();
        sort_recipes(&mut public, sort, order);

        async move { Ok(MemoryDb::page(public, page)) }.boxed()
    }

    fn popular_recipes(&self, limit: i64) -> BoxFuture<Result<Vec<Recipe>, BackendError>> {
        let mut public: Vec<Recipe> = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.is_public)
            .cloned()
            .collect();
        public.sort_by(|a, b| b.average_rating.partial_cmp(&a.average_rating).unwrap());
        public.truncate(limit as usize);

        async move { Ok(public) }.boxed()
    }

    fn recipes_by_author(
        &self,
        author: &Uuid,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>> {
        let own: Vec<Recipe> = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.author.id == *author)
            .cloned()
            .collect();

        async move { Ok(MemoryDb::page(own, page)) }.boxed()
    }

    fn update_recipe(
        &self,
        id: &Uuid,
        draft: RecipeDraft,
        image: Option<String>,
    ) -> BoxFuture<Result<(), BackendError>> {
        let mut recipes = self.recipes.write().unwrap();
        let result = match recipes.iter_mut().find(|r| r.id == *id) {
            Some(recipe) => {
                recipe.title = draft.title;
                if let Some(image) = image {
                    recipe.image = image;
                }
                Ok(())
            }
            None => Err(BackendError::NotFound("recipe")),
        };

        async move { result }.boxed()
    }

    fn delete_recipe(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let mut recipes = self.recipes.write().unwrap();
        let before = recipes.len();
        recipes.retain(|r| r.id != *id);

        let result = if recipes.len() == before {
            Err(BackendError::NotFound("recipe"))
        } else {
            Ok(())
        };

        async move { result }.boxed()
    }

    fn recipe_exists(&self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>> {
        let exists = self.recipes.read().unwrap().iter().any(|r| r.id == *id);

        async move { Ok(exists) }.boxed()
    }

    fn retrieve_ratings(&self, id: &Uuid) -> BoxFuture<Result<Option<Vec<Rating>>, BackendError>> {
        let ratings = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == *id)
            .map(|r| r.ratings.clone());

        async move { Ok(ratings) }.boxed()
    }

    fn store_ratings(
        &self,
        id: &Uuid,
        ratings: Vec<Rating>,
        average: f64,
        total: i64,
    ) -> BoxFuture<Result<(), BackendError>> {
        let mut recipes = self.recipes.write().unwrap();
        let result = match recipes.iter_mut().find(|r| r.id == *id) {
            Some(recipe) => {
                recipe.ratings = ratings;
                recipe.average_rating = average;
                recipe.total_ratings = total;
                Ok(())
            }
            None => Err(BackendError::NotFound("recipe")),
        };

        async move { result }.boxed()
    }

    fn retrieve_favorites(&self, user: &Uuid) -> BoxFuture<Result<Vec<Uuid>, BackendError>> {
        let favorites = self
            .favorites
            .read()
            .unwrap()
            .get(user)
            .cloned()
            .unwrap_or_default();

        async move { Ok(favorites) }.boxed()
    }

    fn store_favorites(
        &self,
        user: &Uuid,
        favorites: Vec<Uuid>,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.favorites.write().unwrap().insert(*user, favorites);

        async move { Ok(()) }.boxed()
    }

    fn favorite_recipes(
        &self,
        ids: Vec<Uuid>,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>> {
        let favorites: Vec<Recipe> = self
            .recipes
            .read()
            .unwrap()
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();

        async move { Ok(MemoryDb::page(favorites, page)) }.boxed()
    }

    fn lookup_session(
        &self,
        token: &Uuid,
    ) -> BoxFuture<Result<Option<AuthenticatedUser>, BackendError>> {
        let user = self.sessions.read().unwrap().get(token).cloned();

        async move { Ok(user) }.boxed()
    }

    fn create_session(&self, user: &Uuid) -> BoxFuture<Result<Uuid, BackendError>> {
        let token = Uuid::new_v4();
        self.sessions.write().unwrap().insert(
            token,
            AuthenticatedUser {
                id: *user,
                username: "user".to_owned(),
            },
        );

        async move { Ok(token) }.boxed()
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<HashMap<String, Vec<u8>>>,
}

impl Store for MemoryStore {
    type Output = ();
    type Raw = Vec<u8>;

    fn delete(&self, key: &str) -> BoxFuture<Result<(), StoreError>> {
        self.saved.lock().unwrap().remove(key);
        async move { Ok(()) }.boxed()
    }

    fn save(&self, key: &str, raw: Vec<u8>) -> BoxFuture<Result<(), StoreError>> {
        self.saved.lock().unwrap().insert(key.to_owned(), raw);
        async move { Ok(()) }.boxed()
    }
}

struct Server {
    db: Arc<MemoryDb>,
    store: Arc<MemoryStore>,
    environment: Environment<()>,
}

impl Server {
    fn new() -> Self {
        let db = Arc::new(MemoryDb::default());
        let store = Arc::new(MemoryStore::default());
        let environment = Environment::new(
            Arc::new(initialize_logger()),
            db.clone(),
            Arc::new(Urls::new("https://example.com/", "recipes", "media")),
            store.clone(),
            Config::new(PAGE_SIZE, POPULAR_PAGE_SIZE),
        );

        Server { db, store, environment }
    }

    fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let environment = self.environment.clone();
        let logger = environment.logger.clone();

        routes::make_list_route(environment.clone())
            .or(routes::make_popular_route(environment.clone()))
            .or(routes::make_my_recipes_route(environment.clone()))
            .or(routes::make_favorites_route(environment.clone()))
            .or(routes::make_create_route(environment.clone()))
            .or(routes::make_update_route(environment.clone()))
            .or(routes::make_rate_route(environment.clone()))
            .or(routes::make_add_favorite_route(environment.clone()))
            .or(routes::make_remove_favorite_route(environment.clone()))
            .or(routes::make_delete_route(environment.clone()))
            .or(routes::make_retrieve_route(environment))
            .recover(move |r| routes::format_rejection(logger.clone(), r))
    }

    fn author(&self) -> Author {
        Author {
            id: Uuid::new_v4(),
            username: "poignant_cook".to_owned(),
            first_name: "Poignant".to_owned(),
            last_name: "Cook".to_owned(),
            profile_image: String::new(),
            bio: Some("I cook.".to_owned()),
        }
    }
}

fn body_json(body: &Bytes) -> Value {
    serde_json::from_slice(body).expect("parse response body as JSON")
}

#[tokio::test]
async fn listing_only_returns_public_recipes() {
    let server = Server::new();
    let author = server.author();

    server.db.add_recipe(&author, "Public Pie", true);
    server.db.add_recipe(&author, "Secret Stew", false);

    let response = warp::test::request()
        .path("/recipes")
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.body());
    assert_eq!(body["success"], true);

    let recipes = body["data"]["recipes"].as_array().expect("recipes array");
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0]["title"], "Public Pie");
    assert_eq!(body["data"]["pagination"]["totalCount"], 1);
    assert_eq!(body["data"]["pagination"]["hasNextPage"], false);
}

#[tokio::test]
async fn retrieving_an_unknown_recipe_is_a_404() {
    let server = Server::new();

    let response = warp::test::request()
        .path(&format!("/recipes/{}", Uuid::new_v4()))
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response.body());
    assert_eq!(body["success"], false);
    assert_eq!(body["operation"], "retrieve");
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let server = Server::new();

    let response = warp::test::request()
        .path("/recipes/not-a-uuid")
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authenticated_routes_require_a_session() {
    let server = Server::new();

    let response = warp::test::request()
        .path("/recipes/user/my-recipes")
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = warp::test::request()
        .path("/recipes/user/my-recipes")
        .header("authorization", format!("Bearer {}", Uuid::new_v4()))
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rating_twice_replaces_the_first_rating() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Rated Ragout", true);
    let token = server.db.add_session(&author);

    for (rating, expected_average) in &[(5u8, 5.0), (2u8, 2.0)] {
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/recipes/{}/rate", id))
            .header("authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "rating": rating }))
            .reply(&server.routes())
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response.body());
        assert_eq!(body["data"]["averageRating"], *expected_average);
        assert_eq!(body["data"]["totalRatings"], 1);
    }
}

#[tokio::test]
async fn out_of_range_ratings_are_rejected() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Rated Ragout", true);
    let token = server.db.add_session(&author);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/recipes/{}/rate", id))
        .header("authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "rating": 6 }))
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response.body());
    assert_eq!(body["errors"][0]["field"], "rating");
}

#[tokio::test]
async fn favoriting_twice_is_a_conflict_but_unfavoriting_is_idempotent() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Favored Focaccia", true);
    let token = server.db.add_session(&author);

    let favorite = |method: &'static str, path: String| {
        let routes = server.routes();
        let token = token;

        async move {
            warp::test::request()
                .method(method)
                .path(&path)
                .header("authorization", format!("Bearer {}", token))
                .reply(&routes)
                .await
        }
    };

    let response = favorite("POST", format!("/recipes/{}/favorite", id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = favorite("POST", format!("/recipes/{}/favorite", id)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = favorite("DELETE", format!("/recipes/{}/favorite", id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // removing an absent favorite is still a success
    let response = favorite("DELETE", format!("/recipes/{}/favorite", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn favoriting_an_unknown_recipe_is_a_404() {
    let server = Server::new();
    let author = server.author();
    let token = server.db.add_session(&author);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/recipes/{}/favorite", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_someone_elses_recipe_is_forbidden() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Owned Orzo", true);

    let interloper = server.author();
    let token = server.db.add_session(&interloper);

    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/recipes/{}", id))
        .header("authorization", format!("Bearer {}", token))
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response.body());
    assert_eq!(body["success"], false);
    assert_eq!(body["operation"], "delete");
}

#[tokio::test]
async fn ratings_keep_their_aggregates_consistent() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Aggregated Arepas", true);

    let raters: Vec<_> = (0..3).map(|_| server.author()).collect();

    for (rater, rating) in raters.iter().zip([5u8, 4, 3]) {
        let token = server.db.add_session(rater);

        let response = warp::test::request()
            .method("POST")
            .path(&format!("/recipes/{}/rate", id))
            .header("authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "rating": rating, "comment": "nice" }))
            .reply(&server.routes())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = warp::test::request()
        .path(&format!("/recipes/{}", id))
        .reply(&server.routes())
        .await;

    let body = body_json(response.body());
    assert_eq!(body["data"]["averageRating"], 4.0);
    assert_eq!(body["data"]["totalRatings"], 3);
    assert_eq!(body["data"]["ratings"].as_array().expect("ratings").len(), 3);
}

const BOUNDARY: &str = "thisisaboundary1234";

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

fn make_multipart_body(metadata: Option<&[u8]>, image: Option<&[u8]>) -> Vec<u8> {
    const NEWLINE: &[u8] = b"\r\n";
    const METADATA_HEADER: &[u8] = b"Content-Disposition: form-data; name=\"recipe\"\r\n\r\n";
    const IMAGE_HEADER: &[u8] = b"Content-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n";

    let boundary = format!("--{}", BOUNDARY).into_bytes();
    let boundary = boundary.as_slice();

    let mut parts: Vec<&[u8]> = vec![];

    if let Some(metadata) = metadata {
        parts.push(boundary);
        parts.push(NEWLINE);
        parts.push(METADATA_HEADER);
        parts.push(metadata);
        parts.push(NEWLINE);
    }

    if let Some(image) = image {
        parts.push(boundary);
        parts.push(NEWLINE);
        parts.push(IMAGE_HEADER);
        parts.push(image);
        parts.push(NEWLINE);
    }

    parts.push(boundary);
    parts.push(b"--");
    parts.push(NEWLINE);

    parts.concat()
}

fn draft_json(title: &str) -> Vec<u8> {
    serde_json::json!({
        "title": title,
        "description": "Toast the spices before grinding.",
        "servings": 4,
        "difficulty": "Easy",
        "cuisine": "Levantine",
        "dietType": "Vegetarian",
        "calories": 420,
        "isPublic": true,
        "cookingTime": { "prep": 10, "cook": 25 },
        "ingredients": [{ "name": "Chickpeas", "quantity": "400", "unit": "g" }],
        "instructions": [{ "stepNumber": 1, "instruction": "Simmer until tender." }],
        "tags": ["weeknight"]
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn listing_filters_on_total_time() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Slow Stew", true);
    server
        .db
        .tweak(&id, |r| r.cooking_time = CookingTime { prep: 10, cook: 20 });

    let response = warp::test::request()
        .path("/recipes?maxTime=25")
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.body());
    assert_eq!(body["data"]["recipes"].as_array().expect("recipes").len(), 0);

    let response = warp::test::request()
        .path("/recipes?maxTime=30")
        .reply(&server.routes())
        .await;

    let body = body_json(response.body());
    let recipes = body["data"]["recipes"].as_array().expect("recipes");
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0]["title"], "Slow Stew");
}

#[tokio::test]
async fn listing_applies_filters_and_search() {
    let server = Server::new();
    let author = server.author();

    let plain = server.db.add_recipe(&author, "Plain Porridge", true);
    let spiced = server.db.add_recipe(&author, "Spiced Chickpeas", true);
    server.db.tweak(&spiced, |r| {
        r.cuisine = "Levantine".to_owned();
        r.average_rating = 4.5;
        r.total_ratings = 2;
        r.calories = Some(600);
        r.ingredients[0].name = "Sumac".to_owned();
    });

    let cases = &[
        ("/recipes?cuisine=Levantine", vec![spiced]),
        ("/recipes?dietType=Vegetarian", vec![plain, spiced]),
        ("/recipes?difficulty=Hard", vec![]),
        ("/recipes?minRating=4", vec![spiced]),
        ("/recipes?maxCalories=400", vec![plain]),
        ("/recipes?search=sumac", vec![spiced]),
        ("/recipes?search=porridge", vec![plain]),
        ("/recipes?search=saffron", vec![]),
    ];

    for (path, expected) in cases {
        let response = warp::test::request()
            .path(path)
            .reply(&server.routes())
            .await;

        assert_eq!(response.status(), StatusCode::OK, "{}", path);

        let body = body_json(response.body());
        let mut ids: Vec<String> = body["data"]["recipes"]
            .as_array()
            .expect("recipes array")
            .iter()
            .map(|r| r["id"].as_str().expect("recipe ID").to_owned())
            .collect();
        ids.sort();

        let mut expected: Vec<String> = expected.iter().map(|id| id.to_string()).collect();
        expected.sort();

        assert_eq!(ids, expected, "{}", path);
    }
}

#[tokio::test]
async fn listing_sorts_by_title() {
    let server = Server::new();
    let author = server.author();
    server.db.add_recipe(&author, "Banana Bread", true);
    server.db.add_recipe(&author, "Apple Pie", true);

    let titles = |body: &Bytes| -> Vec<String> {
        body_json(body)["data"]["recipes"]
            .as_array()
            .expect("recipes array")
            .iter()
            .map(|r| r["title"].as_str().expect("title").to_owned())
            .collect()
    };

    let response = warp::test::request()
        .path("/recipes?sort=title")
        .reply(&server.routes())
        .await;
    assert_eq!(titles(response.body()), ["Apple Pie", "Banana Bread"]);

    let response = warp::test::request()
        .path("/recipes?sort=title&order=desc")
        .reply(&server.routes())
        .await;
    assert_eq!(titles(response.body()), ["Banana Bread", "Apple Pie"]);
}

#[tokio::test]
async fn popular_listing_caps_oversized_limits() {
    let server = Server::new();
    let author = server.author();

    for i in 0..POPULAR_PAGE_SIZE + 2 {
        server.db.add_recipe(&author, &format!("Recipe {}", i), true);
    }

    let response = warp::test::request()
        .path("/recipes/popular?limit=4000000000")
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.body());
    let recipes = body["data"].as_array().expect("recipes array");
    assert_eq!(recipes.len(), POPULAR_PAGE_SIZE as usize);
}

#[tokio::test]
async fn creating_a_recipe_returns_its_location() {
    let server = Server::new();
    let token = server.db.add_session(&server.author());

    let metadata = draft_json("Submitted Shakshuka");
    let body = make_multipart_body(Some(metadata.as_slice()), Some(b"not actually a PNG".as_slice()));

    let response = warp::test::request()
        .method("POST")
        .path("/recipes")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response.body());
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["title"], "Submitted Shakshuka");

    let id = body["data"]["id"].as_str().expect("recipe ID");
    let location = response
        .headers()
        .get("location")
        .expect("Location header")
        .to_str()
        .expect("Location header as text");
    assert_eq!(location, format!("https://example.com/recipes/{}", id));

    let image = body["data"]["image"].as_str().expect("image URL");
    let key = image.strip_prefix("/media/").expect("media URL prefix");
    assert!(server.store.saved.lock().unwrap().contains_key(key));
}

#[tokio::test]
async fn submissions_without_metadata_are_rejected() {
    let server = Server::new();
    let token = server.db.add_session(&server.author());

    let body = make_multipart_body(None, Some(b"not actually a PNG".as_slice()));

    let response = warp::test::request()
        .method("POST")
        .path("/recipes")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response.body());
    assert_eq!(body["success"], false);
    assert_eq!(body["operation"], "create");
}

#[tokio::test]
async fn invalid_drafts_report_field_errors() {
    let server = Server::new();
    let token = server.db.add_session(&server.author());

    let metadata = draft_json("");
    let body = make_multipart_body(Some(metadata.as_slice()), None);

    let response = warp::test::request()
        .method("POST")
        .path("/recipes")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response.body());
    assert_eq!(body["errors"][0]["field"], "title");
}

#[tokio::test]
async fn updating_replaces_the_image() {
    let server = Server::new();
    let author = server.author();
    let id = server.db.add_recipe(&author, "Original Orzo", true);
    let token = server.db.add_session(&author);

    server.db.tweak(&id, |r| r.image = "/media/old.png".to_owned());
    server
        .store
        .saved
        .lock()
        .unwrap()
        .insert("old.png".to_owned(), b"old bytes".to_vec());

    let metadata = draft_json("Renamed Risotto");
    let body = make_multipart_body(Some(metadata.as_slice()), Some(b"new bytes".as_slice()));

    let response = warp::test::request()
        .method("PUT")
        .path(&format!("/recipes/{}", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.body());
    assert_eq!(body["data"]["title"], "Renamed Risotto");

    let image = body["data"]["image"].as_str().expect("image URL");
    let key = image.strip_prefix("/media/").expect("media URL prefix");

    let saved = server.store.saved.lock().unwrap();
    assert!(!saved.contains_key("old.png"));
    assert_eq!(saved.get(key), Some(&b"new bytes".to_vec()));
}

#[tokio::test]
async fn updating_someone_elses_recipe_is_forbidden() {
    let server = Server::new();
    let id = server.db.add_recipe(&server.author(), "Owned Oatmeal", true);
    let token = server.db.add_session(&server.author());

    let metadata = draft_json("Hijacked Hash");
    let body = make_multipart_body(Some(metadata.as_slice()), None);

    let response = warp::test::request()
        .method("PUT")
        .path(&format!("/recipes/{}", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", multipart_content_type())
        .body(body)
        .reply(&server.routes())
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response.body());
    assert_eq!(body["success"], false);
    assert_eq!(body["operation"], "update");
}

#[test]
fn summary_matches_stored_ratings() {
    let ratings: Vec<Rating> = [5u8, 4, 3]
        .iter()
        .map(|&rating| Rating {
            user: Uuid::new_v4(),
            rating,
            comment: None,
        })
        .collect();

    assert_eq!(recipe::rating_summary(&ratings), (4.0, 3));
}
