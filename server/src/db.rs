use futures::future::BoxFuture;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::pagination::PageRequest;
use crate::recipe::{Rating, Recipe, RecipeDetail, RecipeDraft};
use crate::user::AuthenticatedUser;

/// The filters applied to the public recipe listing. Exact-match values
/// arrive pre-screened: the sentinel "All" has already been dropped.
#[derive(Clone, Debug, Default)]
pub struct RecipeFilter {
    pub cuisine: Option<String>,
    pub diet_type: Option<String>,
    pub difficulty: Option<String>,
    pub min_rating: Option<f64>,
    pub max_calories: Option<i32>,
    pub max_time: Option<i32>,
    pub search: Option<String>,
}

/// The whitelisted sort keys for the public listing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortKey {
    CreatedAt,
    Title,
    AverageRating,
    Calories,
    TotalTime,
}

impl SortKey {
    /// The SQL expression this key sorts by. Only these fixed strings
    /// ever reach the query text.
    fn expression(self) -> &'static str {
        match self {
            SortKey::CreatedAt => "r.created_at",
            SortKey::Title => "r.title",
            SortKey::AverageRating => "r.average_rating",
            SortKey::Calories => "r.calories",
            SortKey::TotalTime => "r.prep_minutes + r.cook_minutes",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// One page of recipes plus the unpaginated match count.
#[derive(Debug)]
pub struct RecipePage {
    pub recipes: Vec<Recipe>,
    pub total: i64,
}

pub trait Db {
    fn insert_recipe(
        &self,
        author: &Uuid,
        draft: RecipeDraft,
        image: String,
    ) -> BoxFuture<Result<Uuid, BackendError>>;

    fn retrieve_recipe(&self, id: &Uuid) -> BoxFuture<Result<Option<RecipeDetail>, BackendError>>;

    fn list_recipes(
        &self,
        filter: RecipeFilter,
        sort: SortKey,
        order: SortOrder,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>>;

    fn popular_recipes(&self, limit: i64) -> BoxFuture<Result<Vec<Recipe>, BackendError>>;

    fn recipes_by_author(
        &self,
        author: &Uuid,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>>;

    fn update_recipe(
        &self,
        id: &Uuid,
        draft: RecipeDraft,
        image: Option<String>,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn delete_recipe(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn recipe_exists(&self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>>;

    fn retrieve_ratings(&self, id: &Uuid) -> BoxFuture<Result<Option<Vec<Rating>>, BackendError>>;

    fn store_ratings(
        &self,
        id: &Uuid,
        ratings: Vec<Rating>,
        average: f64,
        total: i64,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn retrieve_favorites(&self, user: &Uuid) -> BoxFuture<Result<Vec<Uuid>, BackendError>>;

    fn store_favorites(
        &self,
        user: &Uuid,
        favorites: Vec<Uuid>,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn favorite_recipes(
        &self,
        ids: Vec<Uuid>,
        page: PageRequest,
    ) -> BoxFuture<Result<RecipePage, BackendError>>;

    fn lookup_session(
        &self,
        token: &Uuid,
    ) -> BoxFuture<Result<Option<AuthenticatedUser>, BackendError>>;

    fn create_session(&self, user: &Uuid) -> BoxFuture<Result<Uuid, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use std::collections::HashMap;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::{PgPool, PgRow};
    use sqlx::types::Json;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::{RecipeFilter, RecipePage, SortKey, SortOrder};
    use crate::errors::BackendError;
    use crate::pagination::PageRequest;
    use crate::recipe::{
        CookingTime, Ingredient, InstructionStep, NutritionalInfo, PopulatedRating, Rating,
        RatingUser, Recipe, RecipeDetail, RecipeDraft, Times,
    };
    use crate::user::{AuthenticatedUser, Author};

    const USERS_USERNAME_CONSTRAINT: &str = "users_username";

    // works for both `Query` and `QueryAs`
    macro_rules! bind_filter {
        ($query:expr, $filter:expr) => {
            $query
                .bind(&$filter.cuisine)
                .bind(&$filter.diet_type)
                .bind(&$filter.difficulty)
                .bind($filter.min_rating)
                .bind($filter.max_calories)
                .bind($filter.max_time)
                .bind(&$filter.search)
        };
    }

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_recipe(
            &self,
            author: &Uuid,
            draft: RecipeDraft,
            image: String,
        ) -> BoxFuture<Result<Uuid, BackendError>> {
            let author = *author;

            async move {
                let query =
                    sqlx::query_as::<_, (Uuid,)>(include_str!("queries/insert_recipe.sql"));

                let (id,) = query
                    .bind(author)
                    .bind(&draft.title)
                    .bind(&draft.description)
                    .bind(draft.servings)
                    .bind(draft.difficulty.as_str())
                    .bind(&draft.cuisine)
                    .bind(draft.diet_type.as_str())
                    .bind(draft.calories)
                    .bind(image)
                    .bind(draft.is_public)
                    .bind(draft.cooking_time.prep)
                    .bind(draft.cooking_time.cook)
                    .bind(Json(&draft.ingredients))
                    .bind(Json(&draft.instructions))
                    .bind(Json(&draft.tags))
                    .bind(draft.nutritional_info.as_ref().map(Json))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(id)
            }
            .boxed()
        }

        fn retrieve_recipe(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<RecipeDetail>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_recipe.sql"));

                let row = query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let row = match row {
                    Some(row) => row,
                    None => return Ok(None),
                };

                let recipe = recipe_from_row(&row, true).map_err(map_sqlx_error)?;

                let raters: Vec<Uuid> = recipe.ratings.iter().map(|r| r.user).collect();
                let users = self.rating_users(raters).await?;

                Ok(Some(populate_ratings(recipe, &users)))
            }
            .boxed()
        }

        fn list_recipes(
            &self,
            filter: RecipeFilter,
            sort: SortKey,
            order: SortOrder,
            page: PageRequest,
        ) -> BoxFuture<Result<RecipePage, BackendError>> {
            let filter = RecipeFilter {
                search: filter.search.as_deref().map(escape_like),
                ..filter
            };

            async move {
                let count_query =
                    sqlx::query_as::<_, (i64,)>(include_str!("queries/count_recipes.sql"));

                let (total,) = bind_filter!(count_query, filter)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                // the sort expression comes from a fixed whitelist, never
                // from request text
                let sql = format!(
                    "{} ORDER BY {} {}, r.id LIMIT $8 OFFSET $9",
                    include_str!("queries/list_recipes.sql"),
                    sort.expression(),
                    order.keyword(),
                );

                let rows = bind_filter!(sqlx::query(&sql), filter)
                    .bind(i64::from(page.limit))
                    .bind(page.offset())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let recipes = rows
                    .iter()
                    .map(|row| recipe_from_row(row, false))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_sqlx_error)?;

                Ok(RecipePage { recipes, total })
            }
            .boxed()
        }

        fn popular_recipes(&self, limit: i64) -> BoxFuture<Result<Vec<Recipe>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/popular_recipes.sql"));

                let rows = query
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                rows.iter()
                    .map(|row| recipe_from_row(row, false))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn recipes_by_author(
            &self,
            author: &Uuid,
            page: PageRequest,
        ) -> BoxFuture<Result<RecipePage, BackendError>> {
            let author = *author;

            async move {
                let count_query = sqlx::query_as::<_, (i64,)>(include_str!(
                    "queries/count_recipes_by_author.sql"
                ));

                let (total,) = count_query
                    .bind(author)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let rows = sqlx::query(include_str!("queries/recipes_by_author.sql"))
                    .bind(author)
                    .bind(i64::from(page.limit))
                    .bind(page.offset())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let recipes = rows
                    .iter()
                    .map(|row| recipe_from_row(row, false))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_sqlx_error)?;

                Ok(RecipePage { recipes, total })
            }
            .boxed()
        }

        fn update_recipe(
            &self,
            id: &Uuid,
            draft: RecipeDraft,
            image: Option<String>,
        ) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/update_recipe.sql"));

                let count = query
                    .bind(id)
                    .bind(&draft.title)
                    .bind(&draft.description)
                    .bind(draft.servings)
                    .bind(draft.difficulty.as_str())
                    .bind(&draft.cuisine)
                    .bind(draft.diet_type.as_str())
                    .bind(draft.calories)
                    .bind(draft.is_public)
                    .bind(draft.cooking_time.prep)
                    .bind(draft.cooking_time.cook)
                    .bind(Json(&draft.ingredients))
                    .bind(Json(&draft.instructions))
                    .bind(Json(&draft.tags))
                    .bind(draft.nutritional_info.as_ref().map(Json))
                    .bind(image)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NotFound("recipe"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn delete_recipe(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_recipe.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NotFound("recipe"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn recipe_exists(&self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/recipe_exists.sql"));

                let row = query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(row.is_some())
            }
            .boxed()
        }

        fn retrieve_ratings(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<Vec<Rating>>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, (Json<Vec<Rating>>,)>(include_str!(
                    "queries/retrieve_ratings.sql"
                ));

                let ratings = query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .map(|(Json(ratings),)| ratings);

                Ok(ratings)
            }
            .boxed()
        }

        fn store_ratings(
            &self,
            id: &Uuid,
            ratings: Vec<Rating>,
            average: f64,
            total: i64,
        ) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/update_ratings.sql"));

                let count = query
                    .bind(id)
                    .bind(Json(&ratings))
                    .bind(average)
                    .bind(total)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NotFound("recipe"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn retrieve_favorites(&self, user: &Uuid) -> BoxFuture<Result<Vec<Uuid>, BackendError>> {
            let user = *user;

            async move {
                let query = sqlx::query_as::<_, (Json<Vec<Uuid>>,)>(include_str!(
                    "queries/retrieve_favorites.sql"
                ));

                let favorites = query
                    .bind(user)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .map(|(Json(favorites),)| favorites)
                    .ok_or(BackendError::NotFound("user"))?;

                Ok(favorites)
            }
            .boxed()
        }

        fn store_favorites(
            &self,
            user: &Uuid,
            favorites: Vec<Uuid>,
        ) -> BoxFuture<Result<(), BackendError>> {
            let user = *user;

            async move {
                let query = sqlx::query(include_str!("queries/update_favorites.sql"));

                let count = query
                    .bind(user)
                    .bind(Json(&favorites))
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NotFound("user"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn favorite_recipes(
            &self,
            ids: Vec<Uuid>,
            page: PageRequest,
        ) -> BoxFuture<Result<RecipePage, BackendError>> {
            async move {
                if ids.is_empty() {
                    return Ok(RecipePage {
                        recipes: vec![],
                        total: 0,
                    });
                }

                let count_query = sqlx::query_as::<_, (i64,)>(include_str!(
                    "queries/count_favorite_recipes.sql"
                ));

                // deleted recipes drop out of the join, so dangling
                // favorite references never reach the response or the
                // total
                let (total,) = count_query
                    .bind(&ids)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let rows = sqlx::query(include_str!("queries/favorite_recipes.sql"))
                    .bind(&ids)
                    .bind(i64::from(page.limit))
                    .bind(page.offset())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let recipes = rows
                    .iter()
                    .map(|row| recipe_from_row(row, false))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_sqlx_error)?;

                Ok(RecipePage { recipes, total })
            }
            .boxed()
        }

        fn lookup_session(
            &self,
            token: &Uuid,
        ) -> BoxFuture<Result<Option<AuthenticatedUser>, BackendError>> {
            let token = *token;

            async move {
                let query =
                    sqlx::query_as::<_, (Uuid, String)>(include_str!("queries/lookup_session.sql"));

                let user = query
                    .bind(token)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .map(|(id, username)| AuthenticatedUser { id, username });

                Ok(user)
            }
            .boxed()
        }

        fn create_session(&self, user: &Uuid) -> BoxFuture<Result<Uuid, BackendError>> {
            let user = *user;

            async move {
                let query =
                    sqlx::query_as::<_, (Uuid,)>(include_str!("queries/create_session.sql"));

                let (token,) = query
                    .bind(user)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(token)
            }
            .boxed()
        }
    }

    impl PgDb {
        async fn rating_users(
            &self,
            ids: Vec<Uuid>,
        ) -> Result<HashMap<Uuid, RatingUser>, BackendError> {
            if ids.is_empty() {
                return Ok(HashMap::new());
            }

            let rows = sqlx::query_as::<_, (Uuid, String, String)>(include_str!(
                "queries/rating_users.sql"
            ))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(rows
                .into_iter()
                .map(|(id, username, profile_image)| {
                    (
                        id,
                        RatingUser {
                            id,
                            username,
                            profile_image,
                        },
                    )
                })
                .collect())
        }
    }

    /// Replaces each rating's user reference with the user's details.
    /// Ratings whose user no longer exists are dropped from the view,
    /// not from the document.
    fn populate_ratings(recipe: Recipe, users: &HashMap<Uuid, RatingUser>) -> RecipeDetail {
        let ratings = recipe
            .ratings
            .iter()
            .filter_map(|rating| {
                users.get(&rating.user).map(|user| PopulatedRating {
                    user: user.clone(),
                    rating: rating.rating,
                    comment: rating.comment.clone(),
                })
            })
            .collect();

        Recipe {
            id: recipe.id,
            author: recipe.author,
            title: recipe.title,
            description: recipe.description,
            servings: recipe.servings,
            difficulty: recipe.difficulty,
            cuisine: recipe.cuisine,
            diet_type: recipe.diet_type,
            calories: recipe.calories,
            image: recipe.image,
            is_public: recipe.is_public,
            cooking_time: recipe.cooking_time,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            tags: recipe.tags,
            nutritional_info: recipe.nutritional_info,
            ratings,
            average_rating: recipe.average_rating,
            total_ratings: recipe.total_ratings,
            times: recipe.times,
        }
    }

    fn recipe_from_row(row: &PgRow, with_bio: bool) -> Result<Recipe, sqlx::Error> {
        let difficulty = try_get::<String>(row, "difficulty")?
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let diet_type = try_get::<String>(row, "diet_type")?
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        let Json(ingredients): Json<Vec<Ingredient>> = try_get(row, "ingredients")?;
        let Json(instructions): Json<Vec<InstructionStep>> = try_get(row, "instructions")?;
        let Json(tags): Json<Vec<String>> = try_get(row, "tags")?;
        let nutritional_info: Option<Json<NutritionalInfo>> = try_get(row, "nutritional_info")?;
        let Json(ratings): Json<Vec<Rating>> = try_get(row, "ratings")?;

        let created_at: OffsetDateTime = try_get(row, "created_at")?;
        let updated_at: OffsetDateTime = try_get(row, "updated_at")?;

        let author = Author {
            id: try_get(row, "author_id")?,
            username: try_get(row, "author_username")?,
            first_name: try_get(row, "author_first_name")?,
            last_name: try_get(row, "author_last_name")?,
            profile_image: try_get(row, "author_profile_image")?,
            bio: if with_bio {
                try_get(row, "author_bio")?
            } else {
                None
            },
        };

        Ok(Recipe {
            id: try_get(row, "id")?,
            author,
            title: try_get(row, "title")?,
            description: try_get(row, "description")?,
            servings: try_get(row, "servings")?,
            difficulty,
            cuisine: try_get(row, "cuisine")?,
            diet_type,
            calories: try_get(row, "calories")?,
            image: try_get(row, "image")?,
            is_public: try_get(row, "is_public")?,
            cooking_time: CookingTime {
                prep: try_get(row, "prep_minutes")?,
                cook: try_get(row, "cook_minutes")?,
            },
            ingredients,
            instructions,
            tags,
            nutritional_info: nutritional_info.map(|Json(info)| info),
            ratings,
            average_rating: try_get(row, "average_rating")?,
            total_ratings: try_get(row, "total_ratings")?,
            times: Times {
                created_at,
                updated_at,
            },
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::Row;

        row.try_get(column)
    }

    // Postgres unique_violation
    const UNIQUE_VIOLATION_CODE: &str = "23505";

    fn is_unique_violation(e: &(dyn sqlx::error::DatabaseError + 'static)) -> bool {
        e.code().as_deref() == Some(UNIQUE_VIOLATION_CODE)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e)
                if is_unique_violation(&**e)
                    && e.constraint() == Some(USERS_USERNAME_CONSTRAINT) =>
            {
                BackendError::DuplicateKey {
                    field: "username".into(),
                }
            }
            Error::Database(ref e) if is_unique_violation(&**e) && e.constraint().is_some() => {
                BackendError::DuplicateKey {
                    field: e.constraint().unwrap_or_default().into(),
                }
            }
            _ => BackendError::Sqlx { source: error },
        }
    }

    /// Escapes `%`, `_`, and `\` in caller text so a substring match
    /// treats them literally.
    fn escape_like(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());

        for c in text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }

        escaped
    }

}
