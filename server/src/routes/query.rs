use serde::Deserialize;

use crate::db::{RecipeFilter, SortKey, SortOrder};

/// The sentinel filter value that means "no filter".
const ALL: &str = "All";

/// Query parameters accepted by the public listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub cuisine: Option<String>,
    pub diet_type: Option<String>,
    pub difficulty: Option<String>,
    pub min_rating: Option<f64>,
    pub max_calories: Option<i32>,
    pub max_time: Option<i32>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl ListQuery {
    pub fn filter(&self) -> RecipeFilter {
        RecipeFilter {
            cuisine: screen(&self.cuisine),
            diet_type: screen(&self.diet_type),
            difficulty: screen(&self.difficulty),
            min_rating: self.min_rating,
            max_calories: self.max_calories,
            max_time: self.max_time,
            search: screen(&self.search),
        }
    }

    /// Resolves the requested sort against the whitelist; anything
    /// unrecognized falls back to newest-first.
    pub fn sort(&self) -> (SortKey, SortOrder) {
        let key = match self.sort_by.as_deref() {
            Some("title") => SortKey::Title,
            Some("averageRating") => SortKey::AverageRating,
            Some("calories") => SortKey::Calories,
            Some("totalTime") => SortKey::TotalTime,
            _ => SortKey::CreatedAt,
        };

        let order = match self.order.as_deref() {
            Some("asc") => SortOrder::Ascending,
            Some("desc") => SortOrder::Descending,
            _ if key == SortKey::CreatedAt => SortOrder::Descending,
            _ => SortOrder::Ascending,
        };

        (key, order)
    }
}

/// Drops empty strings and the "All" sentinel.
fn screen(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty() && *v != ALL)
        .map(str::to_owned)
}

/// Plain page/limit parameters for authenticated listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// The optional limit on the popular listing.
#[derive(Debug, Default, Deserialize)]
pub struct PopularQuery {
    pub limit: Option<u32>,
}

/// The body of a rating submission.
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}
