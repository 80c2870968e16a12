use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::{BackendError, FieldError};
use crate::normalization;
use crate::user::Author;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_CUISINE_LENGTH: usize = 50;
pub const MAX_COMMENT_LENGTH: usize = 200;

/// How demanding a recipe is to cook.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Easy" => Ok(Difficulty::Easy),
            "Medium" => Ok(Difficulty::Medium),
            "Hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// The dietary category a recipe falls into.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DietType {
    Vegetarian,
    #[serde(rename = "Non-Vegetarian")]
    NonVegetarian,
    Vegan,
    #[serde(rename = "Gluten-Free")]
    GlutenFree,
    Keto,
    Paleo,
    #[serde(rename = "Low-Carb")]
    LowCarb,
    #[serde(rename = "Dairy-Free")]
    DairyFree,
}

impl DietType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DietType::Vegetarian => "Vegetarian",
            DietType::NonVegetarian => "Non-Vegetarian",
            DietType::Vegan => "Vegan",
            DietType::GlutenFree => "Gluten-Free",
            DietType::Keto => "Keto",
            DietType::Paleo => "Paleo",
            DietType::LowCarb => "Low-Carb",
            DietType::DairyFree => "Dairy-Free",
        }
    }
}

impl FromStr for DietType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vegetarian" => Ok(DietType::Vegetarian),
            "Non-Vegetarian" => Ok(DietType::NonVegetarian),
            "Vegan" => Ok(DietType::Vegan),
            "Gluten-Free" => Ok(DietType::GlutenFree),
            "Keto" => Ok(DietType::Keto),
            "Paleo" => Ok(DietType::Paleo),
            "Low-Carb" => Ok(DietType::LowCarb),
            "Dairy-Free" => Ok(DietType::DairyFree),
            other => Err(format!("unknown diet type: {}", other)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DietType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preparation and cooking times in minutes. The total is derived on
/// serialization and never stored.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct CookingTime {
    pub prep: i32,
    pub cook: i32,
}

impl CookingTime {
    pub fn total(&self) -> i32 {
        self.prep + self.cook
    }
}

impl Serialize for CookingTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CookingTime", 3)?;
        s.serialize_field("prep", &self.prep)?;
        s.serialize_field("cook", &self.cook)?;
        s.serialize_field("totalTime", &self.total())?;
        s.end()
    }
}

/// One entry of the ordered ingredient list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

/// One entry of the ordered instruction list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionStep {
    pub step_number: i32,
    pub instruction: String,
}

/// Optional macro-nutrient breakdown.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NutritionalInfo {
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub sugar: Option<f64>,
}

/// A single per-user rating as stored on the recipe document.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rating {
    pub user: Uuid,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The times a document was created and last modified.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Times {
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// A full recipe document with its author populated. The rating
/// representation is generic: listings carry stored [`Rating`]s, the
/// single-recipe view carries [`PopulatedRating`]s with their users
/// resolved.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe<R = Rating> {
    pub id: Uuid,
    pub author: Author,
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub difficulty: Difficulty,
    pub cuisine: String,
    pub diet_type: DietType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<i32>,
    pub image: String,
    pub is_public: bool,
    pub cooking_time: CookingTime,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<InstructionStep>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutritional_info: Option<NutritionalInfo>,
    pub ratings: Vec<R>,
    pub average_rating: f64,
    pub total_ratings: i64,
    #[serde(flatten)]
    pub times: Times,
}

/// A rating with its user reference replaced by the user's details.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedRating {
    pub user: RatingUser,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The selected fields of a rating's user.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingUser {
    pub id: Uuid,
    pub username: String,
    pub profile_image: String,
}

/// The single-recipe view: author including bio, rating users resolved.
pub type RecipeDetail = Recipe<PopulatedRating>;

/// The caller-supplied fields of a recipe, as submitted on create and
/// update. Structured fields accept either their structured form or a
/// JSON string containing it (see [`textual`]).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDraft {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub difficulty: Difficulty,
    #[serde(deserialize_with = "normalization::deserialize")]
    pub cuisine: String,
    pub diet_type: DietType,
    #[serde(default)]
    pub calories: Option<i32>,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
    #[serde(deserialize_with = "textual::decode")]
    pub cooking_time: CookingTime,
    #[serde(deserialize_with = "textual::decode")]
    pub ingredients: Vec<Ingredient>,
    #[serde(deserialize_with = "textual::decode")]
    pub instructions: Vec<InstructionStep>,
    #[serde(default, deserialize_with = "textual::decode")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "textual::decode_option")]
    pub nutritional_info: Option<NutritionalInfo>,
}

fn default_is_public() -> bool {
    true
}

impl RecipeDraft {
    /// Checks every schema constraint, collecting field-level messages
    /// instead of failing on the first violation.
    pub fn validate(&self) -> Result<(), BackendError> {
        let mut errors = vec![];

        if self.title.is_empty() {
            errors.push(FieldError::new("title", "title is required"));
        } else if self.title.chars().count() > MAX_TITLE_LENGTH {
            errors.push(FieldError::new(
                "title",
                format!("title must be at most {} characters", MAX_TITLE_LENGTH),
            ));
        }

        if self.description.is_empty() {
            errors.push(FieldError::new("description", "description is required"));
        } else if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            errors.push(FieldError::new(
                "description",
                format!(
                    "description must be at most {} characters",
                    MAX_DESCRIPTION_LENGTH
                ),
            ));
        }

        if self.servings < 1 {
            errors.push(FieldError::new("servings", "servings must be at least 1"));
        }

        if self.cuisine.is_empty() {
            errors.push(FieldError::new("cuisine", "cuisine is required"));
        } else if self.cuisine.chars().count() > MAX_CUISINE_LENGTH {
            errors.push(FieldError::new(
                "cuisine",
                format!("cuisine must be at most {} characters", MAX_CUISINE_LENGTH),
            ));
        }

        if let Some(calories) = self.calories {
            if calories < 1 {
                errors.push(FieldError::new("calories", "calories must be at least 1"));
            }
        }

        if self.cooking_time.prep < 1 {
            errors.push(FieldError::new(
                "cookingTime.prep",
                "prep time must be at least 1 minute",
            ));
        }

        if self.cooking_time.cook < 1 {
            errors.push(FieldError::new(
                "cookingTime.cook",
                "cook time must be at least 1 minute",
            ));
        }

        if self.ingredients.is_empty() {
            errors.push(FieldError::new(
                "ingredients",
                "at least one ingredient is required",
            ));
        }

        for (index, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.name.is_empty() || ingredient.quantity.is_empty() || ingredient.unit.is_empty() {
                errors.push(FieldError::new(
                    format!("ingredients[{}]", index),
                    "name, quantity and unit are required",
                ));
            }
        }

        if self.instructions.is_empty() {
            errors.push(FieldError::new(
                "instructions",
                "at least one instruction is required",
            ));
        }

        for (index, step) in self.instructions.iter().enumerate() {
            if step.instruction.is_empty() {
                errors.push(FieldError::new(
                    format!("instructions[{}]", index),
                    "instruction text is required",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BackendError::Validation { errors })
        }
    }
}

/// Validates a rating submission (value plus optional comment).
pub fn validate_rating(rating: u8, comment: Option<&str>) -> Result<(), BackendError> {
    let mut errors = vec![];

    if !(1..=5).contains(&rating) {
        errors.push(FieldError::new("rating", "rating must be between 1 and 5"));
    }

    if let Some(comment) = comment {
        if comment.chars().count() > MAX_COMMENT_LENGTH {
            errors.push(FieldError::new(
                "comment",
                format!("comment must be at most {} characters", MAX_COMMENT_LENGTH),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BackendError::Validation { errors })
    }
}

/// Inserts or replaces the user's rating. An existing entry is replaced
/// in place so the array keeps its order; a new rater is appended.
pub fn upsert_rating(ratings: &mut Vec<Rating>, entry: Rating) {
    match ratings.iter_mut().find(|r| r.user == entry.user) {
        Some(existing) => *existing = entry,
        None => ratings.push(entry),
    }
}

/// Recomputes the derived aggregates: the mean rating rounded to one
/// decimal (0.0 when empty) and the rating count.
pub fn rating_summary(ratings: &[Rating]) -> (f64, i64) {
    if ratings.is_empty() {
        return (0.0, 0);
    }

    let sum: u32 = ratings.iter().map(|r| u32::from(r.rating)).sum();
    let mean = f64::from(sum) / ratings.len() as f64;

    ((mean * 10.0).round() / 10.0, ratings.len() as i64)
}

/// Decode-or-pass-through deserialization for structured fields that may
/// arrive as serialized JSON text. Malformed text is a deserialization
/// error, surfaced to the caller as a bad request.
pub mod textual {
    use serde::de::{self, DeserializeOwned, Deserializer};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Dual<T> {
        Structured(T),
        Text(String),
    }

    pub fn decode<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        match Dual::<T>::deserialize(deserializer)? {
            Dual::Structured(value) => Ok(value),
            Dual::Text(text) => serde_json::from_str(&text).map_err(de::Error::custom),
        }
    }

    pub fn decode_option<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        match Option::<Dual<T>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Dual::Structured(value)) => Ok(Some(value)),
            Some(Dual::Text(text)) => serde_json::from_str(&text)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}
