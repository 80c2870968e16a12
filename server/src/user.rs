use serde::Serialize;
use uuid::Uuid;

/// The caller resolved from a bearer session. Sessions are issued by the
/// authentication service; this backend only looks them up.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub username: String,
}

/// The selected author fields populated onto recipes. The bio is only
/// selected for the single-recipe view.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}
