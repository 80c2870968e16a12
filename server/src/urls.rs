use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL and path generation.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path segment for all recipe actions.
    pub(crate) recipes_path: String,

    /// Prefix for all recipe actions.
    recipes_prefix: String,

    /// Path segment under which uploaded media is served.
    pub(crate) media_path: String,
}

impl Urls {
    /// Create a new instance. Neither path should include slashes.
    pub fn new(
        base: impl AsRef<str>,
        recipes_path: impl Into<String>,
        media_path: impl Into<String>,
    ) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let recipes_path = recipes_path.into();
        let recipes_prefix = format!("{}/", recipes_path);

        Urls {
            base,
            recipes_path,
            recipes_prefix,
            media_path: media_path.into(),
        }
    }

    pub fn recipes(&self) -> Url {
        self.base.join(&self.recipes_prefix).expect("get recipes URL")
    }

    pub fn recipe(&self, id: &Uuid) -> Url {
        let id = format!("{}", id);
        self.recipes()
            .join(&id)
            .unwrap_or_else(|_| panic!("get URL for recipe {}", id))
    }

    /// The relative path under which a stored media file is served.
    pub fn media_file(&self, key: &str) -> String {
        format!("/{}/{}", self.media_path, key)
    }

    /// Recovers the store key from a persisted media path, if it is ours.
    pub fn media_key<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix('/')
            .and_then(|p| p.strip_prefix(self.media_path.as_str()))
            .and_then(|p| p.strip_prefix('/'))
            .filter(|k| !k.is_empty())
    }
}
