//! Catalog entities: categories and the signs they contain.
//!
//! Raw payload records are validated into these types at the crawler
//! boundary. A sign's owning category is attached exactly once, when a
//! [`SignRecord`] is consumed into a [`Sign`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque catalog identifier.
///
/// The remote service emits ids as numbers in some payloads and strings in
/// others; both normalize to the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct CatalogId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl From<RawId> for CatalogId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Int(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        }
    }
}

impl From<CatalogId> for String {
    fn from(id: CatalogId) -> Self {
        id.0
    }
}

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form of the id that is safe to use as a file stem.
    ///
    /// Ids made only of `[A-Za-z0-9_-]` are used as is. Any other id has
    /// its unsafe characters replaced and a short digest of the full id
    /// appended, so distinct ids never share a stem.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if stem == self.0 {
            return stem;
        }

        let digest = hex::encode(Sha256::digest(self.0.as_bytes()));
        format!("{}-{}", stem, &digest[..8])
    }
}

impl std::fmt::Display for CatalogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog category ("module")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CatalogId,
    pub title: String,
}

impl Category {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: CatalogId::new(id),
            title: title.into(),
        }
    }
}

/// A sign parsed from a category's item list, not yet placed in a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRecord {
    pub id: CatalogId,
    pub definition: String,
    pub pos: String,
    pub video_url: String,
}

impl SignRecord {
    /// Attach the owning category, producing a complete [`Sign`]
    pub fn place_in(self, category: &Category) -> Sign {
        Sign {
            id: self.id,
            definition: self.definition,
            pos: self.pos,
            video_url: self.video_url,
            category_id: category.id.clone(),
            category_title: category.title.clone(),
        }
    }
}

/// A sign with its owning category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sign {
    pub id: CatalogId,
    pub definition: String,
    pub pos: String,
    pub video_url: String,
    category_id: CatalogId,
    category_title: String,
}

impl Sign {
    pub fn category_id(&self) -> &CatalogId {
        &self.category_id
    }

    pub fn category_title(&self) -> &str {
        &self.category_title
    }

    /// Human-facing page for this sign on the catalog site
    pub fn page_url(&self, base_url: &str, language: &str, sign_language: &str) -> String {
        format!(
            "{}/{}/signs/{}?sl={}",
            base_url.trim_end_matches('/'),
            language,
            self.id,
            sign_language
        )
    }
}
