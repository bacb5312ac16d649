use serde::{Deserialize, Serialize};

/// A catalog row (`spec.md` §3 Product). Categories form a 3-level path;
/// absent levels are empty strings, never synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub product_name: String,
    pub category_1: String,
    #[serde(default)]
    pub category_2: String,
    #[serde(default)]
    pub category_3: String,
    pub article: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub page_url: String,
}

impl Product {
    /// The text embedded for this row: name, description, three category
    /// levels, and article, blank fields skipped, single-space separated
    /// (`spec.md` §4.3 indexing).
    pub fn embed_text(&self) -> String {
        [
            self.product_name.as_str(),
            self.description.as_str(),
            self.category_1.as_str(),
            self.category_2.as_str(),
            self.category_3.as_str(),
            self.article.as_str(),
        ]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Lifecycle of a built catalog index (`spec.md` §3 CatalogVersion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogVersionStatus {
    Building,
    Active,
    Superseded,
    Failed,
}

impl std::fmt::Display for CatalogVersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Active => write!(f, "active"),
            Self::Superseded => write!(f, "superseded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CatalogVersionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "building" => Ok(Self::Building),
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown catalog version status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub version_name: String,
    pub status: CatalogVersionStatus,
    pub total_rows: u64,
    pub indexed_rows: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub product: Product,
    /// Original cosine-similarity score in `[0, 1]`, before boosts.
    pub raw_score: f64,
    /// `raw_score` plus name/article boosts, clamped to `[0, 1]`.
    pub score: f64,
}
