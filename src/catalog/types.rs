//! Catalog record types.
//!
//! [`ProductRecord`] is what the catalog source hands us, [`EmbeddedProduct`] is
//! what the store persists.

use serde::{Deserialize, Serialize};

/// One catalog row. Field names follow the catalog CSV headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Stable product identifier; primary key of the store.
    pub id: i64,
    #[serde(rename = "productDisplayName", default)]
    pub display_name: String,
    #[serde(rename = "masterCategory", default)]
    pub master_category: String,
    #[serde(rename = "subCategory", default)]
    pub sub_category: String,
    #[serde(rename = "articleType", default)]
    pub article_type: String,
    #[serde(rename = "baseColour", default)]
    pub base_colour: String,
    /// Precomputed text for the text encoder. Blank means "embed the empty string".
    #[serde(default)]
    pub text_for_embedding: Option<String>,
    /// Image file name relative to the image directory, if the catalog names one.
    #[serde(default)]
    pub image_file: Option<String>,
}

impl ProductRecord {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            master_category: String::new(),
            sub_category: String::new(),
            article_type: String::new(),
            base_colour: String::new(),
            text_for_embedding: None,
            image_file: None,
        }
    }

    /// The string handed to the text encoder; missing text is the empty string.
    pub fn embedding_text(&self) -> &str {
        self.text_for_embedding.as_deref().unwrap_or("")
    }

    /// Name, then the four categorical attributes, space-joined, trimmed, lower-cased.
    pub fn compose_embedding_text(&self) -> String {
        let joined = [
            clean_text(&self.display_name).as_str(),
            self.master_category.as_str(),
            self.sub_category.as_str(),
            self.article_type.as_str(),
            self.base_colour.as_str(),
        ]
        .join(" ");
        clean_text(&joined)
    }
}

fn clean_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A product with its computed vectors, the unit of persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedProduct {
    pub record: ProductRecord,
    /// 384-d, unit norm (or zero).
    pub text_embedding: Option<Vec<f32>>,
    /// 512-d, unit norm. `None` when no decodable image exists.
    pub image_embedding: Option<Vec<f32>>,
}
