//! Blog post, category and media models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

use super::{Comment, UserSummary};

/// Blog category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Emoji or icon name
    pub icon: String,
}

/// Who may read a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    /// Author and users who follow the author and are followed back
    Friends,
    Private,
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privacy::Public => write!(f, "public"),
            Privacy::Friends => write!(f, "friends"),
            Privacy::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Privacy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Privacy::Public),
            "friends" => Ok(Privacy::Friends),
            "private" => Ok(Privacy::Private),
            _ => Err(anyhow::anyhow!("Invalid privacy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feeling {
    Happy,
    Sad,
    Excited,
    Tired,
    Loved,
    Angry,
}

impl Feeling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feeling::Happy => "happy",
            Feeling::Sad => "sad",
            Feeling::Excited => "excited",
            Feeling::Tired => "tired",
            Feeling::Loved => "loved",
            Feeling::Angry => "angry",
        }
    }

    /// Parse the stored column, where an empty string means no feeling
    pub fn from_column(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl FromStr for Feeling {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "happy" => Ok(Feeling::Happy),
            "sad" => Ok(Feeling::Sad),
            "excited" => Ok(Feeling::Excited),
            "tired" => Ok(Feeling::Tired),
            "loved" => Ok(Feeling::Loved),
            "angry" => Ok(Feeling::Angry),
            _ => Err(anyhow::anyhow!("Invalid feeling: {}", s)),
        }
    }
}

/// Blog post row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub author_id: i64,
    pub category_id: Option<i64>,
    pub content: String,
    pub featured: bool,
    pub privacy: Privacy,
    pub location: String,
    pub feeling: Option<Feeling>,
    pub activity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a writer supplies when creating or editing a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub feeling: Option<Feeling>,
    #[serde(default)]
    pub activity: String,
    /// Usernames of tagged users
    #[serde(default)]
    pub tagged_users: Vec<String>,
}

impl PostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            _ => Err(anyhow::anyhow!("Invalid media type: {}", s)),
        }
    }
}

/// File attached to a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMedia {
    pub id: i64,
    pub post_id: i64,
    /// Path relative to the media root
    pub file: String,
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
}

impl PostMedia {
    pub fn url(&self) -> String {
        format!("/media/{}", self.file)
    }
}

/// Post as shown in listings
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
    pub category: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
}

/// Everything needed to render a single post
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
    pub category: Option<Category>,
    pub media: Vec<PostMedia>,
    pub tagged_users: Vec<UserSummary>,
    pub likes_count: i64,
    pub shares_count: i64,
    pub is_liked: bool,
    pub is_shared: bool,
    pub comments: Vec<Comment>,
}

/// Slug derived from a title
///
/// Accented letters are decomposed (NFKD) and folded to their ASCII base;
/// whatever has no ASCII form is dropped. The rest is lowercased, reduced
/// to letters, digits, underscores, hyphens and whitespace, and the words
/// are joined with single hyphens. Titles with no usable characters fall
/// back to `post`.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_ascii_whitespace())
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_dash = false;
    for c in kept.chars() {
        if c == '-' || c.is_ascii_whitespace() {
            pending_dash = true;
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c);
    }

    let slug = slug.trim_matches(|c| c == '-' || c == '_').to_string();
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust -- is   fun!  "), "rust-is-fun");
        assert_eq!(slugify("snake_case title"), "snake_case-title");
        assert_eq!(slugify("_edge_"), "edge");
    }

    #[test]
    fn test_slugify_folds_accents_to_ascii() {
        assert_eq!(slugify("Café au lait"), "cafe-au-lait");
        assert_eq!(slugify("Ñandú Señor"), "nandu-senor");
        assert_eq!(slugify("Ｆｕｌｌ ｗｉｄｔｈ"), "full-width");
        assert_eq!(slugify("ﬁle naïve"), "file-naive");
        // no decomposition, dropped
        assert_eq!(slugify("Straße"), "strae");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), "post");
        assert_eq!(slugify("!!!"), "post");
        assert_eq!(slugify("日本語"), "post");
    }

    #[test]
    fn test_enum_round_trips() {
        for privacy in [Privacy::Public, Privacy::Friends, Privacy::Private] {
            assert_eq!(privacy.to_string().parse::<Privacy>().unwrap(), privacy);
        }
        assert_eq!(Feeling::from_column(""), None);
        assert_eq!(Feeling::from_column("loved"), Some(Feeling::Loved));
        assert!("blurry".parse::<MediaType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_slug_charset(title in "\\PC{0,60}") {
            let slug = slugify(&title);
            prop_assert!(!slug.is_empty());
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn prop_slugify_is_idempotent(title in "[a-zA-Z0-9 _-]{0,40}") {
            let once = slugify(&title);
            prop_assert_eq!(slugify(&once), once);
        }
    }
}
