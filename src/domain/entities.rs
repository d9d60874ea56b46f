//! Content entities as the rendering layer sees them, independent of which
//! CMS endpoint produced them.

use serde::{Deserialize, Serialize, Serializer};
use time::OffsetDateTime;

use crate::domain::types::PostStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: u64,
    pub slug: String,
    pub status: PostStatus,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
    pub author: Option<Author>,
    pub featured_media: Option<Media>,
    pub category_ids: Vec<u64>,
    pub tag_ids: Vec<u64>,
    pub categories: Vec<Term>,
    pub tags: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub id: u64,
    pub source_url: String,
    pub alt_text: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A category or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Term {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub count: u64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeoMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub twitter_title: Option<String>,
    pub twitter_description: Option<String>,
    /// Raw JSON-LD graph, passed through untouched.
    pub schema: Option<serde_json::Value>,
}

/// Optional fields supplied by the slower enrichment source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Enrichment {
    pub seo: Option<SeoMetadata>,
    pub featured_image: Option<Media>,
    pub categories: Vec<Term>,
    pub tags: Vec<Term>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.seo.is_none()
            && self.featured_image.is_none()
            && self.categories.is_empty()
            && self.tags.is_empty()
    }
}

/// A single post as returned to callers.
///
/// Serializes as the post's fields plus an `enrichment` member that is `null`
/// for [`MergedPost::PrimaryOnly`].
#[derive(Debug, Clone, PartialEq)]
pub enum MergedPost {
    /// Enrichment failed, timed out, or was skipped.
    PrimaryOnly(Post),
    Merged { post: Post, enrichment: Enrichment },
}

impl MergedPost {
    pub fn post(&self) -> &Post {
        match self {
            MergedPost::PrimaryOnly(post) | MergedPost::Merged { post, .. } => post,
        }
    }

    pub fn enrichment(&self) -> Option<&Enrichment> {
        match self {
            MergedPost::PrimaryOnly(_) => None,
            MergedPost::Merged { enrichment, .. } => Some(enrichment),
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, MergedPost::Merged { .. })
    }
}

impl Serialize for MergedPost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(flatten)]
            post: &'a Post,
            enrichment: Option<&'a Enrichment>,
        }

        Wire {
            post: self.post(),
            enrichment: self.enrichment(),
        }
        .serialize(serializer)
    }
}

/// Summary of a related post, normalized across recommendation sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedPost {
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub featured_image: Option<String>,
}

impl From<&Post> for RelatedPost {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            slug: post.slug.clone(),
            title: post.title.clone(),
            excerpt: (!post.excerpt.is_empty()).then(|| post.excerpt.clone()),
            published_at: Some(post.published_at),
            featured_image: post
                .featured_media
                .as_ref()
                .map(|media| media.source_url.clone()),
        }
    }
}

impl From<Post> for RelatedPost {
    fn from(post: Post) -> Self {
        RelatedPost::from(&post)
    }
}

/// Diagnostics the recommendation service attaches to a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationMetadata {
    pub categories_found: u64,
    pub tags_found: u64,
    pub total_posts_processed: u64,
    pub unique_posts_found: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recommendations {
    pub posts: Vec<RelatedPost>,
    pub metadata: Option<RecommendationMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_post() -> Post {
        Post {
            id: 7,
            slug: "hello-world".to_string(),
            status: PostStatus::Publish,
            title: "Hello".to_string(),
            content: "<p>Body</p>".to_string(),
            excerpt: String::new(),
            published_at: OffsetDateTime::UNIX_EPOCH,
            modified_at: OffsetDateTime::UNIX_EPOCH,
            author: None,
            featured_media: None,
            category_ids: vec![1],
            tag_ids: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn primary_only_serializes_null_enrichment() {
        let merged = MergedPost::PrimaryOnly(sample_post());
        let json = serde_json::to_value(&merged).expect("serialize");

        assert_eq!(json["slug"], "hello-world");
        assert!(json["enrichment"].is_null());
        assert!(!merged.is_enriched());
    }

    #[test]
    fn merged_serializes_enrichment_alongside_post_fields() {
        let merged = MergedPost::Merged {
            post: sample_post(),
            enrichment: Enrichment {
                seo: Some(SeoMetadata {
                    title: Some("SEO title".to_string()),
                    ..SeoMetadata::default()
                }),
                ..Enrichment::default()
            },
        };
        let json = serde_json::to_value(&merged).expect("serialize");

        assert_eq!(json["id"], 7);
        assert_eq!(json["enrichment"]["seo"]["title"], "SEO title");
        assert_eq!(merged.enrichment().map(Enrichment::is_empty), Some(false));
    }

    #[test]
    fn related_post_drops_empty_excerpt() {
        let related = RelatedPost::from(&sample_post());
        assert_eq!(related.excerpt, None);
        assert_eq!(related.published_at, Some(OffsetDateTime::UNIX_EPOCH));
    }
}
