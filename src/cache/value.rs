use std::sync::Arc;

use crate::domain::entities::{Media, MergedPost, Post, RelatedPost, Term};

/// Values held by the category engines. Payloads are shared, so a hit is a
/// reference-count bump rather than a deep copy.
#[derive(Debug, Clone)]
pub enum CachedContent {
    Post(Arc<MergedPost>),
    Posts(Arc<Vec<Post>>),
    Terms(Arc<Vec<Term>>),
    Related(Arc<Vec<RelatedPost>>),
    Media(Arc<Media>),
}
