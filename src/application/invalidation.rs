//! Invalidation gateway.
//!
//! External change notices (CMS webhooks, admin actions, revalidation
//! requests) are first classified into [`InvalidationEvent`]s by pure
//! functions, then applied to the registry and discarded.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::cache::keys::{LIST_PREFIX, RELATED_PREFIX, media_key, post_key};
use crate::cache::{CacheRegistry, Clock, ContentCategory, SystemClock};
use crate::domain::types::{ContentNotification, PostStatus};

/// Which entries of a category an event removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    Key(String),
    /// Every key starting with the prefix.
    Prefix(String),
    /// Wildcard: the whole category.
    All,
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationTarget::Key(key) => f.write_str(key),
            InvalidationTarget::Prefix(prefix) => write!(f, "{prefix}*"),
            InvalidationTarget::All => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub category: ContentCategory,
    pub target: InvalidationTarget,
    pub reason: String,
    pub received_at: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(
        category: ContentCategory,
        target: InvalidationTarget,
        reason: impl Into<String>,
        received_at: OffsetDateTime,
    ) -> Self {
        Self {
            category,
            target,
            reason: reason.into(),
            received_at,
        }
    }
}

/// Result of handling one external notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationSummary {
    pub events: usize,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<&'static str>,
}

/// Category cached for a CMS `post_type`, if any.
pub fn category_for_post_type(post_type: &str) -> Option<ContentCategory> {
    match post_type.trim().to_ascii_lowercase().as_str() {
        "post" | "page" => Some(ContentCategory::Posts),
        "attachment" | "download" => Some(ContentCategory::Media),
        "category" => Some(ContentCategory::Categories),
        "post_tag" | "tag" => Some(ContentCategory::Tags),
        _ => None,
    }
}

/// Reason a notification produces no events.
pub fn ignore_reason(notification: &ContentNotification) -> Option<&'static str> {
    if notification.post_status == PostStatus::Draft {
        return Some("draft");
    }
    if category_for_post_type(&notification.post_type).is_none() {
        return Some("unsupported post type");
    }
    None
}

/// Classify a webhook notification. Performs no I/O.
pub fn plan_notification(
    notification: &ContentNotification,
    received_at: OffsetDateTime,
) -> Vec<InvalidationEvent> {
    if ignore_reason(notification).is_some() {
        return Vec::new();
    }
    let Some(category) = category_for_post_type(&notification.post_type) else {
        return Vec::new();
    };
    let reason = format!(
        "webhook: {} {} {}",
        notification.post_type, notification.post_id, notification.post_status
    );
    let event = |category, target| InvalidationEvent::new(category, target, &reason, received_at);

    match category {
        ContentCategory::Posts => {
            let mut events: Vec<_> = notification
                .affected_slugs()
                .into_iter()
                .map(|slug| event(category, InvalidationTarget::Key(post_key(&slug))))
                .collect();
            events.push(event(
                category,
                InvalidationTarget::Prefix(LIST_PREFIX.to_string()),
            ));
            events.push(event(
                category,
                InvalidationTarget::Prefix(RELATED_PREFIX.to_string()),
            ));
            events.push(event(ContentCategory::Search, InvalidationTarget::All));
            events
        }
        ContentCategory::Media => vec![event(
            category,
            InvalidationTarget::Key(media_key(notification.post_id)),
        )],
        ContentCategory::Categories | ContentCategory::Tags => vec![
            event(category, InvalidationTarget::All),
            event(
                ContentCategory::Posts,
                InvalidationTarget::Prefix(LIST_PREFIX.to_string()),
            ),
        ],
        ContentCategory::Search => vec![event(category, InvalidationTarget::All)],
    }
}

/// Events clearing every category.
pub fn plan_clear_all(reason: &str, received_at: OffsetDateTime) -> Vec<InvalidationEvent> {
    ContentCategory::ALL
        .into_iter()
        .map(|category| {
            InvalidationEvent::new(category, InvalidationTarget::All, reason, received_at)
        })
        .collect()
}

/// Applies invalidation events to the registry. The only writer besides the
/// content fetch path.
pub struct InvalidationGateway {
    registry: Arc<CacheRegistry>,
    clock: Arc<dyn Clock>,
}

impl InvalidationGateway {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(registry: Arc<CacheRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Remove `target` from `category`. Absent keys are a no-op.
    pub fn invalidate(
        &self,
        category: ContentCategory,
        target: InvalidationTarget,
        reason: &str,
    ) -> usize {
        self.apply(&InvalidationEvent::new(category, target, reason, self.now()))
    }

    /// Apply one event and return how many entries it removed.
    pub fn apply(&self, event: &InvalidationEvent) -> usize {
        // Engines that were never created hold nothing to remove.
        let Some(engine) = self.registry.existing(event.category) else {
            return 0;
        };

        let removed = match &event.target {
            InvalidationTarget::Key(key) => usize::from(engine.delete(key)),
            InvalidationTarget::Prefix(prefix) => engine.delete_prefix(prefix),
            InvalidationTarget::All => engine.clear(),
        };

        debug!(
            target = "headpress::application::invalidation",
            category = %event.category,
            key = %event.target,
            reason = %event.reason,
            removed,
            "Applied invalidation"
        );
        removed
    }

    pub fn apply_all(&self, events: &[InvalidationEvent]) -> usize {
        events.iter().map(|event| self.apply(event)).sum()
    }

    pub fn handle_notification(&self, notification: &ContentNotification) -> InvalidationSummary {
        if let Some(reason) = ignore_reason(notification) {
            debug!(
                target = "headpress::application::invalidation",
                post_id = notification.post_id,
                post_type = %notification.post_type,
                reason,
                "Ignored content notification"
            );
            return InvalidationSummary {
                ignored: Some(reason),
                ..InvalidationSummary::default()
            };
        }

        let events = plan_notification(notification, self.now());
        let removed = self.apply_all(&events);
        info!(
            target = "headpress::application::invalidation",
            post_id = notification.post_id,
            post_type = %notification.post_type,
            status = %notification.post_status,
            events = events.len(),
            removed,
            "Processed content notification"
        );

        InvalidationSummary {
            events: events.len(),
            removed,
            ignored: None,
        }
    }

    pub fn clear_all(&self, reason: &str) -> usize {
        let removed = self.apply_all(&plan_clear_all(reason, self.now()));
        info!(
            target = "headpress::application::invalidation",
            reason,
            removed,
            "Cleared every cache category"
        );
        removed
    }
}
