//! Slug validation for values arriving from request paths and webhooks.
//!
//! CMS slugs are lowercase ASCII with `-`/`_`, and non-ASCII titles are stored
//! percent-encoded (`%e4%bd%a0`). Anything else cannot name a post.

use crate::domain::error::DomainError;

/// Longest slug the CMS stores.
pub const MAX_SLUG_LEN: usize = 200;

/// Normalize `input` to the stored slug form, rejecting values that cannot be
/// a slug.
pub fn normalize_slug(input: &str) -> Result<String, DomainError> {
    let candidate = input.trim().trim_matches('/').to_ascii_lowercase();

    if candidate.is_empty() {
        return Err(DomainError::validation("slug", "must not be empty"));
    }
    if candidate.len() > MAX_SLUG_LEN {
        return Err(DomainError::validation(
            "slug",
            format!("longer than {MAX_SLUG_LEN} characters"),
        ));
    }

    let bytes = candidate.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => index += 1,
            b'%' if bytes.len() > index + 2
                && bytes[index + 1].is_ascii_hexdigit()
                && bytes[index + 2].is_ascii_hexdigit() =>
            {
                index += 3
            }
            other => {
                return Err(DomainError::validation(
                    "slug",
                    format!("unexpected character `{}`", other as char),
                ));
            }
        }
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_percent_encoded_slugs() {
        assert_eq!(normalize_slug(" Hello-World ").unwrap(), "hello-world");
        assert_eq!(normalize_slug("/my_post/").unwrap(), "my_post");
        assert_eq!(normalize_slug("%E4%BD%A0").unwrap(), "%e4%bd%a0");
    }

    #[test]
    fn rejects_invalid_slugs() {
        assert!(normalize_slug("").is_err());
        assert!(normalize_slug("   ").is_err());
        assert!(normalize_slug("a/b").is_err());
        assert!(normalize_slug("bad%zz").is_err());
        assert!(normalize_slug("trailing%4").is_err());
        assert!(normalize_slug(&"a".repeat(MAX_SLUG_LEN + 1)).is_err());
    }
}
