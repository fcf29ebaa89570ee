//! Shared key generation for storage backends.
//!
//! Key format: `photos/{unix_millis}-{uuid}.{ext}`, or `photos/{unix_millis}-{uuid}-{name}`
//! when the uploader's file name is known.

use chrono::{DateTime, Utc};
use uuid::Uuid;

const KEY_PREFIX: &str = "photos";

/// Generate the storage key for one upload.
///
/// The key is generated once per upload and reused for every attempt against every
/// backend, so retries and the failover hop all target the same object name.
pub fn generate_photo_key(
    file_name: Option<&str>,
    content_type: &str,
    now: DateTime<Utc>,
) -> String {
    let stamp = format!("{}-{}", now.timestamp_millis(), Uuid::new_v4().simple());

    match file_name.map(sanitize_file_name).filter(|n| !n.is_empty()) {
        Some(name) => format!("{}/{}-{}", KEY_PREFIX, stamp, name),
        None => format!(
            "{}/{}.{}",
            KEY_PREFIX,
            stamp,
            extension_for_content_type(content_type)
        ),
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_` and collapse `..`.
///
/// `../../../malicious.jpg` becomes `_/_/_/malicious.jpg` first and then
/// `______malicious.jpg`: no separator and no parent reference survives.
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "_");
    }

    sanitized
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "image/avif" => "avif",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn key_without_name_uses_content_type_extension() {
        let key = generate_photo_key(None, "image/jpeg", fixed_now());
        assert!(key.starts_with("photos/1700000000123-"));
        assert!(key.ends_with(".jpg"));
    }

    #[test]
    fn key_with_name_keeps_sanitized_name() {
        let key = generate_photo_key(Some("wedding photo.jpg"), "image/jpeg", fixed_now());
        assert!(key.starts_with("photos/1700000000123-"));
        assert!(key.ends_with("-wedding_photo.jpg"));
    }

    #[test]
    fn keys_are_unique_within_the_same_millisecond() {
        let a = generate_photo_key(None, "image/png", fixed_now());
        let b = generate_photo_key(None, "image/png", fixed_now());
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_blocks_path_traversal() {
        let name = sanitize_file_name("../../../malicious.jpg");
        assert!(!name.contains(".."));
        assert!(!name.contains('/'));
        assert!(name.ends_with("malicious.jpg"));
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_file_name("test_photo-v2.jpg"), "test_photo-v2.jpg");
        assert_eq!(sanitize_file_name("a b%c.png"), "a_b_c.png");
    }

    #[test]
    fn empty_name_falls_back_to_extension() {
        let key = generate_photo_key(Some(""), "image/webp; charset=binary", fixed_now());
        assert!(key.ends_with(".webp"));
    }

    #[test]
    fn unknown_content_type_gets_bin() {
        assert_eq!(extension_for_content_type("application/octet-stream"), "bin");
        assert_eq!(extension_for_content_type("IMAGE/PNG"), "png");
    }
}
