//! Payload normalization: heterogeneous upstream records into one Creator
//! shape. Field names vary per platform and per collector version, so each
//! normalized field is picked from a candidate list.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use castnet_common::{Creator, Platform};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid regex")
    })
}

/// Contact emails found in free text, lowercased and deduplicated.
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    email_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

fn str_field(raw: &Value, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|key| raw.get(key))
        .find_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn int_field(raw: &Value, candidates: &[&str]) -> Option<i64> {
    candidates.iter().filter_map(|key| raw.get(key)).find_map(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn float_field(raw: &Value, candidates: &[&str]) -> Option<f64> {
    candidates.iter().filter_map(|key| raw.get(key)).find_map(|v| {
        v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn identity_candidates(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Tiktok => &["uniqueId", "username", "handle", "id"],
        Platform::Instagram => &["username", "ownerUsername", "handle", "id"],
        Platform::Youtube => &["channelHandle", "customUrl", "channelId", "id"],
    }
}

/// Normalize one raw upstream record. Returns None for records with nothing
/// usable at all (no identity, name, or bio) — the merge engine's fallback
/// key exists for thin-but-real records, not for empty husks.
pub fn normalize_profile(
    platform: Platform,
    raw: &Value,
    provider: &str,
    origin_keyword: Option<&str>,
) -> Option<Creator> {
    if !raw.is_object() {
        return None;
    }

    let identity = str_field(raw, identity_candidates(platform));
    let username = identity.clone();
    let display_name = str_field(raw, &["nickname", "fullName", "displayName", "channelName", "title"]);
    let bio = str_field(raw, &["signature", "biography", "bio", "channelDescription", "description"]);

    if identity.is_none() && display_name.is_none() && bio.is_none() {
        return None;
    }

    let follower_count = int_field(
        raw,
        &["followerCount", "followersCount", "fans", "subscriberCount", "subscribers"],
    );
    let engagement_rate = float_field(raw, &["engagementRate", "engagement"]);
    let profile_url = str_field(raw, &["profileUrl", "url", "channelUrl", "webUrl"]);
    let emails = bio.as_deref().map(extract_emails).unwrap_or_default();

    let mut metadata = json!({ "provider": provider });
    if let Some(keyword) = origin_keyword {
        metadata["keyword"] = json!(keyword);
    }

    Some(Creator {
        platform,
        identity: identity.unwrap_or_default(),
        username,
        display_name,
        follower_count,
        engagement_rate,
        bio,
        emails,
        profile_url,
        metadata,
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tiktok_payload() {
        let raw = json!({
            "uniqueId": "gymrat99",
            "nickname": "Gym Rat",
            "followerCount": 120000,
            "signature": "fitness coach | collabs: gymrat@agency.io",
            "profileUrl": "https://www.tiktok.com/@gymrat99",
        });
        let creator = normalize_profile(Platform::Tiktok, &raw, "scrapedeck", Some("fitness")).unwrap();
        assert_eq!(creator.identity, "gymrat99");
        assert_eq!(creator.display_name.as_deref(), Some("Gym Rat"));
        assert_eq!(creator.follower_count, Some(120000));
        assert_eq!(creator.emails, vec!["gymrat@agency.io".to_string()]);
        assert_eq!(creator.metadata["provider"], "scrapedeck");
        assert_eq!(creator.metadata["keyword"], "fitness");
    }

    #[test]
    fn normalizes_youtube_payload_with_string_counts() {
        let raw = json!({
            "channelId": "UC123",
            "channelName": "Cook With Ana",
            "subscriberCount": "45210",
            "channelDescription": "Recipes weekly.",
        });
        let creator = normalize_profile(Platform::Youtube, &raw, "scrapedeck", None).unwrap();
        assert_eq!(creator.identity, "UC123");
        assert_eq!(creator.follower_count, Some(45210));
        assert!(creator.emails.is_empty());
        assert!(creator.metadata.get("keyword").is_none());
    }

    #[test]
    fn empty_husks_are_dropped() {
        assert!(normalize_profile(Platform::Tiktok, &json!({"likes": 3}), "p", None).is_none());
        assert!(normalize_profile(Platform::Tiktok, &json!("string"), "p", None).is_none());
    }

    #[test]
    fn keeps_identityless_records_with_content() {
        let raw = json!({"bio": "no handle but real content"});
        let creator = normalize_profile(Platform::Instagram, &raw, "p", None).unwrap();
        assert!(creator.identity.is_empty());
        assert_eq!(creator.bio.as_deref(), Some("no handle but real content"));
    }

    #[test]
    fn email_extraction_dedupes_case_insensitively() {
        let emails = extract_emails("Reach me: A@b.co or a@B.CO or other@x.dev");
        assert_eq!(emails, vec!["a@b.co".to_string(), "other@x.dev".to_string()]);
    }
}
