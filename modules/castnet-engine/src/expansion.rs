//! Keyword expansion for exhaustible search sources.
//!
//! The real expansion model is an external collaborator; adapters talk to it
//! through `KeywordExpander` and fall back to deterministic modifier suffixes
//! when it fails, so a run always has some forward progress.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait KeywordExpander: Send + Sync {
    /// Up to `count` query variants for `seed`, none of which appear in
    /// `exclude` (compared case-insensitively, whitespace-trimmed).
    async fn expand(&self, seed: &str, exclude: &[String], count: usize) -> anyhow::Result<Vec<String>>;
}

/// Deterministic fallback: seed + modifier suffix. Exhausts quickly by
/// design — a source that needed more variants than this has an expansion
/// model configured.
pub struct ModifierExpander;

const MODIFIERS: &[&str] = &[
    "tips", "tutorial", "review", "ideas", "vlog", "routine", "guide", "hacks",
    "challenge", "daily", "for beginners", "inspiration", "behind the scenes",
    "q&a", "transformation",
];

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[async_trait]
impl KeywordExpander for ModifierExpander {
    async fn expand(&self, seed: &str, exclude: &[String], count: usize) -> anyhow::Result<Vec<String>> {
        let excluded: HashSet<String> = exclude.iter().map(|k| normalize(k)).collect();
        let seed = seed.trim();
        let variants = MODIFIERS
            .iter()
            .map(|modifier| format!("{seed} {modifier}"))
            .filter(|variant| !excluded.contains(&normalize(variant)))
            .take(count)
            .collect();
        Ok(variants)
    }
}

/// Expand via the configured expander; on failure fall back to the
/// deterministic modifiers rather than aborting the run.
pub(crate) async fn expand_with_fallback(
    expander: &dyn KeywordExpander,
    seed: &str,
    exclude: &[String],
    count: usize,
) -> Vec<String> {
    match expander.expand(seed, exclude, count).await {
        Ok(variants) => {
            // Re-filter defensively: an external model does not always honor
            // the exclude list.
            let excluded: HashSet<String> = exclude.iter().map(|k| normalize(k)).collect();
            let mut seen = HashSet::new();
            variants
                .into_iter()
                .filter(|v| !excluded.contains(&normalize(v)))
                .filter(|v| seen.insert(normalize(v)))
                .take(count)
                .collect()
        }
        Err(e) => {
            warn!(seed, error = %e, "Keyword expansion failed, using modifier fallback");
            ModifierExpander
                .expand(seed, exclude, count)
                .await
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenExpander;

    #[async_trait]
    impl KeywordExpander for BrokenExpander {
        async fn expand(&self, _: &str, _: &[String], _: usize) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("model unavailable")
        }
    }

    struct RudeExpander;

    #[async_trait]
    impl KeywordExpander for RudeExpander {
        async fn expand(&self, seed: &str, _: &[String], _: usize) -> anyhow::Result<Vec<String>> {
            // Ignores the exclude list and duplicates itself.
            Ok(vec![
                format!("{seed} tips"),
                format!("{seed} TIPS"),
                format!("{seed} new"),
            ])
        }
    }

    #[tokio::test]
    async fn modifier_expander_excludes_processed() {
        let variants = ModifierExpander
            .expand("yoga", &["Yoga Tips".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(variants.len(), 3);
        assert!(!variants.iter().any(|v| v.eq_ignore_ascii_case("yoga tips")));
        assert_eq!(variants[0], "yoga tutorial");
    }

    #[tokio::test]
    async fn modifier_expander_exhausts_to_empty() {
        let all: Vec<String> = MODIFIERS.iter().map(|m| format!("yoga {m}")).collect();
        let variants = ModifierExpander.expand("yoga", &all, 5).await.unwrap();
        assert!(variants.is_empty());
    }

    #[tokio::test]
    async fn fallback_kicks_in_on_expander_failure() {
        let variants = expand_with_fallback(&BrokenExpander, "yoga", &[], 4).await;
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[0], "yoga tips");
    }

    #[tokio::test]
    async fn fallback_refilters_rude_expanders() {
        let variants =
            expand_with_fallback(&RudeExpander, "yoga", &["yoga tips".to_string()], 5).await;
        assert_eq!(variants, vec!["yoga new".to_string()]);
    }
}
