//! Capability token derivation: capabilities are derived from the effective
//! configuration and what actually landed in the datasets, never declared
//! by the caller, so a capability token is only ever present when the
//! dataset it promises is actually non-empty.

use crate::config::{RenderMode, ReplayTier};
use crate::model::AssetType;
use std::collections::HashSet;

/// Derives the closed-vocabulary capability set for this archive.
///
/// A capability is only included when its backing dataset content is
/// actually present — `replay.css` is never claimed on a crawl that
/// captured no stylesheet links, regardless of the configured replay tier.
pub fn derive_capabilities(
    tier: ReplayTier,
    render_mode: RenderMode,
    pages_count: u64,
    asset_types_present: &HashSet<AssetType>,
) -> Vec<String> {
    let mut caps = Vec::new();

    if pages_count > 0 {
        caps.push("seo.core".to_string());
        caps.push("replay.html".to_string());
    }

    if render_mode != RenderMode::Raw {
        caps.push("render.dom".to_string());
    }

    if matches!(tier, ReplayTier::HtmlCss | ReplayTier::Full)
        && asset_types_present.contains(&AssetType::Css)
    {
        caps.push("replay.css".to_string());
    }

    if matches!(tier, ReplayTier::Full) && asset_types_present.contains(&AssetType::Image) {
        caps.push("replay.images".to_string());
    }

    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capabilities_when_no_pages() {
        let caps = derive_capabilities(ReplayTier::Full, RenderMode::Raw, 0, &HashSet::new());
        assert!(caps.is_empty());
    }

    #[test]
    fn test_seo_and_replay_html_with_pages_present() {
        let caps = derive_capabilities(ReplayTier::Html, RenderMode::Raw, 3, &HashSet::new());
        assert!(caps.contains(&"seo.core".to_string()));
        assert!(caps.contains(&"replay.html".to_string()));
        assert!(!caps.contains(&"replay.css".to_string()));
    }

    #[test]
    fn test_replay_css_requires_both_tier_and_asset_presence() {
        let mut present = HashSet::new();
        present.insert(AssetType::Css);
        let caps = derive_capabilities(ReplayTier::HtmlCss, RenderMode::Raw, 1, &present);
        assert!(caps.contains(&"replay.css".to_string()));

        let caps_without_asset =
            derive_capabilities(ReplayTier::HtmlCss, RenderMode::Raw, 1, &HashSet::new());
        assert!(!caps_without_asset.contains(&"replay.css".to_string()));
    }

    #[test]
    fn test_render_dom_only_for_non_raw_mode() {
        let caps = derive_capabilities(ReplayTier::Html, RenderMode::Full, 1, &HashSet::new());
        assert!(caps.contains(&"render.dom".to_string()));
    }
}
