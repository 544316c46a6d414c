//! The default HTML extractor: title-agnostic link and asset extraction
//! plus the page record itself. Link-extraction rules mirror the teacher's
//! original parser — `rel="nofollow"` links are still followed, only
//! `javascript:`/`mailto:`/`tel:`/`data:` schemes and same-page fragments
//! are excluded.

use super::{ExtractionContext, ExtractionOutput, Extractor};
use crate::model::{AssetRecord, AssetType, DomLocation, EdgeRecord};
use crate::url::{extract_domain, normalize_url};
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn name(&self) -> &str {
        "html"
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionOutput {
        let mut output = ExtractionOutput::default();

        let body_sha256 = hex::encode(Sha256::digest(&ctx.render.body));
        let dom_sha256 = ctx.render.dom.as_ref().map(|dom| hex::encode(Sha256::digest(dom.as_bytes())));

        let is_html = ctx
            .render
            .declared_encoding
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);

        let base_url = Url::parse(&ctx.render.final_url).ok();
        let document_text = ctx.render.dom.clone().or_else(|| {
            if is_html {
                String::from_utf8(ctx.render.body.clone()).ok()
            } else {
                None
            }
        });

        let mut noindex = false;
        if let (Some(base), Some(html_text)) = (base_url.as_ref(), document_text.as_ref()) {
            let document = Html::parse_document(html_text);
            noindex = detect_noindex(&document);
            output.edges = extract_edges(&document, base, ctx.page_id);
            output.assets = extract_assets(&document, base, ctx.page_id);
        }

        output.page = Some(crate::model::PageRecord {
            page_id: ctx.page_id,
            url: ctx.task.url.clone(),
            normalized_url: ctx.task.normalized_url.clone(),
            final_url: ctx.render.final_url.clone(),
            status_code: ctx.render.status_code,
            content_type: ctx.render.declared_encoding.clone(),
            response_size: ctx.render.body.len() as u64,
            response_time_ms: ctx.render.navigation.load_event_end_ms.unwrap_or(0),
            body_sha256,
            dom_sha256,
            body_blob_ref: None,
            depth: ctx.task.depth,
            discovery_source: ctx.task.discovery_source,
            referrer: ctx.task.referrer.clone(),
            robots_decision: ctx.robots_decision,
            noindex,
            wait_condition: ctx.wait_condition.clone(),
            navigation: ctx.render.navigation.clone(),
            nav_reason: ctx.render.nav_reason,
            captured_at: ctx.captured_at,
            previous_page_id: ctx.previous_page_id,
        });

        output
    }
}

fn detect_noindex(document: &Html) -> bool {
    let Ok(selector) = Selector::parse(r#"meta[name="robots"]"#) else {
        return false;
    };
    document.select(&selector).any(|el| {
        el.value()
            .attr("content")
            .map(|c| c.to_lowercase().contains("noindex"))
            .unwrap_or(false)
    })
}

fn extract_edges(document: &Html, base_url: &Url, source_page_id: uuid::Uuid) -> Vec<EdgeRecord> {
    let mut edges = Vec::new();
    let source_host = base_url.host_str().map(|h| h.to_lowercase());

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return edges;
    };
    let mut sequence = 0u32;
    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(target) = resolve_followable_link(href, base_url) else {
            continue;
        };
        let normalized = normalize_url(target.as_str()).unwrap_or_else(|_| target.to_string());
        let target_host = extract_domain(target.as_str());
        let internal = source_host.is_some() && target_host == source_host;

        edges.push(EdgeRecord {
            source_page_id,
            target_url: normalized,
            target_page_id: None,
            anchor_text: {
                let text = element.text().collect::<String>().trim().to_string();
                if text.is_empty() { None } else { Some(text) }
            },
            rel: element.value().attr("rel").map(|s| s.to_string()),
            internal,
            dom_location: classify_dom_location(&element),
            discovery_render_mode: "raw".to_string(),
            sequence,
        });
        sequence += 1;
    }

    if let Ok(canonical_selector) = Selector::parse(r#"link[rel="canonical"][href]"#) {
        for element in document.select(&canonical_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(target) = resolve_followable_link(href, base_url) else {
                continue;
            };
            let normalized = normalize_url(target.as_str()).unwrap_or_else(|_| target.to_string());
            let target_host = extract_domain(target.as_str());
            edges.push(EdgeRecord {
                source_page_id,
                target_url: normalized,
                target_page_id: None,
                anchor_text: None,
                rel: Some("canonical".to_string()),
                internal: source_host.is_some() && target_host == source_host,
                dom_location: DomLocation::Other,
                discovery_render_mode: "raw".to_string(),
                sequence,
            });
            sequence += 1;
        }
    }

    edges
}

fn classify_dom_location(element: &ElementRef) -> DomLocation {
    for ancestor in element.ancestors() {
        if let Some(el) = scraper::ElementRef::wrap(ancestor) {
            match el.value().name() {
                "nav" => return DomLocation::Nav,
                "header" => return DomLocation::Header,
                "footer" => return DomLocation::Footer,
                "main" => return DomLocation::Main,
                _ => continue,
            }
        }
    }
    DomLocation::Other
}

fn extract_assets(document: &Html, base_url: &Url, page_id: uuid::Uuid) -> Vec<AssetRecord> {
    let mut assets = Vec::new();

    let img_selector = Selector::parse("img[src]").ok();
    if let Some(selector) = img_selector {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if let Some(url) = resolve_any_link(src, base_url) {
                    assets.push(AssetRecord {
                        page_id,
                        asset_url: url.to_string(),
                        asset_type: AssetType::Image,
                        alt_text: element.value().attr("alt").map(|s| s.to_string()),
                        tag_name: "img".to_string(),
                        size: None,
                        body_blob_ref: None,
                    });
                }
            }
        }
    }

    if let Some(selector) = Selector::parse(r#"link[rel="stylesheet"][href]"#).ok() {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_any_link(href, base_url) {
                    assets.push(AssetRecord {
                        page_id,
                        asset_url: url.to_string(),
                        asset_type: AssetType::Css,
                        alt_text: None,
                        tag_name: "link".to_string(),
                        size: None,
                        body_blob_ref: None,
                    });
                }
            }
        }
    }

    if let Some(selector) = Selector::parse("script[src]").ok() {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if let Some(url) = resolve_any_link(src, base_url) {
                    assets.push(AssetRecord {
                        page_id,
                        asset_url: url.to_string(),
                        asset_type: AssetType::Js,
                        alt_text: None,
                        tag_name: "script".to_string(),
                        size: None,
                        body_blob_ref: None,
                    });
                }
            }
        }
    }

    assets
}

/// Resolves and filters a link per the followable-link rules: excludes
/// `javascript:`/`mailto:`/`tel:`/`data:` schemes, fragment-only hrefs, and
/// anything that doesn't resolve to http(s).
fn resolve_followable_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let resolved = base_url.join(href).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved)
    } else {
        None
    }
}

/// Like `resolve_followable_link` but for non-navigational resource
/// references (images, stylesheets, scripts), which may legitimately be
/// `data:` URIs; those are simply skipped rather than treated as an error.
fn resolve_any_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    base_url.join(href).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiscoverySource, NavReason, NavigationTimings, RobotsDecision, UrlTask, WaitCondition};
    use crate::render::RenderOutput;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx_for<'a>(task: &'a UrlTask, render: &'a RenderOutput) -> ExtractionContext<'a> {
        ExtractionContext {
            task,
            page_id: Uuid::nil(),
            render,
            robots_decision: RobotsDecision::Allow,
            wait_condition: WaitCondition::Timeout,
            captured_at: Utc::now(),
            previous_page_id: None,
        }
    }

    fn html_render(body: &str) -> RenderOutput {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        RenderOutput {
            final_url: "https://example.com/page".to_string(),
            status_code: Some(200),
            headers,
            body: body.as_bytes().to_vec(),
            declared_encoding: Some("text/html".to_string()),
            dom: None,
            navigation: NavigationTimings::default(),
            nav_reason: NavReason::Fetch,
            screenshot: None,
            console_messages: None,
            accessibility_tree: None,
        }
    }

    #[test]
    fn test_extracts_page_record_with_body_hash() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render("<html><body>hi</body></html>");
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        let page = output.page.unwrap();
        assert_eq!(page.status_code, Some(200));
        assert_eq!(page.body_sha256.len(), 64);
    }

    #[test]
    fn test_follows_nofollow_links() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(r#"<html><body><a href="/other" rel="nofollow">x</a></body></html>"#);
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        assert_eq!(output.edges.len(), 1);
        assert_eq!(output.edges[0].target_url, "https://example.com/other");
    }

    #[test]
    fn test_skips_javascript_and_mailto_links() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(
            r#"<html><body>
                <a href="javascript:void(0)">a</a>
                <a href="mailto:test@example.com">b</a>
                <a href="/valid">c</a>
            </body></html>"#,
        );
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        assert_eq!(output.edges.len(), 1);
    }

    #[test]
    fn test_classifies_internal_vs_external_edges() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(
            r#"<html><body><a href="/internal">i</a><a href="https://other.test/external">e</a></body></html>"#,
        );
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        let internal = output.edges.iter().find(|e| e.target_url.contains("example.com")).unwrap();
        let external = output.edges.iter().find(|e| e.target_url.contains("other.test")).unwrap();
        assert!(internal.internal);
        assert!(!external.internal);
    }

    #[test]
    fn test_detects_noindex_meta() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(r#"<html><head><meta name="robots" content="noindex"></head><body></body></html>"#);
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        assert!(output.page.unwrap().noindex);
    }

    #[test]
    fn test_extracts_assets() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(
            r#"<html><head><link rel="stylesheet" href="/s.css"></head><body><img src="/i.png" alt="pic"></body></html>"#,
        );
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        assert_eq!(output.assets.len(), 2);
        assert!(output.assets.iter().any(|a| a.asset_type == AssetType::Css));
        assert!(output.assets.iter().any(|a| a.asset_type == AssetType::Image && a.alt_text.as_deref() == Some("pic")));
    }

    #[test]
    fn test_dom_location_classification() {
        let task = UrlTask::seed("https://example.com/page", "https://example.com/page");
        let render = html_render(
            r#"<html><body><nav><a href="/in-nav">n</a></nav><main><a href="/in-main">m</a></main></body></html>"#,
        );
        let output = HtmlExtractor.extract(&ctx_for(&task, &render));
        let nav_edge = output.edges.iter().find(|e| e.target_url.ends_with("in-nav")).unwrap();
        let main_edge = output.edges.iter().find(|e| e.target_url.ends_with("in-main")).unwrap();
        assert_eq!(nav_edge.dom_location, DomLocation::Nav);
        assert_eq!(main_edge.dom_location, DomLocation::Main);
    }
}
