//! End-to-end crawl scenarios against mock HTTP servers, driving the full
//! `Scheduler` lifecycle (start, join, archive inspection) rather than any
//! single component in isolation.

use atlas_crawl_core::scheduler::ExitStatus;
use atlas_crawl_core::Scheduler;
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn out_atls_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("atlas-test-{}-{}.atls", std::process::id(), uuid::Uuid::now_v7()))
}

#[tokio::test]
async fn test_full_crawl_single_domain_discovers_linked_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body><a href="{base}/page1">Page 1</a><a href="{base}/page2">Page 2</a></body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>one</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>two</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let out_atls = out_atls_path();
    let config = write_config(&format!(
        r#"
seeds = ["{base}/"]
out-atls = "{out}"
max-errors = 10

[http]
rps = 100.0
per-host-rps = 100.0

[checkpoint]
enabled = false
"#,
        base = base,
        out = out_atls.display(),
    ));

    let scheduler = Scheduler::new();
    let crawl_id = scheduler.start(config.path()).await.unwrap();
    let outcome = scheduler.join(crawl_id).await.unwrap();

    assert_eq!(outcome.exit_status, ExitStatus::Success);
    assert_eq!(outcome.pages_crawled, 3);
    assert!(outcome.archive_path.unwrap().exists());

    let members = atlas_crawl_core::archive::list_members(&out_atls).unwrap();
    assert!(members.contains(&"manifest.json".to_string()));
    assert!(members.contains(&"capabilities.v1.json".to_string()));
    assert!(members.iter().any(|m| m.starts_with("pages.v1/")));
    assert!(members.iter().any(|m| m.starts_with("edges.v1/")));

    let _ = std::fs::remove_file(&out_atls);
}

#[tokio::test]
async fn test_robots_txt_disallow_is_respected() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body><a href="{base}/allowed">ok</a><a href="{base}/admin">no</a></body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/allowed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>allowed</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>admin</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .expect(0)
        .mount(&server)
        .await;

    let out_atls = out_atls_path();
    let config = write_config(&format!(
        r#"
seeds = ["{base}/"]
out-atls = "{out}"

[http]
rps = 100.0
per-host-rps = 100.0

[checkpoint]
enabled = false
"#,
        base = base,
        out = out_atls.display(),
    ));

    let scheduler = Scheduler::new();
    let crawl_id = scheduler.start(config.path()).await.unwrap();
    let outcome = scheduler.join(crawl_id).await.unwrap();

    assert_eq!(outcome.exit_status, ExitStatus::Success);
    // Only the root and /allowed are fetched; /admin is denied by the policy
    // gate before any request is dispatched (the `expect(0)` mock enforces
    // this at drop time).
    assert_eq!(outcome.pages_crawled, 2);

    let _ = std::fs::remove_file(&out_atls);
}

#[tokio::test]
async fn test_max_depth_bounds_discovery() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"<html><body><a href="{base}/level1">l1</a></body></html>"#))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"<html><body><a href="{base}/level2">l2</a></body></html>"#))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>depth exceeded, never fetched</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .expect(0)
        .mount(&server)
        .await;

    let out_atls = out_atls_path();
    let config = write_config(&format!(
        r#"
seeds = ["{base}/"]
out-atls = "{out}"
max-depth = 1

[http]
rps = 100.0
per-host-rps = 100.0

[checkpoint]
enabled = false
"#,
        base = base,
        out = out_atls.display(),
    ));

    let scheduler = Scheduler::new();
    let crawl_id = scheduler.start(config.path()).await.unwrap();
    let outcome = scheduler.join(crawl_id).await.unwrap();

    assert_eq!(outcome.exit_status, ExitStatus::Success);
    // / (depth 0) and /level1 (depth 1) are fetched; /level2 would be depth
    // 2, beyond max-depth, so the policy gate denies it before a request.
    assert_eq!(outcome.pages_crawled, 2);

    let _ = std::fs::remove_file(&out_atls);
}

#[tokio::test]
async fn test_error_budget_stops_crawl_early() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body><a href="{base}/missing1">a</a><a href="{base}/missing2">b</a></body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let out_atls = out_atls_path();
    let config = write_config(&format!(
        r#"
seeds = ["{base}/"]
out-atls = "{out}"
max-errors = 0

[http]
rps = 100.0
per-host-rps = 100.0

[checkpoint]
enabled = false
"#,
        base = base,
        out = out_atls.display(),
    ));

    let scheduler = Scheduler::new();
    let crawl_id = scheduler.start(config.path()).await.unwrap();
    let outcome = scheduler.join(crawl_id).await.unwrap();

    assert_eq!(outcome.exit_status, ExitStatus::ErrorBudgetOrCancelled);
    assert!(outcome.errors >= 1);

    let _ = std::fs::remove_file(&out_atls);
}

#[tokio::test]
async fn test_cancel_mid_crawl_marks_archive_incomplete() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>root, slow to cancel after</body></html>")
                .insert_header("content-type", "text/html")
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let out_atls = out_atls_path();
    let config = write_config(&format!(
        r#"
seeds = ["{base}/"]
out-atls = "{out}"

[http]
rps = 100.0
per-host-rps = 100.0

[checkpoint]
enabled = false
"#,
        base = base,
        out = out_atls.display(),
    ));

    let scheduler = Scheduler::new();
    let crawl_id = scheduler.start(config.path()).await.unwrap();
    scheduler.cancel(crawl_id).await.unwrap();
    let outcome = scheduler.join(crawl_id).await.unwrap();

    assert_eq!(outcome.exit_status, ExitStatus::ErrorBudgetOrCancelled);

    let _ = std::fs::remove_file(&out_atls);
}
