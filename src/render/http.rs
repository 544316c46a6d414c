//! The `raw` renderer: plain HTTP fetch, no browser. Follows redirects
//! manually so the final URL, status, and headers are all observable, and
//! enforces the per-page byte budget while streaming the body.

use super::{RenderOutput, RenderRequest, Renderer};
use crate::model::{NavReason, NavigationTimings};
use crate::AtlasError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{redirect::Policy, Client};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

const MAX_REDIRECTS: usize = 10;

pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(user_agent: &str) -> Result<Self, AtlasError> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(AtlasError::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderOutput, AtlasError> {
        let start = Instant::now();
        let mut current = request.url.clone();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !visited.insert(current.to_string()) {
                return Err(AtlasError::RedirectLoop {
                    url: current.to_string(),
                });
            }
            if visited.len() > MAX_REDIRECTS {
                return Err(AtlasError::RedirectLimit {
                    url: request.url.to_string(),
                });
            }

            let response = self.send_with_timeout(&current, request, cancel).await?;
            let status = response.status();

            if status.is_redirection() {
                let next = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok());
                match next {
                    Some(next_url) => {
                        current = next_url;
                        continue;
                    }
                    None => {
                        return Err(AtlasError::Render {
                            url: current.to_string(),
                            message: "redirect response without a usable Location".to_string(),
                        });
                    }
                }
            }

            let final_url = response.url().to_string();
            let status_code = status.as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let declared_encoding = headers.get("content-type").cloned();

            let body = self
                .read_bounded_body(response, request.max_bytes, &current, cancel)
                .await?;

            let navigation = NavigationTimings {
                nav_start_ms: 0,
                dom_content_loaded_ms: None,
                load_event_end_ms: Some(start.elapsed().as_millis() as u64),
                network_idle_ms: None,
            };

            return Ok(RenderOutput {
                final_url,
                status_code: Some(status_code),
                headers,
                body,
                declared_encoding,
                dom: None,
                navigation,
                nav_reason: NavReason::Fetch,
                screenshot: None,
                console_messages: None,
                accessibility_tree: None,
            });
        }
    }
}

impl HttpRenderer {
    async fn send_with_timeout(
        &self,
        url: &Url,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, AtlasError> {
        tokio::select! {
            result = tokio::time::timeout(request.timeout, self.client.get(url.clone()).send()) => {
                match result {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(classify_reqwest_error(url, e)),
                    Err(_) => Err(AtlasError::FetchTimeout { url: url.to_string() }),
                }
            }
            _ = cancel.cancelled() => Err(AtlasError::Render {
                url: url.to_string(),
                message: "cancelled".to_string(),
            }),
        }
    }

    async fn read_bounded_body(
        &self,
        response: reqwest::Response,
        max_bytes: u64,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AtlasError> {
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        loop {
            let next = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => {
                    // The critical invariant: capture what we have rather than
                    // silently discarding it on cancellation.
                    return Ok(buffer);
                }
            };
            match next {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() as u64 > max_bytes {
                        buffer.truncate(max_bytes as usize);
                        return Ok(buffer);
                    }
                }
                Some(Err(e)) => return Err(classify_reqwest_error(url, e)),
                None => return Ok(buffer),
            }
        }
    }
}

fn classify_reqwest_error(url: &Url, e: reqwest::Error) -> AtlasError {
    if e.is_timeout() {
        AtlasError::FetchTimeout {
            url: url.to_string(),
        }
    } else {
        AtlasError::FetchNetwork {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrivacyConfig;
    use crate::model::WaitCondition;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: Url) -> RenderRequest {
        RenderRequest {
            url,
            wait_condition: WaitCondition::Timeout,
            timeout: Duration::from_secs(5),
            max_bytes: 1024 * 1024,
            privacy: PrivacyConfig::default(),
            session_key: None,
        }
    }

    #[tokio::test]
    async fn test_fetches_simple_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestBot/1.0").unwrap();
        let cancel = CancellationToken::new();
        let url = Url::parse(&server.uri()).unwrap();
        let output = renderer.render(&request(url), &cancel).await.unwrap();
        assert_eq!(output.status_code, Some(200));
        assert_eq!(output.body, b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/end"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/end"))
            .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestBot/1.0").unwrap();
        let cancel = CancellationToken::new();
        let url = Url::parse(&format!("{}/start", server.uri())).unwrap();
        let output = renderer.render(&request(url), &cancel).await.unwrap();
        assert!(output.final_url.ends_with("/end"));
        assert_eq!(output.body, b"landed");
    }

    #[tokio::test]
    async fn test_truncates_body_past_byte_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(100)))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestBot/1.0").unwrap();
        let cancel = CancellationToken::new();
        let url = Url::parse(&format!("{}/big", server.uri())).unwrap();
        let mut req = request(url);
        req.max_bytes = 10;
        let output = renderer.render(&req, &cancel).await.unwrap();
        assert_eq!(output.body.len(), 10);
    }
}
