//! Content extraction: URL in, title and ordered text blocks out.

pub mod html;
pub mod pdf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::config::ExtractConfig;
use crate::models::{ContentType, ExtractedDocument};

/// Turns a URL into raw text blocks. An empty `blocks` means nothing usable was found.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedDocument>;

    /// Drop any remembered result for `url` so the next extract fetches it again.
    fn forget(&self, _url: &str) {}

    /// Drop every remembered result.
    fn clear_cache(&self) {}
}

/// Fetches pages over HTTP; HTML through `scraper`, PDF through `pdf-extract`.
pub struct HttpExtractor {
    client: reqwest::Client,
    min_text_length: usize,
    cache: Option<Mutex<LruCache<String, ExtractedDocument>>>,
}

impl HttpExtractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build extraction HTTP client")?;
        Ok(Self {
            client,
            min_text_length: config.min_text_length,
            cache: NonZeroUsize::new(config.cache_size)
                .map(|capacity| Mutex::new(LruCache::new(capacity))),
        })
    }

    fn cached(&self, url: &str) -> Option<ExtractedDocument> {
        self.cache.as_ref()?.lock().get(url).cloned()
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedDocument> {
        if let Some(doc) = self.cached(url) {
            tracing::debug!("Extraction cache hit for {url}");
            return Ok(doc);
        }

        let parsed = url::Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
        let resp = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !resp.status().is_success() {
            anyhow::bail!("Fetching {url} returned {}", resp.status());
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        let doc = if is_pdf(&parsed, &content_type) {
            let bytes = resp.bytes().await.context("Failed to read PDF body")?;
            let min_len = self.min_text_length;
            let blocks = tokio::task::spawn_blocking(move || pdf::parse_pdf(&bytes, min_len))
                .await
                .context("PDF extraction task panicked")??;
            ExtractedDocument {
                title: pdf_title(&parsed),
                blocks,
                content_type: ContentType::Pdf,
            }
        } else {
            let body = resp.text().await.context("Failed to read HTML body")?;
            let content = html::parse_html(&body, self.min_text_length);
            ExtractedDocument {
                title: content.title.unwrap_or_else(|| host_of(&parsed)),
                blocks: content.blocks,
                content_type: ContentType::Web,
            }
        };

        tracing::info!(
            "Extracted {} blocks from {url} ({:?})",
            doc.blocks.len(),
            doc.content_type
        );
        if let Some(cache) = &self.cache {
            if !doc.blocks.is_empty() {
                cache.lock().put(url.to_string(), doc.clone());
            }
        }
        Ok(doc)
    }

    fn forget(&self, url: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().pop(url);
        }
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

fn is_pdf(url: &url::Url, content_type: &str) -> bool {
    content_type.starts_with("application/pdf") || url.path().to_lowercase().ends_with(".pdf")
}

fn host_of(url: &url::Url) -> String {
    url.host_str().unwrap_or_default().to_string()
}

/// File name of the PDF, falling back to the host.
fn pdf_title(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| host_of(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_pdf_detection() {
        let pdf_url = url::Url::parse("https://example.org/papers/Attention.PDF").unwrap();
        let page_url = url::Url::parse("https://example.org/docs").unwrap();
        assert!(is_pdf(&pdf_url, "application/octet-stream"));
        assert!(is_pdf(&page_url, "application/pdf"));
        assert!(!is_pdf(&page_url, "text/html; charset=utf-8"));
    }

    #[test]
    fn test_titles_fall_back_to_host() {
        let pdf_url = url::Url::parse("https://example.org/papers/paper.pdf").unwrap();
        assert_eq!(pdf_title(&pdf_url), "paper.pdf");
        let bare = url::Url::parse("https://example.org/").unwrap();
        assert_eq!(pdf_title(&bare), "example.org");
        assert_eq!(host_of(&bare), "example.org");
    }

    /// Serves a page whose text changes on every request. Returns its URL and hit counter.
    async fn versioned_page() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = format!(
                    "<html><head><title>Changelog</title></head><body>\
                     <p>Version {n} of the changelog page with enough text to keep.</p>\
                     </body></html>"
                );
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/changelog"), hits)
    }

    fn config_with_cache(cache_size: usize) -> ExtractConfig {
        ExtractConfig {
            min_text_length: 10,
            cache_size,
            ..ExtractConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_extracts() {
        let (url, hits) = versioned_page().await;
        let extractor = HttpExtractor::new(&config_with_cache(4)).unwrap();

        let first = extractor.extract(&url).await.unwrap();
        let second = extractor.extract(&url).await.unwrap();
        assert_eq!(first.title, "Changelog");
        assert!(first.blocks[0].starts_with("Version 0"));
        assert_eq!(second.blocks, first.blocks);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forget_refetches_changed_page() {
        let (url, hits) = versioned_page().await;
        let extractor = HttpExtractor::new(&config_with_cache(4)).unwrap();

        let first = extractor.extract(&url).await.unwrap();
        extractor.forget(&url);
        let second = extractor.extract(&url).await.unwrap();
        assert!(first.blocks[0].starts_with("Version 0"));
        assert!(second.blocks[0].starts_with("Version 1"));

        extractor.clear_cache();
        let third = extractor.extract(&url).await.unwrap();
        assert!(third.blocks[0].starts_with("Version 2"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_cache_size_always_fetches() {
        let (url, hits) = versioned_page().await;
        let extractor = HttpExtractor::new(&config_with_cache(0)).unwrap();
        extractor.extract(&url).await.unwrap();
        extractor.extract(&url).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_is_bounded() {
        let extractor = HttpExtractor::new(&config_with_cache(2)).unwrap();
        let doc = ExtractedDocument {
            title: "t".into(),
            blocks: vec!["b".into()],
            content_type: ContentType::Web,
        };
        if let Some(cache) = &extractor.cache {
            for i in 0..5 {
                cache.lock().put(format!("https://example.org/{i}"), doc.clone());
            }
            assert_eq!(cache.lock().len(), 2);
        }
        assert!(extractor.cached("https://example.org/0").is_none());
        assert!(extractor.cached("https://example.org/4").is_some());
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        let extractor = HttpExtractor::new(&ExtractConfig::default()).unwrap();
        assert!(extractor.extract("not a url").await.is_err());
    }
}
