use std::time::Duration;

use scraper::node::Element;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use crate::error::FetchError;

/// Cap on extracted page text.
pub const MAX_TEXT_CHARS: usize = 20_000;

const USER_AGENT: &str = "Mozilla/5.0";

/// Elements whose text never belongs to a posting body.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "header", "footer", "nav", "svg",
];

/// Follows a posting link and reduces the page to plain text.
pub struct ContentEnricher {
    enabled: bool,
    max_html_chars: usize,
    http: reqwest::Client,
}

impl ContentEnricher {
    pub fn new(enabled: bool, timeout: Duration, max_html_chars: usize) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(ContentEnricher {
            enabled,
            max_html_chars,
            http,
        })
    }

    /// Page text, or "" when disabled or on any failure.
    pub async fn fetch(&self, url: &str) -> String {
        match self.try_fetch(url).await {
            Ok(text) => text,
            Err(FetchError::Disabled | FetchError::EmptyUrl) => String::new(),
            Err(e) => {
                warn!(url, error = %e, "page enrichment failed");
                String::new()
            }
        }
    }

    pub async fn try_fetch(&self, url: &str) -> Result<String, FetchError> {
        if !self.enabled {
            return Err(FetchError::Disabled);
        }
        if url.is_empty() {
            return Err(FetchError::EmptyUrl);
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let html = response.text().await?;
        let text = extract_text(&html, self.max_html_chars);
        debug!(url, chars = text.len(), "page enriched");
        Ok(text)
    }
}

/// Truncate raw HTML to `max_html_chars`, drop noise elements, and
/// collapse the remaining text into single-spaced plain text.
pub fn extract_text(html: &str, max_html_chars: usize) -> String {
    let html: String = html.chars().take(max_html_chars).collect();
    let document = Html::parse_document(&html);

    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_CHARS).collect()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !is_noise(child_element.value()) {
                collect_text(child_element, out);
            }
        }
    }
}

fn is_noise(element: &Element) -> bool {
    NOISE_TAGS.contains(&element.name())
        || element.attr("hidden").is_some()
        || element.attr("aria-hidden") == Some("true")
}
