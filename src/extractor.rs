//! Given HTML and its final URL, produces title, main text, heading
//! list, and discovered anchors.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::core::error::{Failure, FailureType};
use crate::core::types::Heading;
use crate::url_scope;

#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: Option<String>,
    pub content: String,
    pub content_chars: usize,
    pub truncated: bool,
    pub headings: Vec<Heading>,
    /// Absolute canonical URLs in document order, deduped preserving
    /// first occurrence. Used for enqueueing.
    pub anchors: Vec<Url>,
    /// Count of discovered anchors before the dedup above is applied —
    /// what `PageResult.links_found` reports.
    pub links_found: usize,
}

/// Anchors-only extraction for modes that don't retain page content.
#[derive(Debug, Clone)]
pub struct ExtractedLinks {
    pub title: Option<String>,
    pub anchors: Vec<Url>,
    pub links_found: usize,
}

pub struct Extractor {
    pub max_content_length: usize,
    pub max_headings: usize,
}

impl Extractor {
    pub fn new(max_content_length: usize, max_headings: usize) -> Self {
        Self {
            max_content_length,
            max_headings,
        }
    }

    pub fn extract(&self, html: &[u8], final_url: &Url) -> Result<Extracted, Failure> {
        let text = String::from_utf8_lossy(html);
        let document = Html::parse_document(&text);

        let title = self.extract_title(&document);
        let headings = self.extract_headings(&document);
        let (anchors, links_found) = self.extract_anchors(&document, final_url);

        let main_text = self.extract_main_text(&text, final_url, &document);
        let main_text = collapse_whitespace(&main_text);

        if main_text.trim().is_empty() {
            return Err(Failure::scrape(
                FailureType::EmptyContent,
                "extraction produced no readable content",
            ));
        }

        let content_chars = main_text.chars().count();
        let (content, truncated) = if content_chars > self.max_content_length {
            (
                main_text.chars().take(self.max_content_length).collect(),
                true,
            )
        } else {
            (main_text, false)
        };

        Ok(Extracted {
            title,
            content,
            content_chars,
            truncated,
            headings,
            anchors,
            links_found,
        })
    }

    /// Anchors and title only, never failing on empty readable content —
    /// for modes that don't need `main_text`.
    pub fn extract_links(&self, html: &[u8], final_url: &Url) -> ExtractedLinks {
        let text = String::from_utf8_lossy(html);
        let document = Html::parse_document(&text);

        let title = self.extract_title(&document);
        let (anchors, links_found) = self.extract_anchors(&document, final_url);

        ExtractedLinks {
            title,
            anchors,
            links_found,
        }
    }

    /// Title: first non-empty of `<title>`, `<h1>`, `og:title`.
    fn extract_title(&self, document: &Html) -> Option<String> {
        if let Some(t) = select_text(document, "title") {
            return Some(t);
        }
        if let Some(t) = select_text(document, "h1") {
            return Some(t);
        }
        select_attr(document, r#"meta[property="og:title"]"#, "content")
    }

    fn extract_headings(&self, document: &Html) -> Vec<Heading> {
        let mut headings = Vec::new();
        for level in 1..=6u8 {
            let sel = format!("h{level}");
            let Ok(selector) = Selector::parse(&sel) else {
                continue;
            };
            for element in document.select(&selector) {
                let text = element.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    headings.push(Heading { level, text });
                }
                if headings.len() >= self.max_headings {
                    return headings;
                }
            }
        }
        headings
    }

    /// Returns the deduped anchor list (enqueue order) plus the raw
    /// count of anchors discovered before dedup — `links_found` counts
    /// every `href` that canonicalizes, including repeats.
    fn extract_anchors(&self, document: &Html, base: &Url) -> (Vec<Url>, usize) {
        let Ok(selector) = Selector::parse("a[href]") else {
            return (Vec::new(), 0);
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut links_found = 0usize;
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(canonical) = url_scope::canonicalize(href, Some(base)) else {
                continue;
            };
            links_found += 1;
            if seen.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
        (out, links_found)
    }

    /// Main readable text: readability crate first, falling back to a
    /// content-area heuristic, falling back to whole-document text.
    fn extract_main_text(&self, html: &str, base: &Url, document: &Html) -> String {
        if let Ok(product) = readability::extractor::extract(&mut html.as_bytes(), base) {
            let text = Html::parse_fragment(&product.content)
                .root_element()
                .text()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.trim().is_empty() {
                return text;
            }
        }

        for selector_str in ["article", "main", "[role=main]", "#content", "#main"] {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(el) = document.select(&selector).next() {
                    let text: String = el.text().collect::<Vec<_>>().join(" ");
                    if !text.trim().is_empty() {
                        return text;
                    }
                }
            }
        }

        document.root_element().text().collect::<Vec<_>>().join(" ")
    }
}

fn select_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document.select(&selector).next().and_then(|el| {
        let text = el.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

fn select_attr(document: &Html, selector_str: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
