use scraper::{Html, Selector};
use url::Url;

use crawlbot_core::ExtractedPage;

pub fn extract(html_str: &str, base_url: &Url) -> ExtractedPage {
    let document = Html::parse_document(html_str);

    let text = body_text(&document);
    let links = extract_links(&document, base_url);

    ExtractedPage { text, links }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// All visible text under `<body>`, whitespace-collapsed.
fn body_text(document: &Html) -> String {
    selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Absolute, de-empty'd outbound links in document order.
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.is_empty() && !href.trim_start().to_lowercase().starts_with("javascript:"))
        .filter_map(|href| base_url.join(href).ok())
        .map(|u| u.to_string())
        .collect()
}
