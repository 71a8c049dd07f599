pub mod html;

use crawlbot_core::ExtractedPage;
use url::Url;

/// Max bytes to parse. Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Extract plain text and outbound links from a fetched page's HTML body.
pub fn extract(body: &str, page_url: &Url) -> ExtractedPage {
    let truncated = if body.len() > MAX_PARSE_SIZE {
        &body[..MAX_PARSE_SIZE]
    } else {
        body
    };
    html::extract(truncated, page_url)
}
