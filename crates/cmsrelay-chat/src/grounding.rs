//! Best-effort prompt grounding from the content source.

use tracing::{debug, warn};

use cmsrelay_content::{ContentEntry, ContentSource};

use crate::types::ContentGrounding;

/// Entries beyond this are counted in the header but not listed.
pub const MAX_GROUNDING_ENTRIES: usize = 5;
pub const DEFAULT_LOCALE: &str = "en-us";

/// Format fetched entries into a grounding block. `None` when there are none.
///
/// ```text
/// Relevant content from Contentstack (6 entries):
/// (1) <title>: <description>
/// ...
/// (5) <title>: <description>
/// ```
pub fn format_grounding(entries: &[ContentEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let lines: Vec<String> = entries
        .iter()
        .take(MAX_GROUNDING_ENTRIES)
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "({}) {}: {}",
                i + 1,
                entry.title.as_deref().unwrap_or(""),
                entry.description.as_deref().unwrap_or("")
            )
        })
        .collect();

    Some(format!(
        "Relevant content from Contentstack ({} entries):\n{}",
        entries.len(),
        lines.join("\n")
    ))
}

/// Fetch and format grounding for a request. Only called out when the request
/// names a content type; any fetch failure is logged and yields `None`.
pub async fn fetch_grounding(
    source: &dyn ContentSource,
    grounding: Option<&ContentGrounding>,
) -> Option<String> {
    let grounding = grounding?;
    let content_type = grounding.content_type.as_deref().filter(|t| !t.is_empty())?;
    let locale = grounding
        .locale
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LOCALE);

    match source.get_entries(content_type, locale).await {
        Ok(entries) => {
            debug!("Grounding: {} entries for {} ({})", entries.len(), content_type, locale);
            format_grounding(&entries)
        }
        Err(e) => {
            warn!("Content fetch failed for {}: {}", content_type, e);
            None
        }
    }
}
