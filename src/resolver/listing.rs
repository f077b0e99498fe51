//! HTML directory listing resolver
//!
//! EDGAR serves one directory page per filer. Each filing lives in a folder
//! named by its accession number without dashes; every other link on the
//! page (parent directory, sort links, site navigation) is noise.

use crate::harvester::Fetch;
use crate::resolver::{fetch_root, Resolution, ResolveResult};
use crate::url::{filing_for_folder, is_accession_folder, relative_to_archive};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Fetches a directory listing and returns the filings it links to
///
/// # Arguments
///
/// * `fetcher` - Fetcher used for the listing page
/// * `listing_url` - URL of the directory page
/// * `archive_base` - Base URL resource identifiers are relative to
///
/// # Returns
///
/// * `Ok(Resolution)` - The filings found; may be empty
/// * `Err(ResolveError::RootUnavailable)` - The page could not be fetched
pub async fn resolve_listing<F: Fetch + ?Sized>(
    fetcher: &F,
    listing_url: &Url,
    archive_base: &Url,
) -> ResolveResult<Resolution> {
    tracing::info!("Resolving directory listing {}", listing_url);

    let bytes = fetch_root(fetcher, listing_url).await?;
    let html = String::from_utf8_lossy(&bytes);
    let resolution = extract_filings(&html, listing_url, archive_base);

    if resolution.is_empty() {
        tracing::warn!("Listing {} contains no accession folders", listing_url);
    } else {
        tracing::info!(
            "Found {} filings in {} ({} other links ignored)",
            resolution.len(),
            listing_url,
            resolution.discarded
        );
    }

    Ok(resolution)
}

/// Extracts filings from the HTML of a directory listing
///
/// A link is kept when it resolves inside the archive and its last path
/// segment is exactly 18 digits. Kept folders are mapped to the complete
/// submission text file inside them.
pub fn extract_filings(html: &str, page_url: &Url, archive_base: &Url) -> Resolution {
    let document = Html::parse_document(html);
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return resolution;
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        match filing_for_link(href, page_url, archive_base) {
            Some(resource_id) => resolution.push_unique(&mut seen, resource_id),
            None => {
                tracing::debug!("Ignoring listing link {}", href);
                resolution.discarded += 1;
            }
        }
    }

    resolution
}

fn filing_for_link(href: &str, page_url: &Url, archive_base: &Url) -> Option<crate::state::ResourceId> {
    let url = page_url.join(href.trim()).ok()?;
    let relative = relative_to_archive(&url, archive_base).ok()?;

    let folder = relative.rsplit('/').next()?;
    if !is_accession_folder(folder) {
        return None;
    }

    filing_for_folder(&relative).ok()
}
