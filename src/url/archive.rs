use crate::{UrlError, UrlResult};
use url::Url;

/// First year covered by the EDGAR full-index tree
pub const MIN_INDEX_YEAR: u16 = 1993;

/// Parses the archive base URL
///
/// Only HTTP and HTTPS are accepted. A missing trailing slash is added so
/// that joining a relative path keeps the last segment of the base.
///
/// # Examples
///
/// ```
/// use edgar_harvest::url::parse_archive_base;
///
/// let base = parse_archive_base("https://www.sec.gov/Archives").unwrap();
/// assert_eq!(base.as_str(), "https://www.sec.gov/Archives/");
/// ```
pub fn parse_archive_base(base: &str) -> UrlResult<Url> {
    let mut url = Url::parse(base).map_err(|e| UrlError::Parse(format!("{}: {}", base, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::Parse(format!(
            "Only HTTP and HTTPS archive URLs are supported, got: {}",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Returns the path of `url` relative to the archive `base`
///
/// Scheme, host and port must match and the path must lie strictly below
/// the base path. Query and fragment are ignored.
pub fn relative_to_archive(url: &Url, base: &Url) -> UrlResult<String> {
    let outside = || UrlError::OutsideArchive {
        url: url.to_string(),
        base: base.to_string(),
    };

    if url.scheme() != base.scheme()
        || url.host_str() != base.host_str()
        || url.port_or_known_default() != base.port_or_known_default()
    {
        return Err(outside());
    }

    let relative = url
        .path()
        .strip_prefix(base.path())
        .ok_or_else(outside)?
        .trim_end_matches('/');

    if relative.is_empty() {
        return Err(outside());
    }

    Ok(relative.to_string())
}

/// Directory listing URL for one filer
pub fn cik_listing_url(base: &Url, cik: u64) -> UrlResult<Url> {
    base.join(&format!("edgar/data/{}/", cik))
        .map_err(|e| UrlError::Parse(e.to_string()))
}

/// URL of the compressed master index for one quarter
///
/// # Examples
///
/// ```
/// use edgar_harvest::url::{parse_archive_base, quarter_index_url};
///
/// let base = parse_archive_base("https://www.sec.gov/Archives/").unwrap();
/// let url = quarter_index_url(&base, 2020, 1).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/master.zip"
/// );
/// ```
pub fn quarter_index_url(base: &Url, year: u16, quarter: u8) -> UrlResult<Url> {
    if !(1..=4).contains(&quarter) {
        return Err(UrlError::Parse(format!("quarter must be 1-4, got {}", quarter)));
    }
    if year < MIN_INDEX_YEAR {
        return Err(UrlError::Parse(format!(
            "full-index starts in {}, got {}",
            MIN_INDEX_YEAR, year
        )));
    }

    base.join(&format!("edgar/full-index/{}/QTR{}/master.zip", year, quarter))
        .map_err(|e| UrlError::Parse(e.to_string()))
}
