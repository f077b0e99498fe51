use crate::state::ResourceId;
use crate::{UrlError, UrlResult};

/// Number of digits in an undashed accession number
const ACCESSION_DIGITS: usize = 18;

/// Returns true if `segment` looks like an accession folder name
///
/// Accession folders are named by the accession number without dashes:
/// exactly 18 ASCII digits.
pub fn is_accession_folder(segment: &str) -> bool {
    segment.len() == ACCESSION_DIGITS && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Formats an undashed accession number as `XXXXXXXXXX-YY-NNNNNN`
///
/// # Examples
///
/// ```
/// use edgar_harvest::url::format_accession;
///
/// assert_eq!(
///     format_accession("000032019320000010").unwrap(),
///     "0000320193-20-000010"
/// );
/// ```
pub fn format_accession(digits: &str) -> UrlResult<String> {
    if !is_accession_folder(digits) {
        return Err(UrlError::InvalidAccession(digits.to_string()));
    }

    Ok(format!("{}-{}-{}", &digits[..10], &digits[10..12], &digits[12..]))
}

/// Maps an accession folder path to the complete submission file inside it
///
/// `edgar/data/320193/000032019320000010` becomes
/// `edgar/data/320193/0000320193-20-000010.txt`, the path EDGAR serves the
/// full filing under.
pub fn filing_for_folder(folder: &str) -> UrlResult<ResourceId> {
    let folder = folder.trim_end_matches('/');
    let (parent, digits) = match folder.rsplit_once('/') {
        Some((parent, digits)) => (Some(parent), digits),
        None => (None, folder),
    };

    let dashed = format_accession(digits)?;
    let path = match parent {
        Some(parent) => format!("{}/{}.txt", parent, dashed),
        None => format!("{}.txt", dashed),
    };

    ResourceId::new(path)
}
