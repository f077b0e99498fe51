//! Quarterly master index resolver
//!
//! EDGAR publishes one pipe-delimited `master.idx` per quarter, usually as a
//! zip archive. After a fixed-size header each data line reads
//!
//! ```text
//! CIK|Company Name|Form Type|Date Filed|Filename
//! ```
//!
//! where `Filename` is the archive-relative path of the filing.

use crate::harvester::Fetch;
use crate::resolver::{fetch_root, Resolution, ResolveError, ResolveResult};
use crate::state::{Pacer, ResourceId};
use crate::url::quarter_index_url;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::time::Duration;
use url::Url;
use zip::ZipArchive;

/// Minimum number of pipe-delimited fields in a data line
const MIN_FIELDS: usize = 5;

/// Upper bound on the buffer reserved up front for an extracted index
const PREALLOC_LIMIT: u64 = 64 * 1024 * 1024;

/// One parsed data line of a master index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLine<'a> {
    pub cik: &'a str,
    pub company: &'a str,
    pub form_type: &'a str,
    pub date_filed: &'a str,
    pub filename: &'a str,
}

impl<'a> IndexLine<'a> {
    /// Splits a data line, or returns None when it has too few fields
    ///
    /// Company names occasionally contain a pipe, so the trailing three
    /// fields are taken from the right and everything between the CIK and
    /// the form type is the company name.
    pub fn parse(line: &'a str) -> Option<Self> {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < MIN_FIELDS {
            return None;
        }

        let n = fields.len();
        let tail = fields[n - 3].len() + fields[n - 2].len() + fields[n - 1].len() + 3;
        let company = &line[fields[0].len() + 1..line.len() - tail];

        Some(Self {
            cik: fields[0].trim(),
            company: company.trim(),
            form_type: fields[n - 3].trim(),
            date_filed: fields[n - 2].trim(),
            filename: fields[n - 1].trim(),
        })
    }
}

/// Parses the text of a master index
///
/// The first `header_lines` lines are skipped unconditionally. Lines with
/// fewer than five fields, or whose filename is not a valid resource
/// identifier, are counted as discarded. When `forms` is non-empty only
/// lines whose form type matches one of them exactly are kept.
pub fn parse_index(text: &str, header_lines: usize, forms: &[String]) -> Resolution {
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    for (number, line) in text.lines().enumerate().skip(header_lines) {
        if line.trim().is_empty() {
            continue;
        }

        let Some(record) = IndexLine::parse(line) else {
            tracing::debug!("Skipping malformed index line {}: {:?}", number + 1, line);
            resolution.discarded += 1;
            continue;
        };

        if !forms.is_empty() && !forms.iter().any(|f| f == record.form_type) {
            resolution.filtered += 1;
            continue;
        }

        match ResourceId::new(record.filename) {
            Ok(resource_id) => resolution.push_unique(&mut seen, resource_id),
            Err(e) => {
                tracing::debug!("Skipping index line {}: {}", number + 1, e);
                resolution.discarded += 1;
            }
        }
    }

    resolution
}

/// Returns the index text held in `bytes`
///
/// Zip archives are recognised by their magic number and the first `.idx`
/// member (or the first file, if none has that extension) is extracted.
/// Anything else is taken to be an uncompressed index. Invalid UTF-8 is
/// replaced rather than rejected; company names are not always clean.
pub fn decode_index(bytes: Vec<u8>, url: &Url) -> ResolveResult<String> {
    if !bytes.starts_with(b"PK") {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let archive_error = |source| ResolveError::Archive {
        url: url.to_string(),
        source,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;

    let mut member = None;
    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(archive_error)?;
        if file.is_dir() {
            continue;
        }
        if file.name().ends_with(".idx") {
            member = Some(i);
            break;
        }
        member.get_or_insert(i);
    }

    let Some(index) = member else {
        return Err(ResolveError::EmptyArchive {
            url: url.to_string(),
        });
    };

    let mut file = archive.by_index(index).map_err(archive_error)?;
    let mut raw = Vec::with_capacity(prealloc_len(file.size()));
    file.read_to_end(&mut raw)
        .map_err(|e| archive_error(zip::result::ZipError::Io(e)))?;

    tracing::debug!("Extracted {} ({} bytes) from {}", file.name(), raw.len(), url);

    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Buffer to reserve for a member whose header declares `declared` bytes
///
/// The declared size comes from the remote archive, so it only ever hints.
fn prealloc_len(declared: u64) -> usize {
    declared.min(PREALLOC_LIMIT) as usize
}

/// Fetches one master index and returns the filings it lists
pub async fn resolve_index<F: Fetch + ?Sized>(
    fetcher: &F,
    index_url: &Url,
    header_lines: usize,
    forms: &[String],
) -> ResolveResult<Resolution> {
    tracing::info!("Resolving master index {}", index_url);

    let bytes = fetch_root(fetcher, index_url).await?;
    let text = decode_index(bytes, index_url)?;
    let resolution = parse_index(&text, header_lines, forms);

    tracing::info!(
        "Index {} lists {} filings ({} malformed lines, {} filtered by form)",
        index_url,
        resolution.len(),
        resolution.discarded,
        resolution.filtered
    );

    Ok(resolution)
}

/// Resolves several quarters in order and merges the results
///
/// Indexes are fetched one at a time, at least `delay` apart. The first
/// quarter that cannot be fetched aborts the whole resolution.
pub async fn resolve_quarters<F: Fetch + ?Sized>(
    fetcher: &F,
    archive_base: &Url,
    quarters: &[(u16, u8)],
    header_lines: usize,
    forms: &[String],
    delay: Duration,
) -> ResolveResult<Resolution> {
    let mut pacer = Pacer::new(delay);
    let mut resolution = Resolution::default();

    for &(year, quarter) in quarters {
        let url = quarter_index_url(archive_base, year, quarter)?;
        pacer.wait_turn().await;
        resolution.merge(resolve_index(fetcher, &url, header_lines, forms).await?);
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvester::{FetchErrorKind, FetchResult};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;
    use zip::write::SimpleFileOptions;

    const HEADER: &str = "Description:           Master Index of EDGAR Dissemination Feed
Last Data Received:    March 31, 2020
Comments:              webmaster@sec.gov
Anonymous FTP:         ftp://ftp.sec.gov/edgar/
Cloud HTTP:            https://www.sec.gov/Archives/




CIK|Company Name|Form Type|Date Filed|Filename
--------------------------------------------------------------------------------
";

    fn sample_index() -> String {
        format!(
            "{}{}",
            HEADER,
            "1000045|NICHOLAS FINANCIAL INC|10-Q|2020-02-14|edgar/data/1000045/0001564590-20-004703.txt
1000097|KINGDON CAPITAL MANAGEMENT, L.L.C.|SC 13G/A|2020-02-14|edgar/data/1000097/0000919574-20-001457.txt
broken|line|only
1000177|NORDIC AMERICAN TANKERS Ltd|6-K|2020-01-09|edgar/data/1000177/0000919574-20-000158.txt
1000180|SANDISK | CORP|10-K|2020-02-20|edgar/data/1000180/0001000180-20-000011.txt
"
        )
    }

    fn zipped(name: &str, contents: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn url() -> Url {
        Url::parse("https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/master.zip").unwrap()
    }

    #[test]
    fn test_header_is_eleven_lines() {
        assert_eq!(HEADER.lines().count(), 11);
    }

    #[test]
    fn test_parse_index() {
        let resolution = parse_index(&sample_index(), 11, &[]);

        let children: Vec<&str> = resolution.children.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            children,
            vec![
                "edgar/data/1000045/0001564590-20-004703.txt",
                "edgar/data/1000097/0000919574-20-001457.txt",
                "edgar/data/1000177/0000919574-20-000158.txt",
                "edgar/data/1000180/0001000180-20-000011.txt",
            ]
        );
        assert_eq!(resolution.discarded, 1);
        assert_eq!(resolution.filtered, 0);
    }

    #[test]
    fn test_parse_line_with_pipe_in_company() {
        let line = IndexLine::parse("1000180|SANDISK | CORP|10-K|2020-02-20|edgar/data/1000180/x.txt").unwrap();
        assert_eq!(line.cik, "1000180");
        assert_eq!(line.company, "SANDISK | CORP");
        assert_eq!(line.form_type, "10-K");
        assert_eq!(line.date_filed, "2020-02-20");
        assert_eq!(line.filename, "edgar/data/1000180/x.txt");

        assert!(IndexLine::parse("a|b|c|d").is_none());
    }

    #[test]
    fn test_forms_filter_is_exact() {
        let forms = vec!["10-Q".to_string(), "10-K".to_string()];
        let resolution = parse_index(&sample_index(), 11, &forms);

        assert_eq!(resolution.len(), 2);
        assert_eq!(resolution.filtered, 2);
    }

    #[test]
    fn test_header_only_index_is_empty() {
        let resolution = parse_index(HEADER, 11, &[]);
        assert!(resolution.is_empty());
        assert_eq!(resolution.discarded, 0);
    }

    #[test]
    fn test_decode_zip_and_plain() {
        let text = sample_index();

        let decoded = decode_index(zipped("master.idx", &text), &url()).unwrap();
        assert_eq!(decoded, text);

        let decoded = decode_index(text.clone().into_bytes(), &url()).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_decode_corrupt_zip() {
        let result = decode_index(b"PK\x03\x04 definitely not a zip".to_vec(), &url());
        assert!(matches!(result, Err(ResolveError::Archive { .. })));
    }

    #[test]
    fn test_declared_size_only_hints_allocation() {
        assert_eq!(prealloc_len(0), 0);
        assert_eq!(prealloc_len(4096), 4096);
        assert_eq!(prealloc_len(u64::MAX), PREALLOC_LIMIT as usize);
    }

    /// Serves one index body and records the URLs asked for
    struct IndexServer {
        body: Vec<u8>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetch for IndexServer {
        async fn fetch(&self, url: &Url) -> FetchResult {
            self.requested.lock().unwrap().push(url.to_string());
            if url.path().contains("QTR4") {
                return FetchResult::Failure {
                    kind: FetchErrorKind::HttpStatus(404),
                    attempts: 1,
                };
            }
            FetchResult::Success {
                bytes: self.body.clone(),
                content_hash: String::new(),
                status: 200,
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_quarters_merges() {
        let server = IndexServer {
            body: zipped("master.idx", &sample_index()),
            requested: Mutex::new(Vec::new()),
        };
        let base = Url::parse("https://www.sec.gov/Archives/").unwrap();

        let resolution = resolve_quarters(&server, &base, &[(2020, 1), (2020, 2)], 11, &[], Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(resolution.len(), 4);
        assert_eq!(
            *server.requested.lock().unwrap(),
            vec![
                "https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/master.zip",
                "https://www.sec.gov/Archives/edgar/full-index/2020/QTR2/master.zip",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_quarter_is_an_error() {
        let server = IndexServer {
            body: zipped("master.idx", &sample_index()),
            requested: Mutex::new(Vec::new()),
        };
        let base = Url::parse("https://www.sec.gov/Archives/").unwrap();

        let result = resolve_quarters(&server, &base, &[(2020, 3), (2020, 4)], 11, &[], Duration::ZERO).await;
        assert!(matches!(result, Err(ResolveError::RootUnavailable { .. })));
    }
}
