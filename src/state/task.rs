use crate::{UrlError, UrlResult};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Path of a remote file relative to the archive base URL
///
/// For example `edgar/data/320193/0000320193-20-000010.txt`. A `ResourceId`
/// is validated on construction and never changes afterwards; it is the key
/// used by the ledger and the pending list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource identifier from an archive-relative path
    ///
    /// Rejects empty paths, absolute paths, `..` segments, and any character
    /// that cannot be stored in the ledger or the pending list.
    pub fn new(path: impl Into<String>) -> UrlResult<Self> {
        let path = path.into();
        let trimmed = path.trim();

        if trimmed.is_empty() || trimmed != path {
            return Err(UrlError::InvalidResource(path));
        }

        if path.starts_with('/') || path.ends_with('/') {
            return Err(UrlError::InvalidResource(path));
        }

        if path
            .chars()
            .any(|c| c == ',' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(UrlError::InvalidResource(path));
        }

        if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(UrlError::InvalidResource(path));
        }

        Ok(Self(path))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the top-level grouping key used to partition local storage
    ///
    /// For `edgar/data/<CIK>/...` paths this is the CIK. Anything else is
    /// grouped by its first path segment.
    pub fn group(&self) -> &str {
        match self.filer_path() {
            Some((cik, _)) => cik,
            None => self.0.split('/').next().unwrap_or(&self.0),
        }
    }

    /// Splits `edgar/data/<CIK>/<rest>` into the CIK and the rest
    fn filer_path(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix("edgar/data/")?;
        let (cik, rest) = rest.split_once('/')?;
        Some((cik, rest))
    }

    /// Local path for this resource under `download_dir`
    ///
    /// Filer paths drop their `edgar/data/` prefix and land under the CIK
    /// directory with every segment below it kept. Other paths are mirrored
    /// as they are. Distinct identifiers of the same shape never share a
    /// destination.
    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        match self.filer_path() {
            Some((cik, rest)) => rest
                .split('/')
                .fold(download_dir.join(cik), |path, seg| path.join(seg)),
            None => self
                .0
                .split('/')
                .fold(download_dir.to_path_buf(), |path, seg| path.join(seg)),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One download handed to the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub resource_id: ResourceId,
    pub remote_url: Url,
    pub destination: PathBuf,
}

impl DownloadTask {
    /// Builds the task for `resource_id` against the archive base URL
    pub fn new(resource_id: ResourceId, archive_base: &Url, download_dir: &Path) -> UrlResult<Self> {
        let remote_url = archive_base
            .join(resource_id.as_str())
            .map_err(|e| UrlError::Parse(format!("{}: {}", resource_id, e)))?;
        let destination = resource_id.local_path(download_dir);

        Ok(Self {
            resource_id,
            remote_url,
            destination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_resource_id() {
        let id = ResourceId::new("edgar/data/320193/0000320193-20-000010.txt").unwrap();
        assert_eq!(id.file_name(), "0000320193-20-000010.txt");
        assert_eq!(id.group(), "320193");
        assert_eq!(id.to_string(), "edgar/data/320193/0000320193-20-000010.txt");
    }

    #[test]
    fn test_rejects_bad_ids() {
        for bad in [
            "",
            " edgar/data/1/a.txt",
            "/edgar/data/1/a.txt",
            "edgar/data/1/",
            "edgar//data/1/a.txt",
            "edgar/../secret",
            "edgar/data/1/a,b.txt",
            "edgar/data/1/a b.txt",
            "edgar/data/1/a\nb.txt",
        ] {
            assert!(ResourceId::new(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_group_fallbacks() {
        assert_eq!(ResourceId::new("full-index/2020/QTR1/master.zip").unwrap().group(), "full-index");
        assert_eq!(ResourceId::new("readme.txt").unwrap().group(), "readme.txt");
        // No CIK directory after "data"
        assert_eq!(ResourceId::new("edgar/data/file.txt").unwrap().group(), "edgar");
    }

    #[test]
    fn test_local_path_partitioned_by_cik() {
        let id = ResourceId::new("edgar/data/1000045/0001564590-20-002541.txt").unwrap();
        let path = id.local_path(Path::new("/tmp/filings"));
        assert_eq!(
            path,
            PathBuf::from("/tmp/filings/1000045/0001564590-20-002541.txt")
        );
    }

    #[test]
    fn test_local_path_keeps_folders_below_cik() {
        let first = ResourceId::new("edgar/data/1/000000000120000001/primary_doc.xml").unwrap();
        let second = ResourceId::new("edgar/data/1/000000000120000002/primary_doc.xml").unwrap();
        let dir = Path::new("f");

        assert_eq!(
            first.local_path(dir),
            PathBuf::from("f/1/000000000120000001/primary_doc.xml")
        );
        assert_ne!(first.local_path(dir), second.local_path(dir));
    }

    #[test]
    fn test_local_path_mirrors_other_paths() {
        let q2020 = ResourceId::new("full-index/2020/QTR1/master.zip").unwrap();
        let q2021 = ResourceId::new("full-index/2021/QTR1/master.zip").unwrap();
        let dir = Path::new("f");

        assert_eq!(
            q2020.local_path(dir),
            PathBuf::from("f/full-index/2020/QTR1/master.zip")
        );
        assert_ne!(q2020.local_path(dir), q2021.local_path(dir));
    }

    #[test]
    fn test_download_task_url() {
        let base = Url::parse("https://www.sec.gov/Archives/").unwrap();
        let id = ResourceId::new("edgar/data/320193/0000320193-20-000010.txt").unwrap();
        let task = DownloadTask::new(id, &base, Path::new("out")).unwrap();

        assert_eq!(
            task.remote_url.as_str(),
            "https://www.sec.gov/Archives/edgar/data/320193/0000320193-20-000010.txt"
        );
        assert_eq!(
            task.destination,
            PathBuf::from("out/320193/0000320193-20-000010.txt")
        );
    }
}
