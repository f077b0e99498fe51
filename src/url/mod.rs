//! Archive path handling for edgar-harvest
//!
//! This module maps between remote archive URLs and resource identifiers:
//! - Parsing and normalising the archive base URL
//! - Turning absolute archive URLs into archive-relative paths
//! - Recognising accession folders and deriving their filing documents
//! - Building listing and quarterly index URLs

mod accession;
mod archive;

// Re-export main functions
pub use accession::{filing_for_folder, format_accession, is_accession_folder};
pub use archive::{
    cik_listing_url, parse_archive_base, quarter_index_url, relative_to_archive, MIN_INDEX_YEAR,
};
