//! Repository resolution
//!
//! PURL parsing/classification and the version-to-tag commit finder.

pub mod commit_finder;
pub mod purl;

pub use commit_finder::{
    extract_commit_from_version, find_commit, find_commit_from_version_and_name, match_tags,
    CommitFinderOutcome, FixedRepository, Repository,
};
pub use purl::{determine_abstract_purl_type, AbstractPurlType, Purl, PurlError};
