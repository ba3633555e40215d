//! Commit Finder
//!
//! Matches package versions to repository commits via the tags that contain
//! them. Repository-type PURLs resolve their version directly as a commit
//! hash or tag name. Artifact-type PURLs go through a two-stage matcher: an
//! almost-exact pattern, then a pattern constructed from the version's parts
//! followed by a similarity score to disambiguate multiple candidates.

use std::collections::BTreeSet;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex_lite::Regex;

use crate::repo::purl::{determine_abstract_purl_type, AbstractPurlType, Purl};

// An optional named capture group "prefix" that accepts one of the following:
// - A string of any characters that ends with one of:
//   - One non-alphanumeric character, one alphabetic character, and one or more numbers.
//   - One number and one alphabetic character.
//   - Two alphabetic characters.
//   - One or two numbers.
// - OR
// - Two alphabetic characters.
// This part of the pattern terminates with an OR character to allow for it to
// be combined with the name of the target artifact as another possible prefix.
const PREFIX_START: &str =
    "(?P<prefix_0>(?:(?:.*(?:[a-z0-9][a-z][0-9]+|[0-9][a-z]|[a-z]{2}|[0-9]{1,2}))|[a-z]{2})|";
const PREFIX_END: &str = ")?";

// An alternative prefix pattern for prefixes that are difficult to
// distinguish from part of a version, i.e. java-v1-1.1.0 (prefix: java-v1).
const PREFIX_WITH_SEPARATOR: &str =
    "(?P<prefix_1>(?:[a-z].*(?P<prefix_sep_1>[^a-z0-9])[a-z][0-9]+))(?:\\k<prefix_sep_1>)";

// Another alternative prefix: alphabetic characters with no separator.
const PREFIX_WITHOUT_SEPARATOR: &str = "(?P<prefix_2>(?:[a-z]+))";

// A 'v', 'r', or 'c' character not preceded by a non-alphanumeric character,
// or a non-alphanumeric character optionally followed by 'v'/'r'/'c', then
// optionally one more non-alphanumeric character.
const PREFIX_SEPARATOR: &str =
    "(?P<prefix_sep_0>(?:(?:(?<![0-9a-z])[vrc])|(?:[^0-9a-z][vrc])|[^0-9a-z])(?:[^0-9a-z])?)";

// The infix between version parts: one to three alphabetic characters, or
// one to three non-alphanumeric characters. The first occurrence is captured
// and later occurrences are constrained to match it via back reference,
// unless the version itself uses multiple separators.
const INFIX_3: &str = "([a-z]{1,3}|[^0-9a-z]{1,3})";
const INFIX_1: &str = "(?P<sep>([a-z]{1,3}|[^0-9a-z]{1,3}))";
const INFIX_2: &str = "\\k<sep>";

// The suffix separator: one to two non-alphanumeric characters followed by a
// non-numeric character or end of input.
const SUFFIX_SEPARATOR: &str = "(?P<suffix_sep>(?:[^0-9a-z]{1,2}(?:(?=[^0-9])|(?!.))))";

// The suffix: starts alphanumeric, then anything.
const SUFFIX: &str = "(?P<suffix>[a-z0-9].*)?";

// Versions with fewer parts than this are padded with optional zeros, e.g.
// 1.2 also matches 1.2.0.0. Only applies to fully numeric versions.
const MAX_ZERO_DIGIT_EXTENSION: usize = 4;

lazy_static! {
    static ref SPLIT_PATTERN: Regex = Regex::new("(?i)[^0-9a-z]").unwrap();
    static ref ANTI_SPLIT_PATTERN: Regex = Regex::new("(?i)[0-9a-z]+").unwrap();
    static ref VALIDATION_PATTERN: Regex = Regex::new("(?i)^[0-9a-z]+$").unwrap();
    static ref ALPHABETIC_ONLY_PATTERN: Regex = Regex::new("(?i)^[a-z]+$").unwrap();
    static ref HEX_ONLY_PATTERN: Regex = Regex::new("(?i)^[0-9a-f]+$").unwrap();
    static ref NUMERIC_ONLY_PATTERN: Regex = Regex::new("^[0-9]+$").unwrap();
    // E.g. 1.10rc1.
    static ref SPECIAL_SUFFIX_PATTERN: Regex =
        Regex::new("(?i)^([0-9]+)([a-z]+[0-9]+)$").unwrap();
    // E.g. RC1, 15, 0010, M.
    static ref VERSIONED_STRING: Regex = Regex::new("(?i)^([a-z]*)(0*)([1-9]+[0-9]*)?$").unwrap();
    static ref MULTIPLE_ZERO_PATTERN: Regex = Regex::new("^0+$").unwrap();
    // Version-like parts within prefixes.
    static ref NAME_VERSION_PATTERN: Regex = Regex::new("[0-9]+(?:[.][0-9]+)*").unwrap();
    static ref NAME_VERSION_AT_START: Regex = Regex::new("^[0-9]+(?:[.][0-9]+)*").unwrap();
    static ref PREFIX_VERSION_LIKE: Regex = Regex::new("(?i)^([vrc])?[0-9]+$").unwrap();
}

/// How a resolution attempt terminated. Exactly one outcome per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFinderOutcome {
    Matched,
    NoVersionProvided,
    UnsupportedPurlType,
    InvalidVersion,
    RepoPurlFailure,
    NoTags,
    NoTagsWithCommits,
    NoTagsMatched,
    RegexCompileFailure,
    NoTagCommit,
    NotUsed,
}

/// Read access to the repository under analysis. Tag names are byte strings
/// so that non-UTF-8 references stay enumerable byte-exact; only valid UTF-8
/// names participate in matching.
pub trait Repository {
    fn tags(&self) -> Vec<Vec<u8>>;
    fn commit_for_tag(&self, tag: &str) -> Option<String>;
    fn commit_for_sha(&self, prefix: &str) -> Option<String>;
    fn head_commit(&self) -> Option<String>;
    fn default_branch(&self) -> Option<String>;
    fn fs_path(&self) -> Option<PathBuf>;
}

/// In-memory repository used by tests and the offline tag-matching mode.
#[derive(Debug, Clone, Default)]
pub struct FixedRepository {
    /// Tag name bytes with the commit each resolves to, if any.
    pub tags: Vec<(Vec<u8>, Option<String>)>,
    /// All commit hashes, for prefix resolution.
    pub commits: Vec<String>,
    pub head: Option<String>,
    pub branch: Option<String>,
}

impl FixedRepository {
    pub fn with_tags(tags: &[(&str, &str)]) -> Self {
        FixedRepository {
            tags: tags
                .iter()
                .map(|(name, sha)| (name.as_bytes().to_vec(), Some(sha.to_string())))
                .collect(),
            commits: tags.iter().map(|(_, sha)| sha.to_string()).collect(),
            head: None,
            branch: None,
        }
    }
}

impl Repository for FixedRepository {
    fn tags(&self) -> Vec<Vec<u8>> {
        self.tags.iter().map(|(name, _)| name.clone()).collect()
    }

    fn commit_for_tag(&self, tag: &str) -> Option<String> {
        self.tags
            .iter()
            .find(|(name, _)| name.as_slice() == tag.as_bytes())
            .and_then(|(_, sha)| sha.clone())
    }

    fn commit_for_sha(&self, prefix: &str) -> Option<String> {
        self.commits
            .iter()
            .find(|sha| sha.starts_with(prefix))
            .cloned()
    }

    fn head_commit(&self) -> Option<String> {
        self.head.clone()
    }

    fn default_branch(&self) -> Option<String> {
        self.branch.clone()
    }

    fn fs_path(&self) -> Option<PathBuf> {
        None
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Find the commit matching the PURL, via its version as a commit reference
/// for repository PURLs or via tag matching for artifact PURLs.
pub fn find_commit(repo: &dyn Repository, purl: &Purl) -> (Option<String>, CommitFinderOutcome) {
    let Some(version) = purl.version.as_deref() else {
        tracing::debug!(name = purl.name.as_str(), "missing version for analysis target");
        return (None, CommitFinderOutcome::NoVersionProvided);
    };
    match determine_abstract_purl_type(purl) {
        AbstractPurlType::Repository => extract_commit_from_version(repo, version),
        AbstractPurlType::Artifact => find_commit_from_version_and_name(repo, &purl.name, version),
        AbstractPurlType::Unsupported => {
            tracing::debug!(ptype = purl.ptype.as_str(), "unsupported PURL type");
            (None, CommitFinderOutcome::UnsupportedPurlType)
        }
    }
}

/// Resolve the version of a repository-type PURL as a commit hash, falling
/// back to treating it as a tag.
pub fn extract_commit_from_version(
    repo: &dyn Repository,
    version: &str,
) -> (Option<String>, CommitFinderOutcome) {
    let mut commit: Option<String> = None;
    if (7..=40).contains(&version.len()) && HEX_ONLY_PATTERN.is_match(version) {
        commit = repo.commit_for_sha(version);
    }
    if commit.is_none() {
        commit = repo.commit_for_tag(version);
    }
    match commit {
        Some(sha) => (Some(sha), CommitFinderOutcome::Matched),
        None => (None, CommitFinderOutcome::RepoPurlFailure),
    }
}

/// Match the version (and name) of an artifact-type PURL against the
/// repository's tags.
pub fn find_commit_from_version_and_name(
    repo: &dyn Repository,
    name: &str,
    version: &str,
) -> (Option<String>, CommitFinderOutcome) {
    tracing::debug!(name, version, "searching for commit of artifact version using tags");

    let all_tags = repo.tags();
    if all_tags.is_empty() {
        return (None, CommitFinderOutcome::NoTags);
    }

    // Only consider tags that have a commit.
    let mut valid_tags: Vec<(String, String)> = Vec::new();
    for raw in &all_tags {
        let Ok(tag_name) = std::str::from_utf8(raw) else {
            continue;
        };
        let Some(sha) = repo.commit_for_tag(tag_name) else {
            tracing::debug!(tag = tag_name, "no commit found for tag");
            continue;
        };
        valid_tags.push((tag_name.to_string(), sha));
    }
    if valid_tags.is_empty() {
        return (None, CommitFinderOutcome::NoTagsWithCommits);
    }

    let names: Vec<&str> = valid_tags.iter().map(|(name, _)| name.as_str()).collect();
    let (matched, outcome) = match_tags(&names, name, version);
    let Some(best) = matched.first() else {
        return (None, outcome);
    };
    if matched.len() > 1 {
        tracing::debug!(count = matched.len(), best = best.as_str(), "multiple tags matched");
    }
    let sha = valid_tags
        .iter()
        .find(|(tag, _)| tag == best)
        .map(|(_, sha)| sha.clone());
    match sha {
        Some(sha) => (Some(sha), CommitFinderOutcome::Matched),
        None => (None, CommitFinderOutcome::NoTagCommit),
    }
}

// =============================================================================
// SPLITTING HELPERS
// =============================================================================

fn split_by<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut last = 0;
    for found in re.find_iter(text) {
        parts.push(&text[last..found.start()]);
        last = found.end();
    }
    parts.push(&text[last..]);
    parts
}

/// The separator runs of a version string.
fn split_separators(version: &str) -> Vec<&str> {
    split_by(&ANTI_SPLIT_PATTERN, version)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a version into its alphanumeric parts. Also reports whether more
/// than one distinct separator appears, and the indices of parts created by
/// splitting a release-candidate suffix (e.g. `1.10rc1` -> `1`, `10`, `rc1`).
fn split_version(version: &str) -> (Vec<String>, bool, BTreeSet<usize>) {
    let split = split_by(&SPLIT_PATTERN, version);
    let separators = split_separators(version);
    let distinct: BTreeSet<&str> = separators.iter().copied().collect();
    let multi_sep = distinct.len() != 1;

    let mut parts: Vec<String> = Vec::new();
    let mut special_indices: BTreeSet<usize> = BTreeSet::new();
    for (index, part) in split.iter().enumerate() {
        if !VALIDATION_PATTERN.is_match(part) {
            continue;
        }
        if let Some(caps) = SPECIAL_SUFFIX_PATTERN.captures(part) {
            // A release candidate suffix with no separator of its own.
            parts.push(caps[1].to_string());
            parts.push(caps[2].to_string());
            special_indices.insert(index + 1);
        } else {
            parts.push(part.to_string());
        }
    }
    (parts, multi_sep, special_indices)
}

/// Split an artifact name (or name-like prefix) into delimited components,
/// with version-like fragments extracted whole.
fn split_name(name: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    let mut remainder = name.to_string();
    for found in NAME_VERSION_PATTERN.find_iter(name) {
        result.push(found.as_str().to_string());
        remainder = remainder.replace(found.as_str(), "");
    }
    for item in split_by(&SPLIT_PATTERN, &remainder) {
        if item.trim().is_empty() {
            continue;
        }
        result.push(item.to_string());
    }
    result
}

/// Escape regex metacharacters in literal text.
fn regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// PATTERN CONSTRUCTION
// =============================================================================

/// The zero-based index of the first version part that can be treated as an
/// optional suffix, if any. Alphanumeric parts that do not precede purely
/// numeric parts become optional, as do parts after a change in separator.
pub fn determine_optional_suffix_index(version: &str, parts: &[String]) -> Option<usize> {
    let mut optional_start_index = None;
    let separators = split_separators(version);
    let mut last_separator: Option<&str> = separators.first().copied();
    for index in 1..parts.len() {
        optional_start_index = if NUMERIC_ONLY_PATTERN.is_match(&parts[index]) {
            None
        } else {
            Some(index)
        };

        let Some(last) = last_separator else { continue };
        if index >= separators.len() {
            continue;
        }
        let new_separator = separators[index];
        if new_separator != last {
            optional_start_index = Some(index + 1);
            break;
        }
        last_separator = Some(new_separator);
    }
    optional_start_index
}

/// Build the constructed version pattern. Returns the compiled pattern and
/// the version parts, or the outcome to report on failure.
fn build_version_pattern(
    name: &str,
    version: &str,
) -> Result<(fancy_regex::Regex, Vec<String>), CommitFinderOutcome> {
    if version.is_empty() {
        return Err(CommitFinderOutcome::NoVersionProvided);
    }
    let name = regex_escape(name);
    let (parts, multi_sep, special_indices) = split_version(version);
    if parts.is_empty() {
        tracing::debug!(version, "version contained no valid parts");
        return Err(CommitFinderOutcome::InvalidVersion);
    }

    let optional_start_index = determine_optional_suffix_index(version, &parts);

    // A final zero-run part (0, 00, ...) can be made optional.
    let has_trailing_zero = parts.len() > 2
        && parts
            .last()
            .map(|p| MULTIPLE_ZERO_PATTERN.is_match(p))
            .unwrap_or(false);

    let mut body = String::new();
    for (count, part) in parts.iter().enumerate() {
        let optional = optional_start_index.map_or(false, |start| count >= start)
            || (count == parts.len() - 1 && has_trailing_zero);

        if optional {
            body.push('(');
        }
        if count == 1 {
            body.push_str(INFIX_1);
        } else if count > 1 {
            if multi_sep {
                // Allow for a change in separator type.
                body.push_str(INFIX_3);
            } else {
                // Expect the same separator as the first.
                body.push_str(INFIX_2);
            }
        }
        if special_indices.contains(&count) {
            // The separator before a split release-candidate part is optional.
            body.push('?');
        }
        if NUMERIC_ONLY_PATTERN.is_match(part) && optional_start_index.is_none() {
            // Allow any number of preceding zeros, e.g. 000 + 1, 0 + 20.
            body.push_str("0*");
        }
        if count == 0 {
            // Prevent the first part matching inside a longer number,
            // e.g. '11.33' must not match '1.33'.
            body.push_str("(?<![0-9])");
        }
        body.push_str(part);
        if optional {
            body.push_str(")?");
        }
    }

    // Pad fully numeric short versions with optional zeros: 1.2 -> 1.2.0.0.
    if optional_start_index.is_none() && !parts.is_empty() && parts.len() < MAX_ZERO_DIGIT_EXTENSION
    {
        for count in parts.len()..MAX_ZERO_DIGIT_EXTENSION {
            body.push('(');
            body.push_str(if count > 1 { INFIX_2 } else { INFIX_1 });
            body.push_str("0)?");
        }
    }

    let full = format!(
        "(?i)^(?:(?:{PREFIX_WITH_SEPARATOR})|(?:{PREFIX_WITHOUT_SEPARATOR})|\
         (?:{PREFIX_START}{name}{PREFIX_END}{PREFIX_SEPARATOR}))?(?P<version>{body})\
         (?:{SUFFIX_SEPARATOR}{SUFFIX})?$"
    );
    match fancy_regex::Regex::new(&full) {
        Ok(pattern) => Ok((pattern, parts)),
        Err(error) => {
            tracing::debug!(%error, "error while compiling version regex");
            Err(CommitFinderOutcome::RegexCompileFailure)
        }
    }
}

// =============================================================================
// TAG MATCHING
// =============================================================================

#[derive(Debug, Clone)]
struct MatchedTag {
    tag: String,
    version: String,
    prefix: Option<String>,
    prefix_sep: Option<String>,
    suffix_sep: Option<String>,
    suffix: Option<String>,
}

/// Return the tags matching the artifact name and version, best first.
pub fn match_tags(
    tag_list: &[&str],
    name: &str,
    version: &str,
) -> (Vec<String>, CommitFinderOutcome) {
    // If any tag almost exactly matches the version, return it immediately.
    // An optional 'v' prefix and a '<release>/<name>-<version>' shape are
    // allowed; tags that also matched the name prefix win.
    let v_prefix = if version.to_lowercase().starts_with('v') {
        ""
    } else {
        "(?:v)?"
    };
    let almost_exact = Regex::new(&format!(
        "(?i)^(?:[^/]+/)?(?P<prefix>{}-)?{}{}$",
        regex_escape(name),
        v_prefix,
        regex_escape(version)
    ));
    if let Ok(almost_exact) = almost_exact {
        let mut last_match: Option<&str> = None;
        let mut prefix_match: Option<&str> = None;
        for tag in tag_list {
            if let Some(caps) = almost_exact.captures(tag) {
                last_match = Some(tag);
                if caps.name("prefix").is_some() {
                    prefix_match = Some(tag);
                }
            }
        }
        if let Some(tag) = prefix_match.or(last_match) {
            return (vec![tag.to_string()], CommitFinderOutcome::Matched);
        }
    }

    // Build the constructed pattern for the version.
    let (pattern, parts) = match build_version_pattern(name, version) {
        Ok(result) => result,
        Err(outcome) => return (Vec::new(), outcome),
    };

    let mut matched_tags: Vec<MatchedTag> = Vec::new();
    for tag in tag_list {
        let captures = match pattern.captures(tag) {
            Ok(Some(caps)) => caps,
            Ok(None) => continue,
            Err(error) => {
                tracing::debug!(tag = *tag, %error, "match attempt failed");
                continue;
            }
        };
        let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        matched_tags.push(MatchedTag {
            tag: tag.to_string(),
            version: group("version").unwrap_or_default(),
            prefix: group("prefix_0").or_else(|| group("prefix_1")).or_else(|| group("prefix_2")),
            prefix_sep: group("prefix_sep_0").or_else(|| group("prefix_sep_1")),
            suffix_sep: group("suffix_sep"),
            suffix: group("suffix"),
        });
    }

    let mut matched_tags = fix_misaligned_tag_matches(matched_tags, version);

    if matched_tags.is_empty() {
        tracing::debug!("failed to match any tags");
        return (Vec::new(), CommitFinderOutcome::NoTagsMatched);
    }
    if matched_tags.len() == 1 {
        return (
            matched_tags.into_iter().map(|m| m.tag).collect(),
            CommitFinderOutcome::Matched,
        );
    }

    // Prefer matches whose prefix equals the artifact name and whose version
    // is otherwise a perfect match.
    let named_tags: Vec<MatchedTag> = matched_tags
        .iter()
        .filter(|item| {
            let Some(prefix) = item.prefix.as_deref() else {
                return false;
            };
            // Ignore prefix components before a forward slash, e.g. 'rel/'.
            let prefix = prefix.rsplit('/').next().unwrap_or(prefix);
            prefix.eq_ignore_ascii_case(name)
                && compute_tag_version_similarity(
                    "",
                    "",
                    &item.version,
                    item.suffix.as_deref(),
                    item.suffix_sep.as_deref(),
                    &parts,
                    version,
                    name,
                ) == 0.0
        })
        .cloned()
        .collect();
    if !named_tags.is_empty() {
        matched_tags = named_tags;
    }

    if matched_tags.len() > 1 {
        matched_tags.sort_by(|a, b| {
            let score_a = compute_tag_version_similarity(
                a.prefix.as_deref().unwrap_or(""),
                a.prefix_sep.as_deref().unwrap_or(""),
                &a.version,
                a.suffix.as_deref(),
                a.suffix_sep.as_deref(),
                &parts,
                version,
                name,
            );
            let score_b = compute_tag_version_similarity(
                b.prefix.as_deref().unwrap_or(""),
                b.prefix_sep.as_deref().unwrap_or(""),
                &b.version,
                b.suffix.as_deref(),
                b.suffix_sep.as_deref(),
                &parts,
                version,
                name,
            );
            score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    (
        matched_tags.into_iter().map(|m| m.tag).collect(),
        CommitFinderOutcome::Matched,
    )
}

/// Fix tags matched with a version-like fragment absorbed into the prefix,
/// e.g. prefix 'v6' + version '3.1' for the tag 'v6.3.1'. The fragment is
/// moved into the version when the separators agree; matches the rewrite
/// contradicts are rejected.
fn fix_misaligned_tag_matches(matched_tags: Vec<MatchedTag>, version: &str) -> Vec<MatchedTag> {
    let mut filtered: Vec<MatchedTag> = Vec::new();
    for mut matched in matched_tags {
        if version.is_empty() {
            continue;
        }
        let Some(prefix) = matched.prefix.clone().filter(|p| !p.is_empty()) else {
            filtered.push(matched);
            continue;
        };

        let version_seps = split_separators(version);
        let version_sep = version_seps.first().copied().unwrap_or("");
        let (prefixes, _, _) = split_version(&prefix);
        let prefix_separators = split_separators(&prefix);
        let Some(last_prefix_part) = prefixes.last().cloned() else {
            filtered.push(matched);
            continue;
        };

        if PREFIX_VERSION_LIKE.is_match(&last_prefix_part) {
            if !version_sep.is_empty() && matched.prefix_sep.as_deref() == Some(version_sep) {
                // Rebuild the prefix without its trailing fragment.
                let mut new_prefix = String::new();
                for index in 0..prefixes.len() - 1 {
                    if index > 0 {
                        if let Some(sep) = prefix_separators.get(index - 1) {
                            new_prefix.push_str(sep);
                        }
                    }
                    new_prefix.push_str(&prefixes[index]);
                }

                let (version_parts, _, _) = split_version(version);
                let Some(first_version_part) = version_parts.first() else {
                    continue;
                };
                if !last_prefix_part.contains(first_version_part.as_str()) {
                    // Only fix when the fragment contains the sought version.
                    continue;
                }

                let new_version = format!("{last_prefix_part}{version_sep}{}", matched.version);
                let (new_parts, _, _) = split_version(&new_version);
                let mut bad_match = false;
                for index in 0..new_parts.len().min(version_parts.len()) {
                    if !new_parts[index].contains(version_parts[index].as_str()) {
                        bad_match = true;
                        break;
                    }
                }
                if bad_match {
                    continue;
                }

                matched.prefix = Some(new_prefix);
                matched.version = new_version;
            }
        }
        filtered.push(matched);
    }
    filtered
}

// =============================================================================
// SIMILARITY SCORING
// =============================================================================

/// Pattern for loose comparison of a tag part against a version part: the
/// numeric portion may carry any number of leading zeros.
fn create_suffix_tag_comparison_pattern(tag_part: &str) -> Option<Regex> {
    let caps = VERSIONED_STRING.captures(tag_part)?;
    let alpha = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let digits = caps.get(3).map(|m| m.as_str())?;
    Regex::new(&format!("(?i)^{alpha}(0*){digits}")).ok()
}

/// Sort value for how well a matched tag corresponds to the sought version;
/// lower is more similar.
#[allow(clippy::too_many_arguments)]
fn compute_tag_version_similarity(
    prefix: &str,
    prefix_sep: &str,
    tag_version: &str,
    tag_suffix: Option<&str>,
    tag_suffix_sep: Option<&str>,
    version_parts: &[String],
    version: &str,
    artifact_name: &str,
) -> f64 {
    let release_set = ["rel", "release", "fin", "final"];

    let tag_version_text = tag_version.to_lowercase();
    let (mut tag_parts, _, _) = split_version(&tag_version_text);
    let tag_suffix = tag_suffix.map(|s| s.to_lowercase());
    if let Some(suffix) = &tag_suffix {
        if tag_parts.len() < version_parts.len() {
            // Borrow suffix parts when the version has more parts.
            let (suffix_parts, _, _) = split_version(suffix);
            tag_parts.extend(suffix_parts);
        }
    }

    let mut part_count = version_parts.len().max(tag_parts.len()) as f64;
    for index in 0..version_parts.len().min(tag_parts.len()) {
        let part = version_parts[index].to_lowercase();
        if tag_parts[index].contains(&part) {
            part_count -= 1.0;
        }
    }
    let mut score: f64 = part_count;

    if let Some(suffix) = &tag_suffix {
        let mut last_part = version_parts
            .last()
            .map(|p| p.to_lowercase())
            .unwrap_or_default();
        let (suffix_split, _, _) = split_version(suffix);
        let mut versioned_string_match = false;
        if suffix_split.len() > 1 {
            for suffix_part in &suffix_split {
                let suffix_part = suffix_part.to_lowercase();
                if ALPHABETIC_ONLY_PATTERN.is_match(&suffix_part) && suffix_part == last_part {
                    score -= 1.0;
                    continue;
                }
                let Some(pattern) = create_suffix_tag_comparison_pattern(&suffix_part) else {
                    score += 1.0;
                    continue;
                };
                if versioned_string_match {
                    // A comparison already matched; this part is superfluous.
                    score += 1.0;
                    continue;
                }
                if pattern.is_match(&last_part) {
                    score -= 1.0;
                    versioned_string_match = true;
                } else {
                    score += 1.0;
                }
            }
        } else {
            if tag_parts.len() < version_parts.len() {
                let last_part_index = version_parts.len() - tag_parts.len() + 1;
                last_part = version_parts[version_parts.len() - last_part_index].to_lowercase();
            }
            if suffix != &last_part {
                match create_suffix_tag_comparison_pattern(suffix) {
                    Some(pattern) => {
                        if pattern.is_match(&last_part) {
                            // Half value so this never ties an exact suffix.
                            score -= 0.5;
                        } else if !release_set.contains(&suffix.as_str()) {
                            score += 1.0;
                        } else {
                            score += 0.2;
                        }
                    }
                    None => {
                        score += 1.0;
                    }
                }
            } else {
                score -= 0.5;
            }
        }
    }

    if score < 0.0 {
        score = 0.0;
    }

    if let Some(suffix) = &tag_suffix {
        // Slightly prefer release-related suffixes.
        let (suffix_parts, _, _) = split_version(suffix);
        for suffix_part in &suffix_parts {
            if version_parts.contains(suffix_part) {
                continue;
            }
            if release_set.contains(&suffix_part.as_str()) {
                score -= 0.1;
            }
        }
    }

    if !prefix.is_empty() {
        let pre_score = score;
        if prefix.len() > 2 {
            // Prefer prefixes that cover the artifact name or are release
            // related.
            let name_set: BTreeSet<String> =
                split_name(&artifact_name.to_lowercase()).into_iter().collect();
            let prefix_split = split_name(&prefix.to_lowercase());
            let mut bonus: f64 = 0.0;
            for prefix_part in &prefix_split {
                if name_set.contains(prefix_part) {
                    bonus -= 0.1;
                } else {
                    if release_set.contains(&prefix_part.as_str()) {
                        score -= 0.11;
                        continue;
                    }
                    bonus = 0.11;
                    if NAME_VERSION_AT_START.is_match(prefix_part) {
                        // Heavily penalise non-matching version-like values.
                        bonus = 1.0;
                    }
                    break;
                }
            }
            score += bonus;
        }

        if (pre_score - score).abs() < f64::EPSILON {
            // Prefer shorter prefixes when nothing else distinguished them.
            if prefix.len() == 1 && ALPHABETIC_ONLY_PATTERN.is_match(prefix) {
                if !prefix.eq_ignore_ascii_case("v") {
                    score += 0.01;
                }
            } else {
                score += (prefix.len() as f64 / 100.0).min(0.09);
            }
        }
    }

    if version_parts.len() > 1 && score < 1.0 {
        // Prefer tags whose separators appear in the version string.
        for tag_separator in split_separators(tag_version) {
            if !version.contains(tag_separator) {
                score += 0.5;
                break;
            }
        }

        if let Some(suffix) = &tag_suffix {
            if let Some(suffix_index) = version_parts.iter().position(|p| p == suffix) {
                let version_separators = split_separators(version);
                let separator = if suffix_index == 0 {
                    version_separators.last().copied()
                } else {
                    version_separators.get(suffix_index - 1).copied()
                };
                if let Some(separator) = separator {
                    if Some(separator) != tag_suffix_sep.map(|s| s) {
                        score += 0.5;
                    }
                }
            }
        }
    }

    if !prefix_sep.is_empty() {
        // Prefer shorter prefix separators; a 'v' in it is free.
        let mut length = prefix_sep.len();
        if prefix_sep.contains('v') {
            length -= 1;
        }
        score += length as f64 * 0.01;
    }

    score
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_fixture() -> Vec<&'static str> {
        vec![
            "test-name-v1.0.1-A",
            "v1.0.3+test",
            "v_1.0.5",
            "50_0_2",
            "r78rv109",
            "1.0.5-JRE",
        ]
    }

    #[test]
    fn test_match_tags_from_fixture() {
        let cases = [
            ("1.0.1-A", "test-name-1", 0usize),
            ("1.0.3+test", "test-name-2", 1),
            ("1.0.5", "test-name-3", 2),
            ("50.0.2", "test-name-4", 3),
            ("78.109", "test-name-5", 4),
            ("1.0.5-JRE", "test-name-6", 5),
        ];
        let tags = tag_fixture();
        for (version, name, expected_index) in cases {
            let (matched, outcome) = match_tags(&tags, name, version);
            assert_eq!(outcome, CommitFinderOutcome::Matched, "{name}@{version}");
            assert!(!matched.is_empty(), "{name}@{version}");
            assert_eq!(matched[0], tags[expected_index], "{name}@{version}");
        }
    }

    #[test]
    fn test_optional_suffix_indices() {
        let cases: [(&str, &[&str], usize); 4] = [
            ("1.2.RELEASE", &["1", "2", "RELEASE"], 2),
            ("3.1.test.2.M5", &["3", "1", "test", "2", "M5"], 4),
            ("2.2-3", &["2", "2", "3"], 2),
            ("5.4.3_test.2.1", &["5", "4", "3", "test", "2", "1"], 3),
        ];
        for (version, parts, expected) in cases {
            let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
            assert_eq!(
                determine_optional_suffix_index(version, &parts),
                Some(expected),
                "{version}"
            );
        }
    }

    #[test]
    fn test_split_version_special_suffix() {
        let (parts, multi_sep, special) = split_version("1.10rc1");
        assert_eq!(parts, vec!["1", "10", "rc1"]);
        assert!(!multi_sep);
        assert!(special.contains(&2));
    }

    #[test]
    fn test_split_version_multi_separator() {
        let (parts, multi_sep, _) = split_version("1.2-3");
        assert_eq!(parts, vec!["1", "2", "3"]);
        assert!(multi_sep);
    }

    #[test]
    fn test_no_version_and_unsupported_outcomes() {
        let repo = FixedRepository::default();
        let purl = Purl::parse("pkg:maven/apache/maven").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (None, CommitFinderOutcome::NoVersionProvided)
        );
        let purl = Purl::parse("pkg:gem/ruby-artifact@1").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (None, CommitFinderOutcome::UnsupportedPurlType)
        );
    }

    #[test]
    fn test_repo_purl_outcomes() {
        let sha = "ba3fcb0c84d6727de343c247a3181908fcd78410";
        let repo = FixedRepository {
            tags: Vec::new(),
            commits: vec![sha.to_string()],
            head: None,
            branch: None,
        };
        // Full hash resolves directly.
        let purl = Purl::parse(&format!("pkg:github/apache/maven@{sha}")).unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (Some(sha.to_string()), CommitFinderOutcome::Matched)
        );
        // Short prefix resolves too.
        let purl = Purl::parse("pkg:github/apache/maven@ba3fcb0").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (Some(sha.to_string()), CommitFinderOutcome::Matched)
        );
        // Unknown hash that is also not a tag.
        let purl = Purl::parse("pkg:github/apache/maven@ab4ce3e").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (None, CommitFinderOutcome::RepoPurlFailure)
        );
    }

    #[test]
    fn test_tagless_repository_outcomes() {
        let repo = FixedRepository::default();
        let purl = Purl::parse("pkg:maven/apache/maven@1.0").unwrap();
        assert_eq!(find_commit(&repo, &purl), (None, CommitFinderOutcome::NoTags));
    }

    #[test]
    fn test_no_tags_with_commits_outcome() {
        let repo = FixedRepository {
            tags: vec![(b"1.0".to_vec(), None)],
            commits: Vec::new(),
            head: None,
            branch: None,
        };
        let purl = Purl::parse("pkg:maven/apache/maven@1.0").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (None, CommitFinderOutcome::NoTagsWithCommits)
        );
    }

    #[test]
    fn test_no_tags_matched_outcomes() {
        let repo = FixedRepository::with_tags(&[
            ("4.5", "a1"),
            ("2.3.4", "a1"),
            ("4.5.2-DEV", "a2"),
            ("4.5.2_DEV_RC1_RELEASE", "a2"),
            ("rel/prefix_name-2.3.4", "a2"),
        ]);
        for version in ["1-JRE", "1"] {
            let purl = Purl::parse(&format!("pkg:maven/apache/maven@{version}")).unwrap();
            assert_eq!(
                find_commit(&repo, &purl),
                (None, CommitFinderOutcome::NoTagsMatched),
                "{version}"
            );
        }
    }

    #[test]
    fn test_invalid_version_outcome() {
        let repo = FixedRepository::with_tags(&[("2.3.4", "a1")]);
        let purl = Purl {
            ptype: "maven".into(),
            namespace: Some("apache".into()),
            name: "maven".into(),
            version: Some("()".into()),
        };
        assert_eq!(
            find_commit(&repo, &purl),
            (None, CommitFinderOutcome::InvalidVersion)
        );
    }

    #[test]
    fn test_versioned_repository_matches() {
        let repo = FixedRepository::with_tags(&[
            ("4.5", "commit0"),
            ("2.3.4", "commit0"),
            ("4.5.2-DEV", "commit1"),
            ("4.5.2_DEV_RC1_RELEASE", "commit1"),
            ("rel/prefix_name-2.3.4", "commit1"),
        ]);
        let cases = [
            ("pkg:maven/apache/maven@2.3.4", "commit0"),
            ("pkg:maven/apache/maven@2.3.4-RC1", "commit0"),
            ("pkg:maven/apache/prefix_name@2.3.4", "commit1"),
            ("pkg:maven/apache/maven@4.5.2-DEV", "commit1"),
            ("pkg:maven/apache/maven@4.5.2_RELEASE", "commit1"),
            ("pkg:maven/apache/maven@4.5.2_RC1", "commit1"),
        ];
        for (purl, expected) in cases {
            let parsed = Purl::parse(purl).unwrap();
            let (found, outcome) = find_commit(&repo, &parsed);
            assert_eq!(outcome, CommitFinderOutcome::Matched, "{purl}");
            assert_eq!(found.as_deref(), Some(expected), "{purl}");
        }
    }

    #[test]
    fn test_unicode_version_tag() {
        let repo = FixedRepository::with_tags(&[("\u{96ea}", "commit0")]);
        let purl = Purl {
            ptype: "maven".into(),
            namespace: Some("apache".into()),
            name: "maven".into(),
            version: Some("\u{96ea}".into()),
        };
        let (found, outcome) = find_commit(&repo, &purl);
        // The unicode version has no alphanumeric parts to build a pattern
        // from, but the almost-exact pass matches the tag directly.
        assert_eq!(outcome, CommitFinderOutcome::Matched);
        assert_eq!(found.as_deref(), Some("commit0"));
    }

    #[test]
    fn test_non_utf8_tags_are_enumerable() {
        let mut repo = FixedRepository::with_tags(&[("2.3.4", "commit0")]);
        repo.tags.push((vec![b'1', b'.', b'0', 0xc3], None));
        assert_eq!(repo.tags().len(), 2);
        assert_eq!(repo.tags()[1], vec![b'1', b'.', b'0', 0xc3]);
        // Matching still works against the UTF-8 tags.
        let purl = Purl::parse("pkg:maven/apache/maven@2.3.4").unwrap();
        assert_eq!(
            find_commit(&repo, &purl),
            (Some("commit0".to_string()), CommitFinderOutcome::Matched)
        );
    }

    #[test]
    fn test_pattern_is_stable_across_compiles() {
        let (first, _) = build_version_pattern("test", "1.2.3-RC1").unwrap();
        let (second, _) = build_version_pattern("test", "1.2.3-RC1").unwrap();
        for probe in ["1.2.3-RC1", "v1.2.3.RC1", "test-1.2.3", "x9.9.9"] {
            assert_eq!(
                first.is_match(probe).unwrap_or(false),
                second.is_match(probe).unwrap_or(false),
                "{probe}"
            );
        }
    }
}
