//! Package URLs
//!
//! Minimal parser for package-url strings and the classification of a PURL
//! as naming a repository, a registry artifact, or something unsupported.

use thiserror::Error;

/// Known VCS-host PURL types that map directly to a repository.
const REPOSITORY_TYPES: &[&str] = &["github", "bitbucket", "gitlab"];

/// Registry ecosystems the dependency-resolution collaborator understands.
const ARTIFACT_TYPES: &[&str] = &["maven", "npm", "nuget", "pypi", "cargo", "golang"];

/// The kind of thing a PURL identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractPurlType {
    Repository,
    Artifact,
    Unsupported,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PurlError {
    #[error("missing pkg scheme")]
    MissingScheme,
    #[error("missing package type")]
    MissingType,
    #[error("missing package name")]
    MissingName,
}

/// A parsed package URL: `pkg:type/namespace/name@version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purl {
    pub ptype: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

impl Purl {
    pub fn parse(input: &str) -> Result<Purl, PurlError> {
        let rest = input
            .strip_prefix("pkg:")
            .ok_or(PurlError::MissingScheme)?
            .trim_start_matches('/');

        // Qualifiers and subpath are irrelevant here.
        let rest = rest.split('?').next().unwrap_or(rest);
        let rest = rest.split('#').next().unwrap_or(rest);

        let (path, version) = match rest.rsplit_once('@') {
            Some((path, version)) if !version.is_empty() => {
                (path, Some(percent_decode(version)))
            }
            Some((path, _)) => (path, None),
            None => (rest, None),
        };

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(PurlError::MissingType);
        }
        let ptype = segments.remove(0).to_ascii_lowercase();
        let name = segments.pop().map(percent_decode).ok_or(PurlError::MissingName)?;
        if name.is_empty() {
            return Err(PurlError::MissingName);
        }
        let namespace = if segments.is_empty() {
            None
        } else {
            Some(percent_decode(&segments.join("/")))
        };
        Ok(Purl {
            ptype,
            namespace,
            name,
            version,
        })
    }
}

fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&text[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Classify a PURL as repository, artifact, or unsupported.
pub fn determine_abstract_purl_type(purl: &Purl) -> AbstractPurlType {
    if REPOSITORY_TYPES.contains(&purl.ptype.as_str()) {
        return AbstractPurlType::Repository;
    }
    if ARTIFACT_TYPES.contains(&purl.ptype.as_str()) {
        return AbstractPurlType::Artifact;
    }
    AbstractPurlType::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_purl() {
        let purl = Purl::parse("pkg:maven/commons-io/commons-io@2.15.0").unwrap();
        assert_eq!(purl.ptype, "maven");
        assert_eq!(purl.namespace.as_deref(), Some("commons-io"));
        assert_eq!(purl.name, "commons-io");
        assert_eq!(purl.version.as_deref(), Some("2.15.0"));
    }

    #[test]
    fn test_parse_without_version() {
        let purl = Purl::parse("pkg:maven/apache/maven").unwrap();
        assert_eq!(purl.version, None);
    }

    #[test]
    fn test_parse_scoped_npm_name() {
        let purl = Purl::parse("pkg:npm/%40colors/colors@1.4.0").unwrap();
        assert_eq!(purl.namespace.as_deref(), Some("@colors"));
        assert_eq!(purl.name, "colors");
    }

    #[test]
    fn test_artifact_purl_types() {
        for purl in [
            "pkg:maven/apache/maven",
            "pkg:maven/commons-io/commons-io@2.15.0",
            "pkg:pypi/requests@2.31.0",
            "pkg:npm/%40colors/colors@1.4.0",
            "pkg:nuget/system.text.json@8.0.0",
            "pkg:cargo/mailmeld@1.0.0",
        ] {
            let parsed = Purl::parse(purl).unwrap();
            assert_eq!(
                determine_abstract_purl_type(&parsed),
                AbstractPurlType::Artifact,
                "{purl}"
            );
        }
    }

    #[test]
    fn test_repository_purl_types() {
        for purl in [
            "pkg:github/apache/maven@69bc993b8089a2d3d1ddfd6c7d4f8dc6cc205995",
            "pkg:github/oracle/example@v0.6.0",
            "pkg:bitbucket/owner/project@tag_5",
        ] {
            let parsed = Purl::parse(purl).unwrap();
            assert_eq!(
                determine_abstract_purl_type(&parsed),
                AbstractPurlType::Repository,
                "{purl}"
            );
        }
    }

    #[test]
    fn test_unsupported_purl_types() {
        for purl in [
            "pkg:gem/ruby-advisory-db-check@0.12.4",
            "pkg:unknown-domain/project/owner@tag",
        ] {
            let parsed = Purl::parse(purl).unwrap();
            assert_eq!(
                determine_abstract_purl_type(&parsed),
                AbstractPurlType::Unsupported,
                "{purl}"
            );
        }
    }
}
