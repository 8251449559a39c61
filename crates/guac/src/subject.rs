//! Subject identifier parsing: pURLs for packages and VCS locators for
//! sources, plus the reverse pURL rendering used in report rows.

use thiserror::Error;

use crate::model::{PackageQualifierSpec, PkgSpec, SourceSpec};

#[derive(Error, Debug)]
pub enum SubjectError {
    #[error("invalid pURL: {0}")]
    Purl(String),

    #[error("invalid VCS source: {0}")]
    Vcs(String),
}

/// Parse a package URL of the form
/// `pkg:type/namespace/name@version?qualifiers#subpath` into a package
/// filter spec. Components are percent-decoded; qualifier keys are
/// lowercased.
pub fn purl_to_pkg_spec(purl: &str) -> Result<PkgSpec, SubjectError> {
    let rest = purl
        .strip_prefix("pkg:")
        .ok_or_else(|| SubjectError::Purl(format!("missing pkg scheme in {purl:?}")))?;
    let rest = rest.trim_start_matches('/');

    let (rest, subpath) = match rest.split_once('#') {
        Some((head, subpath)) => (head, Some(subpath)),
        None => (rest, None),
    };

    let (rest, qualifiers) = match rest.split_once('?') {
        Some((head, qualifiers)) => (head, Some(qualifiers)),
        None => (rest, None),
    };

    // The version separator is the last raw '@'; encoded ones inside
    // namespaces (e.g. npm scopes) arrive as %40.
    let (path, version) = match rest.rsplit_once('@') {
        Some((head, version)) => (head, Some(version)),
        None => (rest, None),
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let package_type = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SubjectError::Purl(format!("missing type in {purl:?}")))?;
    let mut remainder: Vec<&str> = segments.collect();
    let name = remainder
        .pop()
        .ok_or_else(|| SubjectError::Purl(format!("missing name in {purl:?}")))?;

    let namespace = if remainder.is_empty() {
        None
    } else {
        let decoded: Vec<String> = remainder.iter().map(|s| percent_decode(s)).collect();
        Some(decoded.join("/"))
    };

    let qualifiers = qualifiers
        .map(parse_qualifiers)
        .transpose()?
        .unwrap_or_default();

    Ok(PkgSpec {
        package_type: Some(percent_decode(package_type)),
        namespace,
        name: Some(percent_decode(name)),
        version: version.map(percent_decode),
        subpath: subpath.map(percent_decode),
        qualifiers,
        ..Default::default()
    })
}

fn parse_qualifiers(raw: &str) -> Result<Vec<PackageQualifierSpec>, SubjectError> {
    let mut qualifiers = Vec::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| SubjectError::Purl(format!("malformed qualifier {pair:?}")))?;
        qualifiers.push(PackageQualifierSpec {
            key: percent_decode(key).to_lowercase(),
            value: Some(percent_decode(value)),
        });
    }
    Ok(qualifiers)
}

/// Parse a VCS locator of the form `vcs_tool+transport://host/path[@ref]`
/// into a source filter spec. A 40-hex ref is a commit, anything else a tag.
pub fn vcs_to_source_spec(subject: &str) -> Result<SourceSpec, SubjectError> {
    let (scheme, rest) = subject
        .split_once("://")
        .ok_or_else(|| SubjectError::Vcs(format!("missing transport in {subject:?}")))?;

    let source_type = scheme.split_once('+').map(|(tool, _)| tool).unwrap_or(scheme);
    if source_type.is_empty() {
        return Err(SubjectError::Vcs(format!("missing vcs tool in {subject:?}")));
    }

    let (path, reference) = match rest.rsplit_once('@') {
        Some((path, reference)) => (path, Some(reference)),
        None => (rest, None),
    };

    let (namespace, name) = path
        .rsplit_once('/')
        .filter(|(namespace, name)| !namespace.is_empty() && !name.is_empty())
        .ok_or_else(|| SubjectError::Vcs(format!("missing repository path in {subject:?}")))?;

    let (tag, commit) = match reference {
        None => (None, None),
        Some(r) if is_commit_digest(r) => (None, Some(r.to_string())),
        Some(r) => (Some(r.to_string()), None),
    };

    Ok(SourceSpec {
        source_type: Some(source_type.to_string()),
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        tag,
        commit,
        ..Default::default()
    })
}

fn is_commit_digest(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// Render a package trie back into pURL form. Empty namespace and version
/// are omitted.
pub fn pkg_to_purl(package_type: &str, namespace: &str, name: &str, version: &str) -> String {
    let mut purl = format!("pkg:{package_type}/");
    if !namespace.is_empty() {
        purl.push_str(namespace);
        purl.push('/');
    }
    purl.push_str(name);
    if !version.is_empty() {
        purl.push('@');
        purl.push_str(version);
    }
    purl
}

fn percent_decode(component: &str) -> String {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
