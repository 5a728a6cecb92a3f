//! Repository URL canonicalization: `https://host/org/repo.git` and
//! `git@host:org/repo.git` both reduce to `host/org/repo`.

use http::Uri;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("invalid repository url {0:?}")]
    Invalid(String),
}

/// Splits the scp-like form `user@host:path` into host and path.
fn split_ssh(url: &str) -> Option<(&str, &str)> {
    if url.contains("://") {
        return None;
    }
    let (user, rest) = url.split_once('@')?;
    if user.is_empty() || user.contains(['/', ':']) {
        return None;
    }
    let (host, path) = rest.split_once(':')?;
    if host.is_empty() || host.contains('/') {
        return None;
    }
    Some((host, path))
}

/// Reduces a repository URL to a scheme-free `host/path` form without the
/// `.git` suffix.
pub fn normalize(url: &str) -> Result<String, UrlError> {
    let invalid = || UrlError::Invalid(url.to_string());

    if let Some((host, path)) = split_ssh(url) {
        let (org, repo) = path.split_once('/').ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if org.is_empty() || repo.is_empty() {
            return Err(invalid());
        }
        return Ok(format!("{host}/{org}/{repo}"));
    }

    let uri: Uri = url.parse().map_err(|_| invalid())?;
    // request-URI rules: absolute URI or absolute path
    if uri.scheme().is_none() && !url.starts_with('/') {
        return Err(invalid());
    }
    let host = uri.host().unwrap_or_default();
    // a path-less URI reports "/"
    let path = match uri.path() {
        "/" => "",
        p => p,
    };
    let path = path.strip_suffix(".git").unwrap_or(path);
    Ok(format!("{host}{path}"))
}

/// True when both URLs are identical or normalize to the same value. Parse
/// failures on either side compare as different.
pub fn equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
