//! URL helpers
//!
//! Derives archive-cache filenames from URLs, builds fallback mirror URLs and
//! escapes URL paths before requesting them. All URL paths are joined with
//! forward slashes regardless of scheme or host platform.

use std::path::PathBuf;

/// Schemes the downloader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlScheme {
    Http,
    Https,
    File,
    /// Fetched with the external `scp` client
    Ssh,
}

impl UrlScheme {
    /// Parse the scheme of a URL. Returns `None` for anything unsupported.
    pub fn of(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("https://") {
            Some(Self::Https)
        } else if lower.starts_with("http://") {
            Some(Self::Http)
        } else if lower.starts_with("file://") {
            Some(Self::File)
        } else if lower.starts_with("ssh://") {
            Some(Self::Ssh)
        } else {
            None
        }
    }
}

/// Split `url` into the part before any query/fragment and the rest.
fn split_suffix(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(pos) => (&url[..pos], &url[pos..]),
        None => (url, ""),
    }
}

/// Filename of the last URL path segment, percent-decoded and sanitized.
///
/// Returns "download" when the URL has no usable path segment.
///
/// # Example
/// ```ignore
/// assert_eq!(filename_from_url("https://x.org/dl/glm-0.9.9.zip?raw=1"), "glm-0.9.9.zip");
/// ```
pub fn filename_from_url(url: &str) -> String {
    let (base, _) = split_suffix(url);
    let path = base.split_once("://").map(|(_, rest)| rest).unwrap_or(base);

    // The first segment after the scheme is the host
    match path.split_once('/') {
        Some((_, after_host)) => after_host
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| sanitize_filename(&percent_decode(s)))
            .unwrap_or_else(|| "download".to_string()),
        None => "download".to_string(),
    }
}

/// Percent-encode characters in the URL path that are not allowed verbatim.
///
/// Existing `%XX` escapes are kept as-is so already-encoded URLs are not
/// encoded twice.
pub fn encode_url_path(url: &str) -> String {
    let (base, suffix) = split_suffix(url);
    let Some((scheme, rest)) = base.split_once("://") else {
        return url.to_string();
    };
    let (host, path) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };

    let mut encoded = String::with_capacity(path.len());
    for b in path.bytes() {
        if b.is_ascii_alphanumeric() || b"-._~/!$&'()*+,;=:@%".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{:02X}", b));
        }
    }

    format!("{}://{}{}{}", scheme, host, encoded, suffix)
}

/// Build `<base>/<dir>/<filename>` on a fallback mirror.
///
/// Trailing slashes on the base path are collapsed, and any query or fragment
/// on the base is carried over to the result.
///
/// # Example
/// ```ignore
/// assert_eq!(
///     mirror_url("https://mirror.example.com/ext/", "archives", "zlib.tar.gz"),
///     "https://mirror.example.com/ext/archives/zlib.tar.gz"
/// );
/// ```
pub fn mirror_url(base: &str, dir: &str, filename: &str) -> String {
    let (base, suffix) = split_suffix(base);
    format!(
        "{}/{}/{}{}",
        base.trim_end_matches('/'),
        dir.trim_matches('/'),
        filename,
        suffix
    )
}

/// Local path of a `file://` URL.
pub fn file_url_path(url: &str) -> Option<PathBuf> {
    if UrlScheme::of(url) != Some(UrlScheme::File) {
        return None;
    }
    let (base, _) = split_suffix(url);
    let path = &base["file://".len()..];
    // file://localhost/path is equivalent to file:///path
    let path = path.strip_prefix("localhost").unwrap_or(path);
    Some(PathBuf::from(percent_decode(path)))
}

/// Remote side of an `scp` copy parsed from an `ssh://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpSource {
    /// `[user@]host:/path`
    pub remote: String,
    pub port: Option<u16>,
}

/// Parse `ssh://[user@]host[:port]/path` into an `scp` source.
///
/// # Example
/// ```ignore
/// let src = scp_source("ssh://ci@mirror.example.com:2222/srv/ext/a.zip").unwrap();
/// assert_eq!(src.remote, "ci@mirror.example.com:/srv/ext/a.zip");
/// assert_eq!(src.port, Some(2222));
/// ```
pub fn scp_source(url: &str) -> Option<ScpSource> {
    if UrlScheme::of(url) != Some(UrlScheme::Ssh) {
        return None;
    }
    let (base, _) = split_suffix(url);
    let rest = &base["ssh://".len()..];
    let (authority, path) = rest.split_at(rest.find('/')?);
    if path.len() < 2 {
        return None;
    }

    let (user, host_port) = match authority.rsplit_once('@') {
        Some((user, host_port)) => (Some(user), host_port),
        None => (None, authority),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse().ok()?)),
        None => (host_port, None),
    };
    if host.is_empty() || user.is_some_and(str::is_empty) {
        return None;
    }

    let remote = match user {
        Some(user) => format!("{}@{}:{}", user, host, percent_decode(path)),
        None => format!("{}:{}", host, percent_decode(path)),
    };
    Some(ScpSource { remote, port })
}

/// Simple percent-decoding for URL path segments.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(byte) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Sanitize a filename for safe filesystem use.
pub fn sanitize_filename(name: &str) -> String {
    if name.is_empty() || name == "." || name == ".." {
        return "download".to_string();
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}
