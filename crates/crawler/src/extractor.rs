//! The URL Normalizer: scans a page body for `<a href="...">` links and
//! reduces them to the set that belongs in the graph — percent-decoded,
//! in-domain, free of fragments/query separators/quoting punctuation.

use regex::Regex;

use std::sync::OnceLock;

const FILE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".js", ".ico", ".css", ".png", ".pdf", ".rar", ".zip", ".doc", ".docx",
    ".xls", ".xlsx", ".mp3", ".djvu", ".rtf", ".ppt", ".txt", ".pptx", ".gz", ".gif", ".xml",
    ".tif", ".tiff", ".flv", ".avi", ".mkv", ".flac", ".ogg", ".mp4", ".exe", ".msi", ".deb",
    ".zip.001", ".zip.002", ".svg", ".odt", ".7z", ".ppsx",
];

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<a href="(.*?)""#).expect("static regex"))
}

/// Scan `body` for anchor hrefs and return the ones that belong in the
/// graph, in textual order, with duplicates preserved (repeated hrefs to
/// the same page become parallel edges downstream).
///
/// `root_url` is the root as the graph stores it (scheme and `www.`
/// intact) — the prefix used to resolve site-relative (`/path`) hrefs.
/// `stripped_root_url` is `root_url` with scheme and `www.` removed — the
/// substring an href must contain, domain-bounded, to be in-domain.
pub fn extract_and_filter_links(body: &str, root_url: &str, stripped_root_url: &str) -> Vec<String> {
    let mut out = Vec::new();

    for cap in href_regex().captures_iter(body) {
        let mut url = cap[1].to_lowercase();

        if is_root_or_invalid(&url) || ends_with_file_extension(&url) {
            continue;
        }

        if url.starts_with('/') {
            url = format!("{root_url}{url}");
        }

        if !(url.starts_with("http:/") || url.starts_with("https:/")) {
            continue;
        }

        if !in_domain(&url, stripped_root_url) {
            continue;
        }

        truncate_at_delimiters(&mut url);
        remove_invalid_symbols(&mut url);
        let url = webgraph::percent_decode(&url);

        out.push(url);
    }

    out
}

fn is_root_or_invalid(url: &str) -> bool {
    if url.is_empty() || url == "/" {
        return true;
    }

    let first = url.chars().next().expect("non-empty checked above");
    if first != '/' && !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return true;
    }

    url.starts_with("mailto:")
}

/// Extension = substring from the last `.` to the end — matching the
/// original tool's `rfind('.')` logic. This means a multi-dot entry like
/// `.zip.001` can never actually match (the last `.` always yields a
/// shorter suffix such as `.001`); the entry is kept in the list for
/// fidelity with the original, dead code and all.
fn ends_with_file_extension(url: &str) -> bool {
    match url.rfind('.') {
        Some(idx) => FILE_EXTENSIONS.contains(&&url[idx..]),
        None => false,
    }
}

fn in_domain(url: &str, stripped_root_url: &str) -> bool {
    if stripped_root_url.is_empty() {
        return false;
    }

    match url.find(stripped_root_url) {
        Some(0) | None => false,
        Some(idx) => matches!(url.as_bytes()[idx - 1], b'.' | b'/'),
    }
}

fn truncate_at_delimiters(url: &mut String) {
    if let Some(idx) = url.find(['#', ';', '&']) {
        url.truncate(idx);
    }
}

fn remove_invalid_symbols(url: &mut String) {
    url.retain(|c| !matches!(c, '"' | '\u{201d}' | '\'' | '&'));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_domain_accepts_subdomain_and_path() {
        assert!(in_domain("https://blog.example.com/x", "example.com"));
        assert!(in_domain("https://example.com/x", "example.com"));
    }

    #[test]
    fn in_domain_rejects_unrelated_host() {
        assert!(!in_domain("https://evilexample.com/x", "example.com"));
    }

    #[test]
    fn extracts_relative_and_absolute_links() {
        let body = r#"
            <a href="/about">About</a>
            <a href="https://example.com/contact">Contact</a>
            <a HREF="mailto:a@example.com">mail</a>
            <a href="https://example.com/doc.pdf">doc</a>
            <a href="https://evil.com/x">evil</a>
        "#;

        let urls = extract_and_filter_links(body, "https://www.example.com", "example.com");
        assert_eq!(
            urls,
            vec![
                "https://www.example.com/about",
                "https://example.com/contact",
            ]
        );
    }

    #[test]
    fn truncates_fragment_and_query_and_decodes() {
        let body = r#"<a href="https://example.com/p?x=1&y=2#frag">p</a>"#;
        let urls = extract_and_filter_links(body, "https://example.com", "example.com");
        assert_eq!(urls, vec!["https://example.com/p?x=1"]);
    }

    #[test]
    fn duplicates_are_preserved_for_parallel_edges() {
        let body = r#"
            <a href="https://example.com/b">1</a>
            <a href="https://example.com/b">2</a>
            <a href="https://example.com/b">3</a>
        "#;
        let urls = extract_and_filter_links(body, "https://example.com", "example.com");
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn root_slash_is_rejected() {
        let body = r#"<a href="/">home</a>"#;
        let urls = extract_and_filter_links(body, "https://example.com", "example.com");
        assert!(urls.is_empty());
    }
}
