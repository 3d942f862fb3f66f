//! URL canonicalization used as node identity in [`crate::Graph`].
//!
//! The canonical form is not a general-purpose URL normalizer; it is the
//! exact, reproducible text transform the rest of the system keys on.

/// A URL after the canonicalization pipeline in §3 of the spec this crate
/// implements: lowercased, scheme/`www.` stripped, trailing slash stripped,
/// percent-decoded, and scrubbed of quoting punctuation. Used as the key for
/// node identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub fn new(raw: &str) -> Self {
        Self(canon(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

const STRIPPED_PREFIXES: [&str; 3] = ["http://", "https://", "www."];
const INVALID_SYMBOLS: [char; 4] = ['"', '\u{201d}', '\'', '&'];

/// Canonicalize a raw URL string per §3: lowercase, strip `http://`/`https://`/
/// `www.` (each independently, so `http://www.x` strips both), strip a single
/// trailing slash, percent-decode, then drop quoting punctuation.
pub fn canon(raw: &str) -> String {
    let mut s = raw.to_lowercase();

    for prefix in STRIPPED_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }

    if s.ends_with('/') {
        s.pop();
    }

    s = percent_decode(&s);
    s.retain(|c| !INVALID_SYMBOLS.contains(&c));
    s
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` octets to raw bytes, then reassemble as UTF-8 (lossily —
/// the original bytes need not have been valid UTF-8 to begin with).
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(canon("HTTP://WWW.Example.COM/"), "example.com");
    }

    #[test]
    fn percent_decodes_after_stripping() {
        assert_eq!(
            canon("https://example.com/a/%7Euser"),
            "example.com/a/~user"
        );
    }

    #[test]
    fn idempotent() {
        for raw in [
            "HTTP://WWW.Example.COM/",
            "https://example.com/a/%7Euser",
            "example.com/p?x=1",
            "plain.example.com/path",
        ] {
            let once = canon(raw);
            let twice = canon(&once);
            assert_eq!(once, twice, "canon not idempotent for {raw}");
        }
    }

    #[test]
    fn strips_quoting_punctuation() {
        assert_eq!(canon("example.com/a\"b'c&d”e"), "example.com/abcde");
    }

    #[test]
    fn only_one_trailing_slash_stripped() {
        assert_eq!(canon("example.com//"), "example.com/");
    }
}
