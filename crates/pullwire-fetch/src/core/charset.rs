use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::error::DecodeError;

/// How far into an HTML body a `<meta>` charset declaration is looked for.
pub const META_SNIFF_LEN: usize = 1024;

// Matches both `<meta charset="...">` and the `http-equiv` form whose
// `content` carries `text/html; charset=...`.
static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
        .expect("meta charset pattern is valid")
});

/// Content types whose bodies are treated as text and normalized to UTF-8.
pub fn is_textual(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.starts_with("text/") || lowered.contains("json") || lowered.contains("xml")
}

/// The `charset` parameter of a `Content-Type` value, unquoted.
pub fn declared_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

/// The encoding named by a `<meta>` tag near the start of an HTML body.
/// Unknown labels are ignored.
pub fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LEN)];
    META_CHARSET
        .captures_iter(head)
        .find_map(|caps| Encoding::for_label(caps.get(1)?.as_bytes()))
}

/// Re-encode a text body as UTF-8.
///
/// The encoding is taken from a byte order mark, then the declared charset,
/// then for HTML a `<meta>` declaration in the first [`META_SNIFF_LEN`]
/// bytes, then UTF-8 when the bytes already are valid UTF-8, else
/// windows-1252.
/// Malformed sequences become U+FFFD. An unknown declared label is an error.
pub fn normalize_charset(bytes: &[u8], content_type: &str) -> Result<Vec<u8>, DecodeError> {
    let (encoding, bom_len) = match Encoding::for_bom(bytes) {
        Some(found) => found,
        None => match declared_charset(content_type) {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| DecodeError::UnsupportedCharset(label.to_string()))?;
                (encoding, 0)
            }
            None => match sniff_html(bytes, content_type) {
                Some(encoding) => (encoding, 0),
                None if std::str::from_utf8(bytes).is_ok() => (UTF_8, 0),
                None => (WINDOWS_1252, 0),
            },
        },
    };

    let body = &bytes[bom_len..];
    if encoding == UTF_8 {
        if let Ok(text) = std::str::from_utf8(body) {
            return Ok(text.as_bytes().to_vec());
        }
    }
    let (decoded, _had_errors) = encoding.decode_without_bom_handling(body);
    Ok(decoded.into_owned().into_bytes())
}

fn sniff_html(bytes: &[u8], content_type: &str) -> Option<&'static Encoding> {
    if content_type.to_ascii_lowercase().contains("html") {
        sniff_meta_charset(bytes)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_types() {
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(is_textual("application/json"));
        assert!(is_textual("application/atom+xml"));
        assert!(is_textual("Text/Plain"));
        assert!(!is_textual("application/octet-stream"));
        assert!(!is_textual("image/png"));
        assert!(!is_textual(""));
    }

    #[test]
    fn charset_parameter() {
        assert_eq!(declared_charset("text/html; charset=ISO-8859-1"), Some("ISO-8859-1"));
        assert_eq!(declared_charset(r#"text/html;charset="utf-8""#), Some("utf-8"));
        assert_eq!(declared_charset("text/html; Charset=latin1; q=1"), Some("latin1"));
        assert_eq!(declared_charset("text/html"), None);
        assert_eq!(declared_charset("text/html; charset="), None);
    }

    #[test]
    fn latin1_is_converted() {
        let (latin1, _, _) = WINDOWS_1252.encode("café naïve");
        let out = normalize_charset(&latin1, "text/plain; charset=ISO-8859-1").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "café naïve");
    }

    #[test]
    fn utf8_passes_through() {
        let out = normalize_charset("héllo".as_bytes(), "text/plain").unwrap();
        assert_eq!(out, "héllo".as_bytes());
    }

    #[test]
    fn bom_overrides_declared_charset() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("ünï".as_bytes());
        let out = normalize_charset(&bytes, "text/plain; charset=ISO-8859-1").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "ünï");
    }

    #[test]
    fn undeclared_invalid_utf8_falls_back_to_windows_1252() {
        let out = normalize_charset(&[0x63, 0x61, 0x66, 0xE9], "text/html").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "café");
    }

    #[test]
    fn unknown_charset_is_an_error() {
        let err = normalize_charset(b"abc", "text/plain; charset=klingon").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedCharset(label) if label == "klingon"));
    }

    #[test]
    fn meta_charset_is_used_for_html() {
        let (sjis, _, _) = encoding_rs::SHIFT_JIS.encode("日本語のページ");
        let mut page = b"<html><head><meta charset=\"Shift_JIS\"></head><body>".to_vec();
        page.extend_from_slice(&sjis);
        page.extend_from_slice(b"</body></html>");

        let out = String::from_utf8(normalize_charset(&page, "text/html").unwrap()).unwrap();
        assert!(out.contains("日本語のページ"));
    }

    #[test]
    fn http_equiv_charset_is_used_for_html() {
        let (latin2, _, _) = encoding_rs::ISO_8859_2.encode("Łódź");
        let mut page = br#"<HTML><HEAD><META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=iso-8859-2"></HEAD>"#.to_vec();
        page.extend_from_slice(&latin2);

        let out = String::from_utf8(normalize_charset(&page, "text/html").unwrap()).unwrap();
        assert!(out.ends_with("Łódź"));
    }

    #[test]
    fn meta_charset_is_ignored_past_sniff_window_and_for_plain_text() {
        let mut page = vec![b' '; META_SNIFF_LEN];
        page.extend_from_slice(br#"<meta charset="iso-8859-2">"#);
        page.push(0xA3);
        let out = normalize_charset(&page, "text/html").unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with('£'));

        let text = [br#"<meta charset="iso-8859-2">"#.as_slice(), &[0xA3]].concat();
        let out = normalize_charset(&text, "text/plain").unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with('£'));
    }

    #[test]
    fn declared_charset_wins_over_meta() {
        let page = [br#"<meta charset="shift_jis">"#.as_slice(), &[0xE9]].concat();
        let out = normalize_charset(&page, "text/html; charset=ISO-8859-1").unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with('é'));
    }
}
