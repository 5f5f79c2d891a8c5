use std::collections::HashSet;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use crate::error::AppError;

static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").unwrap());

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a %b %d %Y",
];

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Makes a header unique among `existing_names`: blank headers become
/// `__EMPTY`, repeats get a `_1`, `_2`, ... suffix.
pub fn unique_header(name: &str, existing_names: &mut HashSet<String>) -> String {
    let base_name = match name.trim() {
        "" => "__EMPTY".to_string(),
        _ => name.to_string(),
    };

    let mut candidate = base_name.clone();
    let mut counter = 1;
    while !existing_names.insert(candidate.clone()) {
        candidate = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    candidate
}

/// Downloads `url`, refusing bodies larger than `max_bytes`. A declared
/// `Content-Length` over the limit fails before any body is read; otherwise
/// the body is read chunk by chunk and abandoned once it passes the limit.
pub async fn load_file_from_url(url: &str, max_bytes: usize) -> Result<Bytes, AppError> {
    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileProcessingError(
            format!("Failed to fetch file. Status: {}", response.status())
        ));
    }

    if let Some(declared) = response.content_length() {
        check_download_size(usize::try_from(declared).unwrap_or(usize::MAX), max_bytes)?;
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        AppError::FileProcessingError(format!("Failed to read response bytes: {}", e))
    })? {
        check_download_size(body.len().saturating_add(chunk.len()), max_bytes)?;
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

fn check_download_size(size: usize, limit: usize) -> Result<(), AppError> {
    if size > limit {
        tracing::warn!("Remote file exceeds size limit: {} > {} bytes", size, limit);
        return Err(AppError::FileTooLarge { size, limit });
    }
    Ok(())
}

/// Whether `s` reads as a calendar date or timestamp.
pub fn is_date_string(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    if DateTime::parse_from_rfc3339(s).is_ok() || DateTime::parse_from_rfc2822(s).is_ok() {
        return true;
    }

    if YEAR_MONTH.is_match(s) {
        return NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").is_ok();
    }

    DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(s, format).is_ok())
        || DATE_TIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
}

/// Reads text the way a loose numeric conversion would: surrounding
/// whitespace is ignored, blank text is zero, `0x`/`0o`/`0b` prefixes and
/// `Infinity` are understood. `None` means "not a number".
pub fn coerce_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).ok().map(|n| n as f64);
        }
    }

    match t {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    // Rust also accepts "inf" and "nan"; a plain literal has none of those letters.
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }

    t.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_deduplicated() {
        let mut seen = HashSet::new();
        assert_eq!(unique_header("name", &mut seen), "name");
        assert_eq!(unique_header("name", &mut seen), "name_1");
        assert_eq!(unique_header("name", &mut seen), "name_2");
        assert_eq!(unique_header("", &mut seen), "__EMPTY");
        assert_eq!(unique_header("  ", &mut seen), "__EMPTY_1");
    }

    async fn serve_bytes(len: usize) -> String {
        let app = axum::Router::new()
            .route("/file.csv", axum::routing::get(move || async move { vec![b'x'; len] }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/file.csv", addr)
    }

    #[tokio::test]
    async fn download_within_limit_is_returned() {
        let url = serve_bytes(2048).await;
        let body = load_file_from_url(&url, 4096).await.unwrap();
        assert_eq!(body.len(), 2048);
    }

    #[tokio::test]
    async fn download_over_limit_is_refused() {
        let url = serve_bytes(2048).await;
        let err = load_file_from_url(&url, 1024).await.unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { size: 2048, limit: 1024 }));
    }

    #[test]
    fn download_size_check_allows_exact_limit() {
        assert!(check_download_size(1024, 1024).is_ok());
        assert!(matches!(
            check_download_size(1025, 1024),
            Err(AppError::FileTooLarge { size: 1025, limit: 1024 })
        ));
    }

    #[test]
    fn recognises_common_date_shapes() {
        for s in [
            "2024-01-01",
            "2024-02",
            "2024/03/15",
            "03/15/2024",
            "2024-01-01T10:30:00Z",
            "2024-01-01T10:30:00.123",
            "2024-01-01 10:30:00",
            "Mar 15, 2024",
            "15 March 2024",
            "Tue, 1 Jul 2003 10:52:37 +0200",
        ] {
            assert!(is_date_string(s), "{s} should parse as a date");
        }
    }

    #[test]
    fn rejects_non_dates() {
        for s in ["hello", "", "2024-13-01", "31/12/2024", "yes"] {
            assert!(!is_date_string(s), "{s} should not parse as a date");
        }
    }

    #[test]
    fn coerces_number_literals() {
        assert_eq!(coerce_number(" 42 "), Some(42.0));
        assert_eq!(coerce_number("-1.5e3"), Some(-1500.0));
        assert_eq!(coerce_number(".5"), Some(0.5));
        assert_eq!(coerce_number("0x1F"), Some(31.0));
        assert_eq!(coerce_number(""), Some(0.0));
        assert_eq!(coerce_number("Infinity"), Some(f64::INFINITY));
    }

    #[test]
    fn rejects_non_numbers() {
        assert_eq!(coerce_number("2024-01-01"), None);
        assert_eq!(coerce_number("inf"), None);
        assert_eq!(coerce_number("nan"), None);
        assert_eq!(coerce_number("12abc"), None);
        assert_eq!(coerce_number("0xZZ"), None);
    }
}
