use crate::base::neterror::NetError;
use http::HeaderMap;

/// Response header block in wire order.
///
/// Lookups are case-insensitive, original casing is preserved, and repeated
/// names are kept as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// Headers as (original_name, value) pairs
    headers: Vec<(String, String)>,
}

impl ResponseHeaders {
    /// Create an empty header block.
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Append a header, keeping any earlier entry with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Get the first value for `name` (case-insensitive lookup).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get every value for `name` in wire order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get all headers as-is with original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Parsed `Content-Type`, if present and well formed.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.get("Content-Type")?.trim().parse().ok()
    }

    /// Build from an `http::HeaderMap`, rejecting values that are not visible ASCII.
    pub fn from_header_map(map: &HeaderMap) -> Result<Self, NetError> {
        let mut headers = Self::new();
        for (name, value) in map {
            let value = value.to_str().map_err(|_| NetError::InvalidHeader)?;
            headers.append(name.as_str(), value);
        }
        Ok(headers)
    }

    /// Convert to an `http::HeaderMap`, lowercasing names.
    pub fn to_header_map(&self) -> Result<HeaderMap, NetError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = http::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| NetError::InvalidHeader)?;
            let value =
                http::header::HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_get() {
        let headers: ResponseHeaders = [("CONTENT-TYPE", "application/json")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_repeated_names_are_kept() {
        let mut headers = ResponseHeaders::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Set-Cookie"), Some("a=1"));
        let all: Vec<_> = headers.get_all("SET-COOKIE").collect();
        assert_eq!(all, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_preserves_order_and_casing() {
        let mut headers = ResponseHeaders::new();
        headers.append("X-First", "1");
        headers.append("content-length", "0");

        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-First", "content-length"]);
    }

    #[test]
    fn test_content_type_parsing() {
        let headers: ResponseHeaders = [("Content-Type", "application/json; charset=cp1251")]
            .into_iter()
            .collect();
        let mime = headers.content_type().unwrap();
        assert_eq!(mime.essence_str(), "application/json");
        assert_eq!(mime.get_param("charset").unwrap().as_str(), "cp1251");

        let bad: ResponseHeaders = [("Content-Type", "not a mime")].into_iter().collect();
        assert!(bad.content_type().is_none());
    }

    #[test]
    fn test_header_map_conversion() {
        let mut map = HeaderMap::new();
        map.append("content-type", "text/plain".parse().unwrap());
        map.append("x-multi", "a".parse().unwrap());
        map.append("x-multi", "b".parse().unwrap());

        let headers = ResponseHeaders::from_header_map(&map).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get_all("X-Multi").count(), 2);

        let back = headers.to_header_map().unwrap();
        assert_eq!(back.get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let headers: ResponseHeaders = [("Invalid Header", "value")].into_iter().collect();
        assert_eq!(headers.to_header_map(), Err(NetError::InvalidHeader));
    }
}
