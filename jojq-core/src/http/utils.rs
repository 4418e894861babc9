pub struct Utils;

impl Utils {
    pub fn is_header_value_chunk_encoding(
        header_value: Option<&http::header::HeaderValue>,
    ) -> bool {
        match header_value {
            Some(value) => value.as_bytes().eq_ignore_ascii_case(b"chunked"),
            None => false,
        }
    }

    pub fn get_content_length_value(
        header_value: Option<&http::header::HeaderValue>,
    ) -> Option<usize> {
        let header_value = header_value?;
        let str_value = std::str::from_utf8(header_value.as_bytes()).ok()?;
        let value_len: i64 = str_value.parse().ok()?;
        if value_len >= 0 {
            Some(value_len as usize)
        } else {
            tracing::warn!(value_len, "negative content length value");
            None
        }
    }

    pub fn is_connection_keepalive(header_value: &http::header::HeaderValue) -> Option<bool> {
        let value = std::str::from_utf8(header_value.as_bytes()).ok()?;
        Some(value.eq_ignore_ascii_case("keep-alive"))
    }
}
