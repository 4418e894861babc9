use bytes::{BufMut, BytesMut};
use http::header::AsHeaderName;
use http::request::{Parts, Request};
use http::{HeaderName, HeaderValue, Method, Uri, Version};

use super::case::{CaseMap, IntoCaseHeaderName};

const MAX_HEADER_COUNT: usize = 4096;
const INIT_HEADER_SIZE: usize = 8;
const BUILD_HEADER_BUFFER: usize = 512;

const CRLF: &[u8; 2] = b"\r\n";
const HEADER_DELIMITER: &[u8; 2] = b": ";
const EMPTY_SPACE: &[u8; 1] = b" ";

/// A parsed HTTP/1.1 request line plus headers, keeping both the typed
/// `http::request::Parts` and the raw wire casing of each header name so a
/// forwarded request is byte-faithful to what the client sent.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub metadata: Parts,
    pub header_case: CaseMap,
    pub raw_path: Vec<u8>,
}

impl RequestHeader {
    pub fn build<M>(method: M, raw_path: &str, version: Version, size: Option<usize>) -> Self
    where
        M: TryInto<Method>,
    {
        let capacity = Self::serve_capacity(size);

        let method = method
            .try_into()
            .map_err(|_| "Invalid method")
            .expect("Failed to convert method");

        let (mut parts, _) = Request::builder()
            .method(method)
            .uri(raw_path.as_bytes())
            .version(version)
            .body(())
            .expect("Failed to create base request")
            .into_parts();

        parts.headers.reserve(capacity);

        RequestHeader {
            metadata: parts,
            header_case: CaseMap::with_capacity(capacity),
            raw_path: raw_path.as_bytes().to_vec(),
        }
    }

    fn serve_capacity(size: Option<usize>) -> usize {
        std::cmp::min(size.unwrap_or(INIT_HEADER_SIZE), MAX_HEADER_COUNT)
    }

    pub fn get_method(&self) -> &Method {
        &self.metadata.method
    }

    pub fn get_raw_path(&self) -> &[u8] {
        &self.raw_path
    }

    /// use .path() to get uri path as &str
    /// use .host() to get uri host as &str
    /// use .query() to get uri query param as &str
    pub fn get_uri(&self) -> &Uri {
        &self.metadata.uri
    }

    pub fn get_version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn get_raw_version(&self) -> &str {
        match self.metadata.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_2 => "HTTP/2",
            _ => panic!("unsupported version"),
        }
    }

    /// append a header without replacing an existing header of the same name
    pub fn append_header<N, V>(&mut self, name: N, value: V)
    where
        N: IntoCaseHeaderName,
        V: TryInto<HeaderValue>,
    {
        let case_header_name = name.into_case_header_name();

        let header_name: HeaderName = case_header_name
            .as_slice()
            .try_into()
            .map_err(|_| "Invalid header name")
            .expect("Failed to convert header name");

        let header_value = value
            .try_into()
            .map_err(|_| "Invalid header value")
            .expect("Failed to convert header value");

        self.header_case
            .append(header_name.clone(), case_header_name);
        self.metadata.headers.append(header_name, header_value);
    }

    /// insert a header, replacing an existing header of the same name
    pub fn insert_header<N, V>(&mut self, name: N, value: V)
    where
        N: IntoCaseHeaderName,
        V: TryInto<HeaderValue>,
    {
        let case_header_name = name.into_case_header_name();

        let header_name: HeaderName = case_header_name
            .as_slice()
            .try_into()
            .map_err(|_| "Invalid header name")
            .expect("Failed to convert header name");

        let header_value = value
            .try_into()
            .map_err(|_| "Invalid header value")
            .expect("Failed to convert header value");

        self.header_case
            .insert(header_name.clone(), case_header_name);
        self.metadata.headers.insert(header_name, header_value);
    }

    pub fn remove_header<'a, N: ?Sized>(&mut self, name: &'a N)
    where
        &'a N: AsHeaderName,
    {
        self.header_case.remove(name);
        self.metadata.headers.remove(name);
    }

    pub fn get_headers<N>(&self, name: N) -> Vec<&HeaderValue>
    where
        N: AsHeaderName,
    {
        self.metadata.headers.get_all(name).iter().collect()
    }

    pub fn get_header<N>(&self, name: N) -> Option<&HeaderValue>
    where
        N: AsHeaderName,
    {
        self.metadata.headers.get(name)
    }

    pub fn set_method(&mut self, method: Method) {
        self.metadata.method = method
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.metadata.uri = uri
    }

    pub fn set_version(&mut self, version: Version) {
        self.metadata.version = version
    }

    /// serialize the request line and headers to the wire form, used to
    /// write the forwarded request to the upstream socket
    pub fn build_to_buffer(&self) -> BytesMut {
        let mut buffer = BytesMut::with_capacity(BUILD_HEADER_BUFFER);

        let method = self.get_method().as_str().as_bytes();
        buffer.put_slice(method);
        buffer.put_slice(EMPTY_SPACE);

        let path = self.get_raw_path();
        buffer.put_slice(path);
        buffer.put_slice(EMPTY_SPACE);

        let version = self.get_raw_version().as_bytes();
        buffer.put_slice(version);
        buffer.put_slice(CRLF);

        let iter = self.header_case.iter().zip(self.metadata.headers.iter());
        for ((header, case_header), (header2, val)) in iter {
            if header != header2 {
                // header_case and metadata.headers are built in lockstep; a
                // mismatch means HeaderMap iteration order changed underneath us
                panic!("header iter mismatch {}, {}", header, header2)
            }
            buffer.put_slice(case_header.as_slice());
            buffer.put_slice(HEADER_DELIMITER);
            buffer.put_slice(val.as_ref());
            buffer.put_slice(CRLF);
        }
        buffer.put_slice(CRLF);

        buffer
    }
}
