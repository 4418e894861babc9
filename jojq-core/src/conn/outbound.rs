use bytes::{Bytes, BytesMut};
use http::{HeaderValue, StatusCode, Version};
use httparse::{Response, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::http::{BodyReader, BodyWriter, KVOffset, Offset, RequestHeader, ResponseHeader, Utils};
use crate::stream::Stream;

const INIT_BUFFER_SIZE: usize = 1024;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_HEADERS_COUNT: usize = 256;

/// The upstream-facing side of a proxied exchange: writes the forwarded
/// request, then reads and frames the upstream's response.
pub struct Outbound {
    pub stream: Stream,
    pub buffer: Bytes,
    pub buf_headers_offset: Option<Offset>,
    pub buf_body_offset: Option<Offset>,
    pub response_header: Option<ResponseHeader>,
    pub body_writer: BodyWriter,
    pub body_reader: BodyReader,
}

impl Outbound {
    pub fn new(stream: Stream) -> Self {
        Outbound {
            stream,
            buffer: Bytes::new(),
            buf_headers_offset: None,
            buf_body_offset: None,
            response_header: None,
            body_writer: BodyWriter::new(),
            body_reader: BodyReader::new(),
        }
    }

    fn set_request_body_writer(&mut self, req: &RequestHeader) {
        let transfer_encoding =
            Utils::is_header_value_chunk_encoding(req.get_header(http::header::TRANSFER_ENCODING));
        if transfer_encoding {
            self.body_writer.with_chunked_encoding_write();
            return;
        }

        let content_length =
            Utils::get_content_length_value(req.get_header(http::header::CONTENT_LENGTH));
        match content_length {
            Some(length) => self.body_writer.with_content_length_write(length),
            None => self.body_writer.with_content_length_write(0),
        }
    }

    pub async fn write_request_header(&mut self, req: &RequestHeader) -> tokio::io::Result<()> {
        self.set_request_body_writer(req);
        let buf = req.build_to_buffer();
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn write_request_body(&mut self, chunk: &[u8]) -> tokio::io::Result<Option<usize>> {
        self.body_writer.write_body(&mut self.stream, chunk).await
    }

    pub async fn finish_request_body(&mut self) -> tokio::io::Result<Option<usize>> {
        let res = self.body_writer.finish(&mut self.stream).await?;
        self.stream.flush().await?;
        Ok(res)
    }

    /// read and parse the status line + headers from upstream
    pub async fn read_response(&mut self) -> tokio::io::Result<()> {
        self.buffer.clear();
        let mut read_buffer = BytesMut::with_capacity(INIT_BUFFER_SIZE);
        let mut read_buf_size = 0;

        loop {
            if read_buf_size > MAX_BUFFER_SIZE {
                return Err(tokio::io::Error::new(
                    tokio::io::ErrorKind::Other,
                    format!("response larger than {}", MAX_BUFFER_SIZE),
                ));
            }

            let len = match self.stream.read_buf(&mut read_buffer).await {
                Ok(0) if read_buf_size > 0 => {
                    return Err(tokio::io::Error::new(
                        tokio::io::ErrorKind::Other,
                        "connection closed mid response",
                    ));
                }
                Ok(0) => {
                    return Err(tokio::io::Error::new(
                        tokio::io::ErrorKind::Other,
                        "connection closed",
                    ))
                }
                Ok(n) => n,
                Err(e) => return Err(e),
            };

            read_buf_size += len;

            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
            let mut response = Response::new(&mut headers);

            let mut parser_config = httparse::ParserConfig::default();
            parser_config.allow_spaces_after_header_name_in_responses(true);
            parser_config.allow_obsolete_multiline_headers_in_responses(true);

            match parser_config.parse_response(&mut response, &read_buffer) {
                Ok(Status::Complete(size)) => {
                    let headers_offset = Offset::new(0, size);
                    let body_offset = Offset::new(size, read_buf_size);

                    self.buf_headers_offset = Some(headers_offset);
                    self.buf_body_offset = Some(body_offset);

                    let base = read_buffer.as_ptr() as usize;
                    let mut kv_offsets = Vec::<KVOffset>::with_capacity(response.headers.len());

                    for header in response.headers.iter() {
                        if !header.name.is_empty() {
                            let name_start = header.name.as_ptr() as usize - base;
                            let value_start = header.value.as_ptr() as usize - base;

                            kv_offsets.push(KVOffset::new(
                                name_start,
                                header.name.len(),
                                value_start,
                                header.value.len(),
                            ));
                        }
                    }

                    let version = match response.version {
                        Some(1) => Version::HTTP_11,
                        Some(0) => Version::HTTP_10,
                        _ => Version::HTTP_09,
                    };

                    let status: StatusCode = response
                        .code
                        .unwrap_or(502)
                        .try_into()
                        .unwrap_or(StatusCode::BAD_GATEWAY);

                    let mut response_header =
                        ResponseHeader::build(status, version, Some(response.headers.len()));
                    response_header.set_reason_phrase(response.reason).ok();

                    let buffer_bytes = read_buffer.freeze();

                    for header in kv_offsets {
                        let header_name = header.get_key_bytes(&buffer_bytes);
                        let header_value: Bytes = header.get_value_bytes(&buffer_bytes);
                        let header_value: HeaderValue =
                            unsafe { HeaderValue::from_maybe_shared_unchecked(header_value) };
                        response_header.append_header(header_name, header_value);
                    }

                    self.buffer = buffer_bytes;
                    self.response_header = Some(response_header);

                    return Ok(());
                }
                Ok(Status::Partial) => continue,
                Err(e) => {
                    return Err(tokio::io::Error::new(
                        tokio::io::ErrorKind::Other,
                        e.to_string(),
                    ))
                }
            }
        }
    }

    pub fn get_response_header(&self) -> &ResponseHeader {
        self.response_header
            .as_ref()
            .expect("response is not read yet")
    }

    fn set_response_body_reader(&mut self) {
        if !self.body_reader.is_start() {
            return;
        }
        let body_bytes = self.buf_body_offset.as_ref().unwrap().get(&self.buffer[..]);
        let resp = self.get_response_header();

        match resp.get_raw_status_code() {
            204 | 304 => {
                self.body_reader.with_content_length_read(0, body_bytes);
                return;
            }
            100..=199 => return,
            _ => {}
        }

        let transfer_encoding = Utils::is_header_value_chunk_encoding(
            resp.get_header(http::header::TRANSFER_ENCODING),
        );
        if transfer_encoding {
            self.body_reader.with_chunked_read(body_bytes);
            return;
        }

        let content_length =
            Utils::get_content_length_value(resp.get_header(http::header::CONTENT_LENGTH));
        match content_length {
            Some(length) => self.body_reader.with_content_length_read(length, body_bytes),
            None => self.body_reader.with_until_closed_read(body_bytes),
        }
    }

    /// read one frame-decoded chunk of the response body (post
    /// content-length/chunked framing, still content-encoded)
    pub async fn read_response_body(&mut self) -> tokio::io::Result<Option<Bytes>> {
        self.set_response_body_reader();
        let offset = self.body_reader.read_body(&mut self.stream).await?;
        Ok(offset.map(|o| Bytes::copy_from_slice(self.body_reader.get_sliced_body(&o))))
    }

    pub fn is_response_body_finished(&mut self) -> bool {
        self.set_response_body_reader();
        self.body_reader.is_finished()
    }
}
