use bytes::{Bytes, BytesMut};
use http::Version;
use httparse::{Request, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::http::{
    BodyReader, BodyWriter, KVOffset, Offset, RequestHeader, ResponseHeader, Utils,
};
use crate::stream::Stream;

const INIT_BUFFER_SIZE: usize = 1024;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_HEADERS_COUNT: usize = 256;

/// The client-facing side of a proxied exchange: reads the inbound
/// request, and later writes the (possibly tee'd) response back.
pub struct Inbound {
    pub stream: Stream,
    pub buffer: Bytes,
    pub buf_headers_offset: Option<Offset>,
    pub buf_body_offset: Option<Offset>,
    pub request_header: Option<RequestHeader>,
    pub body_reader: BodyReader,
    pub body_writer: BodyWriter,
}

impl Inbound {
    pub fn new(stream: Stream) -> Self {
        Inbound {
            stream,
            buffer: Bytes::new(),
            buf_headers_offset: None,
            buf_body_offset: None,
            request_header: None,
            body_reader: BodyReader::new(),
            body_writer: BodyWriter::new(),
        }
    }

    /// read and parse the request line + headers. Returns `Ok(false)` if
    /// the client closed the connection before sending anything (clean
    /// EOF on keep-alive, not an error).
    pub async fn read_request(&mut self) -> tokio::io::Result<bool> {
        self.buffer.clear();
        let mut read_buffer = BytesMut::with_capacity(INIT_BUFFER_SIZE);
        let mut read_buf_size = 0;

        loop {
            if read_buf_size > MAX_BUFFER_SIZE {
                return Err(tokio::io::Error::new(
                    tokio::io::ErrorKind::Other,
                    format!("request larger than {}", MAX_BUFFER_SIZE),
                ));
            }

            let len = match self.stream.read_buf(&mut read_buffer).await {
                Ok(0) if read_buf_size > 0 => {
                    return Err(tokio::io::Error::new(
                        tokio::io::ErrorKind::Other,
                        "connection closed mid request",
                    ));
                }
                Ok(0) => return Ok(false),
                Ok(n) => n,
                Err(e) => return Err(e),
            };

            read_buf_size += len;

            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
            let mut request = Request::new(&mut headers);

            match request.parse(&read_buffer) {
                Ok(Status::Complete(size)) => {
                    let headers_offset = Offset::new(0, size);
                    let body_offset = Offset::new(size, read_buf_size);

                    self.buf_headers_offset = Some(headers_offset);
                    self.buf_body_offset = Some(body_offset);

                    let base = read_buffer.as_ptr() as usize;
                    let mut kv_offsets = Vec::<KVOffset>::with_capacity(request.headers.len());

                    for header in request.headers.iter() {
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

                    let version = match request.version {
                        Some(1) => Version::HTTP_11,
                        Some(0) => Version::HTTP_10,
                        _ => Version::HTTP_09,
                    };

                    let mut request_header = RequestHeader::build(
                        request.method.unwrap_or(""),
                        request.path.unwrap_or(""),
                        version,
                        Some(request.headers.len()),
                    );

                    let buffer_bytes = read_buffer.freeze();

                    for header in kv_offsets {
                        let header_name = header.get_key_bytes(&buffer_bytes);
                        let header_value = header.get_value_bytes(&buffer_bytes);
                        let header_value =
                            unsafe { http::HeaderValue::from_maybe_shared_unchecked(header_value) };
                        request_header.append_header(header_name, header_value);
                    }

                    self.buffer = buffer_bytes;
                    self.request_header = Some(request_header);

                    return Ok(true);
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

    pub fn get_request_header(&self) -> &RequestHeader {
        self.request_header
            .as_ref()
            .expect("request is not read yet")
    }

    /// set up the body reader for the just-parsed request, using whatever
    /// bytes already landed in the read buffer past the header boundary
    pub fn set_request_body_reader(&mut self) {
        if !self.body_reader.is_start() {
            return;
        }
        let body_bytes = self.buf_body_offset.as_ref().unwrap().get(&self.buffer[..]);
        let req = self.get_request_header();

        let transfer_encoding = Utils::is_header_value_chunk_encoding(
            req.get_header(http::header::TRANSFER_ENCODING),
        );
        if transfer_encoding {
            self.body_reader.with_chunked_read(body_bytes);
            return;
        }

        let content_length =
            Utils::get_content_length_value(req.get_header(http::header::CONTENT_LENGTH));
        match content_length {
            Some(length) => self.body_reader.with_content_length_read(length, body_bytes),
            None => self.body_reader.with_content_length_read(0, body_bytes),
        }
    }

    pub async fn read_request_body(&mut self) -> tokio::io::Result<Option<Bytes>> {
        self.set_request_body_reader();
        let offset = self.body_reader.read_body(&mut self.stream).await?;
        Ok(offset.map(|o| Bytes::copy_from_slice(self.body_reader.get_sliced_body(&o))))
    }

    pub fn is_request_body_finished(&mut self) -> bool {
        self.set_request_body_reader();
        self.body_reader.is_finished()
    }

    /// write the response status line + headers to the client socket
    pub async fn write_response_header(&mut self, header: &ResponseHeader) -> tokio::io::Result<()> {
        let transfer_encoding =
            Utils::is_header_value_chunk_encoding(header.get_header(http::header::TRANSFER_ENCODING));
        let content_length =
            Utils::get_content_length_value(header.get_header(http::header::CONTENT_LENGTH));

        if transfer_encoding {
            self.body_writer.with_chunked_encoding_write();
        } else if let Some(length) = content_length {
            self.body_writer.with_content_length_write(length);
        } else {
            self.body_writer.with_until_closed_write();
        }

        let buf = header.build_to_buffer();
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn write_response_body(&mut self, chunk: &[u8]) -> tokio::io::Result<Option<usize>> {
        self.body_writer.write_body(&mut self.stream, chunk).await
    }

    pub async fn finish_response_body(&mut self) -> tokio::io::Result<Option<usize>> {
        let res = self.body_writer.finish(&mut self.stream).await?;
        self.stream.flush().await?;
        Ok(res)
    }

    /// write a minimal error response and close. Used for 502s and similar.
    pub async fn write_plain_response(
        &mut self,
        status: u16,
        reason: &str,
        body: &str,
    ) -> tokio::io::Result<()> {
        let payload = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        self.stream.write_all(payload.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
