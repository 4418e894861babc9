use bytes::Bytes;

/// A (start, end) slice into a shared buffer. Used to avoid copying header
/// bytes out of the read buffer until the caller actually needs an owned
/// value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Offset(pub usize, pub usize);

impl Offset {
    pub fn new(start: usize, len: usize) -> Self {
        Offset(start, start + len)
    }

    pub fn get<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.0..self.1]
    }

    pub fn get_bytes(&self, buf: &Bytes) -> Bytes {
        buf.slice(self.0..self.1)
    }

    pub fn len(&self) -> usize {
        self.1 - self.0
    }

    pub fn is_empty(&self) -> bool {
        self.1 == self.0
    }
}

/// Header name/value offset pair into the raw request or response buffer.
#[derive(Clone)]
pub struct KVOffset {
    key: Offset,
    value: Offset,
}

impl KVOffset {
    pub fn new(key_start: usize, key_len: usize, value_start: usize, value_len: usize) -> Self {
        KVOffset {
            key: Offset(key_start, key_start + key_len),
            value: Offset(value_start, value_start + value_len),
        }
    }

    pub fn get_key<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.key.get(buf)
    }

    pub fn get_value<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.value.get(buf)
    }

    pub fn get_key_bytes(&self, buf: &Bytes) -> Bytes {
        self.key.get_bytes(buf)
    }

    pub fn get_value_bytes(&self, buf: &Bytes) -> Bytes {
        self.value.get_bytes(buf)
    }

    pub fn value(&self) -> &Offset {
        &self.value
    }
}
