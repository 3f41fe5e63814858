//! The binary wire format.
//!
//! Both frame kinds open with the same fixed 15-byte prefix, big-endian:
//!
//! ```text
//! header_len: u32 | body_len: u32 | request_id: u32 | version: u8 | compressor: u8 | serializer: u8
//! ```
//!
//! A request header continues with `service '\n' method '\n'` and zero or
//! more `key '\r' value '\n'` metadata pairs up to `header_len`; a
//! response header continues with `header_len - 15` bytes of error
//! message. The body occupies the remaining `body_len` bytes. `'\n'` and
//! `'\r'` are reserved inside header strings only; bodies are opaque.

use crate::RpcError;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

/// Field separator inside headers.
const SEPARATOR: u8 = b'\n';
/// Key/value separator inside a metadata pair.
const PAIR_SEPARATOR: u8 = b'\r';
/// Bytes before the variable part of a header.
const PREFIX_LEN: usize = 15;

/// Metadata key marking a fire-and-forget call.
pub const META_ONE_WAY: &str = "one-way";
/// Metadata key carrying the caller's deadline in unix milliseconds.
pub const META_DEADLINE: &str = "deadline";

/// A decoded request frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub header_len: u32,
    pub body_len: u32,
    pub request_id: u32,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    pub service_name: String,
    pub method_name: String,
    pub meta: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(service: &str, method: &str, serializer: u8, body: Vec<u8>) -> Self {
        Self {
            service_name: service.to_string(),
            method_name: method.to_string(),
            serializer,
            body,
            ..Default::default()
        }
    }

    pub fn calculate_header_length(&mut self) {
        let mut len = PREFIX_LEN + self.service_name.len() + 1 + self.method_name.len() + 1;
        for (key, val) in &self.meta {
            len += key.len() + 1 + val.len() + 1;
        }
        self.header_len = len as u32;
    }

    pub fn calculate_body_length(&mut self) {
        self.body_len = self.body.len() as u32;
    }

    /// Recomputes both length fields from the current contents.
    pub fn finalize(&mut self) {
        self.calculate_header_length();
        self.calculate_body_length();
    }

    /// Encodes the frame. The length fields must be current
    /// (see [`Request::finalize`]).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity((self.header_len + self.body_len) as usize);
        buf.put_u32(self.header_len);
        buf.put_u32(self.body_len);
        buf.put_u32(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);
        buf.put_slice(self.service_name.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.put_slice(self.method_name.as_bytes());
        buf.put_u8(SEPARATOR);
        for (key, val) in &self.meta {
            buf.put_slice(key.as_bytes());
            buf.put_u8(PAIR_SEPARATOR);
            buf.put_slice(val.as_bytes());
            buf.put_u8(SEPARATOR);
        }
        buf.put_slice(&self.body);
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RpcError> {
        let (header_len, body_len, request_id, version, compressor, serializer) = prefix(data)?;
        let header = &data[PREFIX_LEN..header_len];

        let service_end = find(header, SEPARATOR, "service name")?;
        let service_name = string(&header[..service_end])?;
        let header = &header[service_end + 1..];

        let method_end = find(header, SEPARATOR, "method name")?;
        let method_name = string(&header[..method_end])?;
        let mut rest = &header[method_end + 1..];

        let mut meta = HashMap::new();
        while let Some(pair_end) = rest.iter().position(|&b| b == SEPARATOR) {
            let pair = &rest[..pair_end];
            let key_end = find(pair, PAIR_SEPARATOR, "metadata pair")?;
            meta.insert(string(&pair[..key_end])?, string(&pair[key_end + 1..])?);
            rest = &rest[pair_end + 1..];
        }

        Ok(Self {
            header_len: header_len as u32,
            body_len: body_len as u32,
            request_id,
            version,
            compressor,
            serializer,
            service_name,
            method_name,
            meta,
            body: data[header_len..].to_vec(),
        })
    }
}

/// A decoded response frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub header_len: u32,
    pub body_len: u32,
    pub request_id: u32,
    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,
    /// The remote error message; empty means success.
    pub error: Vec<u8>,
    pub body: Vec<u8>,
}

impl Response {
    /// A response echoing the identifying fields of `req`.
    pub fn for_request(req: &Request) -> Self {
        Self {
            request_id: req.request_id,
            version: req.version,
            compressor: req.compressor,
            serializer: req.serializer,
            ..Default::default()
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = message.into().into_bytes();
    }

    pub fn calculate_header_length(&mut self) {
        self.header_len = (PREFIX_LEN + self.error.len()) as u32;
    }

    pub fn calculate_body_length(&mut self) {
        self.body_len = self.body.len() as u32;
    }

    pub fn finalize(&mut self) {
        self.calculate_header_length();
        self.calculate_body_length();
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity((self.header_len + self.body_len) as usize);
        buf.put_u32(self.header_len);
        buf.put_u32(self.body_len);
        buf.put_u32(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);
        buf.put_slice(&self.error);
        buf.put_slice(&self.body);
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RpcError> {
        let (header_len, body_len, request_id, version, compressor, serializer) = prefix(data)?;
        Ok(Self {
            header_len: header_len as u32,
            body_len: body_len as u32,
            request_id,
            version,
            compressor,
            serializer,
            error: data[PREFIX_LEN..header_len].to_vec(),
            body: data[header_len..].to_vec(),
        })
    }
}

/// Validates the fixed prefix and the frame's overall size.
fn prefix(data: &[u8]) -> Result<(usize, usize, u32, u8, u8, u8), RpcError> {
    if data.len() < PREFIX_LEN {
        return Err(RpcError::Frame(format!(
            "frame shorter than the {PREFIX_LEN}-byte prefix"
        )));
    }
    let header_len = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
    let body_len = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
    if header_len < PREFIX_LEN {
        return Err(RpcError::Frame(format!("header length {header_len} too small")));
    }
    if header_len + body_len != data.len() {
        return Err(RpcError::Frame(format!(
            "frame is {} bytes but lengths claim {}",
            data.len(),
            header_len + body_len
        )));
    }
    let request_id = u32::from_be_bytes(data[8..12].try_into().unwrap());
    Ok((header_len, body_len, request_id, data[12], data[13], data[14]))
}

fn find(haystack: &[u8], needle: u8, what: &str) -> Result<usize, RpcError> {
    haystack
        .iter()
        .position(|&b| b == needle)
        .ok_or_else(|| RpcError::Frame(format!("unterminated {what}")))
}

fn string(bytes: &[u8]) -> Result<String, RpcError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| RpcError::Frame("header string is not utf-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_request(mut req: Request) -> Request {
        req.finalize();
        Request::decode(&req.encode()).unwrap()
    }

    #[test]
    fn request_roundtrip_with_meta_and_body() {
        let mut req = Request::new("user-service", "get_by_id", 1, vec![1, 2, 3]);
        req.request_id = 42;
        req.version = 1;
        req.compressor = 2;
        req.meta.insert("trace-id".to_string(), "abc123".to_string());
        req.meta.insert("shard".to_string(), "7".to_string());
        let mut expected = req.clone();
        expected.finalize();
        assert_eq!(roundtrip_request(req), expected);
    }

    #[test]
    fn request_roundtrip_with_empty_meta_and_empty_body() {
        let req = Request::new("user-service", "ping", 1, Vec::new());
        let decoded = roundtrip_request(req);
        assert!(decoded.meta.is_empty());
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn body_may_contain_reserved_separators() {
        let body = b"line1\nkey\rvalue\n\r\n".to_vec();
        let req = Request::new("svc", "method", 1, body.clone());
        assert_eq!(roundtrip_request(req).body, body);
    }

    #[test]
    fn header_and_body_lengths_cover_the_frame() {
        let mut req = Request::new("svc", "m", 1, vec![0; 10]);
        req.meta.insert("k".to_string(), "v".to_string());
        req.finalize();
        let encoded = req.encode();
        assert_eq!(
            (req.header_len + req.body_len) as usize,
            encoded.len(),
            "lengths must cover the whole frame"
        );
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut req = Request::new("svc", "m", 1, vec![9; 4]);
        req.finalize();
        let mut encoded = req.encode();
        encoded.pop();
        assert!(matches!(
            Request::decode(&encoded),
            Err(RpcError::Frame(_))
        ));
    }

    #[test]
    fn response_roundtrip_with_error_and_body() {
        let mut resp = Response {
            request_id: 7,
            version: 1,
            serializer: 1,
            error: b"something failed".to_vec(),
            body: b"partial".to_vec(),
            ..Default::default()
        };
        resp.finalize();
        let decoded = Response::decode(&resp.encode()).unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(decoded.error, b"something failed");
    }

    #[test]
    fn response_error_length_is_header_minus_prefix() {
        let mut resp = Response::default();
        resp.set_error("oops");
        resp.finalize();
        assert_eq!(resp.header_len, 15 + 4);
    }

    #[test]
    fn response_roundtrip_empty() {
        let mut resp = Response::default();
        resp.finalize();
        let decoded = Response::decode(&resp.encode()).unwrap();
        assert!(decoded.error.is_empty());
        assert!(decoded.body.is_empty());
    }
}
