//! Tagged Value Encoding
//!
//! A value is either *null* (type present, bytes absent) or a contiguous
//! byte sequence decoded per its type. Records and containers pack their
//! elements into a single buffer using a length-prefixed framing that an
//! iterator can walk without copying:
//!
//! ```text
//! element := tag [body]
//! tag     := uvarint; 0 means null, else ((len + 1) << 1) | container_bit
//! ```
//!
//! ## Primitive bodies
//! - bool: one byte, 0 or 1
//! - int16/int32/int64, time, duration: ZigZag varint
//! - uint16/uint32/uint64, port: uvarint
//! - float64: 8-byte little-endian IEEE bits
//! - string (UTF-8 checked), bytes, enum: raw bytes
//! - ip: 4 or 16 bytes on the wire; canonical form is 16 bytes
//! - net: 16-byte address followed by one prefix-length byte
//!
//! All decoders return a decode error on truncated or malformed input; none
//! panic. That matters because a malformed value is a per-record condition
//! the engine degrades to null, not a fatal error.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::nano::Ts;
use crate::types::Type;
use crate::varint;

// ---------------------------------------------------------------------------
// Element framing
// ---------------------------------------------------------------------------

/// Append one framed element to `buf`.
pub fn append_element(buf: &mut BytesMut, bytes: Option<&[u8]>, container: bool) {
    match bytes {
        None => varint::put_uvarint(buf, 0),
        Some(body) => {
            let tag = ((body.len() as u64 + 1) << 1) | container as u64;
            varint::put_uvarint(buf, tag);
            buf.put_slice(body);
        }
    }
}

/// One element yielded by [`ElementIter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    /// `None` for a null element.
    pub bytes: Option<&'a [u8]>,
    /// Whether the element is itself a container body.
    pub container: bool,
}

/// Walks the elements of a record or container body without copying.
#[derive(Debug, Clone)]
pub struct ElementIter<'a> {
    data: &'a [u8],
}

impl<'a> ElementIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ElementIter { data }
    }

    pub fn is_done(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = Result<Element<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let (tag, n) = match varint::uvarint(self.data) {
            Ok(v) => v,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };
        self.data = &self.data[n..];
        if tag == 0 {
            return Some(Ok(Element {
                bytes: None,
                container: false,
            }));
        }
        let container = (tag & 1) != 0;
        let len = (tag >> 1) as usize - 1;
        if self.data.len() < len {
            self.data = &[];
            return Some(Err(Error::Truncated("element body")));
        }
        let (body, rest) = self.data.split_at(len);
        self.data = rest;
        Some(Ok(Element {
            bytes: Some(body),
            container,
        }))
    }
}

// ---------------------------------------------------------------------------
// Primitive decoders
// ---------------------------------------------------------------------------

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    match data {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(Error::Malformed("bool")),
    }
}

pub fn decode_int(data: &[u8]) -> Result<i64> {
    let (v, n) = varint::varint(data)?;
    if n != data.len() {
        return Err(Error::Malformed("int"));
    }
    Ok(v)
}

pub fn decode_uint(data: &[u8]) -> Result<u64> {
    let (v, n) = varint::uvarint(data)?;
    if n != data.len() {
        return Err(Error::Malformed("uint"));
    }
    Ok(v)
}

pub fn decode_float64(data: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| Error::Malformed("float64"))?;
    Ok(f64::from_le_bytes(bytes))
}

pub fn decode_string(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| Error::InvalidUtf8)
}

pub fn decode_ip(data: &[u8]) -> Result<IpAddr> {
    match data.len() {
        4 => {
            let octets: [u8; 4] = data.try_into().unwrap();
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = data.try_into().unwrap();
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(Error::Malformed("ip")),
    }
}

pub fn decode_net(data: &[u8]) -> Result<(IpAddr, u8)> {
    if data.len() != 17 {
        return Err(Error::Malformed("net"));
    }
    let octets: [u8; 16] = data[..16].try_into().unwrap();
    let prefix = data[16];
    if prefix > 128 {
        return Err(Error::Malformed("net prefix"));
    }
    Ok((IpAddr::V6(Ipv6Addr::from(octets)), prefix))
}

pub fn decode_port(data: &[u8]) -> Result<u16> {
    let v = decode_uint(data)?;
    u16::try_from(v).map_err(|_| Error::OutOfRange("port"))
}

pub fn decode_time(data: &[u8]) -> Result<Ts> {
    Ok(Ts(decode_int(data)?))
}

pub fn decode_duration(data: &[u8]) -> Result<i64> {
    decode_int(data)
}

/// Canonical 16-byte form of an address; v4 maps into `::ffff:a.b.c.d`.
pub fn ip_to16(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

// ---------------------------------------------------------------------------
// Primitive encoders
// ---------------------------------------------------------------------------

pub fn encode_bool(v: bool) -> Bytes {
    Bytes::from(vec![v as u8])
}

pub fn encode_int(v: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    varint::put_varint(&mut buf, v);
    buf.freeze()
}

pub fn encode_uint(v: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    varint::put_uvarint(&mut buf, v);
    buf.freeze()
}

pub fn encode_float64(v: f64) -> Bytes {
    Bytes::copy_from_slice(&v.to_le_bytes())
}

pub fn encode_ip(addr: IpAddr) -> Bytes {
    match addr {
        IpAddr::V4(v4) => Bytes::copy_from_slice(&v4.octets()),
        IpAddr::V6(v6) => Bytes::copy_from_slice(&v6.octets()),
    }
}

/// Encode a network prefix. The address canonicalizes to 16 bytes, so a v4
/// prefix length widens by the 96 mapped bits.
pub fn encode_net(addr: IpAddr, prefix: u8) -> Bytes {
    let prefix = if addr.is_ipv4() { prefix + 96 } else { prefix };
    let mut buf = BytesMut::with_capacity(17);
    buf.put_slice(&ip_to16(addr));
    buf.put_u8(prefix);
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A typed value: a type plus encoded bytes, or null (bytes absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub ty: Type,
    pub bytes: Option<Bytes>,
}

impl Value {
    pub fn new(ty: Type, bytes: Option<Bytes>) -> Self {
        Value { ty, bytes }
    }

    pub fn null(ty: Type) -> Self {
        Value { ty, bytes: None }
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    pub fn from_bool(v: bool) -> Self {
        Value::new(Type::Bool, Some(encode_bool(v)))
    }

    pub fn int64(v: i64) -> Self {
        Value::new(Type::Int64, Some(encode_int(v)))
    }

    pub fn uint64(v: u64) -> Self {
        Value::new(Type::Uint64, Some(encode_uint(v)))
    }

    pub fn float64(v: f64) -> Self {
        Value::new(Type::Float64, Some(encode_float64(v)))
    }

    pub fn string(v: impl AsRef<str>) -> Self {
        Value::new(Type::String, Some(Bytes::copy_from_slice(v.as_ref().as_bytes())))
    }

    pub fn bstring(v: impl AsRef<[u8]>) -> Self {
        Value::new(Type::Bytes, Some(Bytes::copy_from_slice(v.as_ref())))
    }

    pub fn ip(addr: IpAddr) -> Self {
        Value::new(Type::Ip, Some(encode_ip(addr)))
    }

    pub fn net(addr: IpAddr, prefix: u8) -> Self {
        Value::new(Type::Net, Some(encode_net(addr, prefix)))
    }

    pub fn port(v: u16) -> Self {
        Value::new(Type::Port, Some(encode_uint(v as u64)))
    }

    pub fn time(ts: Ts) -> Self {
        Value::new(Type::Time, Some(encode_int(ts.nanos())))
    }

    pub fn duration(ns: i64) -> Self {
        Value::new(Type::Duration, Some(encode_int(ns)))
    }

    /// Canonical string form, used for group-by key canonicalization and
    /// display. Null renders as `-`; a value that fails to decode renders as
    /// `<bad>` so corrupt records still land in a deterministic group.
    pub fn format(&self) -> String {
        let bytes = match &self.bytes {
            None => return "-".to_string(),
            Some(b) => b.as_ref(),
        };
        format_bytes(&self.ty, bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

fn format_bytes(ty: &Type, bytes: &[u8]) -> String {
    let result = match ty {
        Type::Bool => decode_bool(bytes).map(|v| v.to_string()),
        Type::Int16 | Type::Int32 | Type::Int64 => decode_int(bytes).map(|v| v.to_string()),
        Type::Uint16 | Type::Uint32 | Type::Uint64 => decode_uint(bytes).map(|v| v.to_string()),
        Type::Float64 => decode_float64(bytes).map(|v| v.to_string()),
        Type::String => decode_string(bytes).map(|v| v.to_string()),
        Type::Bytes | Type::Enum => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Type::Ip => decode_ip(bytes).map(|v| v.to_string()),
        Type::Net => decode_net(bytes).map(|(addr, prefix)| format!("{}/{}", addr, prefix)),
        Type::Port => decode_port(bytes).map(|v| v.to_string()),
        Type::Time => decode_time(bytes).map(|v| v.to_string()),
        Type::Duration => decode_duration(bytes).map(|v| Ts(v).to_string()),
        Type::Set(inner) | Type::Vector(inner) => {
            let mut parts = Vec::new();
            for elem in ElementIter::new(bytes) {
                match elem {
                    Ok(e) => match e.bytes {
                        Some(b) => parts.push(format_bytes(inner, b)),
                        None => parts.push("-".to_string()),
                    },
                    Err(_) => return "<bad>".to_string(),
                }
            }
            return format!("[{}]", parts.join(","));
        }
        Type::Record(schema) => {
            let mut parts = Vec::new();
            let mut iter = ElementIter::new(bytes);
            for col in schema.columns() {
                match iter.next() {
                    Some(Ok(e)) => match e.bytes {
                        Some(b) => parts.push(format_bytes(&col.ty, b)),
                        None => parts.push("-".to_string()),
                    },
                    Some(Err(_)) | None => return "<bad>".to_string(),
                }
            }
            return format!("[{}]", parts.join(","));
        }
    };
    result.unwrap_or_else(|_| "<bad>".to_string())
}
