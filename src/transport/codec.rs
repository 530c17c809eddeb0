//! Service Frame and SSO Frame encoding.
//!
//! Two nested envelopes travel over the socket. The outer Service Frame
//! carries the account uin and an (optionally) encrypted body; the body is an
//! SSO Frame carrying the sequence, command name and payload. Requests and
//! responses use slightly different layouts for both layers, so each layer has
//! a request pair and a response pair. Everything here is pure: encryption
//! and compression happen in the caller.

use prost::Message as _;
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::FrameError;

use super::binary::{BinaryReader, BinaryWriter, Prefix};
use super::compress;
use super::proto::SsoReservedFields;

/// Protocol tag written on every outgoing Service Frame.
pub const PROTOCOL_TAG: u32 = 12;
/// Locale written into every request envelope (zh-CN).
pub const LOCALE_ID: i32 = 2052;
/// Upper bound on a single frame read from the socket.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LENGTH_FIELD_LEN: usize = 4;
const SSO_FIXED_BYTES: [u8; 12] = [0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const ZERO_KEY: [u8; 16] = [0; 16];

/// Stream codec splitting the socket into whole frames. The length prefix
/// counts its own four bytes and is stripped from the yielded frame.
pub fn frame_codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_FIELD_LEN)
        .length_adjustment(-(LENGTH_FIELD_LEN as isize))
        .num_skip(LENGTH_FIELD_LEN)
        .max_frame_length(max_frame_len)
        .new_codec()
}

/// Which key encrypts a Service Frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthFlag {
    Plain = 0,
    SessionKey = 1,
    ZeroKey = 2,
}

impl AuthFlag {
    /// Flag for an outgoing request: the zero key until a d2 token exists.
    pub fn for_request(d2: &[u8]) -> Self {
        if d2.is_empty() {
            Self::ZeroKey
        } else {
            Self::SessionKey
        }
    }

    /// Key implied by this flag, or `None` when the body is not encrypted.
    pub fn key<'a>(self, d2_key: &'a [u8]) -> Option<&'a [u8]> {
        match self {
            Self::Plain => None,
            Self::SessionKey => Some(d2_key),
            Self::ZeroKey => Some(&ZERO_KEY),
        }
    }
}

impl TryFrom<u8> for AuthFlag {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::SessionKey),
            2 => Ok(Self::ZeroKey),
            other => Err(FrameError::UnknownAuthFlag(other)),
        }
    }
}

fn check_protocol(tag: u32) -> Result<u32, FrameError> {
    match tag {
        12 | 13 => Ok(tag),
        other => Err(FrameError::UnknownProtocol(other)),
    }
}

// ── Service Frame (server → client) ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFrame {
    pub protocol_tag: u32,
    pub auth_flag: AuthFlag,
    pub uin: String,
    pub body: Vec<u8>,
}

/// Encode a response-layout Service Frame, length prefix included.
pub fn encode_service_frame(frame: &ServiceFrame) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    w.put_section(Prefix::U32WithSelf, |s| {
        s.put_u32(frame.protocol_tag)
            .put_u8(frame.auth_flag as u8)
            .put_u8(0)
            .put_prefixed_str(&frame.uin, Prefix::U32WithSelf)
            .put_raw(&frame.body);
    });
    w.into_bytes()
}

/// Decode a response-layout Service Frame. `packet` excludes the length prefix.
pub fn decode_service_frame(packet: &[u8]) -> Result<ServiceFrame, FrameError> {
    let mut r = BinaryReader::new(packet);
    let protocol_tag = check_protocol(r.read_u32()?)?;
    let auth_flag = AuthFlag::try_from(r.read_u8()?)?;
    r.read_u8()?;
    let uin = r.read_prefixed_string(Prefix::U32WithSelf, "uin")?;
    Ok(ServiceFrame {
        protocol_tag,
        auth_flag,
        uin,
        body: r.read_rest().to_vec(),
    })
}

// ── Service Frame (client → server) ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub auth_flag: AuthFlag,
    pub d2: Vec<u8>,
    pub uin: String,
    pub body: Vec<u8>,
}

/// Encode a request-layout Service Frame, length prefix included.
pub fn encode_service_request(req: &ServiceRequest) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    w.put_section(Prefix::U32WithSelf, |s| {
        s.put_u32(PROTOCOL_TAG)
            .put_u8(req.auth_flag as u8)
            .put_prefixed(&req.d2, Prefix::U32WithSelf)
            .put_u8(0)
            .put_prefixed_str(&req.uin, Prefix::U32WithSelf)
            .put_raw(&req.body);
    });
    w.into_bytes()
}

/// Decode a request-layout Service Frame. `packet` excludes the length prefix.
pub fn decode_service_request(packet: &[u8]) -> Result<ServiceRequest, FrameError> {
    let mut r = BinaryReader::new(packet);
    check_protocol(r.read_u32()?)?;
    let auth_flag = AuthFlag::try_from(r.read_u8()?)?;
    let d2 = r.read_prefixed(Prefix::U32WithSelf)?.to_vec();
    r.read_u8()?;
    let uin = r.read_prefixed_string(Prefix::U32WithSelf, "uin")?;
    Ok(ServiceRequest {
        auth_flag,
        d2,
        uin,
        body: r.read_rest().to_vec(),
    })
}

// ── SSO Frame (client → server) ──

#[derive(Debug, Clone, PartialEq)]
pub struct SsoRequest {
    pub sequence: i32,
    pub sub_app_id: i32,
    pub locale_id: i32,
    pub a2: Vec<u8>,
    pub command: String,
    pub guid_hex: String,
    pub app_version: String,
    pub reserved: SsoReservedFields,
    pub payload: Vec<u8>,
}

pub fn encode_sso_request(req: &SsoRequest) -> Vec<u8> {
    let reserved = req.reserved.encode_to_vec();
    let mut w = BinaryWriter::new();
    w.put_section(Prefix::U32WithSelf, |h| {
        h.put_i32(req.sequence)
            .put_i32(req.sub_app_id)
            .put_i32(req.locale_id)
            .put_raw(&SSO_FIXED_BYTES)
            .put_prefixed(&req.a2, Prefix::U32WithSelf)
            .put_prefixed_str(&req.command, Prefix::U32WithSelf)
            .put_prefixed(&[], Prefix::U32WithSelf)
            .put_prefixed_str(&req.guid_hex, Prefix::U32WithSelf)
            .put_prefixed(&[], Prefix::U32WithSelf)
            .put_prefixed_str(&req.app_version, Prefix::U16WithSelf)
            .put_prefixed(&reserved, Prefix::U32WithSelf);
    })
    .put_prefixed(&req.payload, Prefix::U32WithSelf);
    w.into_bytes()
}

pub fn decode_sso_request(body: &[u8]) -> Result<SsoRequest, FrameError> {
    let mut outer = BinaryReader::new(body);
    let mut h = BinaryReader::new(outer.read_prefixed(Prefix::U32WithSelf)?);
    let sequence = h.read_i32()?;
    let sub_app_id = h.read_i32()?;
    let locale_id = h.read_i32()?;
    h.read_bytes(SSO_FIXED_BYTES.len())?;
    let a2 = h.read_prefixed(Prefix::U32WithSelf)?.to_vec();
    let command = h.read_prefixed_string(Prefix::U32WithSelf, "command")?;
    h.read_prefixed(Prefix::U32WithSelf)?;
    let guid_hex = h.read_prefixed_string(Prefix::U32WithSelf, "guid")?;
    h.read_prefixed(Prefix::U32WithSelf)?;
    let app_version = h.read_prefixed_string(Prefix::U16WithSelf, "app_version")?;
    let reserved = SsoReservedFields::decode(h.read_prefixed(Prefix::U32WithSelf)?)
        .map_err(|e| FrameError::ReservedFields(e.to_string()))?;
    let payload = outer.read_prefixed(Prefix::U32WithSelf)?.to_vec();
    Ok(SsoRequest {
        sequence,
        sub_app_id,
        locale_id,
        a2,
        command,
        guid_hex,
        app_version,
        reserved,
        payload,
    })
}

// ── SSO Frame (server → client) ──

/// A decoded response frame, payload still as sent (possibly compressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoFrame {
    pub sequence: i32,
    pub return_code: i32,
    pub extra: String,
    pub command: String,
    pub message_cookie: Vec<u8>,
    pub compressed: bool,
    pub reserved_field: Vec<u8>,
    pub payload: Vec<u8>,
}

/// A completed RPC result or push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoResponse {
    pub return_code: i32,
    pub command: String,
    pub payload: Vec<u8>,
    pub sequence: i32,
    /// Server message, only set when `return_code != 0`.
    pub extra: Option<String>,
}

impl SsoResponse {
    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

impl SsoFrame {
    /// Inflates the payload if flagged and drops wire-only fields.
    pub fn into_response(self) -> Result<SsoResponse, FrameError> {
        let payload = if self.compressed {
            compress::inflate(&self.payload)?
        } else {
            self.payload
        };
        let extra = (self.return_code != 0).then_some(self.extra);
        Ok(SsoResponse {
            return_code: self.return_code,
            command: self.command,
            payload,
            sequence: self.sequence,
            extra,
        })
    }
}

pub fn encode_sso_response(frame: &SsoFrame) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    w.put_section(Prefix::U32WithSelf, |h| {
        h.put_i32(frame.sequence)
            .put_i32(frame.return_code)
            .put_prefixed_str(&frame.extra, Prefix::U32WithSelf)
            .put_prefixed_str(&frame.command, Prefix::U32WithSelf)
            .put_prefixed(&frame.message_cookie, Prefix::U32WithSelf)
            .put_i32(i32::from(frame.compressed))
            .put_prefixed(&frame.reserved_field, Prefix::U32);
    })
    .put_prefixed(&frame.payload, Prefix::U32WithSelf);
    w.into_bytes()
}

/// Decode a response SSO Frame. The sequence is returned alongside the error
/// when it could be read, so a single caller can be failed.
pub fn decode_sso_response(body: &[u8]) -> Result<SsoFrame, (Option<i32>, FrameError)> {
    let mut r = BinaryReader::new(body);
    r.read_u32().map_err(|e| (None, e))?;
    let sequence = r.read_i32().map_err(|e| (None, e))?;
    decode_response_tail(&mut r, sequence).map_err(|e| (Some(sequence), e))
}

fn decode_response_tail(r: &mut BinaryReader<'_>, sequence: i32) -> Result<SsoFrame, FrameError> {
    let return_code = r.read_i32()?;
    let extra = r.read_prefixed_string(Prefix::U32WithSelf, "extra")?;
    let command = r.read_prefixed_string(Prefix::U32WithSelf, "command")?;
    let message_cookie = r.read_prefixed(Prefix::U32WithSelf)?.to_vec();
    let compressed = r.read_i32()? == 1;
    let reserved_field = r.read_prefixed(Prefix::U32)?.to_vec();
    let payload = r.read_prefixed(Prefix::U32WithSelf)?.to_vec();
    Ok(SsoFrame {
        sequence,
        return_code,
        extra,
        command,
        message_cookie,
        compressed,
        reserved_field,
        payload,
    })
}
