//! Protobuf messages embedded in the SSO request envelope.
//! Manually defined to match the wire schema used by the network.

use rand::Rng;

/// Per-request signature block, present only for signed commands.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SsoSecureInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub sign: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub token: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub extra: Vec<u8>,
}

/// The `sso_reserved_fields` section of every outgoing request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SsoReservedFields {
    #[prost(string, tag = "15")]
    pub trace: String,
    #[prost(string, optional, tag = "16")]
    pub uid: Option<String>,
    #[prost(message, optional, tag = "24")]
    pub sec_info: Option<SsoSecureInfo>,
}

const TRACE_ALPHABET: &[u8] = b"1234567890abcdef";

/// `00-<32 hex>-<16 hex>-01`
pub fn generate_trace() -> String {
    let mut rng = rand::thread_rng();
    let mut hex = |n: usize| -> String {
        (0..n)
            .map(|_| TRACE_ALPHABET[rng.gen_range(0..TRACE_ALPHABET.len())] as char)
            .collect()
    };
    let (long, short) = (hex(32), hex(16));
    format!("00-{long}-{short}-01")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_has_fixed_shape() {
        let trace = generate_trace();
        assert_eq!(trace.len(), 55);
        let parts: Vec<&str> = trace.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
