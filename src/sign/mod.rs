mod url;

use anyhow::Result;
use async_trait::async_trait;

pub use url::UrlSigner;

/// Commands whose requests must carry a signature block.
pub const SIGN_REQUIRED_COMMANDS: &[&str] = &[
    "trpc.o3.ecdh_access.EcdhAccess.SsoEstablishShareKey",
    "trpc.o3.ecdh_access.EcdhAccess.SsoSecureAccess",
    "trpc.o3.report.Report.SsoReport",
    "MessageSvc.PbSendMsg",
    "wtlogin.trans_emp",
    "wtlogin.login",
    "trpc.login.ecdh.EcdhService.SsoKeyExchange",
    "trpc.login.ecdh.EcdhService.SsoNTLoginPasswordLogin",
    "trpc.login.ecdh.EcdhService.SsoNTLoginEasyLogin",
    "trpc.login.ecdh.EcdhService.SsoNTLoginPasswordLoginNewDevice",
    "trpc.login.ecdh.EcdhService.SsoNTLoginEasyLoginUnusualDevice",
    "trpc.login.ecdh.EcdhService.SsoNTLoginPasswordLoginUnusualDevice",
    "OidbSvcTrpcTcp.0x11ec_1",
    "OidbSvcTrpcTcp.0x758_1",
    "OidbSvcTrpcTcp.0x7c1_1",
    "OidbSvcTrpcTcp.0x7c2_5",
    "OidbSvcTrpcTcp.0x10db_1",
    "OidbSvcTrpcTcp.0x8a1_7",
    "OidbSvcTrpcTcp.0x89a_0",
    "OidbSvcTrpcTcp.0x89a_15",
    "OidbSvcTrpcTcp.0x88d_0",
    "OidbSvcTrpcTcp.0x88d_14",
    "OidbSvcTrpcTcp.0x112a_1",
    "OidbSvcTrpcTcp.0x587_74",
    "OidbSvcTrpcTcp.0x1100_1",
    "OidbSvcTrpcTcp.0x1102_1",
    "OidbSvcTrpcTcp.0x1103_1",
    "OidbSvcTrpcTcp.0x1107_1",
    "OidbSvcTrpcTcp.0x1105_1",
    "OidbSvcTrpcTcp.0xf88_1",
    "OidbSvcTrpcTcp.0xf89_1",
    "OidbSvcTrpcTcp.0xf57_1",
    "OidbSvcTrpcTcp.0xf57_106",
    "OidbSvcTrpcTcp.0xf57_9",
    "OidbSvcTrpcTcp.0xf55_1",
    "OidbSvcTrpcTcp.0xf67_1",
    "OidbSvcTrpcTcp.0xf67_5",
    "OidbSvcTrpcTcp.0x6d9_4",
];

/// Exact, case-sensitive lookup in [`SIGN_REQUIRED_COMMANDS`].
pub fn requires_signature(command: &str) -> bool {
    SIGN_REQUIRED_COMMANDS.contains(&command)
}

/// Signature material embedded in a request's reserved fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResult {
    pub sign: Vec<u8>,
    pub token: Vec<u8>,
    pub extra: Vec<u8>,
}

/// Produces signatures for allow-listed commands.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    async fn sign(
        &self,
        command: &str,
        sequence: i32,
        payload: &[u8],
    ) -> Result<Option<SignResult>>;
}

/// Signer that never signs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSigner;

#[async_trait]
impl Signer for NoSigner {
    async fn sign(
        &self,
        _command: &str,
        _sequence: i32,
        _payload: &[u8],
    ) -> Result<Option<SignResult>> {
        Ok(None)
    }
}
