use anyhow::Result;
use prost::Message as _;
use tracing::info;

use crate::error::SsoError;
use crate::transport::TransportSession;

use super::proto::{
    DeviceInfo, OnlineBusinessInfo, RegisterInfo, RegisterInfoResponse, SsoHeartBeat,
    UnRegisterInfo,
};
use super::{Service, ServiceContext};

pub const REGISTER_COMMAND: &str = "trpc.qq_new_tech.status_svc.StatusService.Register";
pub const UNREGISTER_COMMAND: &str = "trpc.qq_new_tech.status_svc.StatusService.UnRegister";
pub const HEARTBEAT_COMMAND: &str = "trpc.qq_new_tech.status_svc.StatusService.SsoHeartBeat";

const REGISTER_SUCCESS: &str = "register success";
const OS_VERSION: &str = "Windows 10.0.19042";

fn device_info(ctx: &ServiceContext) -> DeviceInfo {
    DeviceInfo {
        dev_name: ctx.session.device_name.clone(),
        dev_type: ctx.app.kernel.clone(),
        os_ver: OS_VERSION.to_string(),
        brand: None,
        vendor_os_name: ctx.app.vendor_os.clone(),
    }
}

/// Presence registration ("online").
pub struct Register;

impl Service for Register {
    type Request = ();
    type Response = String;

    fn command(&self) -> &'static str {
        REGISTER_COMMAND
    }

    fn build(&self, ctx: &ServiceContext, _req: ()) -> Vec<u8> {
        RegisterInfo {
            guid: hex::encode(&ctx.session.guid),
            current_version: ctx.app.current_version.clone(),
            device: Some(device_info(ctx)),
            business_info: Some(OnlineBusinessInfo {
                notify_switch: 1,
                bind_uin_notify_switch: 1,
            }),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn parse(&self, _ctx: &ServiceContext, payload: &[u8]) -> Result<String> {
        Ok(RegisterInfoResponse::decode(payload)?.message)
    }
}

/// Presence removal ("offline").
pub struct UnRegister;

impl Service for UnRegister {
    type Request = ();
    type Response = String;

    fn command(&self) -> &'static str {
        UNREGISTER_COMMAND
    }

    fn build(&self, ctx: &ServiceContext, _req: ()) -> Vec<u8> {
        UnRegisterInfo {
            device: Some(device_info(ctx)),
        }
        .encode_to_vec()
    }

    fn parse(&self, _ctx: &ServiceContext, payload: &[u8]) -> Result<String> {
        Ok(RegisterInfoResponse::decode(payload)?.message)
    }
}

/// Keep-alive ping.
pub struct Heartbeat;

impl Service for Heartbeat {
    type Request = ();
    type Response = ();

    fn command(&self) -> &'static str {
        HEARTBEAT_COMMAND
    }

    fn build(&self, _ctx: &ServiceContext, _req: ()) -> Vec<u8> {
        SsoHeartBeat { r#type: 1 }.encode_to_vec()
    }

    fn parse(&self, _ctx: &ServiceContext, _payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

impl TransportSession {
    /// Register this device as online.
    pub async fn online(&self) -> Result<(), SsoError> {
        let timeout = self.options().register_timeout;
        let message = self.call(&Register, (), timeout).await?;
        if message != REGISTER_SUCCESS {
            return Err(SsoError::Online(message));
        }
        let uin = self.identity().snapshot().await.uin;
        info!("Account {uin} is online");
        Ok(())
    }

    /// Unregister this device; the connection stays up.
    pub async fn offline(&self) -> Result<String, SsoError> {
        let timeout = self.options().register_timeout;
        self.call(&UnRegister, (), timeout).await
    }

    pub async fn heartbeat(&self) -> Result<(), SsoError> {
        let timeout = self.options().register_timeout;
        self.call(&Heartbeat, (), timeout).await
    }
}
