pub mod proto;
pub mod system;

use std::time::Duration;

use anyhow::Result;

use crate::error::SsoError;
use crate::identity::{AppInfo, SessionStore};
use crate::transport::TransportSession;

/// What a service sees while building a request or parsing a response.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub app: AppInfo,
    pub session: SessionStore,
}

/// A typed RPC: how to build its payload and read its answer.
pub trait Service: Send + Sync {
    type Request: Send;
    type Response;

    fn command(&self) -> &'static str;

    fn build(&self, ctx: &ServiceContext, req: Self::Request) -> Vec<u8>;

    fn parse(&self, ctx: &ServiceContext, payload: &[u8]) -> Result<Self::Response>;
}

impl TransportSession {
    /// Run `service` over this session. A non-zero return code becomes
    /// [`SsoError::Service`].
    pub async fn call<S: Service>(
        &self,
        service: &S,
        req: S::Request,
        timeout: Duration,
    ) -> Result<S::Response, SsoError> {
        let ctx = ServiceContext {
            app: self.app_info().clone(),
            session: self.identity().snapshot().await,
        };
        let payload = service.build(&ctx, req);
        let resp = self.send(service.command(), &payload, timeout).await?;
        if resp.return_code != 0 {
            return Err(SsoError::Service {
                command: resp.command,
                code: resp.return_code,
                message: resp.extra.unwrap_or_default(),
            });
        }
        service
            .parse(&ctx, &resp.payload)
            .map_err(|e| SsoError::Parse {
                command: service.command().to_string(),
                message: format!("{e:#}"),
            })
    }
}
