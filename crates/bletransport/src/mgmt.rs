use crate::transport::BleTransport;
use async_trait::async_trait;
use bletransport_core::TransportError;
use std::sync::Arc;
use std::time::Duration;

/// Management protocols that can run on top of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtProto {
    /// Plain newtmgr management protocol.
    Nmp,
    /// OIC-encapsulated management protocol.
    Omp,
}

/// Configuration for a management session built on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub mgmt_proto: MgmtProto,
}

/// A management session layered over the transport. Transmission is a
/// guarded pass-through; request/response correlation is done by the
/// session through listeners.
#[async_trait]
pub trait ManagementSession: Send + Sync {
    fn proto(&self) -> MgmtProto;

    /// Response timeout advertised by the underlying transport.
    fn rsp_timeout(&self) -> Duration;

    async fn transmit(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}

pub struct PlainSession {
    transport: Arc<BleTransport>,
}

#[async_trait]
impl ManagementSession for PlainSession {
    fn proto(&self) -> MgmtProto {
        MgmtProto::Nmp
    }

    fn rsp_timeout(&self) -> Duration {
        self.transport.rsp_timeout()
    }

    async fn transmit(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.transport.tx(frame).await
    }
}

pub struct OicSession {
    transport: Arc<BleTransport>,
}

#[async_trait]
impl ManagementSession for OicSession {
    fn proto(&self) -> MgmtProto {
        MgmtProto::Omp
    }

    fn rsp_timeout(&self) -> Duration {
        self.transport.rsp_timeout()
    }

    async fn transmit(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.transport.tx(frame).await
    }
}

impl BleTransport {
    /// Build a management session for the requested protocol.
    pub fn build_session(
        self: &Arc<Self>,
        cfg: SessionConfig,
    ) -> Result<Box<dyn ManagementSession>, TransportError> {
        match cfg.mgmt_proto {
            MgmtProto::Nmp => Ok(Box::new(PlainSession {
                transport: Arc::clone(self),
            })),
            MgmtProto::Omp => Ok(Box::new(OicSession {
                transport: Arc::clone(self),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bletransport_core::{
        Session, SessionChannels, SessionFactory, TransportConfig, TransportState,
    };

    struct NoopFactory;

    #[async_trait]
    impl SessionFactory for NoopFactory {
        async fn open(
            &self,
            _cfg: &TransportConfig,
        ) -> Result<(Box<dyn Session>, SessionChannels), TransportError> {
            Err(TransportError::AcceptTimeout)
        }
    }

    fn test_transport() -> Arc<BleTransport> {
        let cfg = TransportConfig::builder()
            .sock_path("/tmp/bletransport-mgmt.sock")
            .hostd_path("/usr/bin/blehostd")
            .dev_path("/dev/ttyUSB0")
            .build()
            .unwrap();
        BleTransport::with_factory(cfg, Arc::new(NoopFactory)).unwrap()
    }

    #[tokio::test]
    async fn test_build_session_dispatches_on_protocol() {
        let transport = test_transport();

        let plain = transport
            .build_session(SessionConfig {
                mgmt_proto: MgmtProto::Nmp,
            })
            .unwrap();
        assert_eq!(plain.proto(), MgmtProto::Nmp);

        let oic = transport
            .build_session(SessionConfig {
                mgmt_proto: MgmtProto::Omp,
            })
            .unwrap();
        assert_eq!(oic.proto(), MgmtProto::Omp);
        assert_eq!(oic.rsp_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_transmit_gated_by_transport_state() {
        let transport = test_transport();
        let session = transport
            .build_session(SessionConfig {
                mgmt_proto: MgmtProto::Nmp,
            })
            .unwrap();

        assert_eq!(
            session.transmit(b"frame".to_vec()).await,
            Err(TransportError::NotStarted(TransportState::Stopped))
        );
    }
}
