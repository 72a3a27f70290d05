use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time;

use crate::climate::protocol::{self, StatusUpdate};
use crate::climate::types::{AcLink, ClimateConfig, LinkError, LinkResult, RECV_BUF_LEN};

impl AcLink {
    /// Binds the local endpoint and locks the socket onto the unit, so only
    /// its datagrams are received.
    pub(crate) async fn connect(config: &ClimateConfig) -> LinkResult<AcLink> {
        let socket = UdpSocket::bind(("0.0.0.0", config.local_port))
            .await
            .map_err(|e| LinkError::Bind(config.local_port, e))?;
        let unit = SocketAddr::new(config.address, config.port);
        socket
            .connect(unit)
            .await
            .map_err(|e| LinkError::Connect(unit, e))?;
        Ok(AcLink {
            socket,
            response_timeout: config.response_timeout,
            buf: [0; RECV_BUF_LEN],
        })
    }

    /// One status exchange: request frame out, reply frame in before the
    /// deadline, decoded. The stop channel aborts the wait mid-exchange.
    pub(crate) async fn request_status(
        &mut self,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> LinkResult<StatusUpdate> {
        self.socket
            .send(protocol::status_request())
            .await
            .map_err(LinkError::Send)?;

        let len = tokio::select! {
            _ = stop_receiver.changed() => return Err(LinkError::Stopped),
            received = time::timeout(self.response_timeout, self.socket.recv(&mut self.buf)) => {
                match received {
                    Err(_) => return Err(LinkError::Timeout(self.response_timeout)),
                    Ok(Err(e)) => return Err(LinkError::Receive(e)),
                    Ok(Ok(len)) => len,
                }
            }
        };

        trace!(
            "received {} byte status frame: {}",
            len,
            protocol::frame_hex(&self.buf[..len])
        );
        Ok(protocol::decode_status(&self.buf[..len])?)
    }

    /// Fires a command frame at the unit. The unit does not acknowledge;
    /// the caller confirms through a later status exchange.
    pub(crate) async fn send_command(&self, frame: &[u8]) -> LinkResult<()> {
        debug!(
            "sending {} byte command frame: {}",
            frame.len(),
            protocol::frame_hex(frame)
        );
        self.socket.send(frame).await.map_err(LinkError::Send)?;
        Ok(())
    }
}
