//! UDP multicast transport using `socket2` for setup and tokio for I/O.
//!
//! Two sockets per transport: a receiver bound to the group address and port
//! with address/port reuse (so several processes on one host can share the
//! group), and an ephemeral sender configured with the group's TTL,
//! loopback and outgoing interface.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::signal::CloseSignal;
use crate::{
    Datagram, DatagramTransport, SequenceCounter, TransportConfig,
    TransportError, MAX_DATAGRAM_SIZE,
};

/// A [`DatagramTransport`] over one UDP multicast group.
#[derive(Debug)]
pub struct MulticastTransport {
    send_socket: UdpSocket,
    recv_socket: UdpSocket,
    destination: SocketAddr,
    sequence: SequenceCounter,
    closed: CloseSignal,
}

impl MulticastTransport {
    /// The group address and port datagrams are sent to.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl DatagramTransport for MulticastTransport {
    type Config = TransportConfig;

    async fn open(config: &TransportConfig) -> Result<Self, TransportError> {
        config.validate()?;

        let recv_socket =
            bind_receiver(config).map_err(TransportError::BindFailed)?;
        let send_socket =
            bind_sender(config).map_err(TransportError::BindFailed)?;
        let destination =
            SocketAddr::V4(SocketAddrV4::new(config.group, config.port));

        tracing::info!(
            group = %config.group,
            port = config.port,
            ttl = config.ttl,
            loopback = config.loopback,
            "multicast transport bound"
        );

        Ok(Self {
            send_socket,
            recv_socket,
            destination,
            sequence: SequenceCounter::default(),
            closed: CloseSignal::new(),
        })
    }

    async fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        if self.closed.is_closed() {
            return Err(TransportError::Closed);
        }
        self.send_socket
            .send_to(datagram, self.destination)
            .await
            .map_err(TransportError::SendFailed)?;
        Ok(())
    }

    async fn next_datagram(&self) -> Result<Option<Datagram>, TransportError> {
        if self.closed.is_closed() {
            return Ok(None);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        tokio::select! {
            () = self.closed.wait() => Ok(None),
            received = self.recv_socket.recv_from(&mut buf) => {
                let (len, source) = received.map_err(TransportError::ReceiveFailed)?;
                buf.truncate(len);
                Ok(Some(Datagram { payload: buf, source }))
            }
        }
    }

    fn close(&self) {
        if self.closed.close() {
            tracing::debug!(destination = %self.destination, "multicast transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.next_sequence()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.send_socket.local_addr().ok()
    }
}

fn bind_receiver(config: &TransportConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;
    if let Some(size) = config.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }

    socket.bind(&SocketAddr::V4(receive_bind_addr(config)).into())?;
    socket.join_multicast_v4(&config.group, &config.interface)?;
    socket.set_multicast_loop_v4(config.loopback)?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

/// Binding to the group filters out unicast datagrams aimed at the port.
/// Windows refuses to bind a multicast address, so it takes the wildcard.
fn receive_bind_addr(config: &TransportConfig) -> SocketAddrV4 {
    let ip = if cfg!(windows) {
        Ipv4Addr::UNSPECIFIED
    } else {
        config.group
    };
    SocketAddrV4::new(ip, config.port)
}

fn bind_sender(config: &TransportConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_loop_v4(config.loopback)?;
    socket.set_multicast_if_v4(&config.interface)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&SocketAddr::V4(bind_addr).into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_receive_bind_addr_is_the_group() {
        let config = TransportConfig {
            group: Ipv4Addr::new(239, 255, 76, 90),
            port: 17669,
            ..TransportConfig::default()
        };
        assert_eq!(
            receive_bind_addr(&config),
            SocketAddrV4::new(Ipv4Addr::new(239, 255, 76, 90), 17669)
        );
    }
}
