/// Transport abstraction used by the packetizers
///
/// The packetizers never open sockets themselves; the caller hands them
/// something that can write bytes. Stream transports take the whole frame in
/// one call, datagram transports additionally take the destination.

use bytes::Bytes;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use tracing::trace;

/// Byte-stream sink (TCP)
pub trait StreamTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Datagram sink (UDP)
pub trait DatagramTransport {
    fn write_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()>;
}

impl StreamTransport for TcpStream {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(self, data)
    }
}

/// In-memory stream: appends everything written
impl StreamTransport for Vec<u8> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

impl<T: StreamTransport + ?Sized> StreamTransport for &mut T {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }
}

impl DatagramTransport for UdpSocket {
    fn write_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        let sent = self.send_to(data, addr)?;
        trace!("Sent {} byte datagram to {}", sent, addr);
        Ok(())
    }
}

/// In-memory datagram sink: records each datagram with its destination
impl DatagramTransport for Vec<(Bytes, SocketAddr)> {
    fn write_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.push((Bytes::copy_from_slice(data), addr));
        Ok(())
    }
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for &mut T {
    fn write_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        (**self).write_to(data, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_vec_stream_appends() {
        let mut sink: Vec<u8> = Vec::new();
        StreamTransport::write(&mut sink, b"ab").unwrap();
        StreamTransport::write(&mut &mut sink, b"cd").unwrap();
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn test_tcp_stream_writes_all() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        StreamTransport::write(&mut client, b"hello").unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_udp_socket_sends_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender.write_to(b"ping", receiver.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[test]
    fn test_vec_datagram_records_destination() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let mut sink: Vec<(Bytes, SocketAddr)> = Vec::new();

        sink.write_to(b"one", addr).unwrap();
        sink.write_to(b"two", addr).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1], (Bytes::from_static(b"two"), addr));
    }
}
