pub mod receiver;
pub mod tcp;
pub mod transport;
pub mod udp;

#[cfg(test)]
mod model;

pub use receiver::{PacketReceiver, ReceiveStats};
pub use tcp::{FrameCodec, TcpPacketizer};
pub use transport::{DatagramTransport, StreamTransport};
pub use udp::{UdpFrame, UdpPacketizer};
