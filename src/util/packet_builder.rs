use crate::error::{Error, Result};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes, MutableIcmpPacket};

/// Payload carried by hop discovery probes
pub const TRACEROUTE_PAYLOAD: &[u8] = b"NETANALYZER-TRACEROUTE";

/// Payload carried by latency sampling probes
pub const PING_PAYLOAD: &[u8] = b"NETANALYZER-PING";

/// Size of the ICMP Echo header (type, code, checksum, identifier, sequence)
const ECHO_HEADER_LEN: usize = 8;

/// Outbound ICMP Echo Request. Built fresh for every send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub identifier: u16,
    pub sequence: u16,
    pub payload: &'static [u8],
}

impl Probe {
    /// Probe sent at every TTL during hop discovery.
    pub fn traceroute(identifier: u16) -> Self {
        Probe { identifier, sequence: 1, payload: TRACEROUTE_PAYLOAD }
    }

    /// Probe number `sequence` of a latency sample.
    pub fn ping(identifier: u16, sequence: u16) -> Self {
        Probe { identifier, sequence, payload: PING_PAYLOAD }
    }

    /// Wire form: ICMP header plus payload, checksum filled in.
    pub fn build_packet(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; ECHO_HEADER_LEN + self.payload.len()];
        {
            let mut echo = MutableEchoRequestPacket::new(&mut buf[..])
                .ok_or(Error::InvalidPacket("echo request buffer too small"))?;
            echo.set_icmp_type(IcmpTypes::EchoRequest);
            echo.set_icmp_code(IcmpCode::new(0));
            echo.set_identifier(self.identifier);
            echo.set_sequence_number(self.sequence);
            echo.set_payload(self.payload);
        }

        let mut icmp_header = MutableIcmpPacket::new(&mut buf[..])
            .ok_or(Error::InvalidPacket("icmp buffer too small"))?;
        let checksum = pnet::packet::icmp::checksum(&icmp_header.to_immutable());
        icmp_header.set_checksum(checksum);

        Ok(buf)
    }
}

/// Identifier shared by every probe of this process: the low 16 bits of the pid.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}
