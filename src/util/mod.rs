/*
   Copyright 2020 Ilya Grishkov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

extern crate pnet;

pub mod packet_builder;

use crate::error::{Error, Result};
use log::{debug, trace};
use packet_builder::Probe;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::EchoRequestPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpType, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::TransportChannelType::Layer4;
use pnet::transport::TransportProtocol::Ipv4;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportReceiver, TransportSender};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

/// ICMP header length shared by all message types handled here
const ICMP_HEADER_LEN: usize = 8;

/// Shortest wait handed to a receive call
const MIN_WAIT: Duration = Duration::from_micros(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Class of a received ICMP message
pub enum ReplyKind {
    /// The probed address answered the Echo Request
    EchoReply,
    /// A router on the path dropped the probe because its TTL expired
    TimeExceeded,
    /// The probe could not be delivered
    DestinationUnreachable,
    /// Any other ICMP type
    Other(u8),
}

impl From<IcmpType> for ReplyKind {
    fn from(icmp_type: IcmpType) -> Self {
        match icmp_type {
            IcmpTypes::EchoReply => ReplyKind::EchoReply,
            IcmpTypes::TimeExceeded => ReplyKind::TimeExceeded,
            IcmpTypes::DestinationUnreachable => ReplyKind::DestinationUnreachable,
            other => ReplyKind::Other(other.0),
        }
    }
}

/// An ICMP message received on a probe channel.
///
/// `identifier` and `sequence` are read from the Echo Reply header, or from the
/// Echo Request quoted inside Time Exceeded and Destination Unreachable messages.
/// They are `None` when the message carries no recognisable echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Address the message came from
    pub source: Ipv4Addr,
    pub kind: ReplyKind,
    pub identifier: Option<u16>,
    pub sequence: Option<u16>,
}

impl Reply {
    /// True when the identifier and sequence echoed in this message are those of `probe`.
    pub fn answers(&self, probe: &Probe) -> bool {
        self.identifier == Some(probe.identifier) && self.sequence == Some(probe.sequence)
    }
}

/// A send/receive channel for ICMP Echo probes.
///
/// Every probing unit opens its own channel and drops it when done.
#[cfg_attr(test, mockall::automock)]
pub trait ProbeChannel {
    /// Constrains the TTL of subsequently sent probes
    fn set_ttl(&mut self, ttl: u8) -> Result<()>;
    /// Sends a probe to the destination
    fn send_probe(&mut self, destination: Ipv4Addr, probe: &Probe) -> Result<()>;
    /// Waits up to `timeout` for the next ICMP message. `Ok(None)` on timeout.
    fn recv_reply(&mut self, timeout: Duration) -> Result<Option<Reply>>;
}

/// Opens a fresh probe channel for each probing unit.
pub trait ChannelFactory {
    type Channel: ProbeChannel;

    fn open(&self) -> Result<Self::Channel>;
}

/// Raw ICMPv4 channel backed by a pnet layer 4 transport channel
pub struct IcmpChannel {
    tx: TransportSender,
    rx: TransportReceiver,
}

impl IcmpChannel {
    /// Opens a raw ICMPv4 socket. Requires elevated privileges.
    pub fn new(buffer_size: usize) -> Result<Self> {
        let protocol = Layer4(Ipv4(IpNextHeaderProtocols::Icmp));
        let (tx, rx) = transport_channel(buffer_size, protocol).map_err(Error::ChannelOpen)?;
        Ok(IcmpChannel { tx, rx })
    }
}

impl ProbeChannel for IcmpChannel {
    fn set_ttl(&mut self, ttl: u8) -> Result<()> {
        self.tx.set_ttl(ttl).map_err(|e| Error::SetTtl(e, ttl))
    }

    fn send_probe(&mut self, destination: Ipv4Addr, probe: &Probe) -> Result<()> {
        let buf = probe.build_packet()?;
        let packet = IcmpPacket::new(&buf).ok_or(Error::InvalidPacket("malformed echo request"))?;
        self.tx
            .send_to(packet, IpAddr::V4(destination))
            .map_err(|e| Error::SendFailed(e, destination))?;
        trace!("sent {:?} to {}", probe, destination);
        Ok(())
    }

    fn recv_reply(&mut self, timeout: Duration) -> Result<Option<Reply>> {
        let deadline = Instant::now() + timeout;
        let mut iter = icmp_packet_iter(&mut self.rx);
        loop {
            let remaining = match remaining_wait(deadline) {
                Some(remaining) => remaining,
                None => return Ok(None),
            };
            match iter.next_with_timeout(remaining).map_err(Error::RecvFailed)? {
                None => return Ok(None),
                Some((packet, IpAddr::V4(source))) => {
                    if let Some(reply) = parse_reply(source, packet.packet()) {
                        return Ok(Some(reply));
                    }
                    debug!("discarding unparsable ICMP message from {}", source);
                }
                Some((_, IpAddr::V6(_))) => {}
            }
        }
    }
}

/// Opens [`IcmpChannel`]s
#[derive(Debug, Clone, Copy)]
pub struct IcmpChannelFactory {
    buffer_size: usize,
}

impl Default for IcmpChannelFactory {
    fn default() -> Self {
        IcmpChannelFactory { buffer_size: 4096 }
    }
}

impl ChannelFactory for IcmpChannelFactory {
    type Channel = IcmpChannel;

    fn open(&self) -> Result<IcmpChannel> {
        IcmpChannel::new(self.buffer_size)
    }
}

/// Reads messages from the channel until one is accepted or `timeout` elapses.
///
/// Rejected messages are logged and dropped; they do not extend the deadline.
pub(crate) fn await_reply<C, F>(channel: &mut C, timeout: Duration, mut accept: F) -> Result<Option<Reply>>
where
    C: ProbeChannel + ?Sized,
    F: FnMut(&Reply) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = match remaining_wait(deadline) {
            Some(remaining) => remaining,
            None => return Ok(None),
        };
        match channel.recv_reply(remaining)? {
            None => return Ok(None),
            Some(reply) if accept(&reply) => return Ok(Some(reply)),
            Some(reply) => debug!("ignoring unrelated {:?}", reply),
        }
    }
}

/// Time left until `deadline`, `None` once less than [`MIN_WAIT`] remains.
///
/// Socket receive timeouts have microsecond resolution and a zero timeout blocks forever.
fn remaining_wait(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining < MIN_WAIT {
        None
    } else {
        Some(remaining)
    }
}

/// Parses an ICMP message (without IP header). Returns `None` if it is too short
/// to carry an ICMP header.
pub fn parse_reply(source: Ipv4Addr, packet: &[u8]) -> Option<Reply> {
    let icmp_packet = IcmpPacket::new(packet)?;
    if packet.len() < ICMP_HEADER_LEN {
        return None;
    }
    let kind = ReplyKind::from(icmp_packet.get_icmp_type());

    let echo = match kind {
        ReplyKind::EchoReply => EchoReplyPacket::new(packet)
            .map(|echo| (echo.get_identifier(), echo.get_sequence_number())),
        ReplyKind::TimeExceeded | ReplyKind::DestinationUnreachable => {
            quoted_echo_request(&packet[ICMP_HEADER_LEN..])
        }
        ReplyKind::Other(_) => None,
    };

    Some(Reply {
        source,
        kind,
        identifier: echo.map(|(id, _)| id),
        sequence: echo.map(|(_, seq)| seq),
    })
}

/// Extracts identifier and sequence of the Echo Request quoted in an ICMP error.
/// The quote is the original IPv4 header followed by at least 8 bytes of its payload.
fn quoted_echo_request(quote: &[u8]) -> Option<(u16, u16)> {
    let header = Ipv4Packet::new(quote)?;
    if header.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let header_len = usize::from(header.get_header_length()) * 4;
    let original = quote.get(header_len..)?;
    if original.len() < ICMP_HEADER_LEN {
        return None;
    }
    let request = EchoRequestPacket::new(original)?;
    if request.get_icmp_type() != IcmpTypes::EchoRequest {
        return None;
    }
    Some((request.get_identifier(), request.get_sequence_number()))
}
