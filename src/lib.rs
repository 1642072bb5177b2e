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

//! # libnetanalyzer
//! `libnetanalyzer` characterises the network path to an IPv4 destination: it discovers the
//! routers on the way with TTL-limited ICMP Echo probes, then measures latency and packet
//! loss of every hop with repeated ICMP Echo probes.
//!
//! ## Features
//! The library allows to configure the following parameters:
//! - Maximum number of hops and first TTL
//! - Timeout per discovery probe and per sampling probe
//! - Number of sampling probes per hop and delay between them (in _µs_)
//! - Strict or permissive matching of replies to probes
//! - Sequential or parallel per-hop sampling
//!
//! Probes are sent over a raw ICMP socket through [pnet](https://github.com/libpnet/libpnet),
//! which requires elevated privileges.
//!
//! ## Example
//!
//! ### Discovery followed by sampling:
//!
//! ```rust,no_run
//! use libnetanalyzer::{Config, NetworkAnalyzer};
//! use std::net::Ipv4Addr;
//!
//! let destination_ip = Ipv4Addr::new(93, 184, 216, 34);
//!
//! let analyzer = NetworkAnalyzer::new(destination_ip, Config::default().with_number_of_pings(5));
//!
//! for measurement in analyzer.run().expect("raw sockets need root") {
//!     println!("{} \t{:.2}%", measurement.hop, measurement.packet_loss);
//! }
//! ```
//!
//! ### Streaming hop discovery:
//!
//! ```rust,no_run
//! use libnetanalyzer::{Config, Traceroute};
//! use std::net::Ipv4Addr;
//!
//! let destination_ip = Ipv4Addr::new(93, 184, 216, 34);
//!
//! for hop in Traceroute::new(destination_ip, Config::default().with_max_hops(20)) {
//!     match hop {
//!         Ok(hop) => println!("{}", hop),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

extern crate pnet;

mod error;
mod ping;
/// Mean and standard deviation over latency samples
pub mod stats;
/// Probe channels and ICMP packet handling
pub mod util;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::ping::{HopMeasurement, Ping, PingSample};

use crate::util::packet_builder::{self, Probe};
use crate::util::{ChannelFactory, IcmpChannelFactory, ProbeChannel, ReplyKind};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Analysis configurations
#[derive(Debug, Clone)]
pub struct Config {
    max_hops: u8,
    first_ttl: u8,
    trace_timeout: Duration,
    number_of_pings: u16,
    ping_timeout: Duration,
    delay: Duration,
    strict_matching: bool,
    parallel_sampling: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_hops: 30,
            first_ttl: 1,
            trace_timeout: Duration::from_secs(5),
            number_of_pings: 10,
            ping_timeout: Duration::from_secs(1),
            delay: Duration::from_micros(500),
            strict_matching: true,
            parallel_sampling: false,
        }
    }
}

impl Config {
    /// Builder: Maximum number of hops
    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Builder: First TTL to probe
    pub fn with_first_ttl(mut self, first_ttl: u8) -> Self {
        self.first_ttl = first_ttl;
        self
    }

    /// Builder: Timeout per discovery probe (in _ms_)
    pub fn with_trace_timeout(mut self, timeout: u64) -> Self {
        self.trace_timeout = Duration::from_millis(timeout);
        self
    }

    /// Builder: Number of sampling probes sent to every hop
    pub fn with_number_of_pings(mut self, number_of_pings: u16) -> Self {
        self.number_of_pings = number_of_pings;
        self
    }

    /// Builder: Timeout per sampling probe (in _ms_)
    pub fn with_ping_timeout(mut self, timeout: u64) -> Self {
        self.ping_timeout = Duration::from_millis(timeout);
        self
    }

    /// Builder: Delay between two sampling probes (in _µs_)
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = Duration::from_micros(delay);
        self
    }

    /// Builder: Accept only replies echoing this process' identifier and the probe's sequence
    pub fn with_strict_matching(mut self, strict: bool) -> Self {
        self.strict_matching = strict;
        self
    }

    /// Builder: Sample all hops concurrently instead of one after another
    pub fn with_parallel_sampling(mut self, parallel: bool) -> Self {
        self.parallel_sampling = parallel;
        self
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    pub fn first_ttl(&self) -> u8 {
        self.first_ttl
    }

    pub fn number_of_pings(&self) -> u16 {
        self.number_of_pings
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Rejects configurations no probing run can satisfy
    pub fn validate(&self) -> Result<()> {
        if self.first_ttl == 0 {
            return Err(Error::BadConfig(String::from("first TTL must be at least 1")));
        }
        if self.first_ttl > self.max_hops {
            return Err(Error::BadConfig(format!(
                "first TTL {} exceeds maximum number of hops {}",
                self.first_ttl, self.max_hops
            )));
        }
        if self.number_of_pings == 0 {
            return Err(Error::BadConfig(String::from("number of pings must be positive")));
        }
        Ok(())
    }
}

/// A single position on the path, discovered with probes limited to `ttl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Time-To-Live of the probe which revealed this hop
    pub ttl: u8,
    /// Address of the responder, `None` if nothing answered within the timeout
    pub addr: Option<Ipv4Addr>,
    /// Class of the reply
    pub kind: Option<ReplyKind>,
}

impl Hop {
    fn unresponsive(ttl: u8) -> Self {
        Hop { ttl, addr: None, kind: None }
    }

    /// Whether this hop is the destination itself
    pub fn is_destination(&self) -> bool {
        self.kind == Some(ReplyKind::EchoReply)
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{:2}: {}", self.ttl, addr),
            None => write!(f, "{:2}: * * *", self.ttl),
        }
    }
}

/// Hop discovery towards a destination address
pub struct Traceroute<F = IcmpChannelFactory> {
    addr: Ipv4Addr,
    config: Config,
    factory: F,
    identifier: u16,
    ttl: u16,
    started: bool,
    done: bool,
}

impl Traceroute {
    /// Creates new instance of Traceroute probing over raw ICMP sockets
    pub fn new(addr: Ipv4Addr, config: Config) -> Self {
        Traceroute::with_factory(addr, config, IcmpChannelFactory::default())
    }
}

impl<F: ChannelFactory> Iterator for Traceroute<F> {
    type Item = Result<Hop>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.config.validate() {
                self.done = true;
                return Some(Err(e));
            }
        }
        if self.ttl > u16::from(self.config.max_hops) {
            return None;
        }

        let hop = self.calculate_next_hop();
        match &hop {
            Ok(hop) => self.done = hop.is_destination(),
            Err(e) => {
                error!("hop discovery aborted at TTL {}: {}", self.ttl, e);
                self.done = true;
            }
        }
        self.ttl += 1;
        Some(hop)
    }
}

impl<F: ChannelFactory> Traceroute<F> {
    /// Creates new instance of Traceroute opening its channels from `factory`
    pub fn with_factory(addr: Ipv4Addr, config: Config, factory: F) -> Self {
        let ttl = u16::from(config.first_ttl);
        Traceroute {
            addr,
            config,
            factory,
            identifier: packet_builder::process_identifier(),
            ttl,
            started: false,
            done: false,
        }
    }

    /// Overrides the identifier carried by the probes
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Returns a vector of traceroute hops, or the setup error which aborted discovery
    pub fn perform_traceroute(&mut self) -> Result<Vec<Hop>> {
        let mut hops = Vec::<Hop>::new();
        while let Some(hop) = self.next() {
            hops.push(hop?);
        }
        Ok(hops)
    }

    /// Probes the current TTL once over a fresh channel. Doesn't increase TTL
    fn calculate_next_hop(&mut self) -> Result<Hop> {
        let ttl = self.ttl as u8;
        let mut channel = self.factory.open()?;
        channel.set_ttl(ttl)?;

        let probe = Probe::traceroute(self.identifier);
        if let Err(e) = channel.send_probe(self.addr, &probe) {
            warn!("TTL {}: {}", ttl, e);
            return Ok(Hop::unresponsive(ttl));
        }

        let (strict, destination) = (self.config.strict_matching, self.addr);
        let reply = util::await_reply(&mut channel, self.config.trace_timeout, |reply| {
            if !strict {
                return true;
            }
            let plausible_source = reply.kind != ReplyKind::EchoReply || reply.source == destination;
            plausible_source && reply.answers(&probe)
        });

        let hop = match reply {
            Ok(Some(reply)) => Hop { ttl, addr: Some(reply.source), kind: Some(reply.kind) },
            Ok(None) => Hop::unresponsive(ttl),
            Err(e) => {
                warn!("TTL {}: {}", ttl, e);
                Hop::unresponsive(ttl)
            }
        };
        debug!("discovered {:?}", hop);
        Ok(hop)
    }
}

/// Hop discovery followed by latency sampling of every discovered hop
pub struct NetworkAnalyzer<F = IcmpChannelFactory> {
    addr: Ipv4Addr,
    config: Config,
    factory: F,
}

impl NetworkAnalyzer {
    /// Creates new analyzer probing over raw ICMP sockets
    pub fn new(addr: Ipv4Addr, config: Config) -> Self {
        NetworkAnalyzer::with_factory(addr, config, IcmpChannelFactory::default())
    }
}

impl<F> NetworkAnalyzer<F>
where
    F: ChannelFactory + Clone + Send + Sync + 'static,
{
    pub fn with_factory(addr: Ipv4Addr, config: Config, factory: F) -> Self {
        NetworkAnalyzer { addr, config, factory }
    }

    /// Hop discovery bound to this analyzer's configuration
    pub fn traceroute(&self) -> Traceroute<F> {
        Traceroute::with_factory(self.addr, self.config.clone(), self.factory.clone())
    }

    /// Latency sampler bound to this analyzer's configuration
    pub fn ping(&self) -> Ping<F> {
        Ping::with_factory(self.config.clone(), self.factory.clone())
    }

    /// Discovers the path, then measures each hop. One measurement per hop, in TTL order.
    pub fn run(&self) -> Result<Vec<HopMeasurement>> {
        let hops = self.traceroute().perform_traceroute()?;
        Ok(self.measure(&hops))
    }

    /// Measures already discovered hops
    pub fn measure(&self, hops: &[Hop]) -> Vec<HopMeasurement> {
        info!("sampling {} hops towards {}", hops.len(), self.addr);
        let ping = self.ping();
        if self.config.parallel_sampling {
            ping.measure_hops_parallel(hops)
        } else {
            ping.measure_hops(hops)
        }
    }
}
