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

use crate::error::{ErrorKind, Result};
use crate::util::packet_builder::{self, Probe};
use crate::util::{self, ChannelFactory, IcmpChannelFactory, ProbeChannel, ReplyKind};
use crate::{Config, Hop};
use async_std::task;
use log::{debug, error, warn};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Round-trip times collected from one target
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PingSample {
    /// RTT of every answered probe, in sequence order
    pub latencies: Vec<Duration>,
    pub sent: u32,
    pub received: u32,
}

impl PingSample {
    /// Percentage of sent probes left unanswered. 100 if nothing was sent.
    pub fn packet_loss(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        let lost = self.sent.saturating_sub(self.received);
        f64::from(lost) / f64::from(self.sent) * 100.0
    }
}

/// Latency and loss of a single hop
#[derive(Debug, Clone, PartialEq)]
pub struct HopMeasurement {
    pub hop: Hop,
    /// Round-Trip Times of answered probes
    pub latencies: Vec<Duration>,
    /// Lost probes in percent, within [0, 100]
    pub packet_loss: f64,
    /// Why the hop could not be sampled at all
    pub failure: Option<ErrorKind>,
}

impl HopMeasurement {
    fn new(hop: Hop, sample: PingSample) -> Self {
        let packet_loss = sample.packet_loss();
        HopMeasurement { hop, latencies: sample.latencies, packet_loss, failure: None }
    }

    fn lost(hop: Hop, failure: Option<ErrorKind>) -> Self {
        HopMeasurement { hop, latencies: Vec::new(), packet_loss: 100.0, failure }
    }
}

/// Latency sampler sending a fixed number of Echo probes per target
#[derive(Clone)]
pub struct Ping<F = IcmpChannelFactory> {
    config: Config,
    factory: F,
    identifier: u16,
}

impl Ping {
    /// Creates new sampler probing over raw ICMP sockets
    pub fn new(config: Config) -> Self {
        Ping::with_factory(config, IcmpChannelFactory::default())
    }
}

impl<F: ChannelFactory> Ping<F> {
    pub fn with_factory(config: Config, factory: F) -> Self {
        Ping { config, factory, identifier: packet_builder::process_identifier() }
    }

    /// Overrides the identifier carried by the probes
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Sends `number_of_pings` probes to `target` over one channel, one at a time.
    ///
    /// Only a failure to open the channel is returned; lost, unsent and unanswered probes
    /// are counted in the sample.
    pub fn measure(&self, target: Ipv4Addr) -> Result<PingSample> {
        let mut channel = self.factory.open()?;
        let count = self.config.number_of_pings;
        let mut sample = PingSample::default();

        for seq in 0..count {
            sample.sent += 1;
            if let Some(rtt) = self.probe(&mut channel, target, seq) {
                sample.received += 1;
                sample.latencies.push(rtt);
            }
            if seq + 1 < count && !self.config.delay.is_zero() {
                std::thread::sleep(self.config.delay);
            }
        }

        debug!("{}: {}/{} replies", target, sample.received, sample.sent);
        Ok(sample)
    }

    /// Sends one probe and returns its RTT if a matching Echo Reply arrives in time
    fn probe(&self, channel: &mut F::Channel, target: Ipv4Addr, seq: u16) -> Option<Duration> {
        let probe = Probe::ping(self.identifier, seq);
        let start = Instant::now();

        if let Err(e) = channel.send_probe(target, &probe) {
            warn!("{} seq {}: {}", target, seq, e);
            return None;
        }

        let strict = self.config.strict_matching;
        let reply = util::await_reply(channel, self.config.ping_timeout, |reply| {
            !strict || reply.kind == ReplyKind::EchoReply && reply.source == target && reply.answers(&probe)
        });

        match reply {
            Ok(Some(reply)) if reply.kind == ReplyKind::EchoReply => Some(start.elapsed()),
            Ok(Some(reply)) => {
                debug!("{} seq {}: got {:?} instead of echo reply", target, seq, reply.kind);
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("{} seq {}: {}", target, seq, e);
                None
            }
        }
    }

    /// Samples one hop. Failures are folded into a 100% loss measurement.
    pub fn measure_hop(&self, hop: &Hop) -> HopMeasurement {
        let addr = match hop.addr {
            Some(addr) => addr,
            None => return HopMeasurement::lost(hop.clone(), None),
        };
        match self.measure(addr) {
            Ok(sample) => HopMeasurement::new(hop.clone(), sample),
            Err(e) => {
                error!("sampling of hop {} aborted: {}", hop.ttl, e);
                HopMeasurement::lost(hop.clone(), Some(e.kind()))
            }
        }
    }

    /// Samples hops one after another, in order
    pub fn measure_hops(&self, hops: &[Hop]) -> Vec<HopMeasurement> {
        hops.iter().map(|hop| self.measure_hop(hop)).collect()
    }
}

impl<F> Ping<F>
where
    F: ChannelFactory + Clone + Send + Sync + 'static,
{
    /// Samples every hop in its own blocking task. Results keep the order of `hops`.
    ///
    /// Every raw socket sees every incoming Echo Reply, so concurrent samplers always match
    /// replies strictly, whatever the configuration says.
    pub fn measure_hops_parallel(&self, hops: &[Hop]) -> Vec<HopMeasurement> {
        if !self.config.strict_matching {
            warn!("permissive matching is not supported with parallel sampling, matching strictly");
        }
        let handles: Vec<_> = hops
            .iter()
            .cloned()
            .map(|hop| {
                let mut ping = self.clone();
                ping.config = ping.config.with_strict_matching(true);
                task::spawn_blocking(move || ping.measure_hop(&hop))
            })
            .collect();

        task::block_on(async {
            let mut measurements = Vec::with_capacity(handles.len());
            for handle in handles {
                measurements.push(handle.await);
            }
            measurements
        })
    }
}
