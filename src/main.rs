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

extern crate libnetanalyzer;

use clap::Parser;
use libnetanalyzer::stats::HopStatistics;
use libnetanalyzer::{Config, HopMeasurement, NetworkAnalyzer};
use log::LevelFilter;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::process::ExitCode;
use std::time::Duration;

const TABLE_WIDTH: usize = 69;

/// Trace the routers to a host, then measure latency and packet loss of every hop.
/// Requires elevated privileges to open raw ICMP sockets.
#[derive(Parser, Debug)]
#[command(name = "netanalyzer", version)]
struct Args {
    /// Hostname or IPv4 address to analyze
    host: String,
    /// Number of echo probes sent to every hop
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    count: u16,
    /// Delay between two probes, in microseconds
    delay: Option<u64>,
    /// Maximum number of hops
    #[arg(long, default_value_t = 30)]
    max_hops: u8,
    /// First TTL to probe
    #[arg(long, default_value_t = 1)]
    first_ttl: u8,
    /// Timeout per discovery probe, in milliseconds
    #[arg(long, default_value_t = 5000)]
    trace_timeout: u64,
    /// Timeout per sampling probe, in milliseconds
    #[arg(long, default_value_t = 1000)]
    ping_timeout: u64,
    /// Sample all hops concurrently
    #[arg(long)]
    parallel: bool,
    /// Accept any ICMP reply instead of only replies matching the probe
    #[arg(long)]
    loose: bool,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> Config {
        let config = Config::default()
            .with_max_hops(self.max_hops)
            .with_first_ttl(self.first_ttl)
            .with_trace_timeout(self.trace_timeout)
            .with_ping_timeout(self.ping_timeout)
            .with_number_of_pings(self.count)
            .with_strict_matching(!self.loose)
            .with_parallel_sampling(self.parallel);
        match self.delay {
            Some(delay) => config.with_delay(delay),
            None => config,
        }
    }

    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(args.log_level())
        .format_target(false)
        .parse_default_env()
        .init();

    let destination = match resolve(&args.host) {
        Some(addr) => addr,
        None => {
            eprintln!("Error resolving host: {}", args.host);
            return ExitCode::FAILURE;
        }
    };

    let config = args.config();
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let banner = format!(" ----- Tracing routers to {} ({}) ----- ", args.host, destination);
    let padding = TABLE_WIDTH.saturating_sub(banner.chars().count()) / 2;
    println!("{}{}", " ".repeat(padding), banner);

    let analyzer = NetworkAnalyzer::new(destination, config);
    let mut hops = Vec::new();
    for hop in analyzer.traceroute() {
        match hop {
            Ok(hop) => {
                println!("{}", hop);
                hops.push(hop);
            }
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    display_results(&analyzer.measure(&hops));
    ExitCode::SUCCESS
}

/// First IPv4 address of the host, via the system resolver
fn resolve(host: &str) -> Option<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    (host, 0)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
}

fn display_results(measurements: &[HopMeasurement]) {
    println!(
        "{:<5} | {:<15} | {:<8} | {:<8} | {:<10}",
        "Hop", "IP Address", "Avg (µs)", "σ (µs)", "Loss (%)"
    );
    println!("{}", "-".repeat(TABLE_WIDTH));

    for measurement in measurements {
        let addr = measurement
            .hop
            .addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| String::from("*"));
        let stats = HopStatistics::from(measurement);
        println!(
            "{:<5} | {:<15} | {:<8} | {:<8} | {:<10.2}",
            measurement.hop.ttl,
            addr,
            as_micros(stats.mean),
            as_micros(stats.std_dev),
            stats.packet_loss
        );
    }
}

fn as_micros(value: Option<Duration>) -> String {
    value
        .map(|d| d.as_micros().to_string())
        .unwrap_or_else(|| String::from("N/A"))
}
