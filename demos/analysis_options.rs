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

use libnetanalyzer::stats::HopStatistics;
use libnetanalyzer::{Config, Ping, Traceroute};
use std::net::Ipv4Addr;

fn main() {
    let destination_ip = Ipv4Addr::new(93, 184, 216, 34); // example.com

    let config = Config::default()
        .with_max_hops(20)
        .with_first_ttl(2)
        .with_trace_timeout(2000)
        .with_number_of_pings(5)
        .with_ping_timeout(500)
        .with_delay(1000)
        .with_parallel_sampling(true);

    // Discover hops upfront
    let hops = match Traceroute::new(destination_ip, config.clone()).perform_traceroute() {
        Ok(hops) => hops,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    // Sample every hop concurrently, results keep the hop order
    for measurement in Ping::new(config).measure_hops_parallel(&hops) {
        let stats = HopStatistics::from(&measurement);
        println!("{} \t{:?} \t{:?} \t{:.2}%", measurement.hop, stats.mean, stats.std_dev, stats.packet_loss);
    }
}
