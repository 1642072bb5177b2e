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

use libnetanalyzer::stats;
use libnetanalyzer::NetworkAnalyzer;
use std::net::Ipv4Addr;

fn main() {
    let destination_ip = Ipv4Addr::new(93, 184, 216, 34); // example.com

    let analyzer = NetworkAnalyzer::new(destination_ip, Default::default());

    let measurements = match analyzer.run() {
        Ok(measurements) => measurements,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    for measurement in measurements {
        let mean = stats::mean(&measurement.latencies);
        print!("{}", measurement.hop);
        match mean {
            Some(mean) => print!(" \t{}µs", mean.as_micros()),
            None => print!(" \tN/A"),
        }
        println!(" \t{:.2}%", measurement.packet_loss);
    }
}
