use crate::network::Network;
use libnetanalyzer::stats::HopStatistics;
use libnetanalyzer::util::{Reply, ReplyKind};
use libnetanalyzer::{Config, ErrorKind, NetworkAnalyzer, Ping, Traceroute};
use std::net::Ipv4Addr;
use test_case::test_case;

const DEST: [u8; 4] = [93, 184, 216, 34];
const R1: [u8; 4] = [10, 0, 0, 1];
const R2: [u8; 4] = [172, 16, 4, 1];
const R3: [u8; 4] = [100, 64, 9, 254];

fn config() -> Config {
    Config::default().with_number_of_pings(5).with_delay(0)
}

fn destination() -> Ipv4Addr {
    Ipv4Addr::from(DEST)
}

#[test]
fn test_destination_reached_at_first_ttl() {
    let factory = Network::path(&[], DEST).into_factory();
    let hops = Traceroute::with_factory(destination(), config(), factory.clone())
        .perform_traceroute()
        .unwrap();

    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].ttl, 1);
    assert_eq!(hops[0].addr, Some(destination()));
    assert!(hops[0].is_destination());
    assert_eq!(factory.opened(), 1);
}

#[test]
fn test_hops_in_ttl_order_ending_at_destination() {
    let factory = Network::path(&[R1, R2, R3], DEST).into_factory();
    let hops = Traceroute::with_factory(destination(), config(), factory.clone())
        .perform_traceroute()
        .unwrap();

    let addrs: Vec<_> = hops.iter().map(|hop| hop.addr).collect();
    let expected: Vec<_> = [R1, R2, R3, DEST].iter().map(|a| Some(Ipv4Addr::from(*a))).collect();
    assert_eq!(addrs, expected);
    assert_eq!(hops.iter().map(|hop| hop.ttl).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(hops.iter().filter(|hop| hop.is_destination()).count(), 1);
    // one fresh channel per TTL
    assert_eq!(factory.opened(), 4);
}

#[test_case(1; "one hop")]
#[test_case(3; "three hops")]
#[test_case(30; "default bound")]
fn test_discovery_bounded_by_max_hops(max_hops: u8) {
    let network = Network::path(&[R1, R2, R3], DEST).silent(DEST);
    let config = config().with_max_hops(max_hops);
    let hops = Traceroute::with_factory(destination(), config, network.into_factory())
        .perform_traceroute()
        .unwrap();

    assert_eq!(hops.len(), usize::from(max_hops));
    assert!(hops.iter().all(|hop| !hop.is_destination()));
}

#[test]
fn test_first_ttl_skips_leading_hops() {
    let factory = Network::path(&[R1, R2, R3], DEST).into_factory();
    let hops = Traceroute::with_factory(destination(), config().with_first_ttl(3), factory)
        .perform_traceroute()
        .unwrap();

    assert_eq!(hops.len(), 2);
    assert_eq!(hops[0].ttl, 3);
    assert_eq!(hops[0].addr, Some(Ipv4Addr::from(R3)));
}

#[test]
fn test_silent_router_does_not_stop_discovery() {
    let network = Network::path(&[R1, R2, R3], DEST).silent(R2);
    let hops = Traceroute::with_factory(destination(), config(), network.into_factory())
        .perform_traceroute()
        .unwrap();

    assert_eq!(hops.len(), 4);
    assert_eq!(hops[1].addr, None);
    assert_eq!(hops[1].to_string(), " 2: * * *");
    assert!(hops[3].is_destination());
}

#[test]
fn test_discovery_setup_failure_returns_no_hops() {
    let network = Network::path(&[R1, R2], DEST).failing_open(1);
    let mut traceroute = Traceroute::with_factory(destination(), config(), network.into_factory());

    let err = traceroute.perform_traceroute().unwrap_err();
    assert!(err.is_setup());

    let analyzer = NetworkAnalyzer::with_factory(
        destination(),
        config(),
        Network::path(&[R1], DEST).failing_open(0).into_factory(),
    );
    assert!(analyzer.run().is_err());
}

#[test]
fn test_two_of_five_dropped() {
    let network = Network::path(&[], DEST).dropping(DEST, &[1, 3]);
    let sample = Ping::with_factory(config(), network.into_factory())
        .measure(destination())
        .unwrap();

    assert_eq!(sample.sent, 5);
    assert_eq!(sample.latencies.len(), 3);
    assert!((sample.packet_loss() - 40.0).abs() < 1e-9);
}

#[test]
fn test_never_replying_target() {
    let network = Network::path(&[], DEST).silent(DEST);
    let sample = Ping::with_factory(config(), network.into_factory())
        .measure(destination())
        .unwrap();

    assert!(sample.latencies.is_empty());
    assert_eq!(sample.packet_loss(), 100.0);
}

#[test]
fn test_sampling_is_repeatable() {
    let ping = Ping::with_factory(config().with_number_of_pings(8), Network::path(&[], DEST).into_factory());

    let first = ping.measure(destination()).unwrap();
    let second = ping.measure(destination()).unwrap();

    assert_eq!(first.latencies.len(), 8);
    assert_eq!(second.latencies.len(), first.latencies.len());
    assert_eq!(first.packet_loss(), 0.0);
    assert_eq!(second.packet_loss(), 0.0);
}

#[test]
fn test_one_measurement_per_hop_in_order() {
    let network = Network::path(&[R1, R2, R3], DEST)
        .silent(R2)
        .dropping(R3, &[0, 1, 2, 3, 4])
        .dropping(DEST, &[4]);
    let analyzer = NetworkAnalyzer::with_factory(destination(), config(), network.into_factory());

    let hops = analyzer.traceroute().perform_traceroute().unwrap();
    let measurements = analyzer.measure(&hops);

    assert_eq!(measurements.len(), hops.len());
    for (measurement, hop) in measurements.iter().zip(&hops) {
        assert_eq!(&measurement.hop, hop);
        assert!((0.0..=100.0).contains(&measurement.packet_loss));
        if measurement.packet_loss == 0.0 {
            assert_eq!(measurement.latencies.len(), 5);
        }
        if measurement.latencies.is_empty() {
            assert_eq!(measurement.packet_loss, 100.0);
        }
    }
    assert_eq!(measurements[0].packet_loss, 0.0);
    assert_eq!(measurements[1].packet_loss, 100.0);
    assert_eq!(measurements[2].packet_loss, 100.0);
    assert!((measurements[3].packet_loss - 20.0).abs() < 1e-9);

    let stats = HopStatistics::from(&measurements[2]);
    assert_eq!(stats.mean, None);
    assert_eq!(stats.std_dev, None);
}

#[test]
fn test_sampling_failure_only_affects_its_hop() {
    // opens 0..=2 are discovery, 3 is the sampling channel of the first hop
    let network = Network::path(&[R1, R2], DEST).failing_open(3);
    let analyzer = NetworkAnalyzer::with_factory(destination(), config(), network.into_factory());

    let measurements = analyzer.run().unwrap();

    assert_eq!(measurements.len(), 3);
    assert_eq!(measurements[0].packet_loss, 100.0);
    assert_eq!(measurements[0].failure, Some(ErrorKind::ChannelOpen));
    assert_eq!(measurements[1].packet_loss, 0.0);
    assert_eq!(measurements[2].packet_loss, 0.0);
}

#[test]
fn test_parallel_sampling_keeps_hop_order() {
    let network = || {
        Network::path(&[R1, R2, R3], DEST)
            .dropping(R1, &[0])
            .dropping(R2, &[0, 1])
            .dropping(DEST, &[4])
    };
    let sequential = NetworkAnalyzer::with_factory(destination(), config(), network().into_factory())
        .run()
        .unwrap();
    let parallel = NetworkAnalyzer::with_factory(
        destination(),
        config().with_parallel_sampling(true),
        network().into_factory(),
    )
    .run()
    .unwrap();

    assert_eq!(parallel.len(), sequential.len());
    for (p, s) in parallel.iter().zip(&sequential) {
        assert_eq!(p.hop, s.hop);
        assert_eq!(p.packet_loss, s.packet_loss);
        assert_eq!(p.latencies.len(), s.latencies.len());
    }
}

fn unrelated_message() -> Reply {
    Reply {
        source: Ipv4Addr::new(203, 0, 113, 99),
        kind: ReplyKind::TimeExceeded,
        identifier: None,
        sequence: None,
    }
}

#[test]
fn test_unrelated_traffic_ignored_when_strict() {
    let network = Network::path(&[R1, R2], DEST).with_noise(unrelated_message());
    let analyzer = NetworkAnalyzer::with_factory(destination(), config(), network.into_factory());

    let measurements = analyzer.run().unwrap();

    let addrs: Vec<_> = measurements.iter().map(|m| m.hop.addr).collect();
    let expected: Vec<_> = [R1, R2, DEST].iter().map(|a| Some(Ipv4Addr::from(*a))).collect();
    assert_eq!(addrs, expected);
    assert!(measurements.iter().all(|m| m.packet_loss == 0.0));
}

#[test]
fn test_unrelated_traffic_recorded_when_permissive() {
    let network = Network::path(&[R1, R2], DEST).with_noise(unrelated_message());
    let config = config().with_strict_matching(false).with_max_hops(4);
    let hops = Traceroute::with_factory(destination(), config, network.into_factory())
        .perform_traceroute()
        .unwrap();

    assert_eq!(hops.len(), 4);
    assert!(hops.iter().all(|hop| hop.addr == Some(Ipv4Addr::new(203, 0, 113, 99))));
}
