//! Encode/decode round trips over all four decoder variants:
//! sorted/unsorted delivery crossed with legacy/current RCU trailers.

use tpcaltro_core::{Digit, RawBlockDescriptor};
use tpcaltro_raw::{
    AltroEncoder, DecoderConfig, DigitDecoder, PadPlaneMapping, RcuFormat, CDH_BYTES,
};

const N_TIME_BINS: u16 = 446;

/// A small but representative pad-signal set on partition 1: multiple pads,
/// multiple bunches per pad, single-sample bunches included.
fn test_signals() -> Vec<(u16, u16, Vec<(u16, u16)>)> {
    vec![
        // (row, pad, [(time, adc)...]) with ascending times per pad
        (30, 0, vec![(4, 13), (5, 1023), (6, 7)]),
        (30, 5, vec![(100, 1), (101, 2), (200, 3)]),
        (31, 2, vec![(0, 55)]),
        (62, 27, vec![(440, 12), (441, 12), (442, 12), (445, 9)]),
    ]
}

fn encode(signals: &[(u16, u16, Vec<(u16, u16)>)], format: RcuFormat) -> Vec<u8> {
    let mapping = PadPlaneMapping::global();
    let mut buf = vec![0u8; 8192];
    let mut encoder = AltroEncoder::new(&mut buf);
    encoder.write_cdh(&[0u8; CDH_BYTES]).unwrap();
    for (row, pad, samples) in signals {
        let hw = mapping.hw_address(1, *row, *pad).unwrap();
        encoder.add_channel(hw, samples).unwrap();
    }
    let len = encoder.finish(format, N_TIME_BINS).unwrap();
    buf.truncate(len);
    buf
}

fn expected_digits(signals: &[(u16, u16, Vec<(u16, u16)>)]) -> Vec<Digit> {
    let mut digits: Vec<Digit> = signals
        .iter()
        .flat_map(|(row, pad, samples)| {
            samples
                .iter()
                .map(move |&(time, adc)| Digit::new(*row, *pad, time, adc))
        })
        .collect();
    digits.sort_by_key(|d| (d.row, d.pad, d.time));
    digits
}

fn roundtrip(old_rcu_format: bool, unsorted: bool) {
    let signals = test_signals();
    let format = RcuFormat::from_old_flag(old_rcu_format);
    let block = encode(&signals, format);
    let descriptor = RawBlockDescriptor::new(30, 62, 1, 9).unwrap();

    let config = DecoderConfig::default()
        .with_old_rcu_format(old_rcu_format)
        .with_unsorted(unsorted)
        .with_n_time_bins(N_TIME_BINS);
    let mut driver = DigitDecoder::new(config);
    let decoded = driver.decode_block(&block, descriptor).unwrap();

    let mut digits = decoded.digits;
    if unsorted {
        // Raw delivery order depends on the backward channel walk; compare
        // as sets by normalizing.
        digits.sort_by_key(|d| (d.row, d.pad, d.time));
    }
    assert_eq!(digits, expected_digits(&signals));
    assert_eq!(decoded.stats.channels, 4);
    assert_eq!(decoded.stats.samples, 11);
    assert_eq!(decoded.stats.malformed_channels, 0);
    assert_eq!(decoded.stats.unmapped_channels, 0);
}

#[test]
fn roundtrip_unsorted_current_trailer() {
    roundtrip(false, true);
}

#[test]
fn roundtrip_unsorted_legacy_trailer() {
    roundtrip(true, true);
}

#[test]
fn roundtrip_sorted_current_trailer() {
    roundtrip(false, false);
}

#[test]
fn roundtrip_sorted_legacy_trailer() {
    roundtrip(true, false);
}

#[test]
fn sorted_and_unsorted_agree_up_to_order() {
    let signals = test_signals();
    let block = encode(&signals, RcuFormat::Current);
    let descriptor = RawBlockDescriptor::new(30, 62, 1, 9).unwrap();

    let mut raw_driver = DigitDecoder::new(
        DecoderConfig::default().with_n_time_bins(N_TIME_BINS),
    );
    let mut sorted_driver = DigitDecoder::new(
        DecoderConfig::default()
            .with_unsorted(false)
            .with_n_time_bins(N_TIME_BINS),
    );
    let mut raw = raw_driver.decode_block(&block, descriptor).unwrap().digits;
    let sorted = sorted_driver.decode_block(&block, descriptor).unwrap().digits;

    raw.sort_by_key(|d| (d.row, d.pad, d.time));
    assert_eq!(raw, sorted);
}

#[test]
fn bunch_decode_order_is_backward_within_a_channel() {
    // One channel, two bunches. The decoder must meet the later bunch first
    // but still deliver each bunch's samples in increasing time order.
    use tpcaltro_raw::AltroBunchDecoder;

    let mapping = PadPlaneMapping::global();
    let hw = mapping.hw_address(0, 3, 7).unwrap();
    let samples = vec![(10, 4), (11, 5), (40, 6), (41, 7)];

    let mut buf = vec![0u8; 1024];
    let mut encoder = AltroEncoder::new(&mut buf);
    encoder.write_cdh(&[0u8; CDH_BYTES]).unwrap();
    encoder.add_channel(hw, &samples).unwrap();
    let len = encoder.finish(RcuFormat::Current, N_TIME_BINS).unwrap();
    buf.truncate(len);

    let descriptor = RawBlockDescriptor::new(0, 29, 0, 0).unwrap();
    let config = DecoderConfig::default().with_n_time_bins(N_TIME_BINS);
    let mut decoder = AltroBunchDecoder::init_block(&buf, descriptor, &config).unwrap();

    let channel = decoder.next_channel().unwrap().expect("one channel");
    assert_eq!(channel.hw_address, hw);
    assert_eq!((channel.coord.row, channel.coord.pad), (3, 7));

    let first = decoder.next_bunch().unwrap().expect("later bunch first");
    assert_eq!(first.start_time, 41);
    assert_eq!(first.samples, vec![6, 7]);
    assert_eq!(first.first_time(), 40);

    let second = decoder.next_bunch().unwrap().expect("earlier bunch second");
    assert_eq!(second.start_time, 11);
    assert_eq!(second.samples, vec![4, 5]);

    assert!(decoder.next_bunch().unwrap().is_none());
    assert!(decoder.next_channel().unwrap().is_none());
}
