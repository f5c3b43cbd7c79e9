//! Property checks for the trust score and the packed signal field,
//! exhaustively over every combination of the seven assigned flags.

use std::collections::BTreeSet;

use alloy_primitives::B256;
use sentry_core::domain::{active_flags, pack_flags};
use sentry_core::{
    calculate_score, decode_attestation_data, decode_signals, encode_attestation_data,
    pack_signals, AgentSignals, AttestationPayload, SignalFlag, MAX_SCORE,
};

fn signals_from_mask(mask: u8) -> AgentSignals {
    let on = |flag: SignalFlag| mask & (1 << flag.bit()) != 0;
    AgentSignals {
        has_valid_registration: on(SignalFlag::ValidRegistration),
        is_active: on(SignalFlag::IsActive),
        has_a2a: on(SignalFlag::HasA2A),
        has_mcp: on(SignalFlag::HasMcp),
        has_ens: on(SignalFlag::HasEns),
        has_x402: on(SignalFlag::HasX402),
        web_endpoint_reachable: on(SignalFlag::WebReachable),
        ..Default::default()
    }
}

#[test]
fn every_combination_round_trips_through_the_packed_field() {
    for mask in 0u8..128 {
        let signals = signals_from_mask(mask);
        let packed = pack_signals(&signals);
        let decoded = decode_signals(&packed).unwrap();
        assert_eq!(decoded, active_flags(&signals), "mask {mask:#09b}");
        // bit positions equal the mask itself
        assert_eq!(packed, B256::with_last_byte(mask), "mask {mask:#09b}");
    }
}

#[test]
fn score_never_decreases_when_a_signal_is_added() {
    for mask in 0u8..128 {
        let base = calculate_score(&signals_from_mask(mask));
        assert!(base <= MAX_SCORE);
        for flag in SignalFlag::ALL {
            let bigger = calculate_score(&signals_from_mask(mask | (1 << flag.bit())));
            assert!(bigger >= base, "adding {flag} to {mask:#09b} lowered the score");
        }
    }
}

#[test]
fn service_count_adds_fifteen_once() {
    let none = AgentSignals::default();
    let one = AgentSignals {
        service_count: 1,
        ..Default::default()
    };
    let many = AgentSignals {
        service_count: 40,
        ..Default::default()
    };
    assert_eq!(calculate_score(&none), 0);
    assert_eq!(calculate_score(&one), 15);
    assert_eq!(calculate_score(&many), 15);
}

#[test]
fn all_signals_cap_at_one_hundred() {
    let mut signals = signals_from_mask(0x7f);
    signals.service_count = 5;
    assert_eq!(calculate_score(&signals), MAX_SCORE);
}

#[test]
fn reserved_and_unassigned_bits_are_rejected() {
    let reserved = B256::with_last_byte(1 << 7);
    let err = decode_signals(&reserved).unwrap_err();
    assert_eq!(err.unknown_bits, vec![7]);

    let mut high = [0u8; 32];
    high[0] = 0x80;
    let err = decode_signals(&B256::from(high)).unwrap_err();
    assert_eq!(err.unknown_bits, vec![255]);
}

#[test]
fn attestation_payload_preserves_the_signal_field() {
    let flags: BTreeSet<SignalFlag> = [SignalFlag::ValidRegistration, SignalFlag::HasEns]
        .into_iter()
        .collect();
    let payload = AttestationPayload {
        agent_id: alloy_primitives::U256::from(99u64),
        registry: sentry_core::config::REGISTRY_ADDRESS,
        verified_at: 1_740_000_000,
        score: 30,
        signals: pack_flags(&flags),
    };
    let decoded = decode_attestation_data(&encode_attestation_data(&payload)).unwrap();
    assert_eq!(decode_signals(&decoded.signals).unwrap(), flags);
}
