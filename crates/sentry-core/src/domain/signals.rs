//! Trust score and packed signal field.
//!
//! The packed field is the `bytes32 signals` column of the attestation
//! schema. Bit positions come from [`SignalFlag`]; encoder and decoder share
//! the same table, so a field decodes back to exactly the flags it was
//! packed from. Bit 0 is the least significant bit of the last byte.

use std::collections::BTreeSet;
use std::fmt;

use alloy_primitives::B256;

pub use sentry_state::AgentSignals;

/// Maximum trust score.
pub const MAX_SCORE: u8 = 100;

/// Bit reserved for endpoint ownership verification. Never set.
pub const RESERVED_VERIFIED_ENDPOINT_BIT: u8 = 7;

/// Boolean signals with a fixed bit position in the packed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalFlag {
    ValidRegistration,
    IsActive,
    HasA2A,
    HasMcp,
    HasEns,
    HasX402,
    WebReachable,
}

impl SignalFlag {
    /// Every assigned flag, in bit order.
    pub const ALL: [SignalFlag; 7] = [
        SignalFlag::ValidRegistration,
        SignalFlag::IsActive,
        SignalFlag::HasA2A,
        SignalFlag::HasMcp,
        SignalFlag::HasEns,
        SignalFlag::HasX402,
        SignalFlag::WebReachable,
    ];

    pub const fn bit(self) -> u8 {
        match self {
            SignalFlag::ValidRegistration => 0,
            SignalFlag::IsActive => 1,
            SignalFlag::HasA2A => 2,
            SignalFlag::HasMcp => 3,
            SignalFlag::HasEns => 4,
            SignalFlag::HasX402 => 5,
            SignalFlag::WebReachable => 6,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.bit() == bit)
    }

    pub fn is_set(self, signals: &AgentSignals) -> bool {
        match self {
            SignalFlag::ValidRegistration => signals.has_valid_registration,
            SignalFlag::IsActive => signals.is_active,
            SignalFlag::HasA2A => signals.has_a2a,
            SignalFlag::HasMcp => signals.has_mcp,
            SignalFlag::HasEns => signals.has_ens,
            SignalFlag::HasX402 => signals.has_x402,
            SignalFlag::WebReachable => signals.web_endpoint_reachable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalFlag::ValidRegistration => "VALID_REGISTRATION",
            SignalFlag::IsActive => "IS_ACTIVE",
            SignalFlag::HasA2A => "HAS_A2A",
            SignalFlag::HasMcp => "HAS_MCP",
            SignalFlag::HasEns => "HAS_ENS",
            SignalFlag::HasX402 => "HAS_X402",
            SignalFlag::WebReachable => "WEB_REACHABLE",
        }
    }
}

impl fmt::Display for SignalFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A packed field with bits outside the assigned table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("signal field has unassigned bits set: {unknown_bits:?}")]
pub struct SignalDecodeError {
    pub unknown_bits: Vec<u16>,
}

/// Additive, capped trust score in `0..=100`.
pub fn calculate_score(signals: &AgentSignals) -> u8 {
    let weights: [(bool, u8); 7] = [
        (signals.has_valid_registration, 20),
        (signals.is_active, 20),
        (signals.service_count > 0, 15),
        (signals.has_a2a, 10),
        (signals.has_mcp, 10),
        (signals.has_ens, 10),
        (signals.web_endpoint_reachable, 15),
    ];
    let total: u16 = weights
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, w)| u16::from(*w))
        .sum();
    total.min(u16::from(MAX_SCORE)) as u8
}

/// Flags set in `signals`.
pub fn active_flags(signals: &AgentSignals) -> BTreeSet<SignalFlag> {
    SignalFlag::ALL
        .into_iter()
        .filter(|f| f.is_set(signals))
        .collect()
}

/// Pack the boolean signals into the 256-bit schema field.
pub fn pack_signals(signals: &AgentSignals) -> B256 {
    pack_flags(&active_flags(signals))
}

pub fn pack_flags(flags: &BTreeSet<SignalFlag>) -> B256 {
    let mut bytes = [0u8; 32];
    for flag in flags {
        let bit = flag.bit() as usize;
        bytes[31 - bit / 8] |= 1 << (bit % 8);
    }
    B256::from(bytes)
}

/// Recover the flag set from a packed field.
pub fn decode_signals(field: &B256) -> Result<BTreeSet<SignalFlag>, SignalDecodeError> {
    let mut flags = BTreeSet::new();
    let mut unknown_bits = Vec::new();
    for (index, byte) in field.as_slice().iter().enumerate() {
        for offset in 0..8u16 {
            if byte & (1 << offset) == 0 {
                continue;
            }
            let bit = (31 - index as u16) * 8 + offset;
            match u8::try_from(bit).ok().and_then(SignalFlag::from_bit) {
                Some(flag) => {
                    flags.insert(flag);
                }
                None => unknown_bits.push(bit),
            }
        }
    }
    if unknown_bits.is_empty() {
        Ok(flags)
    } else {
        unknown_bits.sort_unstable();
        Err(SignalDecodeError { unknown_bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals_from_mask(mask: u8) -> AgentSignals {
        AgentSignals {
            has_valid_registration: mask & 1 != 0,
            is_active: mask & 2 != 0,
            has_a2a: mask & 4 != 0,
            has_mcp: mask & 8 != 0,
            has_ens: mask & 16 != 0,
            has_x402: mask & 32 != 0,
            web_endpoint_reachable: mask & 64 != 0,
            has_web: mask & 64 != 0,
            ..Default::default()
        }
    }

    #[test]
    fn empty_signals_score_zero() {
        assert_eq!(calculate_score(&AgentSignals::default()), 0);
    }

    #[test]
    fn everything_on_caps_at_100() {
        let signals = AgentSignals {
            service_count: 4,
            ..signals_from_mask(0x7f)
        };
        // 20 + 20 + 15 + 10 + 10 + 10 + 15 = 100
        assert_eq!(calculate_score(&signals), 100);
    }

    #[test]
    fn x402_carries_no_weight() {
        let mut signals = signals_from_mask(0b0000_0011);
        let before = calculate_score(&signals);
        signals.has_x402 = true;
        assert_eq!(calculate_score(&signals), before);
    }

    #[test]
    fn packed_layout_is_stable() {
        let field = pack_signals(&signals_from_mask(0b0100_0011));
        assert_eq!(
            field.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000043"
        );
    }

    #[test]
    fn every_flag_has_a_distinct_bit_below_the_reserved_one() {
        let bits: BTreeSet<u8> = SignalFlag::ALL.iter().map(|f| f.bit()).collect();
        assert_eq!(bits.len(), SignalFlag::ALL.len());
        assert!(bits.iter().all(|b| *b < RESERVED_VERIFIED_ENDPOINT_BIT));
    }

    #[test]
    fn decode_rejects_reserved_and_high_bits() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1 << RESERVED_VERIFIED_ENDPOINT_BIT;
        bytes[0] = 0x80;
        let err = decode_signals(&B256::from(bytes)).unwrap_err();
        assert_eq!(err.unknown_bits, vec![7, 255]);
    }

    #[test]
    fn flag_names_match_bit_table() {
        assert_eq!(SignalFlag::from_bit(2), Some(SignalFlag::HasA2A));
        assert_eq!(SignalFlag::HasA2A.to_string(), "HAS_A2A");
        assert_eq!(SignalFlag::from_bit(7), None);
    }
}
