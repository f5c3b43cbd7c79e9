//! Contract ABI for the registry and EAS, and the attestation payload codec.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, sol_data, SolType};

/// Solidity type of the attestation payload tuple.
type AttestationTuple = (
    sol_data::Uint<256>,
    sol_data::Address,
    sol_data::Uint<64>,
    sol_data::Uint<8>,
    sol_data::FixedBytes<32>,
);

use crate::domain::{ChainError, MAX_SCORE};

sol! {
    /// ERC-721 transfer; mints have `from == address(0)`.
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

    function tokenURI(uint256 tokenId) external view returns (string);
    function ownerOf(uint256 tokenId) external view returns (address);

    struct AttestationRequestData {
        address recipient;
        uint64 expirationTime;
        bool revocable;
        bytes32 refUID;
        bytes data;
        uint256 value;
    }

    struct AttestationRequest {
        bytes32 schema;
        AttestationRequestData data;
    }

    struct RevocationRequestData {
        bytes32 uid;
        uint256 value;
    }

    struct RevocationRequest {
        bytes32 schema;
        RevocationRequestData data;
    }

    function attest(AttestationRequest request) external payable returns (bytes32);
    function revoke(RevocationRequest request) external payable;

    event Attested(address indexed recipient, address indexed attester, bytes32 uid, bytes32 indexed schemaUID);
}

/// The five schema fields, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationPayload {
    pub agent_id: U256,
    pub registry: Address,
    pub verified_at: u64,
    pub score: u8,
    pub signals: B256,
}

/// ABI-encode the payload as `(uint256,address,uint64,uint8,bytes32)`.
pub fn encode_attestation_data(payload: &AttestationPayload) -> Bytes {
    AttestationTuple::abi_encode_params(&(
        payload.agent_id,
        payload.registry,
        payload.verified_at,
        payload.score,
        payload.signals,
    ))
    .into()
}

/// Decode attestation data produced by [`encode_attestation_data`].
///
/// This is the one decode path for attestation data; indexer-specific JSON
/// renderings are not consulted.
pub fn decode_attestation_data(data: &[u8]) -> Result<AttestationPayload, ChainError> {
    let (agent_id, registry, verified_at, score, signals) =
        AttestationTuple::abi_decode_params(data)
            .map_err(|e| ChainError::Decode(format!("attestation data: {e}")))?;
    if score > MAX_SCORE {
        return Err(ChainError::Decode(format!(
            "attestation score {score} exceeds {MAX_SCORE}"
        )));
    }
    Ok(AttestationPayload {
        agent_id,
        registry,
        verified_at,
        score,
        signals,
    })
}

/// Calldata for `EAS.attest` with a non-expiring, revocable, recipient-less request.
pub fn attest_calldata(schema: B256, payload: &AttestationPayload) -> Bytes {
    use alloy_sol_types::SolCall;

    attestCall {
        request: AttestationRequest {
            schema,
            data: AttestationRequestData {
                recipient: Address::ZERO,
                expirationTime: 0,
                revocable: true,
                refUID: B256::ZERO,
                data: encode_attestation_data(payload),
                value: U256::ZERO,
            },
        },
    }
    .abi_encode()
    .into()
}

/// Calldata for `EAS.revoke`.
pub fn revoke_calldata(schema: B256, uid: B256) -> Bytes {
    use alloy_sol_types::SolCall;

    revokeCall {
        request: RevocationRequest {
            schema,
            data: RevocationRequestData {
                uid,
                value: U256::ZERO,
            },
        },
    }
    .abi_encode()
    .into()
}
