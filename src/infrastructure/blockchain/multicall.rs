//! # Multicall3 Codec
//!
//! Calldata encoding and return-data decoding for the Multicall3
//! aggregator's `aggregate` and `tryAggregate` entry points.

use crate::domain::error::{GatewayError, GatewayResult};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, H160};
use ethers::utils::id;

/// Canonical Multicall3 deployment address.
pub const MULTICALL3_ADDRESS: Address = H160([
    0xca, 0x11, 0xbd, 0xe0, 0x59, 0x77, 0xb3, 0x63, 0x11, 0x67, 0x02, 0x88, 0x62, 0xbe, 0x2a,
    0x17, 0x39, 0x76, 0xca, 0x11,
]);

const AGGREGATE_SIGNATURE: &str = "aggregate((address,bytes)[])";
const TRY_AGGREGATE_SIGNATURE: &str = "tryAggregate(bool,(address,bytes)[])";

fn calls_token(calls: &[(Address, Vec<u8>)]) -> Token {
    Token::Array(
        calls
            .iter()
            .map(|(target, data)| Token::Tuple(vec![Token::Address(*target), Token::Bytes(data.clone())]))
            .collect(),
    )
}

/// Encodes `aggregate(calls)`.
#[must_use]
pub fn encode_aggregate(calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let mut data = id(AGGREGATE_SIGNATURE).to_vec();
    data.extend(abi::encode(&[calls_token(calls)]));
    data
}

/// Encodes `tryAggregate(require_success, calls)`.
#[must_use]
pub fn encode_try_aggregate(require_success: bool, calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let mut data = id(TRY_AGGREGATE_SIGNATURE).to_vec();
    data.extend(abi::encode(&[Token::Bool(require_success), calls_token(calls)]));
    data
}

/// Decodes `aggregate` return data into per-call return bytes.
///
/// # Errors
///
/// Returns `Decode` if the payload is not `(uint256, bytes[])`.
pub fn decode_aggregate(data: &[u8]) -> GatewayResult<Vec<Vec<u8>>> {
    let tokens = abi::decode(
        &[ParamType::Uint(256), ParamType::Array(Box::new(ParamType::Bytes))],
        data,
    )
    .map_err(|e| GatewayError::decode(format!("aggregate result: {e}")))?;

    match tokens.into_iter().nth(1) {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Token::Bytes(bytes) => Ok(bytes),
                other => Err(GatewayError::decode(format!("unexpected aggregate slot: {other}"))),
            })
            .collect(),
        _ => Err(GatewayError::decode("aggregate result missing return data")),
    }
}

/// Decodes `tryAggregate` return data into `(success, return_data)` pairs.
///
/// # Errors
///
/// Returns `Decode` if the payload is not `(bool, bytes)[]`.
pub fn decode_try_aggregate(data: &[u8]) -> GatewayResult<Vec<(bool, Vec<u8>)>> {
    let tokens = abi::decode(
        &[ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::Bytes,
        ])))],
        data,
    )
    .map_err(|e| GatewayError::decode(format!("tryAggregate result: {e}")))?;

    let Some(Token::Array(items)) = tokens.into_iter().next() else {
        return Err(GatewayError::decode("tryAggregate result missing array"));
    };

    items
        .into_iter()
        .map(|item| match item {
            Token::Tuple(fields) => match fields.as_slice() {
                [Token::Bool(success), Token::Bytes(bytes)] => Ok((*success, bytes.clone())),
                _ => Err(GatewayError::decode("malformed tryAggregate slot")),
            },
            other => Err(GatewayError::decode(format!("unexpected tryAggregate slot: {other}"))),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ethers::types::U256;

    #[test]
    fn multicall3_address_matches_canonical() {
        let parsed: Address = "0xcA11bde05977b3631167028862bE2a173976CA11".parse().unwrap();
        assert_eq!(MULTICALL3_ADDRESS, parsed);
    }

    #[test]
    fn selectors() {
        assert_eq!(encode_aggregate(&[])[..4], [0x25, 0x2d, 0xba, 0x42]);
        assert_eq!(encode_try_aggregate(false, &[])[..4], [0xbc, 0xe3, 0x8b, 0xd7]);
    }

    #[test]
    fn decodes_aggregate_payload() {
        let payload = abi::encode(&[
            Token::Uint(U256::from(19_000_000u64)),
            Token::Array(vec![Token::Bytes(vec![1, 2]), Token::Bytes(vec![])]),
        ]);
        assert_eq!(decode_aggregate(&payload).unwrap(), vec![vec![1, 2], vec![]]);
    }

    #[test]
    fn decodes_try_aggregate_payload() {
        let payload = abi::encode(&[Token::Array(vec![
            Token::Tuple(vec![Token::Bool(true), Token::Bytes(vec![7])]),
            Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
        ])]);
        assert_eq!(
            decode_try_aggregate(&payload).unwrap(),
            vec![(true, vec![7]), (false, vec![])]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_aggregate(&[1, 2, 3]), Err(GatewayError::Decode(_))));
        assert!(matches!(decode_try_aggregate(&[0xff]), Err(GatewayError::Decode(_))));
    }
}
