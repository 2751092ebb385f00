//! ABI decoding of governance event logs and call results.

use crate::rpc_client::RawLog;
use alloy::primitives::{keccak256, Address, B256, U256};
use govsnap_chain::{BalanceEvent, DelegationEvent, SourceError, Support, VoteEvent};

pub const DELEGATE_VOTES_CHANGED: &str = "DelegateVotesChanged(address,uint256,uint256)";
pub const DELEGATE_CHANGED: &str = "DelegateChanged(address,address,address)";
/// Governor layout with every field in data and a boolean choice.
pub const VOTE_CAST: &str = "VoteCast(address,uint256,bool,uint256)";
/// Governor layout with an indexed voter, a uint8 choice and a reason.
pub const VOTE_CAST_WITH_REASON: &str = "VoteCast(address,uint256,uint8,uint256,string)";

const WORD: usize = 32;

/// Topic hash of an event signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Four-byte selector of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Decode a `DelegateVotesChanged` log.
pub fn decode_balance(log: &RawLog) -> Result<BalanceEvent, SourceError> {
    let malformed = |reason: &str| malformed("DelegateVotesChanged", log, reason);

    let delegate = log
        .topics
        .get(1)
        .map(|topic| Address::from_word(*topic))
        .ok_or_else(|| malformed("missing delegate topic"))?;
    let new_balance = word(&log.data, 1)
        .map(U256::from_be_slice)
        .ok_or_else(|| malformed("missing newBalance"))?;

    Ok(BalanceEvent {
        delegate,
        new_balance,
    })
}

/// Decode a `DelegateChanged` log.
pub fn decode_delegation(log: &RawLog) -> Result<DelegationEvent, SourceError> {
    if log.topics.len() < 4 {
        return Err(malformed("DelegateChanged", log, "expected four topics"));
    }

    Ok(DelegationEvent {
        delegator: Address::from_word(log.topics[1]),
        from_delegate: non_zero(Address::from_word(log.topics[2])),
        to_delegate: non_zero(Address::from_word(log.topics[3])),
    })
}

/// Decode either `VoteCast` layout, chosen by the log's first topic.
pub fn decode_vote(log: &RawLog) -> Result<VoteEvent, SourceError> {
    let malformed = |reason: &str| malformed("VoteCast", log, reason);

    let topic0 = log.topics.first().ok_or_else(|| malformed("missing topics"))?;
    let (voter, fields) = if *topic0 == event_topic(VOTE_CAST) {
        let voter = word(&log.data, 0)
            .map(|w| Address::from_slice(&w[12..]))
            .ok_or_else(|| malformed("missing voter"))?;
        (voter, 1)
    } else if *topic0 == event_topic(VOTE_CAST_WITH_REASON) {
        let voter = log
            .topics
            .get(1)
            .map(|topic| Address::from_word(*topic))
            .ok_or_else(|| malformed("missing voter topic"))?;
        (voter, 0)
    } else {
        return Err(malformed("unknown event signature"));
    };

    let proposal_id = word(&log.data, fields)
        .map(U256::from_be_slice)
        .ok_or_else(|| malformed("missing proposalId"))?;
    let support = word(&log.data, fields + 1)
        .map(U256::from_be_slice)
        .and_then(|raw| u8::try_from(raw).ok())
        .and_then(Support::from_raw)
        .ok_or_else(|| malformed("invalid support"))?;
    let votes = word(&log.data, fields + 2)
        .map(U256::from_be_slice)
        .ok_or_else(|| malformed("missing votes"))?;

    Ok(VoteEvent {
        voter,
        proposal_id,
        support,
        votes,
    })
}

/// Encode a call taking a single `bytes32` argument.
pub fn encode_bytes32_call(signature: &str, arg: B256) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(arg.as_slice());
    data
}

/// Decode an `address` return value.
pub fn decode_address(data: &[u8]) -> Option<Address> {
    word(data, 0).map(|w| Address::from_slice(&w[12..]))
}

/// Decode a dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Option<String> {
    let offset = word(data, 0).and_then(to_usize)?;
    let len_word = data.get(offset..offset.checked_add(WORD)?)?;
    let len = to_usize(len_word)?;
    let start = offset + WORD;
    let bytes = data.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn word(data: &[u8], index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(WORD)?;
    data.get(start..start.checked_add(WORD)?)
}

fn to_usize(word: &[u8]) -> Option<usize> {
    usize::try_from(U256::from_be_slice(word)).ok()
}

fn non_zero(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}

fn malformed(kind: &'static str, log: &RawLog, reason: &str) -> SourceError {
    SourceError::MalformedLog {
        kind,
        block: log.block_number,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_of(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    fn address_word(address: Address) -> B256 {
        address.into_word()
    }

    fn log(topics: Vec<B256>, words: &[[u8; 32]]) -> RawLog {
        RawLog {
            block_number: 100,
            log_index: 0,
            topics,
            data: words.concat(),
        }
    }

    #[test]
    fn test_known_topics() {
        // keccak256("Transfer(address,address,uint256)")
        assert_eq!(
            format!("0x{:x}", event_topic("Transfer(address,address,uint256)")),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
        assert_eq!(selector("addr(bytes32)"), [0x3b, 0x3b, 0x57, 0xde]);
    }

    #[test]
    fn test_decode_balance() {
        let delegate = Address::from([7; 20]);
        let log = log(
            vec![event_topic(DELEGATE_VOTES_CHANGED), address_word(delegate)],
            &[word_of(5), word_of(900)],
        );

        let event = decode_balance(&log).unwrap();
        assert_eq!(event.delegate, delegate);
        assert_eq!(event.new_balance, U256::from(900u64));
    }

    #[test]
    fn test_decode_balance_short_data() {
        let log = log(
            vec![event_topic(DELEGATE_VOTES_CHANGED), address_word(Address::ZERO)],
            &[word_of(5)],
        );
        assert!(matches!(
            decode_balance(&log),
            Err(SourceError::MalformedLog { block: 100, .. })
        ));
    }

    #[test]
    fn test_decode_delegation_maps_zero_to_none() {
        let delegator = Address::from([1; 20]);
        let to = Address::from([2; 20]);
        let log = log(
            vec![
                event_topic(DELEGATE_CHANGED),
                address_word(delegator),
                address_word(Address::ZERO),
                address_word(to),
            ],
            &[],
        );

        let event = decode_delegation(&log).unwrap();
        assert_eq!(event.delegator, delegator);
        assert_eq!(event.from_delegate, None);
        assert_eq!(event.to_delegate, Some(to));
    }

    #[test]
    fn test_decode_boolean_vote() {
        let voter = Address::from([3; 20]);
        let log = log(
            vec![event_topic(VOTE_CAST)],
            &[address_word(voter).0, word_of(12), word_of(1), word_of(4_000)],
        );

        let event = decode_vote(&log).unwrap();
        assert_eq!(event.voter, voter);
        assert_eq!(event.proposal_id, U256::from(12u64));
        assert_eq!(event.support, Support::For);
        assert_eq!(event.votes, U256::from(4_000u64));
    }

    #[test]
    fn test_decode_vote_with_reason() {
        let voter = Address::from([4; 20]);
        // proposalId, support, votes, reason offset, reason length
        let log = log(
            vec![event_topic(VOTE_CAST_WITH_REASON), address_word(voter)],
            &[word_of(9), word_of(2), word_of(77), word_of(128), word_of(0)],
        );

        let event = decode_vote(&log).unwrap();
        assert_eq!(event.voter, voter);
        assert_eq!(event.proposal_id, U256::from(9u64));
        assert_eq!(event.support, Support::Abstain);
        assert_eq!(event.votes, U256::from(77u64));
    }

    #[test]
    fn test_decode_vote_rejects_unknown_support() {
        let log = log(
            vec![event_topic(VOTE_CAST)],
            &[word_of(0), word_of(1), word_of(5), word_of(1)],
        );
        assert!(decode_vote(&log).is_err());
    }

    #[test]
    fn test_decode_string() {
        let mut data = word_of(32).to_vec();
        data.extend_from_slice(&word_of(9));
        let mut text = b"alice.eth".to_vec();
        text.resize(32, 0);
        data.extend_from_slice(&text);

        assert_eq!(decode_string(&data).as_deref(), Some("alice.eth"));
        assert_eq!(decode_string(&data[..40]), None);
        assert_eq!(decode_string(&[]), None);
    }

    #[test]
    fn test_decode_address() {
        let address = Address::from([9; 20]);
        assert_eq!(decode_address(address_word(address).as_slice()), Some(address));
        assert_eq!(decode_address(&[0; 4]), None);
    }
}
