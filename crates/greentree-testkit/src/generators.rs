//! Proptest generators for property-based testing.

use proptest::prelude::*;

use greentree_core::{
    AuthProof, ClaimWindow, KdfParams, Passphrase, PendingBlock, Result, Timestamp, Token,
};

const DAY_MS: i64 = 86_400_000;

/// Generate a timestamp between the epoch and the year 2100.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    0i64..=4_102_444_800_000
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a printable passphrase.
pub fn passphrase() -> impl Strategy<Value = String> {
    "[ -~]{0,24}".prop_map(String::from)
}

/// Generate a non-empty window up to a year long.
pub fn window() -> impl Strategy<Value = ClaimWindow> {
    (timestamp(), 1i64..=365 * DAY_MS)
        .prop_filter_map("empty window", |(start, len)| {
            ClaimWindow::new(start, start + len).ok()
        })
}

/// Parameters for building a token and its chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub passphrase: String,
    pub created_at: Timestamp,
    /// Payloads appended after the root, one block each.
    pub payloads: Vec<Vec<u8>>,
    /// Gap between consecutive blocks.
    pub step_ms: i64,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            passphrase(),
            timestamp(),
            prop::collection::vec(payload(256), 0..6),
            0i64..=DAY_MS,
        )
            .prop_map(|(passphrase, created_at, payloads, step_ms)| ChainParams {
                passphrase,
                created_at,
                payloads,
                step_ms,
            })
            .boxed()
    }
}

/// Build a token from parameters, using minimum-cost KDF parameters.
pub fn chain_from_params(params: &ChainParams) -> Result<(Token, AuthProof)> {
    let (mut token, proof) = Token::create_authenticated(
        &Passphrase::from(params.passphrase.as_str()),
        &KdfParams::fast(),
        params.created_at,
    )?;

    let mut now = params.created_at;
    for payload in &params.payloads {
        now += params.step_ms;
        let pending = match token.head() {
            Some(head) => PendingBlock::chained(&token, &proof, payload, head, now)?,
            None => PendingBlock::root(&token, &proof, payload, now)?,
        };
        token.append(pending.commit())?;
    }
    Ok((token, proof))
}
