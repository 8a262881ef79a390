use primitive_types::U256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::Hash256;

/// Account-state leaf payload. Besides the conventional storage root the
/// chain tracks four auxiliary per-account ledgers, each with its own
/// trie root: pending TX1/TX3 cross-chain entries, proxied balances, and
/// accrued rewards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Hash256,
    pub tx1_root: Hash256,
    pub tx3_root: Hash256,
    pub proxied_root: Hash256,
    pub reward_root: Hash256,
}

impl AccountRecord {
    /// All five sub-trie roots in traversal order.
    pub fn sub_roots(&self) -> [Hash256; 5] {
        [
            self.storage_root,
            self.tx1_root,
            self.tx3_root,
            self.proxied_root,
            self.reward_root,
        ]
    }
}

impl Encodable for AccountRecord {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u64_le(self.nonce);
        let balance: [u8; 32] = self.balance.to_big_endian();
        encoder.write_bytes(&balance);
        encoder.write_hash(&self.storage_root);
        encoder.write_hash(&self.tx1_root);
        encoder.write_hash(&self.tx3_root);
        encoder.write_hash(&self.proxied_root);
        encoder.write_hash(&self.reward_root);
    }
}

impl Decodable for AccountRecord {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let nonce = decoder.read_u64_le()?;
        let balance = U256::from_big_endian(&decoder.read_fixed::<32>()?);
        Ok(Self {
            nonce,
            balance,
            storage_root: decoder.read_hash()?,
            tx1_root: decoder.read_hash()?,
            tx3_root: decoder.read_hash()?,
            proxied_root: decoder.read_hash()?,
            reward_root: decoder.read_hash()?,
        })
    }
}
