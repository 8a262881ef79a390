//! Block, header, and transaction types.

use primitive_types::U256;

use crate::encoding::{encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::{sha256, sha256d};
use crate::{Address, Hash256};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    pub parent_hash: Hash256,
    /// Root of the account-state trie after this block.
    pub state_root: Hash256,
    pub tx_root: Hash256,
    pub time: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash256 {
        sha256d(&encode(self))
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u64_le(self.height);
        encoder.write_hash(&self.parent_hash);
        encoder.write_hash(&self.state_root);
        encoder.write_hash(&self.tx_root);
        encoder.write_u64_le(self.time);
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            height: decoder.read_u64_le()?,
            parent_hash: decoder.read_hash()?,
            state_root: decoder.read_hash()?,
            tx_root: decoder.read_hash()?,
            time: decoder.read_u64_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> Hash256 {
        sha256d(&encode(self))
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u64_le(self.nonce);
        encoder.write_address(&self.from);
        match &self.to {
            Some(to) => {
                encoder.write_u8(1);
                encoder.write_address(to);
            }
            None => encoder.write_u8(0),
        }
        let value: [u8; 32] = self.value.to_big_endian();
        encoder.write_bytes(&value);
        encoder.write_var_bytes(&self.payload);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let nonce = decoder.read_u64_le()?;
        let from = decoder.read_address()?;
        let to = match decoder.read_u8()? {
            0 => None,
            1 => Some(decoder.read_address()?),
            _ => return Err(DecodeError::InvalidData("invalid recipient tag")),
        };
        let value = U256::from_big_endian(&decoder.read_fixed::<32>()?);
        let payload = decoder.read_var_bytes()?;
        Ok(Self {
            nonce,
            from,
            to,
            value,
            payload,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Size of the consensus encoding in bytes.
    pub fn encoded_size(&self) -> usize {
        encode(self).len()
    }

    /// Digest committing to the transaction list, stored in the header.
    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash256 {
        let mut encoder = Encoder::new();
        for tx in transactions {
            encoder.write_hash(&tx.hash());
        }
        sha256(&encoder.into_inner())
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.header.consensus_encode(encoder);
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.consensus_encode(encoder);
        }
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::consensus_decode(decoder)?;
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut transactions = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            transactions.push(Transaction::consensus_decode(decoder)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode;

    fn sample_block() -> Block {
        let transactions = vec![
            Transaction {
                nonce: 0,
                from: [0xaa; 20],
                to: Some([0xbb; 20]),
                value: U256::from(42u64),
                payload: Vec::new(),
            },
            Transaction {
                nonce: 1,
                from: [0xaa; 20],
                to: None,
                value: U256::zero(),
                payload: b"create".to_vec(),
            },
        ];
        Block {
            header: BlockHeader {
                height: 9,
                parent_hash: [0x01; 32],
                state_root: [0x02; 32],
                tx_root: Block::compute_tx_root(&transactions),
                time: 1_700_000_000,
            },
            transactions,
        }
    }

    #[test]
    fn block_roundtrip() {
        let block = sample_block();
        let bytes = encode(&block);
        assert_eq!(bytes.len(), block.encoded_size());
        let decoded = decode::<Block>(&bytes).expect("decode");
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn header_hash_covers_state_root() {
        let block = sample_block();
        let mut other = block.clone();
        other.header.state_root = [0x03; 32];
        assert_ne!(block.hash(), other.hash());
    }

    #[test]
    fn invalid_recipient_tag_is_rejected() {
        let block = sample_block();
        let mut bytes = encode(&block);
        // Corrupt the first transaction's recipient tag (header is 8+32*3+8 bytes,
        // then varint count, then nonce + from).
        let tag_offset = 112 + 1 + 8 + 20;
        bytes[tag_offset] = 9;
        assert!(decode::<Block>(&bytes).is_err());
    }
}
