//! Kademlia node Id or a lookup target
use primitive_types::U256;
use rand::Rng;
use std::{
    convert::TryInto,
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits, also the number of buckets in a routing table.
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
/// Kademlia node Id or a lookup target
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE](crate::common::ID_SIZE).
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();

        let array: [u8; ID_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidIdSize(bytes.len()))?;

        Ok(Id(array))
    }

    /// Digest arbitrary bytes (usually a storage key) into an Id,
    /// so it can be compared to node ids by XOR distance.
    pub fn digest<T: AsRef<[u8]>>(key: T) -> Id {
        Id(sha1_smol::Sha1::from(key).digest().bytes())
    }

    /// Full XOR distance between this Id and another.
    pub fn xor(&self, other: &Id) -> Distance {
        let mut result = [0_u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Distance(result)
    }

    /// Simplified XOR distance between this Id and a target Id.
    ///
    /// The distance is the number of trailing non zero bits in the XOR result.
    ///
    /// Distance to self is 0
    /// Distance to the furthest Id is 160
    /// Distance to an Id with 5 leading matching bits is 155
    pub fn log_distance(&self, other: &Id) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    /// Returns the lowest and highest Ids (both inclusive) whose [Self::log_distance]
    /// from this Id equals `distance`.
    ///
    /// These Ids share the first `160 - distance` bits with this Id, differ in the next one,
    /// and the remaining bits are free. For `distance == 0` the range is this Id alone.
    pub fn bucket_range(&self, distance: u8) -> (Id, Id) {
        if distance == 0 {
            return (*self, *self);
        }

        let distance = distance.min(MAX_DISTANCE) as usize;
        // Index of the first differing bit, counted from the most significant bit.
        let flipped = ID_SIZE * 8 - distance;

        let mut low = self.0;
        let mut high = self.0;

        for bit in flipped..ID_SIZE * 8 {
            let mask = 0x80_u8 >> (bit % 8);
            let byte = bit / 8;

            if bit == flipped {
                low[byte] ^= mask;
                high[byte] ^= mask;
            } else {
                low[byte] &= !mask;
                high[byte] |= mask;
            }
        }

        (Id(low), Id(high))
    }

    /// Pick an Id at random between `low` and `high`, both inclusive.
    ///
    /// The bounds are swapped if `low > high`.
    pub fn random_in_range(low: &Id, high: &Id) -> Id {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };

        let low = U256::from_big_endian(&low.0);
        let span = U256::from_big_endian(&high.0) - low;

        let random: [u8; 32] = rand::thread_rng().gen();
        // span < 2^160, so the modulo bias over 256 random bits is negligible.
        let value = low + U256::from_big_endian(&random) % (span + U256::one());

        let mut bytes = [0_u8; 32];
        value.to_big_endian(&mut bytes);

        let mut id = [0_u8; ID_SIZE];
        id.copy_from_slice(&bytes[32 - ID_SIZE..]);

        Id(id)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        let bytes = hex::decode(s).map_err(|error| Error::InvalidIdEncoding(error.to_string()))?;

        Id::from_bytes(bytes)
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
/// XOR of two [Id]s, ordered as a 160 bit unsigned integer. Smaller is closer.
pub struct Distance(pub [u8; ID_SIZE]);

impl Distance {
    pub const ZERO: Distance = Distance([0; ID_SIZE]);
}

impl Debug for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}
