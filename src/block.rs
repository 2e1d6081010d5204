//! 128-bit block algebra.
//!
//! Every seed, control bit, correction word, and packed output value in this
//! crate is ultimately a [`Block`]: sixteen bytes with XOR, bitwise AND, and
//! an interpretation as an unsigned integer modulo `2^k` for the widths the
//! value-correction codec supports.
use std::convert::TryFrom;
use std::fmt;
use std::ops::{BitAnd, BitXor, BitXorAssign};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// An opaque 128-bit value: a GGM tree seed, a correction word, or a packed
/// output value, depending on context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Block(pub [u8; 16]);

impl Block {
    pub const ZERO: Block = Block([0u8; 16]);

    /// Samples a uniformly random block from the given randomness source.
    ///
    /// Key generation must consult its injected randomness exactly twice per
    /// `generate_keys*` call (one seed per party); callers should not call
    /// this more often than the algorithm requires.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Block {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Block(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Least-significant bit, used as a GGM tree control bit.
    pub fn control_bit(&self) -> bool {
        self.0[15] & 1 == 1
    }

    /// Interprets this block as an unsigned integer modulo `2^bitsize`,
    /// reading from the low-order bits.
    ///
    /// `bitsize` must be one of `{1,2,4,8,16,32,64,128}`; widths above 64
    /// round-trip through `u128`.
    pub fn low_bits(&self, bitsize: u32) -> u128 {
        let value = u128::from_le_bytes(self.0);
        if bitsize >= 128 {
            value
        } else {
            value & ((1u128 << bitsize) - 1)
        }
    }

    /// Returns a block whose low `bitsize` bits are `value` (truncated to
    /// that width) and all other bits zero.
    pub fn from_low_bits(value: u128, bitsize: u32) -> Block {
        let masked = if bitsize >= 128 {
            value
        } else {
            value & ((1u128 << bitsize) - 1)
        };
        Block(masked.to_le_bytes())
    }

    /// Writes `value`'s low `bitsize` bits into slot `slot` of a block that
    /// packs `128 / bitsize` such slots, leaving every other slot untouched.
    ///
    /// Used by the value-correction codec (component 6) to build masks with
    /// several small integers packed into one block.
    pub fn with_slot_set(mut self, slot: usize, bitsize: u32, value: u128) -> Block {
        debug_assert!(bitsize >= 1 && bitsize <= 128);
        let slots = (128 / bitsize) as usize;
        debug_assert!(slot < slots);
        let whole = u128::from_le_bytes(self.0);
        let mask = if bitsize >= 128 {
            u128::MAX
        } else {
            (1u128 << bitsize) - 1
        };
        let shift = bitsize as usize * slot;
        let cleared = whole & !(mask << shift);
        let inserted = cleared | ((value & mask) << shift);
        self.0 = inserted.to_le_bytes();
        self
    }

    /// Reads slot `slot` out of a block packing `128 / bitsize` slots.
    pub fn slot(&self, slot: usize, bitsize: u32) -> u128 {
        debug_assert!(bitsize >= 1 && bitsize <= 128);
        let whole = u128::from_le_bytes(self.0);
        let mask = if bitsize >= 128 {
            u128::MAX
        } else {
            (1u128 << bitsize) - 1
        };
        let shift = bitsize as usize * slot;
        (whole >> shift) & mask
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl From<[u8; 16]> for Block {
    fn from(bytes: [u8; 16]) -> Self {
        Block(bytes)
    }
}

impl From<Block> for [u8; 16] {
    fn from(block: Block) -> Self {
        block.0
    }
}

impl TryFrom<&[u8]> for Block {
    type Error = std::array::TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 16]>::try_from(bytes).map(Block)
    }
}

impl BitXor for Block {
    type Output = Block;

    fn bitxor(self, rhs: Block) -> Block {
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = self.0[i] ^ rhs.0[i];
        }
        Block(out)
    }
}

impl BitXorAssign for Block {
    fn bitxor_assign(&mut self, rhs: Block) {
        for i in 0..16 {
            self.0[i] ^= rhs.0[i];
        }
    }
}

impl BitAnd for Block {
    type Output = Block;

    fn bitand(self, rhs: Block) -> Block {
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = self.0[i] & rhs.0[i];
        }
        Block(out)
    }
}

#[cfg(any(test, feature = "testing"))]
use proptest::prelude::*;

#[cfg(any(test, feature = "testing"))]
impl Arbitrary for Block {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        any::<[u8; 16]>().prop_map(Block).boxed()
    }
}
