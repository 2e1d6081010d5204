//! The pseudorandom generator abstraction (component 2).
//!
//! Grounded on the teacher's `AESPRG` (`constructions/aes_prg.rs`): a fixed
//! cipher expands a seed into pseudorandom output. There, the seed keyed an
//! AES-CTR stream over a zero plaintext of the desired output length; here
//! the output is always exactly one block, so we use a fixed-key
//! Davies-Meyer construction instead (`AES_K(seed) XOR seed`) — the
//! standard way to get a cheap, parallelizable PRG out of a block cipher
//! when only 128 bits of output are needed per call, and the reason
//! `prg_left`/`prg_right`/`prg_value` can share one underlying cipher
//! instantiated under three different fixed keys.
use derivative::Derivative;
use openssl::symm::{encrypt, Cipher};

use crate::block::Block;
use crate::error::DpfError;

/// Three fixed, distinct 128-bit keys. Changing any of them changes every
/// output of this crate and breaks interoperability with keys generated
/// under the old constants (§6).
const PRG_LEFT_KEY: [u8; 16] = *b"dpf-prg-left-key";
const PRG_RIGHT_KEY: [u8; 16] = *b"dpf-prg-right-ky";
const PRG_VALUE_KEY: [u8; 16] = *b"dpf-prg-value-ky";

/// A pseudorandom generator over 128-bit blocks.
pub trait Prg {
    /// Expands a seed block into a pseudorandom output block.
    fn expand(&self, seed: &Block) -> Result<Block, DpfError>;

    /// Expands a span of seeds. The default implementation is sequential;
    /// implementations may parallelize internally, but per §5 the
    /// externally observable order must match sequential `expand`.
    fn expand_batch(&self, seeds: &[Block]) -> Result<Vec<Block>, DpfError> {
        seeds.iter().map(|s| self.expand(s)).collect()
    }
}

/// Fixed-key AES-128 PRG: `G(seed) = AES_K(seed) XOR seed`.
#[derive(Derivative, Clone, Copy)]
#[derivative(Debug)]
pub struct AesPrg {
    #[derivative(Debug = "ignore")]
    key: [u8; 16],
}

impl AesPrg {
    fn new(key: [u8; 16]) -> Self {
        AesPrg { key }
    }

    pub fn left() -> Self {
        AesPrg::new(PRG_LEFT_KEY)
    }

    pub fn right() -> Self {
        AesPrg::new(PRG_RIGHT_KEY)
    }

    pub fn value() -> Self {
        AesPrg::new(PRG_VALUE_KEY)
    }
}

impl Prg for AesPrg {
    fn expand(&self, seed: &Block) -> Result<Block, DpfError> {
        // ECB on a single 16-byte block is just one AES invocation; no
        // chaining mode subtleties apply since we never encrypt more than
        // one block under a given key/IV.
        let ciphertext = encrypt(Cipher::aes_128_ecb(), &self.key, None, seed.as_bytes())
            .map_err(|e| DpfError::Internal(format!("AES PRG backend failure: {}", e)))?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&ciphertext[..16]);
        Ok(Block(out) ^ *seed)
    }
}

/// The three PRG instances a [`crate::DistributedPointFunction`] uses: two
/// to drive GGM tree expansion, one to mask output values.
#[derive(Clone, Copy, Debug)]
pub struct Prgs {
    pub left: AesPrg,
    pub right: AesPrg,
    pub value: AesPrg,
}

impl Prgs {
    pub fn new() -> Self {
        Prgs {
            left: AesPrg::left(),
            right: AesPrg::right(),
            value: AesPrg::value(),
        }
    }
}

impl Default for Prgs {
    fn default() -> Self {
        Prgs::new()
    }
}
