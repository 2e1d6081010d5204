//! Wire types for DPF keys (§3, §6): what `generate_keys*` produces and
//! `create_evaluation_context` consumes.
use serde::{Deserialize, Serialize};

use crate::block::Block;

/// The correction information attached to one real GGM-tree level.
///
/// `value_correction` is `Some` only at a hierarchy boundary (a tree level
/// that `TreeMapping::tree_to_hierarchy` maps to a hierarchy index); every
/// other level only corrects seeds and control bits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionWord {
    pub seed: Block,
    pub control_bit_left: bool,
    pub control_bit_right: bool,
    pub value_correction: Option<Block>,
}

/// One party's half of a DPF key pair.
///
/// `party_bit` is `false` for party A, `true` for party B; it flips the sign
/// of every value this party reconstructs, which is what makes the two
/// parties' outputs sum (rather than agree) to `f_{α,β}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DpfKey {
    pub party_bit: bool,
    pub root_seed: Block,
    pub root_control_bit: bool,
    pub correction_words: Vec<CorrectionWord>,
    /// Convenience copy of the deepest hierarchy boundary's value
    /// correction: `correction_words.last().value_correction` when the key
    /// has any real tree levels, or `root_value_correction` when hierarchy 0
    /// is root-only (§8 "single-point domain" boundary case) and the key has
    /// no tree levels at all. Always `Some` by construction.
    pub last_level_value_correction: Block,
    /// Hierarchy 0's value correction when it is resolved directly from the
    /// root seeds with no GGM-tree levels at all (`TreeMapping::is_root_only`),
    /// `None` otherwise. Only hierarchy 0 can ever be root-only.
    pub root_value_correction: Option<Block>,
}

impl DpfKey {
    pub fn tree_levels(&self) -> usize {
        self.correction_words.len()
    }
}
