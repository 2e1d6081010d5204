//! Key generation (component 4, §4.3): the per-tree-level loop that derives
//! seed, control-bit, and (at hierarchy boundaries) value correction words.
//!
//! This is the standard GGM-tree DPF construction (Gilboa-Ishai /
//! Boyle-Gilboa-Ishai), generalized so a single tree can serve several
//! hierarchy levels and so the final value correction at each boundary
//! packs several slots instead of exactly one. The two root seeds are the
//! only randomness this algorithm consumes.
use log::debug;
use rand::{CryptoRng, RngCore};

use crate::block::Block;
use crate::codec;
use crate::error::DpfError;
use crate::key::{CorrectionWord, DpfKey};
use crate::params::TreeMapping;
use crate::prg::{Prg, Prgs};

/// Computes hierarchy `i`'s value correction word from the two seeds at its
/// boundary (the root seeds, for a root-only hierarchy; the next tree-level
/// seeds otherwise), per §4.3 step 5.
#[allow(clippy::too_many_arguments)]
fn value_correction_for(
    mapping: &TreeMapping,
    i: usize,
    alpha: u128,
    betas: &[u128],
    prgs: &Prgs,
    seed_a: &Block,
    seed_b: &Block,
    cb_b: bool,
) -> Result<Block, DpfError> {
    let l_max = mapping.max_log_domain_size();
    let bitsize = mapping.element_bitsize(i);
    let pack_bits = mapping.pack_bits(i);
    let slot = if pack_bits == 0 {
        0
    } else {
        let prefix = alpha >> (l_max - mapping.log_domain_size(i));
        (prefix & ((1u128 << pack_bits) - 1)) as usize
    };

    let val_a = prgs.value.expand(seed_a)?;
    let val_b = prgs.value.expand(seed_b)?;
    let slots = codec::slots_per_block(bitsize)?;
    let mut values = Vec::with_capacity(slots);
    for slot_idx in 0..slots {
        let target = if slot_idx == slot { betas[i] } else { 0 };
        let a_v = codec::unpack_slot(&val_a, slot_idx, bitsize)?;
        let b_v = codec::unpack_slot(&val_b, slot_idx, bitsize)?;
        let diff = codec::add_mod(codec::sub_mod(target, a_v, bitsize), b_v, bitsize);
        values.push(if cb_b {
            codec::negate_mod(diff, bitsize)
        } else {
            diff
        });
    }
    codec::pack(&values, bitsize)
}

fn validate_point(mapping: &TreeMapping, alpha: u128, betas: &[u128]) -> Result<(), DpfError> {
    if betas.len() != mapping.hierarchy_levels() {
        return Err(DpfError::InvalidArgument(format!(
            "expected {} beta values, got {}",
            mapping.hierarchy_levels(),
            betas.len()
        )));
    }
    let l_max = mapping.max_log_domain_size();
    if l_max < 128 && alpha >= (1u128 << l_max) {
        return Err(DpfError::InvalidArgument(format!(
            "alpha {} is out of range for a domain of size 2^{}",
            alpha, l_max
        )));
    }
    for (i, beta) in betas.iter().enumerate() {
        let bitsize = mapping.element_bitsize(i);
        if bitsize < 128 && *beta >= (1u128 << bitsize) {
            return Err(DpfError::InvalidArgument(format!(
                "hierarchy {}: beta {} does not fit in {} bits",
                i, beta, bitsize
            )));
        }
    }
    Ok(())
}

/// Generates a pair of incremental DPF keys for point `alpha` carrying value
/// `betas[i]` at each hierarchy level `i`'s prefix of `alpha`.
pub fn generate_keys_incremental<R: RngCore + CryptoRng>(
    mapping: &TreeMapping,
    alpha: u128,
    betas: &[u128],
    prgs: &Prgs,
    rng: &mut R,
) -> Result<(DpfKey, DpfKey), DpfError> {
    validate_point(mapping, alpha, betas)?;
    debug!(
        "generating incremental DPF keys: {} hierarchy levels, {} tree levels",
        mapping.hierarchy_levels(),
        mapping.tree_levels_needed()
    );

    let root_seed_a = Block::random(rng);
    let root_seed_b = Block::random(rng);
    let mut state_a = (root_seed_a, false);
    let mut state_b = (root_seed_b, true);

    // Hierarchy 0 may be root-only (§8 "single-point domain" and any other
    // case the tree mapping resolves with zero real levels): its value
    // correction comes straight from the root seeds, with no correction
    // word to hold it.
    let root_value_correction = if mapping.is_root_only(0) {
        Some(value_correction_for(
            mapping, 0, alpha, betas, prgs, &root_seed_a, &root_seed_b, true,
        )?)
    } else {
        None
    };

    let mut correction_words = Vec::with_capacity(mapping.tree_levels_needed());
    let mut last_value_correction: Option<Block> = root_value_correction;

    for t in 0..mapping.tree_levels_needed() {
        let bit_pos = mapping.branch_bit_position(t);
        let branch_bit = ((alpha >> bit_pos) & 1) == 1;

        let (seed_a_cur, cb_a_cur) = state_a;
        let (seed_b_cur, cb_b_cur) = state_b;

        let l_a = prgs.left.expand(&seed_a_cur)?;
        let r_a = prgs.right.expand(&seed_a_cur)?;
        let l_b = prgs.left.expand(&seed_b_cur)?;
        let r_b = prgs.right.expand(&seed_b_cur)?;

        let (keep_a_pre, lose_a_pre) = if branch_bit { (r_a, l_a) } else { (l_a, r_a) };
        let (keep_b_pre, lose_b_pre) = if branch_bit { (r_b, l_b) } else { (l_b, r_b) };

        let cw_seed = lose_a_pre ^ lose_b_pre;
        let cw_bit_left = l_a.control_bit() ^ l_b.control_bit() ^ !branch_bit;
        let cw_bit_right = r_a.control_bit() ^ r_b.control_bit() ^ branch_bit;
        let cw_bit_keep = if branch_bit { cw_bit_right } else { cw_bit_left };

        let next_seed_a = keep_a_pre ^ if cb_a_cur { cw_seed } else { Block::ZERO };
        let next_seed_b = keep_b_pre ^ if cb_b_cur { cw_seed } else { Block::ZERO };
        let next_cb_a = keep_a_pre.control_bit() ^ (cb_a_cur && cw_bit_keep);
        let next_cb_b = keep_b_pre.control_bit() ^ (cb_b_cur && cw_bit_keep);

        let value_correction = match mapping.tree_to_hierarchy(t) {
            Some(i) => {
                let cw_val = value_correction_for(
                    mapping,
                    i,
                    alpha,
                    betas,
                    prgs,
                    &next_seed_a,
                    &next_seed_b,
                    next_cb_b,
                )?;
                last_value_correction = Some(cw_val);
                Some(cw_val)
            }
            None => None,
        };

        correction_words.push(CorrectionWord {
            seed: cw_seed,
            control_bit_left: cw_bit_left,
            control_bit_right: cw_bit_right,
            value_correction,
        });

        state_a = (next_seed_a, next_cb_a);
        state_b = (next_seed_b, next_cb_b);
    }

    let last_level_value_correction = last_value_correction.ok_or_else(|| {
        DpfError::Internal("no hierarchy boundary produced a value correction".into())
    })?;

    let key_a = DpfKey {
        party_bit: false,
        root_seed: root_seed_a,
        root_control_bit: false,
        correction_words: correction_words.clone(),
        last_level_value_correction,
        root_value_correction,
    };
    let key_b = DpfKey {
        party_bit: true,
        root_seed: root_seed_b,
        root_control_bit: true,
        correction_words,
        last_level_value_correction,
        root_value_correction,
    };
    Ok((key_a, key_b))
}

/// Convenience wrapper for a single, non-incremental hierarchy level.
pub fn generate_keys<R: RngCore + CryptoRng>(
    mapping: &TreeMapping,
    alpha: u128,
    beta: u128,
    prgs: &Prgs,
    rng: &mut R,
) -> Result<(DpfKey, DpfKey), DpfError> {
    if mapping.hierarchy_levels() != 1 {
        return Err(DpfError::InvalidArgument(
            "generate_keys is only for a single-hierarchy-level parameter list; use \
             generate_keys_incremental otherwise"
                .into(),
        ));
    }
    generate_keys_incremental(mapping, alpha, &[beta], prgs, rng)
}
