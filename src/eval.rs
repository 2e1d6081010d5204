//! Evaluation (component 5, §4.4): walking a key's GGM tree one hierarchy
//! level at a time and extracting packed output slots.
//!
//! [`EvaluationContext`] remembers, for each previously-expanded prefix, the
//! seed and control bit reached at that point in the tree, so a later
//! `evaluate_next` call can resume from exactly where an earlier one left
//! off instead of re-walking the tree from the root.
use std::collections::HashMap;
use std::sync::Arc;

use itertools::iproduct;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::codec;
use crate::error::DpfError;
use crate::key::DpfKey;
use crate::params::TreeMapping;
use crate::prg::{Prg, Prgs};

/// Evaluation state threaded through successive `evaluate_next` calls for a
/// single key. Not meaningfully shared between the two parties' keys.
///
/// Carries the key itself (§3, §6), so a context deserialized on its own is
/// sufficient to resume evaluation without the caller separately keeping
/// track of which key it came from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationContext {
    key: Arc<DpfKey>,
    hierarchy_level: usize,
    /// Global tree-path bits reached so far (as a plain integer, MSB-first)
    /// mapped to the (seed, control bit) at that tree node.
    frontier: HashMap<u128, (Block, bool)>,
}

impl EvaluationContext {
    pub fn hierarchy_level(&self) -> usize {
        self.hierarchy_level
    }

    pub fn key(&self) -> &DpfKey {
        &self.key
    }
}

/// Creates a fresh evaluation context seeded from a key's root.
pub fn create_evaluation_context(key: &DpfKey) -> Result<EvaluationContext, DpfError> {
    let mut frontier = HashMap::new();
    frontier.insert(0u128, (key.root_seed, key.root_control_bit));
    Ok(EvaluationContext {
        key: Arc::new(key.clone()),
        hierarchy_level: 0,
        frontier,
    })
}

/// Expands the next hierarchy level for the given prefixes.
///
/// On the very first call, `prefixes` must be empty: the single implicit
/// root prefix stands in for the whole hierarchy-0 domain. On every
/// subsequent call, each entry of `prefixes` must be a value returned by the
/// previous call (a point in hierarchy `i - 1`'s domain); the result is, for
/// each such prefix, every value in hierarchy `i`'s domain that extends it.
pub fn evaluate_next(
    mapping: &TreeMapping,
    prgs: &Prgs,
    prefixes: &[u128],
    ctx: &mut EvaluationContext,
) -> Result<Vec<Vec<u128>>, DpfError> {
    let key = Arc::clone(&ctx.key);
    if ctx.hierarchy_level >= mapping.hierarchy_levels() {
        return Err(DpfError::FailedPrecondition(
            "every hierarchy level has already been evaluated for this context".into(),
        ));
    }
    let i = ctx.hierarchy_level;
    if i == 0 && !prefixes.is_empty() {
        return Err(DpfError::FailedPrecondition(
            "the first EvaluateNext call must be made with no prefixes".into(),
        ));
    }
    if i > 0 && prefixes.is_empty() {
        return Err(DpfError::InvalidArgument(
            "prefixes must be non-empty once past the first hierarchy level".into(),
        ));
    }

    trace!("evaluate_next: hierarchy level {} ({} prefixes)", i, prefixes.len());

    let effective_prefixes: &[u128] = if i == 0 { &[0u128] } else { prefixes };

    let tree_depth_before = mapping.tree_depth_before(i);
    let tree_depth_after = mapping.tree_depth_after(i);
    let pack_bits = mapping.pack_bits(i);
    let element_bitsize = mapping.element_bitsize(i);

    let value_correction = if mapping.is_root_only(i) {
        key.root_value_correction.ok_or_else(|| {
            DpfError::Internal(format!("hierarchy {} is root-only but has no root value correction", i))
        })?
    } else {
        key.correction_words
            .get(tree_depth_after - 1)
            .and_then(|cw| cw.value_correction)
            .ok_or_else(|| {
                DpfError::Internal(format!("hierarchy {} boundary has no value correction", i))
            })?
    };

    let mut results = Vec::with_capacity(effective_prefixes.len());
    let mut next_frontier = HashMap::new();

    for &prefix in effective_prefixes {
        // Every hierarchy but the last has pack_bits == 0 (params.rs), so a
        // prefix is always exactly a prior hierarchy's tree path: no packed
        // low bits to strip off before the frontier lookup.
        let tree_key = if i == 0 { 0u128 } else { prefix };
        let (seed, control_bit) = *ctx.frontier.get(&tree_key).ok_or_else(|| {
            DpfError::InvalidArgument(format!(
                "prefix {} does not extend a previously evaluated prefix",
                prefix
            ))
        })?;

        let mut leaves = vec![(seed, control_bit, tree_key)];
        for t in tree_depth_before..tree_depth_after {
            let cw = &key.correction_words[t];
            let mut next_leaves = Vec::with_capacity(leaves.len() * 2);
            for (s, cb, path) in leaves {
                let l = prgs.left.expand(&s)?;
                let r = prgs.right.expand(&s)?;
                let seed_l = l ^ if cb { cw.seed } else { Block::ZERO };
                let seed_r = r ^ if cb { cw.seed } else { Block::ZERO };
                let cb_l = l.control_bit() ^ (cb && cw.control_bit_left);
                let cb_r = r.control_bit() ^ (cb && cw.control_bit_right);
                next_leaves.push((seed_l, cb_l, path << 1));
                next_leaves.push((seed_r, cb_r, (path << 1) | 1));
            }
            leaves = next_leaves;
        }

        let mut val_blocks = Vec::with_capacity(leaves.len());
        for (seed, control_bit, path) in &leaves {
            next_frontier.insert(*path, (*seed, *control_bit));
            val_blocks.push((prgs.value.expand(seed)?, *control_bit));
        }

        let slots = 1usize << pack_bits;
        let mut per_prefix_outputs = Vec::with_capacity(leaves.len() * slots);
        for ((val_block, control_bit), slot) in iproduct!(val_blocks.iter(), 0..slots) {
            let raw = codec::unpack_slot(val_block, slot, element_bitsize)?;
            let raw = if *control_bit {
                codec::add_mod(
                    raw,
                    codec::unpack_slot(&value_correction, slot, element_bitsize)?,
                    element_bitsize,
                )
            } else {
                raw
            };
            let output = if key.party_bit {
                codec::negate_mod(raw, element_bitsize)
            } else {
                raw
            };
            per_prefix_outputs.push(output);
        }
        results.push(per_prefix_outputs);
    }

    ctx.frontier = next_frontier;
    ctx.hierarchy_level += 1;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::generate_keys_incremental;
    use crate::params::DpfParameters;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn combine(a: u128, b: u128, bitsize: u32) -> u128 {
        codec::add_mod(a, b, bitsize)
    }

    #[test]
    fn single_level_additive_share_law_holds_at_alpha_and_elsewhere() {
        let mapping = TreeMapping::validate(&[DpfParameters::new(3, 8)]).unwrap();
        let prgs = Prgs::new();
        let mut rng = StdRng::seed_from_u64(7);
        let alpha = 5u128;
        let beta = 123u128;
        let (key_a, key_b) =
            generate_keys_incremental(&mapping, alpha, &[beta], &prgs, &mut rng).unwrap();

        let mut ctx_a = create_evaluation_context(&key_a).unwrap();
        let mut ctx_b = create_evaluation_context(&key_b).unwrap();
        let out_a = evaluate_next(&mapping, &prgs, &[], &mut ctx_a).unwrap();
        let out_b = evaluate_next(&mapping, &prgs, &[], &mut ctx_b).unwrap();

        assert_eq!(out_a.len(), 1);
        assert_eq!(out_a[0].len(), 8);
        for x in 0..8u128 {
            let share_a = out_a[0][x as usize];
            let share_b = out_b[0][x as usize];
            let combined = combine(share_a, share_b, 8);
            let expected = if x == alpha { beta } else { 0 };
            assert_eq!(combined, expected, "mismatch at x={}", x);
        }
    }

    #[test]
    fn incremental_evaluation_is_prefix_consistent() {
        let mapping =
            TreeMapping::validate(&[DpfParameters::new(2, 8), DpfParameters::new(4, 8)]).unwrap();
        let prgs = Prgs::new();
        let mut rng = StdRng::seed_from_u64(99);
        let alpha = 0b1011u128;
        let betas = [7u128, 19u128];
        let (key_a, key_b) =
            generate_keys_incremental(&mapping, alpha, &betas, &prgs, &mut rng).unwrap();

        let mut ctx_a = create_evaluation_context(&key_a).unwrap();
        let mut ctx_b = create_evaluation_context(&key_b).unwrap();
        let level0_a = evaluate_next(&mapping, &prgs, &[], &mut ctx_a).unwrap();
        let level0_b = evaluate_next(&mapping, &prgs, &[], &mut ctx_b).unwrap();
        for x in 0..4u128 {
            let expected = if x == (alpha >> 2) { betas[0] } else { 0 };
            assert_eq!(combine(level0_a[0][x as usize], level0_b[0][x as usize], 8), expected);
        }

        let prefixes: Vec<u128> = (0..4).collect();
        let level1_a = evaluate_next(&mapping, &prgs, &prefixes, &mut ctx_a).unwrap();
        let level1_b = evaluate_next(&mapping, &prgs, &prefixes, &mut ctx_b).unwrap();
        for (p_idx, &prefix) in prefixes.iter().enumerate() {
            for suffix in 0..4u128 {
                let x = (prefix << 2) | suffix;
                let expected = if x == alpha { betas[1] } else { 0 };
                let share_a = level1_a[p_idx][suffix as usize];
                let share_b = level1_b[p_idx][suffix as usize];
                assert_eq!(combine(share_a, share_b, 8), expected, "mismatch at x={}", x);
            }
        }
    }

    #[test]
    fn second_call_with_empty_prefixes_is_rejected() {
        let mapping = TreeMapping::validate(&[DpfParameters::new(2, 8), DpfParameters::new(4, 8)])
            .unwrap();
        let prgs = Prgs::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (key_a, _) =
            generate_keys_incremental(&mapping, 1, &[0, 0], &prgs, &mut rng).unwrap();
        let mut ctx = create_evaluation_context(&key_a).unwrap();
        evaluate_next(&mapping, &prgs, &[], &mut ctx).unwrap();
        assert!(matches!(
            evaluate_next(&mapping, &prgs, &[], &mut ctx),
            Err(DpfError::InvalidArgument(_))
        ));
    }

    #[test]
    fn first_call_with_prefixes_is_rejected() {
        let mapping = TreeMapping::validate(&[DpfParameters::new(2, 8)]).unwrap();
        let prgs = Prgs::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (key_a, _) = generate_keys_incremental(&mapping, 1, &[0], &prgs, &mut rng).unwrap();
        let mut ctx = create_evaluation_context(&key_a).unwrap();
        assert!(matches!(
            evaluate_next(&mapping, &prgs, &[0], &mut ctx),
            Err(DpfError::FailedPrecondition(_))
        ));
    }

    #[test]
    fn evaluating_past_the_last_hierarchy_fails_precondition() {
        let mapping = TreeMapping::validate(&[DpfParameters::new(2, 8)]).unwrap();
        let prgs = Prgs::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (key_a, _) = generate_keys_incremental(&mapping, 1, &[0], &prgs, &mut rng).unwrap();
        let mut ctx = create_evaluation_context(&key_a).unwrap();
        evaluate_next(&mapping, &prgs, &[], &mut ctx).unwrap();
        assert!(matches!(
            evaluate_next(&mapping, &prgs, &[0], &mut ctx),
            Err(DpfError::FailedPrecondition(_))
        ));
    }
}
