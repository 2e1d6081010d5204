//! Incremental distributed point functions over a GGM tree (§1-§6).
//!
//! A distributed point function for `f_{α,β}` splits that function into two
//! keys `k_A, k_B` such that evaluating each key at any `x` and summing the
//! results reconstructs `f_{α,β}(x)`: `β` at `x = α`, `0` everywhere else,
//! without either key on its own revealing `α` or `β`. This crate's
//! incremental variant carries several `(log_domain_size, element_bitsize)`
//! hierarchy levels at once, sharing one GGM tree, so a caller can evaluate
//! a coarse prefix of `α`'s domain before deciding whether to drill into a
//! finer one.
use log::debug;
use rand::{CryptoRng, RngCore};

mod block;
mod codec;
mod error;
mod eval;
mod key;
mod keygen;
mod params;
mod prg;

pub use block::Block;
pub use codec::slots_per_block;
pub use error::DpfError;
pub use eval::EvaluationContext;
pub use key::{CorrectionWord, DpfKey};
pub use params::DpfParameters;
pub use prg::{AesPrg, Prg, Prgs};

use params::TreeMapping;

/// A validated set of hierarchy parameters plus the PRG instances used to
/// generate and evaluate keys under them.
///
/// Construct with [`DistributedPointFunction::new`] (one hierarchy level)
/// or [`DistributedPointFunction::new_incremental`] (several). Parameter
/// validation happens once, here, rather than on every `generate_keys*`
/// call.
#[derive(Clone, Debug)]
pub struct DistributedPointFunction {
    mapping: TreeMapping,
    prgs: Prgs,
}

impl DistributedPointFunction {
    /// Validates a single-hierarchy-level parameter set.
    pub fn new(log_domain_size: u32, element_bitsize: u32) -> Result<Self, DpfError> {
        Self::new_incremental(&[DpfParameters::new(log_domain_size, element_bitsize)])
    }

    /// Validates an incremental (multi-hierarchy-level) parameter set (§4.1).
    pub fn new_incremental(params: &[DpfParameters]) -> Result<Self, DpfError> {
        let mapping = TreeMapping::validate(params)?;
        debug!(
            "validated {} hierarchy levels, {} tree levels needed",
            mapping.hierarchy_levels(),
            mapping.tree_levels_needed()
        );
        Ok(DistributedPointFunction {
            mapping,
            prgs: Prgs::new(),
        })
    }

    pub fn hierarchy_levels(&self) -> usize {
        self.mapping.hierarchy_levels()
    }

    pub fn tree_levels_needed(&self) -> usize {
        self.mapping.tree_levels_needed()
    }

    pub fn params(&self) -> &[DpfParameters] {
        self.mapping.params()
    }

    /// Generates a key pair for the single hierarchy level `(α, β)`;
    /// errors if this instance has more than one hierarchy level.
    pub fn generate_keys<R: RngCore + CryptoRng>(
        &self,
        alpha: u128,
        beta: u128,
        rng: &mut R,
    ) -> Result<(DpfKey, DpfKey), DpfError> {
        keygen::generate_keys(&self.mapping, alpha, beta, &self.prgs, rng)
    }

    /// Generates a key pair for point `α` carrying `betas[i]` at each
    /// hierarchy level `i`'s prefix of `α` (§4.3).
    pub fn generate_keys_incremental<R: RngCore + CryptoRng>(
        &self,
        alpha: u128,
        betas: &[u128],
        rng: &mut R,
    ) -> Result<(DpfKey, DpfKey), DpfError> {
        keygen::generate_keys_incremental(&self.mapping, alpha, betas, &self.prgs, rng)
    }

    /// Creates a fresh evaluation context for `key` (§4.4).
    pub fn create_evaluation_context(&self, key: &DpfKey) -> Result<EvaluationContext, DpfError> {
        eval::create_evaluation_context(key)
    }

    /// Expands the next hierarchy level of `key`'s evaluation for the given
    /// prefixes. See [`EvaluationContext`] and [`eval::evaluate_next`] for
    /// the calling convention.
    pub fn evaluate_next(
        &self,
        prefixes: &[u128],
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<Vec<u128>>, DpfError> {
        eval::evaluate_next(&self.mapping, &self.prgs, prefixes, ctx)
    }

    /// Evaluates a single-hierarchy-level key over its whole domain in one
    /// call, for callers who don't need the incremental API.
    pub fn evaluate(&self, key: &DpfKey) -> Result<Vec<u128>, DpfError> {
        if self.mapping.hierarchy_levels() != 1 {
            return Err(DpfError::InvalidArgument(
                "evaluate is only for a single-hierarchy-level parameter list; use \
                 evaluate_next otherwise"
                    .into(),
            ));
        }
        let mut ctx = self.create_evaluation_context(key)?;
        let mut result = self.evaluate_next(&[], &mut ctx)?;
        Ok(result.pop().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn combine(a: u128, b: u128, bitsize: u32) -> u128 {
        codec::add_mod(a, b, bitsize)
    }

    // §8 scenario: log_domain_size=3, element_bitsize=8, α=5, β=200.
    #[test]
    fn scenario_single_level_additive_share_law() {
        let dpf = DistributedPointFunction::new(3, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let (key_a, key_b) = dpf.generate_keys(5, 200, &mut rng).unwrap();
        let out_a = dpf.evaluate(&key_a).unwrap();
        let out_b = dpf.evaluate(&key_b).unwrap();
        for x in 0..8u128 {
            let expected = if x == 5 { 200 } else { 0 };
            assert_eq!(combine(out_a[x as usize], out_b[x as usize], 8), expected);
        }
    }

    #[test]
    fn scenario_boundary_log_domain_size_one() {
        let dpf = DistributedPointFunction::new(1, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let (key_a, key_b) = dpf.generate_keys(0, 7, &mut rng).unwrap();
        let out_a = dpf.evaluate(&key_a).unwrap();
        let out_b = dpf.evaluate(&key_b).unwrap();
        assert_eq!(out_a.len(), 2);
        assert_eq!(combine(out_a[0], out_b[0], 8), 7);
        assert_eq!(combine(out_a[1], out_b[1], 8), 0);
    }

    // §8 boundary case: a single-point domain resolves entirely from the
    // root seeds, with no tree levels at all.
    #[test]
    fn scenario_boundary_log_domain_size_zero() {
        let dpf = DistributedPointFunction::new(0, 8).unwrap();
        assert_eq!(dpf.tree_levels_needed(), 0);
        let mut rng = StdRng::seed_from_u64(2);
        let (key_a, key_b) = dpf.generate_keys(0, 7, &mut rng).unwrap();
        let out_a = dpf.evaluate(&key_a).unwrap();
        let out_b = dpf.evaluate(&key_b).unwrap();
        assert_eq!(out_a.len(), 1);
        assert_eq!(combine(out_a[0], out_b[0], 8), 7);
    }

    #[test]
    fn scenario_element_bitsize_128_has_one_slot() {
        let dpf = DistributedPointFunction::new(2, 128).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let (key_a, key_b) = dpf
            .generate_keys(2, u128::MAX - 41, &mut rng)
            .unwrap();
        let out_a = dpf.evaluate(&key_a).unwrap();
        let out_b = dpf.evaluate(&key_b).unwrap();
        for x in 0..4u128 {
            let expected = if x == 2 { u128::MAX - 41 } else { 0 };
            assert_eq!(out_a[x as usize].wrapping_add(out_b[x as usize]), expected);
        }
    }

    #[test]
    fn invalid_empty_parameter_list_is_rejected() {
        assert!(matches!(
            DistributedPointFunction::new_incremental(&[]),
            Err(DpfError::InvalidArgument(_))
        ));
    }

    #[test]
    fn invalid_beta_out_of_range_is_rejected() {
        let dpf = DistributedPointFunction::new(3, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        assert!(matches!(
            dpf.generate_keys(1, 999, &mut rng),
            Err(DpfError::InvalidArgument(_))
        ));
    }

    #[test]
    fn single_hierarchy_evaluate_rejects_multi_level_instance() {
        let dpf = DistributedPointFunction::new_incremental(&[
            DpfParameters::new(2, 8),
            DpfParameters::new(4, 8),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let (key_a, _) = dpf.generate_keys_incremental(1, &[0, 0], &mut rng).unwrap();
        assert!(matches!(
            dpf.evaluate(&key_a),
            Err(DpfError::InvalidArgument(_))
        ));
    }

    // §8: serializing any key and evaluation context and deserializing it
    // back must re-evaluate to bit-identical results.
    #[test]
    fn key_and_context_survive_a_bincode_round_trip() {
        let dpf = DistributedPointFunction::new(4, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let (key_a, _) = dpf.generate_keys(9, 42, &mut rng).unwrap();

        let key_bytes = bincode::serialize(&key_a).unwrap();
        let key_a_restored: DpfKey = bincode::deserialize(&key_bytes).unwrap();
        assert_eq!(key_a, key_a_restored);

        let ctx = dpf.create_evaluation_context(&key_a).unwrap();
        let ctx_bytes = bincode::serialize(&ctx).unwrap();
        let mut ctx_restored: EvaluationContext = bincode::deserialize(&ctx_bytes).unwrap();
        assert_eq!(ctx_restored.key(), &key_a_restored);

        let direct = dpf.evaluate(&key_a).unwrap();
        // The restored context carries its own key, so it alone is
        // sufficient to resume evaluation; no key is passed here.
        let restored = dpf
            .evaluate_next(&[], &mut ctx_restored)
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(direct, restored);
    }

    #[test]
    fn incremental_round_trip_matches_additive_share_law() {
        let dpf = DistributedPointFunction::new_incremental(&[
            DpfParameters::new(2, 8),
            DpfParameters::new(5, 16),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let alpha = 0b10110u128;
        let betas = [3u128, 1000u128];
        let (key_a, key_b) = dpf.generate_keys_incremental(alpha, &betas, &mut rng).unwrap();

        let mut ctx_a = dpf.create_evaluation_context(&key_a).unwrap();
        let mut ctx_b = dpf.create_evaluation_context(&key_b).unwrap();
        let level0_a = dpf.evaluate_next(&[], &mut ctx_a).unwrap();
        let level0_b = dpf.evaluate_next(&[], &mut ctx_b).unwrap();
        let prefixes: Vec<u128> = (0..4).collect();
        let level1_a = dpf.evaluate_next(&prefixes, &mut ctx_a).unwrap();
        let level1_b = dpf.evaluate_next(&prefixes, &mut ctx_b).unwrap();

        for x in 0..4u128 {
            let expected = if x == (alpha >> 3) { betas[0] } else { 0 };
            assert_eq!(combine(level0_a[0][x as usize], level0_b[0][x as usize], 8), expected);
        }
        for (p_idx, &prefix) in prefixes.iter().enumerate() {
            for suffix in 0..8u128 {
                let x = (prefix << 3) | suffix;
                let expected = if x == alpha { betas[1] } else { 0 };
                let combined = combine(
                    level1_a[p_idx][suffix as usize],
                    level1_b[p_idx][suffix as usize],
                    16,
                );
                assert_eq!(combined, expected, "mismatch at x={}", x);
            }
        }
    }
}
