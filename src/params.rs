//! Parameter validation and the hierarchy-level <-> tree-level mapping
//! (component 3, §4.1).
//!
//! The GGM tree backing an incremental DPF is shared across every
//! hierarchy level. Each hierarchy level's output can be "packed": when
//! `element_bitsize_i` is small enough that `128 / element_bitsize_i`
//! slots comfortably hold more than one output, the last few bits of that
//! hierarchy's domain are resolved by reading a slot out of a single
//! PRG-masked block instead of by descending further into the tree. This
//! module computes, once per validated parameter list, exactly how many
//! real tree levels are needed and which ones carry a value correction.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DpfError;

/// One hierarchy level's parameters (§3, §6). `log_domain_size` must be
/// strictly increasing and `element_bitsize` non-decreasing across a
/// validated list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfParameters {
    pub log_domain_size: u32,
    pub element_bitsize: u32,
}

impl DpfParameters {
    pub fn new(log_domain_size: u32, element_bitsize: u32) -> Self {
        DpfParameters {
            log_domain_size,
            element_bitsize,
        }
    }
}

const SUPPORTED_WIDTHS: [u32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

fn packing_factor(element_bitsize: u32) -> u32 {
    // element_bitsize is a power of two in {1,..,128}: 128 / b is exact,
    // and its log2 is exact too (no rounding needed despite §4.1 phrasing
    // it as a floor).
    128u32.trailing_zeros() - element_bitsize.trailing_zeros()
}

/// Per-hierarchy bookkeeping derived from a validated parameter list.
#[derive(Clone, Debug)]
struct HierarchyLayout {
    /// Global tree depth reached once this hierarchy's boundary is
    /// processed (i.e. one past its boundary tree level).
    tree_depth_after: usize,
    /// Number of real GGM-tree levels newly consumed by this hierarchy.
    branch_bits: usize,
    /// Number of trailing bits of this hierarchy's domain resolved by
    /// reading a packed slot instead of tree branching.
    pack_bits: u32,
}

/// The validated mapping between hierarchy levels and tree levels.
#[derive(Clone, Debug)]
pub struct TreeMapping {
    params: Vec<DpfParameters>,
    layout: Vec<HierarchyLayout>,
    tree_to_hierarchy: HashMap<usize, usize>,
    tree_levels_needed: usize,
}

impl TreeMapping {
    /// Validates `params` per §4.1 and builds the tree mapping.
    pub fn validate(params: &[DpfParameters]) -> Result<TreeMapping, DpfError> {
        if params.is_empty() {
            return Err(DpfError::InvalidArgument(
                "parameter list must be non-empty".into(),
            ));
        }

        let mut previous_log_domain: Option<u32> = None;
        let mut previous_bitsize: Option<u32> = None;
        for (i, p) in params.iter().enumerate() {
            if p.log_domain_size > 128 {
                return Err(DpfError::InvalidArgument(format!(
                    "hierarchy {}: log_domain_size {} exceeds 128",
                    i, p.log_domain_size
                )));
            }
            if let Some(prev) = previous_log_domain {
                if p.log_domain_size <= prev {
                    return Err(DpfError::InvalidArgument(format!(
                        "hierarchy {}: log_domain_size must strictly increase ({} <= {})",
                        i, p.log_domain_size, prev
                    )));
                }
            }
            if !SUPPORTED_WIDTHS.contains(&p.element_bitsize) {
                return Err(DpfError::Unimplemented(format!(
                    "hierarchy {}: element_bitsize {} not in {{1,2,4,8,16,32,64,128}}",
                    i, p.element_bitsize
                )));
            }
            if let Some(prev) = previous_bitsize {
                if p.element_bitsize < prev {
                    return Err(DpfError::InvalidArgument(format!(
                        "hierarchy {}: element_bitsize must be non-decreasing ({} < {})",
                        i, p.element_bitsize, prev
                    )));
                }
            }
            previous_log_domain = Some(p.log_domain_size);
            previous_bitsize = Some(p.element_bitsize);
        }

        let mut layout = Vec::with_capacity(params.len());
        let mut tree_to_hierarchy = HashMap::new();
        let mut tree_depth_before = 0usize;
        let last = params.len() - 1;
        for (i, p) in params.iter().enumerate() {
            let l_i = p.log_domain_size as isize;
            // Packing lets a hierarchy boundary resolve its trailing bits by
            // reading a slot instead of branching, but a packed boundary
            // hides those bits from the tree state handed to the next
            // hierarchy's prefixes. Restricting packing to the last
            // hierarchy keeps every intermediate prefix a full, unpacked
            // tree node, so `evaluate_next` never has to reconcile a
            // caller-supplied prefix against bits a prior boundary packed
            // away (see keys_carry_matching_public_correction_words and the
            // incremental round-trip tests for the case this would
            // otherwise break: a later hierarchy packing more bits than an
            // earlier one exposed).
            let p_i = if i == last {
                packing_factor(p.element_bitsize) as isize
            } else {
                0
            };
            // Smallest tree depth whose packing slots can still reach this
            // hierarchy's full resolution. Hierarchy 0 has no previous
            // boundary to stay clear of, so a single-point domain
            // (`log_domain_size == 0`) can legitimately need zero tree
            // levels at all, its value resolved directly from the root
            // seeds (§8 "single-point domain" boundary case). Every later
            // hierarchy must advance at least one real tree level past the
            // previous one, both so it owns a distinct tree level in
            // `tree_to_hierarchy` and so it can never itself collapse to
            // the root-only case (only hierarchy 0 ever can).
            let floor = if i == 0 { 0 } else { tree_depth_before as isize + 1 };
            let tree_depth_after = std::cmp::max(l_i - p_i, floor) as usize;
            debug_assert!(tree_depth_after <= p.log_domain_size as usize);
            let branch_bits = tree_depth_after - tree_depth_before;
            let pack_bits = p.log_domain_size - tree_depth_after as u32;

            if tree_depth_after > 0 {
                tree_to_hierarchy.insert(tree_depth_after - 1, i);
            }
            layout.push(HierarchyLayout {
                tree_depth_after,
                branch_bits,
                pack_bits,
            });
            tree_depth_before = tree_depth_after;
        }

        let tree_levels_needed = tree_depth_before;
        Ok(TreeMapping {
            params: params.to_vec(),
            layout,
            tree_to_hierarchy,
            tree_levels_needed,
        })
    }

    pub fn params(&self) -> &[DpfParameters] {
        &self.params
    }

    pub fn hierarchy_levels(&self) -> usize {
        self.params.len()
    }

    pub fn tree_levels_needed(&self) -> usize {
        self.tree_levels_needed
    }

    /// The domain size (in bits) of the deepest hierarchy; global tree
    /// branching bit positions are numbered from its most-significant bit.
    pub fn max_log_domain_size(&self) -> u32 {
        self.params.last().expect("validated: non-empty").log_domain_size
    }

    /// The tree level of hierarchy `i`'s correction word (its boundary), or
    /// `None` if `i` is resolved entirely from the root (see
    /// [`TreeMapping::is_root_only`]).
    pub fn hierarchy_to_tree(&self, i: usize) -> Option<usize> {
        let depth = self.layout[i].tree_depth_after;
        if depth == 0 {
            None
        } else {
            Some(depth - 1)
        }
    }

    /// True when hierarchy `i`'s value is resolved directly from the root
    /// seeds, with no real GGM-tree levels at all. Only possible for
    /// hierarchy 0, and only when its `log_domain_size` is 0 (a single-point
    /// domain) or small enough to be fully packed into the root's value
    /// correction.
    pub fn is_root_only(&self, i: usize) -> bool {
        self.layout[i].tree_depth_after == 0
    }

    /// Which hierarchy (if any) has its boundary at tree level `t`.
    pub fn tree_to_hierarchy(&self, t: usize) -> Option<usize> {
        self.tree_to_hierarchy.get(&t).copied()
    }

    /// Global tree depth once hierarchy `i` has been fully processed.
    pub fn tree_depth_after(&self, i: usize) -> usize {
        self.layout[i].tree_depth_after
    }

    /// Global tree depth before hierarchy `i` starts (= tree depth after
    /// hierarchy `i - 1`, or 0 for `i == 0`).
    pub fn tree_depth_before(&self, i: usize) -> usize {
        if i == 0 {
            0
        } else {
            self.layout[i - 1].tree_depth_after
        }
    }

    /// Number of trailing bits of hierarchy `i`'s domain resolved via a
    /// packed output slot rather than tree branching.
    pub fn pack_bits(&self, i: usize) -> u32 {
        self.layout[i].pack_bits
    }

    /// The global branching bit position (MSB-first from the deepest
    /// hierarchy's domain) consumed at tree level `t`.
    pub fn branch_bit_position(&self, t: usize) -> u32 {
        self.max_log_domain_size() - 1 - t as u32
    }

    pub fn element_bitsize(&self, i: usize) -> u32 {
        self.params[i].element_bitsize
    }

    pub fn log_domain_size(&self, i: usize) -> u32 {
        self.params[i].log_domain_size
    }
}
