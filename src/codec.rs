//! Value-correction codec (component 6): packing small output elements into
//! slots of a 128-bit [`Block`], and the inverse.
//!
//! A hierarchy level whose `element_bitsize` is less than 128 can pack
//! `128 / element_bitsize` values into one correction word, which is how a
//! single tree-level boundary can cover several trailing domain bits at
//! once (see [`crate::params::TreeMapping::pack_bits`]).
use crate::block::Block;
use crate::error::DpfError;

const SUPPORTED_WIDTHS: [u32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

fn check_width(element_bitsize: u32) -> Result<(), DpfError> {
    if SUPPORTED_WIDTHS.contains(&element_bitsize) {
        Ok(())
    } else {
        Err(DpfError::Unimplemented(format!(
            "element_bitsize {} not in {{1,2,4,8,16,32,64,128}}",
            element_bitsize
        )))
    }
}

/// Number of slots a block packs at the given element width.
pub fn slots_per_block(element_bitsize: u32) -> Result<usize, DpfError> {
    check_width(element_bitsize)?;
    Ok((128 / element_bitsize) as usize)
}

/// Packs `values` into a single block, `values[0]` in slot 0 and so on.
/// `values.len()` must not exceed `slots_per_block(element_bitsize)`.
pub fn pack(values: &[u128], element_bitsize: u32) -> Result<Block, DpfError> {
    let slots = slots_per_block(element_bitsize)?;
    if values.len() > slots {
        return Err(DpfError::InvalidArgument(format!(
            "{} values do not fit in {} slots of width {}",
            values.len(),
            slots,
            element_bitsize
        )));
    }
    let mut block = Block::ZERO;
    for (i, v) in values.iter().enumerate() {
        block = block.with_slot_set(i, element_bitsize, *v);
    }
    Ok(block)
}

/// Reads a single packed slot out of `block`.
pub fn unpack_slot(block: &Block, slot: usize, element_bitsize: u32) -> Result<u128, DpfError> {
    let slots = slots_per_block(element_bitsize)?;
    if slot >= slots {
        return Err(DpfError::InvalidArgument(format!(
            "slot {} out of range for {} slots of width {}",
            slot, slots, element_bitsize
        )));
    }
    Ok(block.slot(slot, element_bitsize))
}

fn mask(bitsize: u32) -> u128 {
    if bitsize >= 128 {
        u128::MAX
    } else {
        (1u128 << bitsize) - 1
    }
}

/// Modular addition within one packed slot's width. Used by keygen and eval
/// to combine a PRG-derived output with a value correction without letting a
/// carry bleed into an adjacent slot.
pub fn add_mod(a: u128, b: u128, bitsize: u32) -> u128 {
    a.wrapping_add(b) & mask(bitsize)
}

/// Modular subtraction within one packed slot's width.
pub fn sub_mod(a: u128, b: u128, bitsize: u32) -> u128 {
    a.wrapping_sub(b) & mask(bitsize)
}

/// Modular negation within one packed slot's width; this is how a party B
/// share gets turned into its contribution to the additive law.
pub fn negate_mod(a: u128, bitsize: u32) -> u128 {
    0u128.wrapping_sub(a) & mask(bitsize)
}
