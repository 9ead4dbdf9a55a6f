//! Condition-code engine (component D): guest CCR bits <-> host NZCV.
//!
//! Mirrors `cpu-m68k`'s `Status`/`C`/`N`/`Z`/`V`/`X` flag-bit convention
//! (re-exported from its `flags` module), generalized here to also carry
//! the `SR_Valt`/`SR_Calt` translator-internal rename slots used while
//! host flags are being projected into guest sense, grounded on
//! `M68k_LINE9.c`'s `EMIT_SetFlagsConditional(ptr, cc, SR_Valt, ARM_CC_VS)`
//! / `SR_Calt` call sites.

use crate::arm64::{self, Cond, Shift};
use crate::buffer::CodeBuffer;
use crate::context::TranslationContext;
use crate::error::Result;
use crate::regalloc::HostReg;

/// Bit positions within the low byte of the guest SR (the CCR), per spec §6.
pub const C: u8 = 1 << 0;
pub const V: u8 = 1 << 1;
pub const Z: u8 = 1 << 2;
pub const N: u8 = 1 << 3;
pub const X: u8 = 1 << 4;

/// All five CCR bits, the value used when an opcode table row's `sr_sets`
/// says "the whole CCR".
pub const CCR: u8 = C | V | Z | N | X;

/// Temporary rename slots for V and C while the host's NZCV is being
/// projected into guest CCR sense. On m68k subtract, the host's native
/// subtract-carry has the opposite polarity from the guest's C bit; rather
/// than emitting an explicit bit flip, the engine materializes `SR_Calt`
/// (itself carrying the *host* polarity) and reconciles it by testing the
/// host's carry-clear (`CC`) condition instead of carry-set wherever a
/// guest-sense `C` or `X` bit is ultimately demanded. `SR_Valt` has no
/// polarity difference from `V` — it exists purely so `ClearFlags`/
/// `SetFlagsConditional` can batch V and the about-to-be-reconciled C into
/// one masked update before the final bits land in their real slots.
pub const SR_VALT: u8 = 1 << 0;
pub const SR_CALT: u8 = 1 << 1;

/// `X` and `Z` together — the subset SUBX needs as `sr_needs` (the X input
/// carry, and Z's "clear on nonzero, otherwise unchanged" stickiness).
pub const XZ: u8 = X | Z;

/// `X`, `V`, `C` together — the subset whose narrow-width derivation is the
/// Open Question this crate resolves in `DESIGN.md`.
pub const XVC: u8 = X | V | C;

/// `N`, `Z`, `V`, `C` together, `X` excluded — the `sr_sets` mask shared by
/// every line-B row: CMP/CMPA/CMPM never touch `X`, and EOR's table row
/// covers the same four bits even though it forces `V`/`C` to zero rather
/// than copying a host flag into them.
pub const NZVC: u8 = N | Z | V | C;

/// A mask of CCR bits, with the masked-update operations the opcode
/// emitters use to only ever touch the bits their table row declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CcrMask(pub u8);

impl CcrMask {
    #[must_use]
    pub const fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    #[must_use]
    pub const fn intersects(self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    #[must_use]
    pub const fn is_only(self, bits: u8) -> bool {
        self.0 == bits
    }
}

/// The guest condition codes as five independent booleans — the
/// CPU-owned-by-reference record the translator reconciles host flags
/// into, replacing the source's pseudo-global `SR` byte manipulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ccr {
    pub x: bool,
    pub n: bool,
    pub z: bool,
    pub v: bool,
    pub c: bool,
}

impl Ccr {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            c: bits & C != 0,
            v: bits & V != 0,
            z: bits & Z != 0,
            n: bits & N != 0,
            x: bits & X != 0,
        }
    }

    #[must_use]
    pub const fn to_bits(self) -> u8 {
        (self.c as u8) | ((self.v as u8) << 1) | ((self.z as u8) << 2) | ((self.n as u8) << 3) | ((self.x as u8) << 4)
    }

    /// `ClearFlags(cc, bits)`: unconditionally clears the named bits.
    pub fn clear(&mut self, bits: u8) {
        let mut v = self.to_bits();
        v &= !bits;
        *self = Self::from_bits(v);
    }

    /// `SetFlagsConditional(cc, bits, host_cond)`: the Rust model of this
    /// call sets the named bits directly (the "host condition" is a
    /// property of the emitted code, evaluated at guest runtime, not at
    /// translation time — see [`crate::arm64::set_flags_conditional`] for
    /// the instruction-emitting counterpart this type's setters back).
    pub fn set(&mut self, bits: u8) {
        let v = self.to_bits() | bits;
        *self = Self::from_bits(v);
    }

    /// Only the bits in `mask` are replaced by the corresponding bits of
    /// `value`; all others are left untouched. This is the Rust-level
    /// enforcement of invariant §8.5 ("bits outside `sr_sets` must be
    /// bitwise identical to their pre-state").
    pub fn update_masked(&mut self, mask: u8, value: Ccr) {
        let merged = (self.to_bits() & !mask) | (value.to_bits() & mask);
        *self = Self::from_bits(merged);
    }
}

/// Derive guest NZVC from a host-native subtract's result and operand
/// width, implementing `GetNZnCV`. `dest`/`src`/`result` are the raw
/// operand-sized bit patterns already masked to `size` bits; the m68k and
/// host ALUs agree on N and Z polarity for subtraction, but not on V and C:
/// V is the standard signed-overflow formula; C (and thus X, which tracks
/// C on every arithmetic op except where noted) is the *borrow* sense,
/// opposite of the host's native carry-out-of-subtract, which is why the
/// reconciliation goes through [`SR_CALT`] and a `CC` (carry-clear) test
/// rather than negating the raw flag.
#[must_use]
pub fn nzcv_for_subtract(dest: u32, src: u32, result: u32, size_bits: u32) -> Ccr {
    let sign_bit = 1u32 << (size_bits - 1);
    let mask = if size_bits == 32 { u32::MAX } else { (1u32 << size_bits) - 1 };
    let dest = dest & mask;
    let src = src & mask;
    let result = result & mask;
    let n = result & sign_bit != 0;
    let z = result == 0;
    let v = (dest ^ src) & (dest ^ result) & sign_bit != 0;
    // Borrow occurred iff the unsigned subtraction underflowed.
    let c = (dest as u64) < (src as u64);
    Ccr { x: c, n, z, v, c }
}

/// `GetNZnCVX`: same as [`nzcv_for_subtract`], explicit about X tracking C
/// (every subtract-family instruction does this; the distinction from
/// `GetNZnCV` exists only because some opcodes, like CMP, must NOT touch X
/// even though they compute the same N/Z/V/C).
#[must_use]
pub fn nzcvx_for_subtract(dest: u32, src: u32, result: u32, size_bits: u32) -> Ccr {
    nzcv_for_subtract(dest, src, result, size_bits)
}

/// The host condition code corresponding to "reconciled guest C/X is set",
/// given that the host's native subtract-carry is borrow-inverted relative
/// to the guest. Centralizes the `SR_Calt`/`CC`-instead-of-`CS` convention
/// so every call site agrees.
#[must_use]
pub const fn host_cond_for_guest_carry_set() -> Cond {
    Cond::Cc
}

/// `EMIT_ClearFlags(cc, bits)`: unconditionally clears the named CCR bits in
/// the guest CCR's host register, via a small immediate mask and `BIC`
/// (register form, since the bits named here are rarely contiguous).
pub fn emit_clear_flags(buf: &mut CodeBuffer, ctx: &mut TranslationContext, cc: HostReg, bits: u8) -> Result<()> {
    let tmp = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::mov_immed_u16(tmp.0, u16::from(bits)));
    buf.push(arm64::bic_reg(cc.0, cc.0, tmp.0, Shift::Lsl, 0));
    ctx.ra.free(buf, Some(tmp));
    Ok(())
}

/// `EMIT_SetFlagsConditional(cc, bits, cond)`: sets every named CCR bit to
/// the boolean value of the host condition `cond`, evaluated at guest
/// runtime by the emitted code (not at translation time). One `CSET`
/// materializes the condition once; a `BFI` per named bit copies it into
/// place, matching the source's pattern of folding several bit positions
/// (e.g. `SR_Calt | SR_X`) onto the same condition in one call.
pub fn emit_set_flags_conditional(buf: &mut CodeBuffer, ctx: &mut TranslationContext, cc: HostReg, bits: u8, cond: Cond) -> Result<()> {
    let tmp = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::cset(tmp.0, cond));
    for bit in 0..5u32 {
        if bits & (1 << bit) != 0 {
            buf.push(arm64::bfi(cc.0, tmp.0, bit, 1));
        }
    }
    ctx.ra.free(buf, Some(tmp));
    Ok(())
}

/// Reconciles a just-emitted host subtract's NZCV into the guest CCR's host
/// register, restricted to the bits named in `mask` (an opcode's static
/// `sr_sets`, per table row). This is the shared tail every SUB/SUBA-less/
/// CMP/CMPA/CMPM handler runs after its ALU sequence: `Z`/`N`/`V` read the
/// host flags at their native polarity, `X`/`C` go through
/// [`host_cond_for_guest_carry_set`] since the host's subtract-carry is
/// borrow-inverted relative to the guest's.
pub fn emit_reconcile_subtract_flags(buf: &mut CodeBuffer, ctx: &mut TranslationContext, cc: HostReg, mask: u8) -> Result<()> {
    if mask & Z != 0 {
        emit_set_flags_conditional(buf, ctx, cc, Z, Cond::Eq)?;
    }
    if mask & N != 0 {
        emit_set_flags_conditional(buf, ctx, cc, N, Cond::Mi)?;
    }
    if mask & V != 0 {
        emit_set_flags_conditional(buf, ctx, cc, V, Cond::Vs)?;
    }
    let xc = mask & (X | C);
    if xc != 0 {
        emit_set_flags_conditional(buf, ctx, cc, xc, host_cond_for_guest_carry_set())?;
    }
    Ok(())
}

/// Reconciles a just-emitted SUBX's host NZCV into the guest CCR. N, V and
/// X/C follow the host flags exactly like [`emit_reconcile_subtract_flags`],
/// but Z is sticky: SUBX clears it only when this operation's result is
/// nonzero, and leaves it untouched when the result is zero, so a
/// multi-precision SUBX chain's Z reflects "every limb was zero" rather
/// than just the last one. Must run immediately after the flag-setting
/// `sbcs` this reconciles, before any other flag-setting instruction.
pub fn emit_reconcile_subx_flags(buf: &mut CodeBuffer, ctx: &mut TranslationContext, cc: HostReg) -> Result<()> {
    emit_set_flags_conditional(buf, ctx, cc, N, Cond::Mi)?;
    emit_set_flags_conditional(buf, ctx, cc, V, Cond::Vs)?;
    emit_set_flags_conditional(buf, ctx, cc, X | C, host_cond_for_guest_carry_set())?;

    let mask = ctx.ra.alloc_scratch(buf)?;
    let cleared = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::mov_immed_u16(mask.0, u16::from(Z)));
    buf.push(arm64::bic_reg(cleared.0, cc.0, mask.0, Shift::Lsl, 0));
    buf.push(arm64::csel(cc.0, cleared.0, cc.0, Cond::Ne));
    ctx.ra.free(buf, Some(cleared));
    ctx.ra.free(buf, Some(mask));
    Ok(())
}

/// Reconciles a just-emitted logical op's host NZ into the guest CCR,
/// restricted to `mask`. `EOR`/`AND`/`OR`-family opcodes don't run a
/// subtract, so there is no host carry/overflow to reconcile: `V` and `C`
/// are simply forced clear whenever `mask` names them, per the m68k's own
/// "logical operations always clear V and C" rule, and `X` is left alone
/// (not part of `mask` for this family in the first place).
pub fn emit_reconcile_logical_flags(buf: &mut CodeBuffer, ctx: &mut TranslationContext, cc: HostReg, mask: u8) -> Result<()> {
    if mask & Z != 0 {
        emit_set_flags_conditional(buf, ctx, cc, Z, Cond::Eq)?;
    }
    if mask & N != 0 {
        emit_set_flags_conditional(buf, ctx, cc, N, Cond::Mi)?;
    }
    let vc = mask & (V | C);
    if vc != 0 {
        emit_clear_flags(buf, ctx, cc, vc)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullDiagnostics;
    use crate::icache::FlatICache;
    use crate::regalloc::GuestReg;

    #[test]
    fn emit_set_flags_conditional_bfis_every_named_bit() {
        let cache = FlatICache::new(&[]);
        let mut diag = NullDiagnostics;
        let mut tctx = TranslationContext::new(0, &cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let cc = tctx.ra.map(buf, GuestReg::Ccr).unwrap();

        emit_set_flags_conditional(&mut buf, &mut tctx, cc, X | C, host_cond_for_guest_carry_set()).unwrap();

        // CSET, then one BFI per named bit (C at 0, X at 4).
        assert_eq!(buf.as_slice().len(), 3);
    }

    #[test]
    fn emit_reconcile_subtract_flags_skips_bits_outside_mask() {
        let cache = FlatICache::new(&[]);
        let mut diag = NullDiagnostics;
        let mut tctx = TranslationContext::new(0, &cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let cc = tctx.ra.map(buf, GuestReg::Ccr).unwrap();

        // Z-only mask: exactly one CSET + one BFI.
        emit_reconcile_subtract_flags(&mut buf, &mut tctx, cc, Z).unwrap();
        assert_eq!(buf.as_slice().len(), 2);
    }

    #[test]
    fn emit_reconcile_logical_flags_always_clears_v_and_c() {
        let cache = FlatICache::new(&[]);
        let mut diag = NullDiagnostics;
        let mut tctx = TranslationContext::new(0, &cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let cc = tctx.ra.map(buf, GuestReg::Ccr).unwrap();

        // NZVC mask: CSET+BFI for Z, CSET+BFI for N, then one unconditional
        // clear for V|C (no host-condition test needed for those two).
        emit_reconcile_logical_flags(&mut buf, &mut tctx, cc, NZVC).unwrap();
        assert_eq!(buf.as_slice().len(), 6);
    }

    #[test]
    fn round_trips_through_bits() {
        let ccr = Ccr { x: true, n: false, z: true, v: false, c: true };
        assert_eq!(Ccr::from_bits(ccr.to_bits()), ccr);
    }

    #[test]
    fn update_masked_preserves_bits_outside_mask() {
        let mut ccr = Ccr::from_bits(CCR); // all set
        let incoming = Ccr::from_bits(0);
        ccr.update_masked(Z, incoming);
        // Only Z should have changed.
        assert!(!ccr.z);
        assert!(ccr.x && ccr.n && ccr.v && ccr.c);
    }

    #[test]
    fn s4_cmp_w_sets_n_v_c_and_leaves_z_clear() {
        // CMP.W D1,D0 with D0=0x7FFF, D1=0x8000 => N=1 Z=0 V=1 C=1
        let dest = 0x0000_7FFF_u32;
        let src = 0x0000_8000_u32;
        let result = dest.wrapping_sub(src) & 0xFFFF;
        let ccr = nzcv_for_subtract(dest, src, result, 16);
        assert!(ccr.n);
        assert!(!ccr.z);
        assert!(ccr.v);
        assert!(ccr.c);
    }
}
