//! Line-B opcode family: CMP / CMPA / CMPM / EOR (spec §4.A/B/C).
//!
//! Grounded on `M68k_LINEB.c`'s `EMIT_CMP_ext`, `EMIT_CMPA_ext`,
//! `EMIT_CMPM` and `EMIT_EOR_ext`. CMP/CMPA/CMPM are non-destructive
//! subtracts and share [`line9`]'s shift-align-then-reconcile shape
//! (`DESIGN.md`) exactly, down to reusing
//! [`cc::emit_reconcile_subtract_flags`] — only `sr_sets` differs (`X` is
//! never part of this family's mask). EOR is not a subtract at all: it
//! reconciles through [`cc::emit_reconcile_logical_flags`] instead, which
//! forces `V`/`C` clear rather than copying a host flag into them.

use crate::arm64::{self, Shift};
use crate::buffer::CodeBuffer;
use crate::cc;
use crate::context::TranslationContext;
use crate::ea::{self, Size};
use crate::error::Result;
use crate::regalloc::GuestReg;
use crate::rmw;

fn decode_size(field: u16) -> Size {
    match field & 3 {
        0 => Size::Byte,
        1 => Size::Word,
        _ => Size::Long,
    }
}

/// `CMP <ea>,Dn`. A non-destructive `SUB` into a scratch register; `Dn`
/// itself is never written.
pub fn emit_cmp(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, guest_ptr: &mut u32) -> Result<()> {
    let size = decode_size(opcode >> 6);
    let shift = 64 - size.bits();
    let reg = ((opcode >> 9) & 7) as u8;
    let ea_byte = (opcode & 0x3f) as u8;
    let mut ext_words = 0u8;

    let dest = ctx.ra.map(buf, GuestReg::d(reg))?;
    let mut src_reg = None;
    let mut imm_offset = None;
    ea::load_from_effective_address(buf, ctx, size, false, &mut src_reg, ea_byte, guest_ptr, &mut ext_words, true, &mut imm_offset)?;
    let src = src_reg.expect("CMP's EA load never takes the immediate-offset shortcut (read_only dest is always a register)");

    let shifted = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::lsl_imm(shifted.0, dest.0, shift));
    buf.push(arm64::subs_reg(shifted.0, shifted.0, src.0, Shift::Lsl, shift));
    ctx.ra.free(buf, Some(shifted));
    ctx.ra.free(buf, Some(src));

    ctx.pc.advance(2 * (1 + u32::from(ext_words)));
    let cc = ctx.ra.modify_cc(buf)?;
    cc::emit_reconcile_subtract_flags(buf, ctx, cc, cc::NZVC)
}

/// `CMPA <ea>,An`. Always a full 32-bit compare: the word form sign-extends
/// its source before subtracting, exactly as [`line9::emit_suba`] extends
/// its operand, but unlike `SUBA` this row does set flags, so it still runs
/// through the shift-align trick at a fixed width of 32 rather than 0.
pub fn emit_cmpa(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, guest_ptr: &mut u32) -> Result<()> {
    let long = opcode & 0x0100 != 0;
    let size = if long { Size::Long } else { Size::Word };
    let shift = 64 - Size::Long.bits();
    let an = ((opcode >> 9) & 7) as u8;
    let ea_byte = (opcode & 0x3f) as u8;
    let mut ext_words = 0u8;

    let dest = ctx.ra.map(buf, GuestReg::a(an))?;
    let mut src_reg = None;
    let mut imm_offset = None;
    ea::load_from_effective_address(buf, ctx, size, !long, &mut src_reg, ea_byte, guest_ptr, &mut ext_words, true, &mut imm_offset)?;
    let src = src_reg.expect("CMPA's EA load always materializes a register");

    let shifted = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::lsl_imm(shifted.0, dest.0, shift));
    buf.push(arm64::subs_reg(shifted.0, shifted.0, src.0, Shift::Lsl, shift));
    ctx.ra.free(buf, Some(shifted));
    ctx.ra.free(buf, Some(src));

    ctx.pc.advance(2 * (1 + u32::from(ext_words)));
    let cc = ctx.ra.modify_cc(buf)?;
    cc::emit_reconcile_subtract_flags(buf, ctx, cc, cc::NZVC)
}

/// `CMPM (Ay)+,(Ax)+`. Reuses the exact bit pattern an `EOR Dn,<ea>` row
/// would otherwise decode as address-register-direct (an EA the real ISA
/// never allows as an EOR destination), which is why [`tables`] routes this
/// one combination to a dedicated handler instead of [`emit_eor`].
pub fn emit_cmpm(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16) -> Result<()> {
    let size = decode_size(opcode >> 6);
    let shift = 64 - size.bits();
    let ax = ((opcode >> 9) & 7) as u8;
    let ay = (opcode & 7) as u8;

    let ay_reg = ctx.ra.map(buf, GuestReg::a(ay))?;
    let src = ctx.ra.alloc_scratch(buf)?;
    let inc_y = if matches!(size, Size::Byte) && ay == 7 { 2 } else { size.bytes() };
    ea::emit_sized_load_postindex(buf, size, ay_reg, src, inc_y as i32);
    ctx.ra.set_dirty(GuestReg::a(ay));

    let ax_reg = ctx.ra.map(buf, GuestReg::a(ax))?;
    let dst = ctx.ra.alloc_scratch(buf)?;
    let inc_x = if matches!(size, Size::Byte) && ax == 7 { 2 } else { size.bytes() };
    ea::emit_sized_load_postindex(buf, size, ax_reg, dst, inc_x as i32);
    ctx.ra.set_dirty(GuestReg::a(ax));

    let shifted = ctx.ra.alloc_scratch(buf)?;
    buf.push(arm64::lsl_imm(shifted.0, dst.0, shift));
    buf.push(arm64::subs_reg(shifted.0, shifted.0, src.0, Shift::Lsl, shift));
    ctx.ra.free(buf, Some(shifted));
    ctx.ra.free(buf, Some(src));
    ctx.ra.free(buf, Some(dst));

    ctx.pc.advance(2);
    let cc = ctx.ra.modify_cc(buf)?;
    cc::emit_reconcile_subtract_flags(buf, ctx, cc, cc::NZVC)
}

/// `EOR Dn,<ea>`. Register-direct destinations fold the result straight
/// back with one `EOR`/`BFI` pair (no `BFI` at all for `Long`, since the
/// full 64-bit XOR already leaves the low 32 bits correct); memory
/// destinations go through the same `rmw` load/XOR/store/side-effect
/// sequence [`line9::emit_sub`]'s memory-destination branch uses.
pub fn emit_eor(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, guest_ptr: &mut u32) -> Result<()> {
    let size = decode_size(opcode >> 6);
    let reg = ((opcode >> 9) & 7) as u8;
    let ea_byte = (opcode & 0x3f) as u8;
    let mut ext_words = 0u8;
    let src = ctx.ra.map(buf, GuestReg::d(reg))?;

    let (test, test_is_scratch) = if ea_byte & 0x38 == 0 {
        let dn = ea_byte & 7;
        let dest = ctx.ra.map_for_write(buf, GuestReg::d(dn))?;
        match size {
            Size::Long => buf.push(arm64::eor_reg(dest.0, dest.0, src.0, Shift::Lsl, 0)),
            Size::Byte | Size::Word => {
                let tmp = ctx.ra.alloc_scratch(buf)?;
                buf.push(arm64::eor_reg(tmp.0, dest.0, src.0, Shift::Lsl, 0));
                buf.push(arm64::bfi(dest.0, tmp.0, 0, size.bits()));
                ctx.ra.free(buf, Some(tmp));
            }
            Size::AddressOnly => unreachable!("decode_size never yields AddressOnly"),
        }
        ctx.ra.set_dirty(GuestReg::d(dn));
        ctx.pc.advance(2);
        (dest, false)
    } else {
        let addr = rmw::resolve_rmw_base(buf, ctx, ea_byte, size, guest_ptr, &mut ext_words)?;
        rmw::apply_predec(buf, ctx, &addr);

        let dst = ctx.ra.alloc_scratch(buf)?;
        ea::emit_sized_load(buf, size, false, addr.base, dst, 0);
        buf.push(arm64::eor_reg(dst.0, dst.0, src.0, Shift::Lsl, 0));
        ea::emit_sized_store(buf, size, addr.base, dst, 0);

        rmw::apply_postinc(buf, ctx, &addr);
        rmw::free_if_owned(buf, ctx, &addr);
        ctx.pc.advance(2 * (1 + u32::from(ext_words)));
        (dst, true)
    };

    let shift = 64 - size.bits();
    buf.push(arm64::adds_reg(31, 31, test.0, Shift::Lsl, shift));
    ctx.ra.free(buf, Some(src));
    if test_is_scratch {
        ctx.ra.free(buf, Some(test));
    }

    let cc = ctx.ra.modify_cc(buf)?;
    cc::emit_reconcile_logical_flags(buf, ctx, cc, cc::NZVC)
}
