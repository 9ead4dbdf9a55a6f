//! Shared memory-destination read-modify-write addressing, used by the
//! line-9/line-B handlers whose `Ea,Dn -> Ea` direction must load, modify
//! and store back through the *same* effective address without applying a
//! post-increment/pre-decrement side effect twice.
//!
//! Grounded on `M68k_LINE9.c`'s `EMIT_SUB_reg` direction-1 branch and
//! `M68k_LINEB.c`'s `EMIT_EOR_ext` memory branch, both of which resolve the
//! address once (mode 3/4 specially, to place the register adjustment on
//! the correct side of the load/store) rather than calling the general EA
//! load and store helpers back to back.

use crate::buffer::CodeBuffer;
use crate::context::TranslationContext;
use crate::ea::{compute_indexed_address, emit_mov_imm32, EaMode, Size};
use crate::error::{Result, TranslateError};
use crate::regalloc::{GuestReg, HostReg};

/// A resolved memory-destination address, plus the register side effect
/// (if any) the caller must apply before (`PreDec`) or after (`PostInc`)
/// the load/store pair.
pub struct RmwAddr {
    pub base: HostReg,
    /// True when `base` is a scratch register the caller must free; false
    /// when it is a live guest address register (`An`) that must not be.
    pub owned: bool,
    pub predec: Option<(u8, u32)>,
    pub postinc: Option<(u8, u32)>,
}

/// Resolves `ea` (restricted to the modes the ISA allows as a memory
/// destination: `Indirect`, `PostInc`, `PreDec`, `Disp`, `Indexed`,
/// `AbsShort`, `AbsLong`) to a base register ready for
/// [`crate::ea::emit_sized_load`]/[`crate::ea::emit_sized_store`] at
/// displacement 0, without yet applying any pre/post register adjustment.
pub fn resolve_rmw_base(buf: &mut CodeBuffer, ctx: &mut TranslationContext, ea: u8, size: Size, guest_ptr: &mut u32, ext_words: &mut u8) -> Result<RmwAddr> {
    let mode = EaMode::decode(ea).ok_or(TranslateError::InvalidEaSize { mode: ea, size })?;
    match mode {
        EaMode::Indirect(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            Ok(RmwAddr { base, owned: false, predec: None, postinc: None })
        }
        EaMode::PostInc(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let inc = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
            Ok(RmwAddr { base, owned: false, predec: None, postinc: Some((n, inc)) })
        }
        EaMode::PreDec(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let dec = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
            Ok(RmwAddr { base, owned: false, predec: Some((n, dec)), postinc: None })
        }
        EaMode::Disp(n) => {
            let an = ctx.ra.map(buf, GuestReg::a(n))?;
            let disp = ctx.consume_word(guest_ptr, ext_words) as i16 as i32;
            let base = ctx.ra.alloc_scratch(buf)?;
            emit_add_disp(buf, ctx, base, an, disp);
            Ok(RmwAddr { base, owned: true, predec: None, postinc: None })
        }
        EaMode::Indexed(n) => {
            let an = ctx.ra.map(buf, GuestReg::a(n))?;
            let base = compute_indexed_address(buf, ctx, Some(an), guest_ptr, ext_words)?;
            Ok(RmwAddr { base, owned: true, predec: None, postinc: None })
        }
        EaMode::AbsShort => {
            let word = ctx.consume_word(guest_ptr, ext_words) as i16 as i32 as u32;
            let base = ctx.ra.alloc_scratch(buf)?;
            emit_mov_imm32(buf, base, word);
            Ok(RmwAddr { base, owned: true, predec: None, postinc: None })
        }
        EaMode::AbsLong => {
            let hi = ctx.consume_word(guest_ptr, ext_words);
            let lo = ctx.consume_word(guest_ptr, ext_words);
            let addr = (u32::from(hi) << 16) | u32::from(lo);
            let base = ctx.ra.alloc_scratch(buf)?;
            emit_mov_imm32(buf, base, addr);
            Ok(RmwAddr { base, owned: true, predec: None, postinc: None })
        }
        EaMode::DataReg(_) | EaMode::AddrReg(_) | EaMode::PcDisp | EaMode::PcIndex | EaMode::Immediate => Err(TranslateError::InvalidEaSize { mode: ea, size }),
    }
}

fn emit_add_disp(buf: &mut CodeBuffer, ctx: &mut TranslationContext, dst: HostReg, base: HostReg, disp: i32) {
    use crate::arm64::{self, Shift};
    if (0..4096).contains(&disp) {
        buf.push(arm64::add_immed(dst.0, base.0, disp as u32));
    } else if (-4095..0).contains(&disp) {
        buf.push(arm64::sub_immed(dst.0, base.0, (-disp) as u32));
    } else {
        emit_mov_imm32(buf, dst, disp as u32);
        buf.push(arm64::add_reg(dst.0, dst.0, base.0, Shift::Lsl, 0));
    }
}

/// Applies the pre-decrement side effect, if any, marking the address
/// register dirty.
pub fn apply_predec(buf: &mut CodeBuffer, ctx: &mut TranslationContext, addr: &RmwAddr) {
    if let Some((n, dec)) = addr.predec {
        buf.push(crate::arm64::sub_immed(addr.base.0, addr.base.0, dec));
        ctx.ra.set_dirty(GuestReg::a(n));
    }
}

/// Applies the post-increment side effect, if any, marking the address
/// register dirty.
pub fn apply_postinc(buf: &mut CodeBuffer, ctx: &mut TranslationContext, addr: &RmwAddr) {
    if let Some((n, inc)) = addr.postinc {
        buf.push(crate::arm64::add_immed(addr.base.0, addr.base.0, inc));
        ctx.ra.set_dirty(GuestReg::a(n));
    }
}

/// Frees `addr.base` if it was a scratch register this call allocated.
pub fn free_if_owned(buf: &mut CodeBuffer, ctx: &mut TranslationContext, addr: &RmwAddr) {
    if addr.owned {
        ctx.ra.free(buf, Some(addr.base));
    }
}
