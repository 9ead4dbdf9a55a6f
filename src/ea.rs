//! Effective-address generator (component E): `LoadFromEffectiveAddress`
//! and `StoreToEffectiveAddress`.
//!
//! Grounded directly on `M68k_EA.c`'s `EMIT_LoadFromEffectiveAddress` /
//! `EMIT_StoreToEffectiveAddress`: the mode dispatch, the brief/full
//! extension-word decoding, and the pre/post-increment side effects below
//! all mirror that function's `switch (mode)` structure, generalized from
//! raw pointer arithmetic into the typed [`crate::regalloc`] /
//! [`crate::buffer`] / [`crate::context`] abstractions this crate builds.

use crate::arm64::{self, Shift};
use crate::buffer::CodeBuffer;
use crate::context::TranslationContext;
use crate::diagnostics::Diagnostic;
use crate::error::{Result, TranslateError};
use crate::regalloc::{GuestReg, HostReg};

/// The size tag passed to the EA generator (spec §3). `AddressOnly` means
/// "compute the EA, do not load through it" — used by instructions like
/// LEA and PEA, and by opcode emitters that want to reuse a computed
/// address across the load and the store half of a read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
    AddressOnly,
}

impl Size {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long | Self::AddressOnly => 4,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }
}

/// A decoded EA mode/register pair (spec §3: bits 5..3 mode, 2..0 register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaMode {
    DataReg(u8),
    AddrReg(u8),
    Indirect(u8),
    PostInc(u8),
    PreDec(u8),
    Disp(u8),
    Indexed(u8),
    AbsShort,
    AbsLong,
    PcDisp,
    PcIndex,
    Immediate,
}

impl EaMode {
    /// Decodes an EA byte. Returns `None` for the one reserved mode-7
    /// sub-selector (5, 6, 7) with no defined addressing mode.
    #[must_use]
    pub const fn decode(ea: u8) -> Option<Self> {
        let mode = (ea >> 3) & 7;
        let reg = ea & 7;
        Some(match mode {
            0 => Self::DataReg(reg),
            1 => Self::AddrReg(reg),
            2 => Self::Indirect(reg),
            3 => Self::PostInc(reg),
            4 => Self::PreDec(reg),
            5 => Self::Disp(reg),
            6 => Self::Indexed(reg),
            7 => match reg {
                0 => Self::AbsShort,
                1 => Self::AbsLong,
                2 => Self::PcDisp,
                3 => Self::PcIndex,
                4 => Self::Immediate,
                _ => return None,
            },
            _ => unreachable!("mode is a 3-bit field"),
        })
    }
}

/// A decoded brief or full extension word (spec §4.E).
#[derive(Debug, Clone, Copy)]
struct ExtWord {
    raw: u16,
}

impl ExtWord {
    const fn is_full(self) -> bool {
        self.raw & 0x0100 != 0
    }

    const fn index_reg(self) -> GuestReg {
        let field = ((self.raw >> 12) & 0xf) as u8;
        GuestReg::from_da(field)
    }

    const fn index_is_long(self) -> bool {
        self.raw & 0x0800 != 0
    }

    const fn scale_shift(self) -> u32 {
        (self.raw as u32 >> 9) & 3
    }

    const fn brief_disp(self) -> i32 {
        (self.raw as i8) as i32
    }

    const fn base_suppress(self) -> bool {
        self.raw & 0x0080 != 0
    }

    const fn index_suppress(self) -> bool {
        self.raw & 0x0040 != 0
    }

    const fn bd_size(self) -> u8 {
        ((self.raw >> 4) & 3) as u8
    }

    const fn iis(self) -> u8 {
        (self.raw & 7) as u8
    }
}

/// `GetOffsetPC`'s anchor convention, applied consistently by both the
/// load and the store path (this crate's resolution of the "`(d16,PC)` PC
/// origin" Open Question, see `DESIGN.md`): PC is anchored at the address
/// of the first extension word belonging to *this* operand, i.e. the
/// opcode word's own two bytes plus two bytes for every extension word
/// already consumed for this operand before the displacement itself.
fn pc_anchor(ctx: &TranslationContext, ext_words_before_this_one: u8) -> i32 {
    ctx.pc.offset_pc(2 + 2 * i32::from(ext_words_before_this_one)) as i32
}

/// Loads the effective address's operand into a host register, allocating
/// one if `*arm_reg` is `None`.
///
/// See spec §4.E for the full contract (mode table, brief/full extension
/// words, pre/post side effects, the immediate-offset shortcut, and the
/// same-source-and-dest aliasing rule).
#[allow(clippy::too_many_arguments)]
pub fn load_from_effective_address(
    buf: &mut CodeBuffer,
    ctx: &mut TranslationContext,
    size: Size,
    sign_extend: bool,
    arm_reg: &mut Option<HostReg>,
    ea: u8,
    guest_ptr: &mut u32,
    ext_words: &mut u8,
    read_only: bool,
    imm_offset: &mut Option<i32>,
) -> Result<()> {
    let mode = EaMode::decode(ea).ok_or(TranslateError::InvalidEaSize { mode: ea, size })?;

    let dest = |arm_reg: &mut Option<HostReg>, ctx: &mut TranslationContext| -> Result<HostReg> {
        match *arm_reg {
            Some(r) => Ok(r),
            None => {
                let r = ctx.ra.alloc_scratch(buf)?;
                *arm_reg = Some(r);
                Ok(r)
            }
        }
    };

    match mode {
        EaMode::DataReg(n) => {
            if matches!(size, Size::AddressOnly) {
                ctx.diagnostics.report(Diagnostic::InvalidEaSize { guest_pc: ctx.pc.current(), mode: ea });
                return Err(TranslateError::InvalidEaSize { mode: ea, size });
            }
            let mapped = ctx.ra.map(buf, GuestReg::d(n))?;
            if read_only && arm_reg.is_none() && !(sign_extend && !matches!(size, Size::Long)) {
                *arm_reg = Some(mapped);
            } else {
                let dst = dest(arm_reg, ctx)?;
                match (size, sign_extend) {
                    (Size::Byte, true) => buf.push(arm64::sxtb(dst.0, mapped.0)),
                    (Size::Word, true) => buf.push(arm64::sxth(dst.0, mapped.0)),
                    _ => buf.push(arm64::mov_reg(dst.0, mapped.0)),
                }
            }
        }
        EaMode::AddrReg(n) => {
            if matches!(size, Size::Byte | Size::AddressOnly) {
                ctx.diagnostics.report(Diagnostic::InvalidEaSize { guest_pc: ctx.pc.current(), mode: ea });
                return Err(TranslateError::InvalidEaSize { mode: ea, size });
            }
            let mapped = ctx.ra.map(buf, GuestReg::a(n))?;
            if read_only && arm_reg.is_none() && !(sign_extend && matches!(size, Size::Word)) {
                *arm_reg = Some(mapped);
            } else {
                let dst = dest(arm_reg, ctx)?;
                if matches!(size, Size::Word) && sign_extend {
                    buf.push(arm64::sxth(dst.0, mapped.0));
                } else {
                    buf.push(arm64::mov_reg(dst.0, mapped.0));
                }
            }
        }
        EaMode::Indirect(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let dst = dest(arm_reg, ctx)?;
            emit_sized_load(buf, size, sign_extend, base, dst, 0);
        }
        EaMode::PostInc(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let dst = dest(arm_reg, ctx)?;
            if matches!(size, Size::AddressOnly) {
                emit_sized_load(buf, size, sign_extend, base, dst, 0);
            } else {
                let inc = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
                if sign_extend {
                    emit_sized_load(buf, size, sign_extend, base, dst, 0);
                    buf.push(arm64::add_immed(base.0, base.0, inc));
                } else {
                    emit_sized_load_postindex(buf, size, base, dst, inc as i32);
                }
                ctx.ra.set_dirty(GuestReg::a(n));
            }
        }
        EaMode::PreDec(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let dst = dest(arm_reg, ctx)?;
            if matches!(size, Size::AddressOnly) {
                emit_sized_load(buf, size, sign_extend, base, dst, 0);
            } else {
                let dec = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
                if sign_extend {
                    buf.push(arm64::sub_immed(base.0, base.0, dec));
                    emit_sized_load(buf, size, sign_extend, base, dst, 0);
                } else {
                    emit_sized_load_preindex(buf, size, base, dst, -(dec as i32));
                }
                ctx.ra.set_dirty(GuestReg::a(n));
            }
        }
        EaMode::Disp(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let disp = ctx.consume_word(guest_ptr, ext_words) as i16 as i32;
            if imm_offset.is_some() && matches!(size, Size::AddressOnly) && read_only {
                *arm_reg = Some(base);
                *imm_offset = Some(disp);
            } else {
                let dst = dest(arm_reg, ctx)?;
                emit_sized_load(buf, size, sign_extend, base, dst, disp);
            }
        }
        EaMode::Indexed(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let addr = compute_indexed_address(buf, ctx, Some(base), guest_ptr, ext_words)?;
            let dst = dest(arm_reg, ctx)?;
            emit_sized_load(buf, size, sign_extend, addr, dst, 0);
            ctx.ra.free(buf, Some(addr));
        }
        EaMode::AbsShort => {
            let word = ctx.consume_word(guest_ptr, ext_words) as i16 as i32 as u32;
            let dst = dest(arm_reg, ctx)?;
            load_absolute(buf, ctx, size, sign_extend, word, dst)?;
        }
        EaMode::AbsLong => {
            let hi = ctx.consume_word(guest_ptr, ext_words);
            let lo = ctx.consume_word(guest_ptr, ext_words);
            let addr = (u32::from(hi) << 16) | u32::from(lo);
            let dst = dest(arm_reg, ctx)?;
            load_absolute(buf, ctx, size, sign_extend, addr, dst)?;
        }
        EaMode::PcDisp => {
            if imm_offset.is_some() && matches!(size, Size::AddressOnly) && read_only {
                let off = pc_anchor(ctx, *ext_words);
                let disp = ctx.consume_word(guest_ptr, ext_words) as i16 as i32;
                *imm_offset = Some(off + disp);
            } else {
                let off = pc_anchor(ctx, *ext_words);
                let disp = ctx.consume_word(guest_ptr, ext_words) as i16 as i32;
                let base = ctx.ra.alloc_scratch(buf)?;
                emit_mov_imm32(buf, base, (off + disp) as u32);
                let dst = dest(arm_reg, ctx)?;
                emit_sized_load(buf, size, sign_extend, base, dst, 0);
                ctx.ra.free(buf, Some(base));
            }
        }
        EaMode::PcIndex => {
            let off = pc_anchor(ctx, *ext_words);
            let pc_base = ctx.ra.alloc_scratch(buf)?;
            emit_mov_imm32(buf, pc_base, off as u32);
            let addr = compute_indexed_address(buf, ctx, Some(pc_base), guest_ptr, ext_words)?;
            ctx.ra.free(buf, Some(pc_base));
            let dst = dest(arm_reg, ctx)?;
            emit_sized_load(buf, size, sign_extend, addr, dst, 0);
            ctx.ra.free(buf, Some(addr));
        }
        EaMode::Immediate => {
            let dst = dest(arm_reg, ctx)?;
            match size {
                Size::Byte => {
                    let word = ctx.consume_word(guest_ptr, ext_words);
                    let v = if sign_extend { (word as u8 as i8) as i32 as u32 } else { u32::from(word as u8) };
                    emit_mov_imm32(buf, dst, v);
                }
                Size::Word => {
                    let word = ctx.consume_word(guest_ptr, ext_words);
                    let v = if sign_extend { (word as i16) as i32 as u32 } else { u32::from(word) };
                    emit_mov_imm32(buf, dst, v);
                }
                Size::Long | Size::AddressOnly => {
                    let hi = ctx.consume_word(guest_ptr, ext_words);
                    let lo = ctx.consume_word(guest_ptr, ext_words);
                    let v = (u32::from(hi) << 16) | u32::from(lo);
                    emit_mov_imm32(buf, dst, v);
                }
            }
        }
    }

    Ok(())
}

/// Stores a host register's value through the effective address.
///
/// Mirrors `EMIT_StoreToEffectiveAddress`: every mode valid as a
/// destination (everything but `Immediate`, and `PcDisp`/`PcIndex` which
/// the ISA defines as read-only) is handled; writing through a read-only
/// mode is a translator bug and reported via [`TranslateError::InvalidEaSize`].
#[allow(clippy::too_many_arguments)]
pub fn store_to_effective_address(
    buf: &mut CodeBuffer,
    ctx: &mut TranslationContext,
    size: Size,
    src: HostReg,
    ea: u8,
    guest_ptr: &mut u32,
    ext_words: &mut u8,
) -> Result<()> {
    let mode = EaMode::decode(ea).ok_or(TranslateError::InvalidEaSize { mode: ea, size })?;

    match mode {
        EaMode::DataReg(n) => {
            let dst = ctx.ra.map_for_write(buf, GuestReg::d(n))?;
            emit_bitfield_writeback(buf, size, dst, src);
        }
        EaMode::AddrReg(n) => {
            if matches!(size, Size::Byte) {
                return Err(TranslateError::InvalidEaSize { mode: ea, size });
            }
            let dst = ctx.ra.map_for_write(buf, GuestReg::a(n))?;
            buf.push(arm64::mov_reg(dst.0, src.0));
        }
        EaMode::Indirect(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            emit_sized_store(buf, size, base, src, 0);
        }
        EaMode::PostInc(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let inc = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
            emit_sized_store_postindex(buf, size, base, src, inc as i32);
            ctx.ra.set_dirty(GuestReg::a(n));
        }
        EaMode::PreDec(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let dec = if matches!(size, Size::Byte) && n == 7 { 2 } else { size.bytes() };
            emit_sized_store_preindex(buf, size, base, src, -(dec as i32));
            ctx.ra.set_dirty(GuestReg::a(n));
        }
        EaMode::Disp(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let disp = ctx.consume_word(guest_ptr, ext_words) as i16 as i32;
            emit_sized_store(buf, size, base, src, disp);
        }
        EaMode::Indexed(n) => {
            let base = ctx.ra.map(buf, GuestReg::a(n))?;
            let addr = compute_indexed_address(buf, ctx, Some(base), guest_ptr, ext_words)?;
            emit_sized_store(buf, size, addr, src, 0);
            ctx.ra.free(buf, Some(addr));
        }
        EaMode::AbsShort => {
            let word = ctx.consume_word(guest_ptr, ext_words) as i16 as i32 as u32;
            let base = ctx.ra.alloc_scratch(buf)?;
            emit_mov_imm32(buf, base, word);
            emit_sized_store(buf, size, base, src, 0);
            ctx.ra.free(buf, Some(base));
        }
        EaMode::AbsLong => {
            let hi = ctx.consume_word(guest_ptr, ext_words);
            let lo = ctx.consume_word(guest_ptr, ext_words);
            let addr = (u32::from(hi) << 16) | u32::from(lo);
            let base = ctx.ra.alloc_scratch(buf)?;
            emit_mov_imm32(buf, base, addr);
            emit_sized_store(buf, size, base, src, 0);
            ctx.ra.free(buf, Some(base));
        }
        EaMode::PcDisp | EaMode::PcIndex | EaMode::Immediate => {
            return Err(TranslateError::InvalidEaSize { mode: ea, size });
        }
    }

    Ok(())
}

/// Computes `base + index*scale [+ base/outer displacement, with optional
/// memory indirection]` into a freshly allocated host register, handling
/// both brief (bit 8 clear) and full (bit 8 set) extension-word formats.
/// `base` is `None` when the full-format base-suppress bit is set (the
/// caller never passes `None` for the brief format, which has no base
/// suppress).
pub(crate) fn compute_indexed_address(
    buf: &mut CodeBuffer,
    ctx: &mut TranslationContext,
    base: Option<HostReg>,
    guest_ptr: &mut u32,
    ext_words: &mut u8,
) -> Result<HostReg> {
    let ext = ExtWord { raw: ctx.consume_word(guest_ptr, ext_words) };

    if !ext.is_full() {
        // Brief format: base + sign/zero-extended index<<scale + disp8.
        let addr = base.expect("brief format always carries a base register");
        let index = load_index_operand(buf, ctx, ext)?;
        let result = ctx.ra.alloc_scratch(buf)?;
        match index {
            Some(idx) => buf.push(arm64::add_reg(result.0, addr.0, idx.0, Shift::Lsl, ext.scale_shift())),
            None => buf.push(arm64::mov_reg(result.0, addr.0)),
        }
        if let Some(idx) = index {
            ctx.ra.free(buf, Some(idx));
        }
        let disp = ext.brief_disp();
        if disp != 0 {
            emit_add_imm32(buf, ctx, result, disp)?;
        }
        return Ok(result);
    }

    // Full format.
    let base_reg = if ext.base_suppress() {
        None
    } else {
        Some(base.expect("full format with base in use always carries a base register"))
    };
    let index = if ext.index_suppress() { None } else { load_index_operand(buf, ctx, ext)? };

    let bd: i32 = match ext.bd_size() {
        2 => {
            let w = ctx.consume_word(guest_ptr, ext_words);
            w as i16 as i32
        }
        3 => {
            let hi = ctx.consume_word(guest_ptr, ext_words);
            let lo = ctx.consume_word(guest_ptr, ext_words);
            ((u32::from(hi) << 16) | u32::from(lo)) as i32
        }
        _ => 0,
    };

    let result = ctx.ra.alloc_scratch(buf)?;
    match base_reg {
        Some(b) => emit_add_imm32_into(buf, result, b, bd),
        None => emit_mov_imm32(buf, result, bd as u32),
    }

    let preindexed = matches!(ext.iis(), 1 | 2 | 3);
    let postindexed = matches!(ext.iis(), 5 | 6 | 7);

    if preindexed {
        if let Some(idx) = index {
            buf.push(arm64::add_reg(result.0, result.0, idx.0, Shift::Lsl, ext.scale_shift()));
        }
        // Memory indirection: *result -> result.
        buf.push(arm64::ldr_offset(result.0, result.0, 0));
    }

    let od: i32 = match ext.iis() & 3 {
        2 => {
            let w = ctx.consume_word(guest_ptr, ext_words);
            w as i16 as i32
        }
        3 => {
            let hi = ctx.consume_word(guest_ptr, ext_words);
            let lo = ctx.consume_word(guest_ptr, ext_words);
            ((u32::from(hi) << 16) | u32::from(lo)) as i32
        }
        _ => 0,
    };

    if preindexed {
        if od != 0 {
            emit_add_imm32(buf, ctx, result, od)?;
        }
    } else if postindexed {
        buf.push(arm64::ldr_offset(result.0, result.0, 0));
        if let Some(idx) = index {
            buf.push(arm64::add_reg(result.0, result.0, idx.0, Shift::Lsl, ext.scale_shift()));
        }
        if od != 0 {
            emit_add_imm32(buf, ctx, result, od)?;
        }
    } else if let Some(idx) = index {
        // No memory indirection (iis == 0): index applies directly.
        buf.push(arm64::add_reg(result.0, result.0, idx.0, Shift::Lsl, ext.scale_shift()));
    }

    if let Some(idx) = index {
        ctx.ra.free(buf, Some(idx));
    }

    Ok(result)
}

/// Loads and, if necessary, sign/zero-extends the index operand named by
/// an extension word, per the "when bit 11 is 0, the low 16 bits of the
/// index register are sign-extended to 32 before scaling" rule.
fn load_index_operand(buf: &mut CodeBuffer, ctx: &mut TranslationContext, ext: ExtWord) -> Result<Option<HostReg>> {
    let mapped = ctx.ra.map(buf, ext.index_reg())?;
    if ext.index_is_long() {
        Ok(Some(mapped))
    } else {
        let tmp = ctx.ra.alloc_scratch(buf)?;
        buf.push(arm64::sxth(tmp.0, mapped.0));
        Ok(Some(tmp))
    }
}

fn load_absolute(buf: &mut CodeBuffer, ctx: &mut TranslationContext, size: Size, sign_extend: bool, addr: u32, dst: HostReg) -> Result<()> {
    let base = ctx.ra.alloc_scratch(buf)?;
    emit_mov_imm32(buf, base, addr);
    emit_sized_load(buf, size, sign_extend, base, dst, 0);
    ctx.ra.free(buf, Some(base));
    Ok(())
}

/// Emits one load of `size` bytes from `[base, #disp]` into `dst`.
///
/// Used for every addressing mode that does not fold its register update
/// into the load itself: `Indirect`/`Disp`/`Indexed`/absolute addressing,
/// and the sign-extending flavor of mode 3/4 (post-increment/
/// pre-decrement), for which AArch64 has no signed pre/post-index load —
/// see [`emit_sized_load_postindex`]/[`emit_sized_load_preindex`] for the
/// unsigned mode 3/4 case, which folds the `(An)+`/`-(An)` side effect
/// into the load's own writeback.
pub(crate) fn emit_sized_load(buf: &mut CodeBuffer, size: Size, sign_extend: bool, base: HostReg, dst: HostReg, disp: i32) {
    match size {
        Size::Byte => {
            if sign_extend {
                buf.push(arm64::ldursb_offset(dst.0, base.0, disp));
            } else {
                buf.push(arm64::ldurb_offset(dst.0, base.0, disp));
            }
        }
        Size::Word => {
            if sign_extend {
                buf.push(arm64::ldursh_offset(dst.0, base.0, disp));
            } else {
                buf.push(arm64::ldurh_offset(dst.0, base.0, disp));
            }
        }
        Size::Long | Size::AddressOnly => {
            buf.push(arm64::ldur_offset(dst.0, base.0, disp));
        }
    }
}

pub(crate) fn emit_sized_store(buf: &mut CodeBuffer, size: Size, base: HostReg, src: HostReg, disp: i32) {
    match size {
        Size::Byte => buf.push(arm64::sturb_offset(src.0, base.0, disp)),
        Size::Word => buf.push(arm64::sturh_offset(src.0, base.0, disp)),
        Size::Long | Size::AddressOnly => buf.push(arm64::stur_offset(src.0, base.0, disp)),
    }
}

/// Loads `size` bytes from `[base]` into `dst`, then advances `base` by
/// `imm` as part of the same instruction (AArch64 post-index writeback) —
/// the `(An)+` side effect folded into the load rather than emitted as a
/// separate `add_immed`.
pub(crate) fn emit_sized_load_postindex(buf: &mut CodeBuffer, size: Size, base: HostReg, dst: HostReg, imm: i32) {
    match size {
        Size::Byte => buf.push(arm64::ldrb_offset_postindex(dst.0, base.0, imm)),
        Size::Word => buf.push(arm64::ldrh_offset_postindex(dst.0, base.0, imm)),
        Size::Long | Size::AddressOnly => buf.push(arm64::ldr_offset_postindex(dst.0, base.0, imm)),
    }
}

/// Advances `base` by `imm` (normally negative), then loads `size` bytes
/// from the updated address into `dst`, as one instruction (AArch64
/// pre-index writeback) — the `-(An)` side effect folded into the load.
pub(crate) fn emit_sized_load_preindex(buf: &mut CodeBuffer, size: Size, base: HostReg, dst: HostReg, imm: i32) {
    match size {
        Size::Byte => buf.push(arm64::ldrb_offset_preindex(dst.0, base.0, imm)),
        Size::Word => buf.push(arm64::ldrh_offset_preindex(dst.0, base.0, imm)),
        Size::Long | Size::AddressOnly => buf.push(arm64::ldr_offset_preindex(dst.0, base.0, imm)),
    }
}

/// Stores `size` bytes of `src` to `[base]`, then advances `base` by `imm`
/// as part of the same instruction — the store-side counterpart of
/// [`emit_sized_load_postindex`].
pub(crate) fn emit_sized_store_postindex(buf: &mut CodeBuffer, size: Size, base: HostReg, src: HostReg, imm: i32) {
    match size {
        Size::Byte => buf.push(arm64::strb_offset_postindex(src.0, base.0, imm)),
        Size::Word => buf.push(arm64::strh_offset_postindex(src.0, base.0, imm)),
        Size::Long | Size::AddressOnly => buf.push(arm64::str_offset_postindex(src.0, base.0, imm)),
    }
}

/// Advances `base` by `imm` (normally negative), then stores `size` bytes
/// of `src` to the updated address — the store-side counterpart of
/// [`emit_sized_load_preindex`].
pub(crate) fn emit_sized_store_preindex(buf: &mut CodeBuffer, size: Size, base: HostReg, src: HostReg, imm: i32) {
    match size {
        Size::Byte => buf.push(arm64::strb_offset_preindex(src.0, base.0, imm)),
        Size::Word => buf.push(arm64::strh_offset_preindex(src.0, base.0, imm)),
        Size::Long | Size::AddressOnly => buf.push(arm64::str_offset_preindex(src.0, base.0, imm)),
    }
}

/// Writes only the low `size` bits of `src` into `dst`, per spec §4.F's
/// "sign-preservation at bitfield write": the upper bits of `dst` (a guest
/// Dn) are never clobbered.
fn emit_bitfield_writeback(buf: &mut CodeBuffer, size: Size, dst: HostReg, src: HostReg) {
    match size {
        Size::Byte => buf.push(arm64::bfi(dst.0, src.0, 0, 8)),
        Size::Word => buf.push(arm64::bfi(dst.0, src.0, 0, 16)),
        Size::Long | Size::AddressOnly => buf.push(arm64::mov_reg(dst.0, src.0)),
    }
}

/// Materializes a full 32-bit constant into `dst` using the
/// `mov_immed_u16`/`movt_immed_u16` pair, skipping the `movt` when the
/// upper half is zero.
pub(crate) fn emit_mov_imm32(buf: &mut CodeBuffer, dst: HostReg, value: u32) {
    buf.push(arm64::mov_immed_u16(dst.0, (value & 0xffff) as u16));
    if value >> 16 != 0 {
        buf.push(arm64::movt_immed_u16(dst.0, (value >> 16) as u16));
    }
}

/// `dst = dst + imm32`, materializing a negative immediate via `sub_immed`
/// when that is the more compact encoding, matching the source's pattern
/// of choosing `add_immed`/`sub_immed` by the sign of the displacement.
/// Unlike [`emit_add_imm32_into`], `dst` already holds a live accumulated
/// address here, so the oversized-immediate fallback must build the
/// constant in a separate scratch register rather than overwriting `dst`
/// in place before adding it to itself.
fn emit_add_imm32(buf: &mut CodeBuffer, ctx: &mut TranslationContext, dst: HostReg, imm: i32) -> Result<()> {
    if (0..4096).contains(&imm) {
        buf.push(arm64::add_immed(dst.0, dst.0, imm as u32));
    } else if (-4095..0).contains(&imm) {
        buf.push(arm64::sub_immed(dst.0, dst.0, (-imm) as u32));
    } else {
        let tmp = ctx.ra.alloc_scratch(buf)?;
        emit_mov_imm32(buf, tmp, imm as u32);
        buf.push(arm64::add_reg(dst.0, dst.0, tmp.0, Shift::Lsl, 0));
        ctx.ra.free(buf, Some(tmp));
    }
    Ok(())
}

/// `dst = base + imm32`, with `dst` assumed to hold no value the caller
/// still needs (it is about to be overwritten either way), so the
/// oversized-immediate fallback may freely build the constant in `dst`
/// itself before adding `base`.
fn emit_add_imm32_into(buf: &mut CodeBuffer, dst: HostReg, base: HostReg, imm: i32) {
    if (0..4096).contains(&imm) {
        buf.push(arm64::add_immed(dst.0, base.0, imm as u32));
    } else if (-4095..0).contains(&imm) {
        buf.push(arm64::sub_immed(dst.0, base.0, (-imm) as u32));
    } else {
        emit_mov_imm32(buf, dst, imm as u32);
        buf.push(arm64::add_reg(dst.0, dst.0, base.0, Shift::Lsl, 0));
    }
}

/// Counts the extension words a single EA occupies, given the raw
/// instruction-word stream starting just past the opcode word (component
/// H). Reads directly from `stream`, never through [`crate::icache::ICache`]
/// — this is a pure decode used by callers (e.g. `M68K_GetLine9Length`'s
/// Rust counterpart) that must compute an instruction's total length
/// without emitting any host code or touching the translation context.
#[must_use]
pub fn ea_length_words(stream: &[u16], ea: u8, size: Size) -> u8 {
    let Some(mode) = EaMode::decode(ea) else { return 0 };
    match mode {
        EaMode::DataReg(_) | EaMode::AddrReg(_) | EaMode::Indirect(_) | EaMode::PostInc(_) | EaMode::PreDec(_) => 0,
        EaMode::Disp(_) | EaMode::PcDisp => 1,
        EaMode::Indexed(_) | EaMode::PcIndex => ext_word_length(stream, 0),
        EaMode::AbsShort => 1,
        EaMode::AbsLong => 2,
        EaMode::Immediate => match size {
            Size::Byte | Size::Word => 1,
            Size::Long | Size::AddressOnly => 2,
        },
    }
}

/// Counts the words a brief/full extension word at `stream[idx]` occupies,
/// including any base/outer displacement words it carries. Mirrors the
/// word-counting embedded in [`compute_indexed_address`], kept separate
/// because that function also emits host code and this one must not.
fn ext_word_length(stream: &[u16], idx: usize) -> u8 {
    let Some(&raw) = stream.get(idx) else { return 1 };
    let ext = ExtWord { raw };
    let mut words = 1u8;
    if ext.is_full() {
        words += match ext.bd_size() {
            2 => 1,
            3 => 2,
            _ => 0,
        };
        let preindexed = matches!(ext.iis(), 1 | 2 | 3);
        let postindexed = matches!(ext.iis(), 5 | 6 | 7);
        if preindexed || postindexed {
            words += match ext.iis() & 3 {
                2 => 1,
                3 => 2,
                _ => 0,
            };
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullDiagnostics;
    use crate::icache::FlatICache;

    fn ctx<'a>(icache: &'a FlatICache<'a>, diag: &'a mut NullDiagnostics) -> TranslationContext<'a> {
        TranslationContext::new(0x1000, icache, diag)
    }

    #[test]
    fn decode_covers_all_modes() {
        assert_eq!(EaMode::decode(0b000_000), Some(EaMode::DataReg(0)));
        assert_eq!(EaMode::decode(0b001_011), Some(EaMode::AddrReg(3)));
        assert_eq!(EaMode::decode(0b111_000), Some(EaMode::AbsShort));
        assert_eq!(EaMode::decode(0b111_100), Some(EaMode::Immediate));
        assert_eq!(EaMode::decode(0b111_101), None);
    }

    #[test]
    fn dn_addressonly_is_an_invalid_ea_size() {
        let cache = FlatICache::new(&[]);
        let mut diag = NullDiagnostics;
        let mut tctx = ctx(&cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut arm_reg = None;
        let mut guest_ptr = 0x1002;
        let mut ext_words = 0;
        let mut imm_offset = None;
        let result = load_from_effective_address(
            &mut buf,
            &mut tctx,
            Size::AddressOnly,
            false,
            &mut arm_reg,
            0b000_000, // Dn, n=0
            &mut guest_ptr,
            &mut ext_words,
            true,
            &mut imm_offset,
        );
        assert_eq!(result, Err(TranslateError::InvalidEaSize { mode: 0, size: Size::AddressOnly }));
    }

    #[test]
    fn postinc_a7_byte_increments_by_two() {
        let cache = FlatICache::new(&[]);
        let mut diag = NullDiagnostics;
        let mut tctx = ctx(&cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut arm_reg = None;
        let mut guest_ptr = 0x1002;
        let mut ext_words = 0;
        let mut imm_offset = None;
        load_from_effective_address(
            &mut buf,
            &mut tctx,
            Size::Byte,
            false,
            &mut arm_reg,
            0b011_111, // (A7)+
            &mut guest_ptr,
            &mut ext_words,
            true,
            &mut imm_offset,
        )
        .unwrap();
        // The byte load and the +2 pointer bump fold into one post-index
        // LDRB, so the buffer holds exactly that instruction.
        let a7 = tctx.ra.snapshot()[8 + 7].unwrap();
        let dst = arm_reg.expect("a destination register was allocated");
        assert_eq!(buf.as_slice(), &[arm64::ldrb_offset_postindex(dst.0, a7.0, 2)]);
    }

    #[test]
    fn disp_mode_consumes_exactly_one_extension_word() {
        let cache = FlatICache::new(&[0x00, 0x04]); // displacement +4
        let mut diag = NullDiagnostics;
        let mut tctx = ctx(&cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut arm_reg = None;
        let mut guest_ptr = 0;
        let mut ext_words = 0;
        let mut imm_offset = None;
        load_from_effective_address(
            &mut buf,
            &mut tctx,
            Size::Long,
            false,
            &mut arm_reg,
            0b101_000, // (d16,A0)
            &mut guest_ptr,
            &mut ext_words,
            true,
            &mut imm_offset,
        )
        .unwrap();
        assert_eq!(ext_words, 1);
        assert_eq!(guest_ptr, 2);
    }

    #[test]
    fn immediate_offset_shortcut_avoids_a_temporary_add() {
        let cache = FlatICache::new(&[0x00, 0x08]);
        let mut diag = NullDiagnostics;
        let mut tctx = ctx(&cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut arm_reg = None;
        let mut guest_ptr = 0;
        let mut ext_words = 0;
        let mut imm_offset = Some(0);
        load_from_effective_address(
            &mut buf,
            &mut tctx,
            Size::AddressOnly,
            false,
            &mut arm_reg,
            0b101_001, // (d16,A1)
            &mut guest_ptr,
            &mut ext_words,
            true,
            &mut imm_offset,
        )
        .unwrap();
        assert!(buf.is_empty());
        assert_eq!(imm_offset, Some(8));
    }

    #[test]
    fn length_probe_agrees_with_register_direct_modes() {
        assert_eq!(ea_length_words(&[], 0b000_011, Size::Long), 0); // Dn
        assert_eq!(ea_length_words(&[], 0b011_010, Size::Long), 0); // (A2)+
    }

    #[test]
    fn length_probe_counts_one_word_for_disp_and_abs_short() {
        assert_eq!(ea_length_words(&[0x0010], 0b101_000, Size::Word), 1); // (d16,A0)
        assert_eq!(ea_length_words(&[0x1000], 0b111_000, Size::Word), 1); // abs.W
    }

    #[test]
    fn length_probe_counts_two_words_for_abs_long_and_long_immediate() {
        assert_eq!(ea_length_words(&[0, 0], 0b111_001, Size::Long), 2); // abs.L
        assert_eq!(ea_length_words(&[0, 0], 0b111_100, Size::Long), 2); // #imm.L
        assert_eq!(ea_length_words(&[0], 0b111_100, Size::Word), 1); // #imm.W
    }

    #[test]
    fn length_probe_brief_indexed_is_one_word() {
        // Brief extension word: bit 8 (0x0100) clear.
        assert_eq!(ea_length_words(&[0x0000], 0b110_011, Size::Long), 1);
    }

    #[test]
    fn length_probe_full_indexed_adds_base_and_outer_displacement_words() {
        // Full format (bit 8 set), bd_size = 3 (long, +2 words), iis = 2
        // (preindexed, word outer displacement, +1 word): 1 + 2 + 1 = 4.
        let ext = 0x0100 | (0b11 << 4) | 0b010;
        assert_eq!(ea_length_words(&[ext, 0, 0, 0], 0b110_100, Size::Long), 4);
    }
}
