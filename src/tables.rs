//! Opcode descriptor tables and per-family entry points (components F/G/H).
//!
//! Grounded on `M68k_LINE9.c`/`M68k_LINEB.c`'s `InsnTable`: a fixed array,
//! indexed by the low 9 bits of the opcode (`opcode & 0o777`), of rows
//! naming a handler plus the `sr_needs`/`sr_sets`/`base_length`/`has_ea`/
//! `op_size` metadata `GetSR_line9`/`GetSR_lineB` and
//! `M68K_GetLine9Length`/`M68K_GetLineBLength` read back *without* running
//! the handler. The source builds this array once, at link time, with
//! range-fill initializers (`[0000 ... 0007] = {...}`); this crate gets the
//! same "512-entry array keyed by the low 9 bits" shape (spec §4.G) from a
//! pure `const fn`-free decode function run per lookup instead of a
//! constructed static, since the bit tests below are exactly the compact
//! source description the spec calls for and a per-lookup match costs
//! nothing a prebuilt array would save.
//!
//! Every row this crate actually reaches maps to a real instruction: unlike
//! some other line families, line-9 and line-B's entire 512-entry opcode
//! space decodes to *something* (SUB/SUBA/SUBX, CMP/CMPA/CMPM/EOR); what
//! varies row to row is only which handler and which EA shape, never
//! "undefined". EA shapes a given handler's row doesn't actually support
//! (e.g. a byte-sized `An` source) are rejected by the EA generator itself
//! at emission time (`TranslateError::InvalidEaSize`), not pre-filtered
//! here — exactly as the source leaves that check to `EMIT_LoadFromEffectiveAddress`
//! rather than duplicating it in the table.

use crate::buffer::CodeBuffer;
use crate::cc;
use crate::context::TranslationContext;
use crate::ea::{self, Size};
use crate::error::Result;
use crate::line9;
use crate::lineb;
use crate::trap;

/// An opcode-emitting handler, uniform across every table row. `SUBX` and
/// `CMPM` never consume an extension word, but are given the same
/// four-argument shape as every EA-bearing handler via a thin adapter
/// below, so one function-pointer type covers the whole table.
pub type Handler = fn(&mut CodeBuffer, &mut TranslationContext, u16, &mut u32) -> Result<()>;

/// One `InsnTable` row: the handler plus the static metadata
/// `GetSR_lineX`/`GetLineXLength` need without invoking it.
#[derive(Clone, Copy)]
pub struct OpcodeDescriptor {
    pub handler: Option<Handler>,
    pub sr_needs: u8,
    pub sr_sets: u8,
    pub base_length: u8,
    pub has_ea: bool,
    pub op_size: Size,
}

const SIZES: [Size; 3] = [Size::Byte, Size::Word, Size::Long];

fn subx_adapter(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, _guest_ptr: &mut u32) -> Result<()> {
    line9::emit_subx(buf, ctx, opcode)
}

fn cmpm_adapter(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, _guest_ptr: &mut u32) -> Result<()> {
    lineb::emit_cmpm(buf, ctx, opcode)
}

/// `InsnTable` row for line-9, keyed by `opcode & 0o777` (opmode in bits
/// 8..6, EA in bits 5..0). Mirrors the source's opmode split: 0/1/2 is
/// `SUB <ea>,Dn`; 3/7 is `SUBA`; 4/5/6 is either `SUBX` (EA bits read as
/// `Dy`/`-(Ay)` rather than a real EA, when the low 3 bits of the EA byte
/// select mode 0 or 1) or `SUB Dn,<ea>` otherwise.
#[must_use]
pub fn line9_descriptor(idx: u16) -> OpcodeDescriptor {
    let opmode = (idx >> 6) & 7;
    let ea = (idx & 0x3f) as u8;
    let ea_mode = (ea >> 3) & 7;

    match opmode {
        0 | 1 | 2 => OpcodeDescriptor {
            handler: Some(line9::emit_sub),
            sr_needs: 0,
            sr_sets: cc::CCR,
            base_length: 1,
            has_ea: true,
            op_size: SIZES[opmode as usize],
        },
        3 | 7 => OpcodeDescriptor {
            handler: Some(line9::emit_suba),
            sr_needs: 0,
            sr_sets: 0,
            base_length: 1,
            has_ea: true,
            op_size: if opmode == 3 { Size::Word } else { Size::Long },
        },
        4 | 5 | 6 if ea_mode == 0 || ea_mode == 1 => OpcodeDescriptor {
            handler: Some(subx_adapter),
            sr_needs: cc::XZ,
            sr_sets: cc::CCR,
            base_length: 1,
            has_ea: false,
            op_size: SIZES[(opmode - 4) as usize],
        },
        4 | 5 | 6 => OpcodeDescriptor {
            handler: Some(line9::emit_sub),
            sr_needs: 0,
            sr_sets: cc::CCR,
            base_length: 1,
            has_ea: true,
            op_size: SIZES[(opmode - 4) as usize],
        },
        _ => unreachable!("opmode is a 3-bit field"),
    }
}

/// `InsnTable` row for line-B. Opmode 0/1/2 is `CMP`; 3/7 is `CMPA`; 4/5/6
/// splits on the EA's mode field exactly like line-9's `SUBX` carve-out,
/// except the repurposed slot here (mode 1, `An`-direct — never a legal
/// `EOR` destination) is `CMPM`, not a register/register form of the same
/// handler.
#[must_use]
pub fn lineb_descriptor(idx: u16) -> OpcodeDescriptor {
    let opmode = (idx >> 6) & 7;
    let ea = (idx & 0x3f) as u8;
    let ea_mode = (ea >> 3) & 7;

    match opmode {
        0 | 1 | 2 => OpcodeDescriptor {
            handler: Some(lineb::emit_cmp),
            sr_needs: 0,
            sr_sets: cc::NZVC,
            base_length: 1,
            has_ea: true,
            op_size: SIZES[opmode as usize],
        },
        3 | 7 => OpcodeDescriptor {
            handler: Some(lineb::emit_cmpa),
            sr_needs: 0,
            sr_sets: cc::NZVC,
            base_length: 1,
            has_ea: true,
            op_size: if opmode == 3 { Size::Word } else { Size::Long },
        },
        4 | 5 | 6 if ea_mode == 1 => OpcodeDescriptor {
            handler: Some(cmpm_adapter),
            sr_needs: 0,
            sr_sets: cc::NZVC,
            base_length: 1,
            has_ea: false,
            op_size: SIZES[(opmode - 4) as usize],
        },
        4 | 5 | 6 => OpcodeDescriptor {
            handler: Some(lineb::emit_eor),
            sr_needs: 0,
            sr_sets: cc::NZVC,
            base_length: 1,
            has_ea: true,
            op_size: SIZES[(opmode - 4) as usize],
        },
        _ => unreachable!("opmode is a 3-bit field"),
    }
}

/// `EMIT_line9`: fetches the opcode word, looks up its row, and either runs
/// the handler or falls through to the shared illegal-instruction trap.
pub fn emit_line9(buf: &mut CodeBuffer, ctx: &mut TranslationContext, guest_ptr: &mut u32) -> Result<()> {
    let opcode = ctx.icache.read16(*guest_ptr);
    *guest_ptr += 2;
    dispatch(buf, ctx, opcode, guest_ptr, line9_descriptor)
}

/// `EMIT_lineB`, the line-B sibling of [`emit_line9`].
pub fn emit_lineb(buf: &mut CodeBuffer, ctx: &mut TranslationContext, guest_ptr: &mut u32) -> Result<()> {
    let opcode = ctx.icache.read16(*guest_ptr);
    *guest_ptr += 2;
    dispatch(buf, ctx, opcode, guest_ptr, lineb_descriptor)
}

fn dispatch(buf: &mut CodeBuffer, ctx: &mut TranslationContext, opcode: u16, guest_ptr: &mut u32, descriptor_of: fn(u16) -> OpcodeDescriptor) -> Result<()> {
    match descriptor_of(opcode & 0x1ff).handler {
        Some(handler) => handler(buf, ctx, opcode, guest_ptr),
        None => {
            trap::emit_illegal_instruction_trap(buf, ctx, opcode);
            Ok(())
        }
    }
}

/// `GetSR_line9`: `(sr_needs, sr_sets)` for `opcode`, without emitting
/// anything.
#[must_use]
pub fn get_sr_line9(opcode: u16) -> (u8, u8) {
    let d = line9_descriptor(opcode & 0x1ff);
    (d.sr_needs, d.sr_sets)
}

/// `GetSR_lineB`, the line-B sibling of [`get_sr_line9`].
#[must_use]
pub fn get_sr_lineb(opcode: u16) -> (u8, u8) {
    let d = lineb_descriptor(opcode & 0x1ff);
    (d.sr_needs, d.sr_sets)
}

/// `M68K_GetLine9Length`: total instruction length in 16-bit words (the
/// opcode word plus every extension word `ea_length_words` says this row's
/// EA shape consumes), given the raw word stream starting just past the
/// opcode.
#[must_use]
pub fn get_line9_length(stream: &[u16], opcode: u16) -> u8 {
    instruction_length(stream, opcode, line9_descriptor)
}

/// `M68K_GetLineBLength`, the line-B sibling of [`get_line9_length`].
#[must_use]
pub fn get_lineb_length(stream: &[u16], opcode: u16) -> u8 {
    instruction_length(stream, opcode, lineb_descriptor)
}

fn instruction_length(stream: &[u16], opcode: u16, descriptor_of: fn(u16) -> OpcodeDescriptor) -> u8 {
    let d = descriptor_of(opcode & 0x1ff);
    let ea_words = if d.has_ea { ea::ea_length_words(stream, (opcode & 0x3f) as u8, d.op_size) } else { 0 };
    d.base_length + ea_words
}

/// Top-level dispatch contract spanning all sixteen opcode-line families
/// (spec §6): the opcode's top nibble selects a family, and only line-9
/// and line-B have a real body here. Every other nibble falls through to
/// the same illegal-instruction trap the source's own per-family dispatch
/// functions emit for their own undefined rows — this is the "table/trait
/// without bodies" the other fourteen families are exposed as.
pub fn translate_one(buf: &mut CodeBuffer, ctx: &mut TranslationContext, guest_ptr: &mut u32) -> Result<()> {
    let opcode = ctx.icache.read16(*guest_ptr);
    match opcode >> 12 {
        0x9 => emit_line9(buf, ctx, guest_ptr),
        0xB => emit_lineb(buf, ctx, guest_ptr),
        _ => {
            *guest_ptr += 2;
            trap::emit_illegal_instruction_trap(buf, ctx, opcode);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostic, NullDiagnostics, RecordingDiagnostics};
    use crate::icache::FlatICache;

    fn ctx<'a>(icache: &'a FlatICache<'a>, diag: &'a mut NullDiagnostics) -> TranslationContext<'a> {
        TranslationContext::new(0x5000, icache, diag)
    }

    #[test]
    fn line9_descriptor_routes_subx_register_pair_without_ea() {
        // SUBX.B D1,D0 : opmode 100, ea = 000_001 (mode0, reg1).
        let idx = 0b100_000_001u16;
        let d = line9_descriptor(idx);
        assert!(!d.has_ea);
        assert_eq!(d.sr_needs, cc::XZ);
    }

    #[test]
    fn line9_descriptor_routes_plain_memory_destination_sub() {
        // SUB.W D1,(A2) : opmode 101, ea = 010_010 (mode2, reg2).
        let idx = 0b101_010_010u16;
        let d = line9_descriptor(idx);
        assert!(d.has_ea);
        assert_eq!(d.op_size.bits(), 16);
    }

    #[test]
    fn lineb_descriptor_routes_cmpm_out_of_the_eor_an_direct_slot() {
        // CMPM.L (A1)+,(A0)+ : opmode 110, ea = 001_001 (mode1, reg1).
        let idx = 0b110_001_001u16;
        let d = lineb_descriptor(idx);
        assert!(!d.has_ea);
        assert_eq!(d.sr_sets, cc::NZVC);
    }

    #[test]
    fn lineb_descriptor_routes_cmpa_long() {
        // CMPA.L <ea>,An : opmode 111.
        let idx = 0b111_000_000u16;
        let d = lineb_descriptor(idx);
        assert_eq!(d.op_size.bits(), 32);
        assert_eq!(d.sr_sets, cc::NZVC);
    }

    #[test]
    fn get_sr_line9_reports_zero_for_suba() {
        let opcode = 0b1001_000_011_111_100u16; // SUBA.W #imm,A0
        assert_eq!(get_sr_line9(opcode), (0, 0));
    }

    #[test]
    fn get_line9_length_counts_one_extension_word_for_disp_mode() {
        let stream = [0x0004u16];
        let opcode = 0b1001_000_000_101_000u16; // SUB.B (d16,A0),D0
        assert_eq!(get_line9_length(stream.as_slice(), opcode), 2);
    }

    #[test]
    fn translate_one_emits_the_trap_for_an_unimplemented_family() {
        let cache = FlatICache::new(&[0xC0, 0x00]); // line-C: not implemented here
        let mut diag = RecordingDiagnostics::default();
        let mut tctx = TranslationContext::new(0x5000, &cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut guest_ptr = 0;

        translate_one(&mut buf, &mut tctx, &mut guest_ptr).unwrap();

        assert_eq!(diag.events, vec![Diagnostic::IllegalOpcode { guest_pc: 0x5000, opcode: 0xC000 }]);
    }

    #[test]
    fn translate_one_dispatches_a_real_line9_opcode() {
        let cache = FlatICache::new(&[0x90, 0x41]); // SUB.W D1,D0
        let mut diag = NullDiagnostics;
        let mut tctx = ctx(&cache, &mut diag);
        let mut buf = CodeBuffer::new();
        let mut guest_ptr = 0;

        translate_one(&mut buf, &mut tctx, &mut guest_ptr).unwrap();

        assert_eq!(tctx.pc.current(), 0x5002);
    }
}
