//! The CPU-owned-by-reference translation context (DESIGN NOTES, "Global
//! mutable state"): the register allocator, PC discipline, and diagnostics
//! sink every emitter needs, threaded explicitly instead of living behind
//! the source's process-wide globals.
//!
//! The source's MMU/TLB scaffold (`include/mmu030.h`'s `emu_mmu_ld8/16/32`
//! et al.) has no counterpart here: every load/store this crate emits goes
//! directly against the identity-mapped context (`ldur`/`stur` off X19),
//! mirroring the direct-load path the source's own EA generator takes when
//! the MMU is disabled (see `DESIGN.md`).
use crate::diagnostics::Diagnostics;
use crate::icache::ICache;
use crate::pc::PcState;
use crate::regalloc::RegisterAllocator;

/// Everything one translation-unit invocation needs besides the host and
/// guest code buffers themselves.
pub struct TranslationContext<'a> {
    pub ra: RegisterAllocator,
    pub pc: PcState,
    pub icache: &'a dyn ICache,
    pub diagnostics: &'a mut dyn Diagnostics,
}

impl<'a> TranslationContext<'a> {
    pub fn new(entry_pc: u32, icache: &'a dyn ICache, diagnostics: &'a mut dyn Diagnostics) -> Self {
        Self { ra: RegisterAllocator::new(), pc: PcState::new(entry_pc), icache, diagnostics }
    }

    /// Reads the next guest word at `*guest_ptr` and advances it by 2,
    /// i.e. consumes one extension word. Mirrors the source's
    /// `*(*m68k_ptr)++` idiom at every `EMIT_*` call site.
    pub fn consume_word(&mut self, guest_ptr: &mut u32, ext_words: &mut u8) -> u16 {
        let word = self.icache.read16(*guest_ptr);
        *guest_ptr += 2;
        *ext_words += 1;
        word
    }
}
