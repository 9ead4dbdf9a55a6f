//! Virtual-to-host register allocator.
//!
//! Binds the sixteen guest registers (D0-D7, A0-A7) plus the CCR to
//! physical AArch64 registers for the lifetime of one translated block.
//! Grounded on the EA generator's `RA_MapM68kRegister` / `RA_AllocARMRegister`
//! / `RA_FreeARMRegister` / `RA_SetDirtyM68kRegister` call sites throughout
//! `M68k_EA.c` and `M68k_LINE9.c` — this module gives those call sites a
//! typed Rust home instead of a global C table.

use crate::arm64;
use crate::buffer::CodeBuffer;
use crate::error::{Result, TranslateError};

/// The AArch64 register holding the CPU context pointer (see
/// [`HostReg`]'s doc comment): every guest-register fill/spill this
/// allocator emits addresses the guest register file through this base.
const CTX_PTR_REG: u8 = 19;

/// Byte offset of guest slot `slot` within the register file `CTX_PTR_REG`
/// points at. Each of the seventeen guest slots (D0-D7, A0-A7, CCR) gets an
/// 8-byte-aligned doubleword, matching this allocator's 64-bit host
/// registers rather than the guest's native 32-bit width, so fills/spills
/// are a single `ldr`/`str` with no sub-register aliasing to worry about.
const fn guest_regfile_offset(slot: usize) -> u32 {
    (slot as u32) * 8
}

/// A guest register identity: the sixteen D/A registers plus the CCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestReg {
    D(u8),
    A(u8),
    Ccr,
}

impl GuestReg {
    /// Decode a 3-bit data-register field.
    #[must_use]
    pub const fn d(n: u8) -> Self {
        Self::D(n & 7)
    }

    /// Decode a 3-bit address-register field.
    #[must_use]
    pub const fn a(n: u8) -> Self {
        Self::A(n & 7)
    }

    /// Decode a combined 4-bit D/A register field as used by EA mode/register
    /// pairs (0-7 = Dn, 8-15 = An).
    #[must_use]
    pub const fn from_da(n: u8) -> Self {
        if n < 8 { Self::D(n) } else { Self::A(n - 8) }
    }

    fn slot(self) -> usize {
        match self {
            Self::D(n) => n as usize,
            Self::A(n) => 8 + n as usize,
            Self::Ccr => 16,
        }
    }
}

/// A physical AArch64 general-purpose register (X0-X15 in this
/// translator's allocatable pool; X16-X18 are linker/platform scratch and
/// X19 holds the CPU context pointer, both reserved outside the allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostReg(pub u8);

impl HostReg {
    #[must_use]
    pub const fn encoding(self) -> u32 {
        self.0 as u32
    }
}

const NUM_HOST_REGS: usize = 16;
const NUM_GUEST_SLOTS: usize = 17; // D0-D7, A0-A7, CCR

/// What a physical host register currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Free,
    Guest(GuestReg),
    /// A scratch register with no guest identity (`AllocHostReg`).
    Scratch,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    occupant: Occupant,
    dirty: bool,
}

impl Default for Binding {
    fn default() -> Self {
        Self { occupant: Occupant::Free, dirty: false }
    }
}

/// The virtual-to-host register allocator (component B).
///
/// `map[slot]` gives the host register currently holding guest slot
/// `slot`, if mapped. `bindings[reg]` gives the reverse mapping plus dirty
/// state. A host register not currently bound to any guest register is
/// free and available for scratch allocation.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    map: [Option<HostReg>; NUM_GUEST_SLOTS],
    bindings: [Binding; NUM_HOST_REGS],
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: [None; NUM_GUEST_SLOTS],
            bindings: [Binding::default(); NUM_HOST_REGS],
        }
    }

    fn first_free(&self) -> Option<usize> {
        self.bindings.iter().position(|b| b.occupant == Occupant::Free)
    }

    /// Spill the first non-free guest binding to make room for a new
    /// allocation. A dirty binding is written back to the guest register
    /// file before its host register is relinquished — otherwise the
    /// pending write this binding represents would simply vanish. Scratch
    /// registers are never spilled — a live scratch register is, by
    /// construction, still in use by its owner on the current call stack.
    fn spill_one(&mut self, buf: &mut CodeBuffer) -> Option<usize> {
        for (idx, binding) in self.bindings.iter_mut().enumerate() {
            if let Occupant::Guest(guest) = binding.occupant {
                if binding.dirty {
                    buf.push(arm64::str_offset(idx as u8, CTX_PTR_REG, guest_regfile_offset(guest.slot())));
                }
                self.map[guest.slot()] = None;
                binding.occupant = Occupant::Free;
                binding.dirty = false;
                return Some(idx);
            }
        }
        None
    }

    /// `MapGuestReg(i) -> host_reg`: returns the host register currently
    /// representing guest register `i`, mapping it if necessary. A freshly
    /// mapped register is filled with an `ldr` from the guest register file
    /// at `ctx_ptr + slot*8`. Idempotent within a block.
    pub fn map(&mut self, buf: &mut CodeBuffer, guest: GuestReg) -> Result<HostReg> {
        let slot = guest.slot();
        if let Some(host) = self.map[slot] {
            return Ok(host);
        }
        let idx = match self.first_free() {
            Some(idx) => idx,
            None => self.spill_one(buf).ok_or(TranslateError::RegisterExhausted)?,
        };
        self.bindings[idx] = Binding { occupant: Occupant::Guest(guest), dirty: false };
        self.map[slot] = Some(HostReg(idx as u8));
        buf.push(arm64::ldr_offset(idx as u8, CTX_PTR_REG, guest_regfile_offset(slot)));
        Ok(HostReg(idx as u8))
    }

    /// `MapGuestRegForWrite(i) -> host_reg`: like [`Self::map`], but marks
    /// the binding dirty immediately since the caller intends to overwrite
    /// it without first reading the old value. Still goes through the same
    /// fill on first mapping: several callers only overwrite part of the
    /// register (e.g. a byte-sized `BFI` writeback), so the untouched upper
    /// bits must already hold the guest's real value.
    pub fn map_for_write(&mut self, buf: &mut CodeBuffer, guest: GuestReg) -> Result<HostReg> {
        let host = self.map(buf, guest)?;
        self.set_dirty(guest);
        Ok(host)
    }

    /// `CopyFromGuestReg(i) -> host_reg`: allocates a fresh scratch register
    /// and copies guest `i`'s current host register into it. The emitter
    /// is responsible for actually issuing the copy instruction; this only
    /// performs the bookkeeping allocation. Returns both the source (the
    /// existing mapping for `guest`) and the freshly allocated destination.
    pub fn copy_from(&mut self, buf: &mut CodeBuffer, guest: GuestReg) -> Result<(HostReg, HostReg)> {
        let src = self.map(buf, guest)?;
        let dst = self.alloc_scratch(buf)?;
        Ok((src, dst))
    }

    /// `AllocHostReg() -> host_reg`: a scratch register not bound to any
    /// guest register. Must be freed with [`Self::free`].
    pub fn alloc_scratch(&mut self, buf: &mut CodeBuffer) -> Result<HostReg> {
        let idx = match self.first_free() {
            Some(idx) => idx,
            None => self.spill_one(buf).ok_or(TranslateError::RegisterExhausted)?,
        };
        self.bindings[idx] = Binding { occupant: Occupant::Scratch, dirty: false };
        Ok(HostReg(idx as u8))
    }

    /// `FreeHostReg(r)`: returns `r` to the free pool, writing back first if
    /// it is a dirty guest binding. A no-op if `r` is `None`, replacing the
    /// source's "tolerant of sentinel `UNALLOC`" idiom with a genuinely
    /// optional parameter.
    pub fn free(&mut self, buf: &mut CodeBuffer, reg: Option<HostReg>) {
        let Some(reg) = reg else { return };
        let idx = reg.0 as usize;
        if let Occupant::Guest(guest) = self.bindings[idx].occupant {
            if self.bindings[idx].dirty {
                buf.push(arm64::str_offset(idx as u8, CTX_PTR_REG, guest_regfile_offset(guest.slot())));
            }
            self.map[guest.slot()] = None;
        }
        self.bindings[idx] = Binding::default();
    }

    /// `SetDirty(i)`: marks guest register `i` as needing writeback. The
    /// register must already be mapped.
    pub fn set_dirty(&mut self, guest: GuestReg) {
        if let Some(host) = self.map[guest.slot()] {
            self.bindings[host.0 as usize].dirty = true;
        }
    }

    #[must_use]
    pub fn is_dirty(&self, guest: GuestReg) -> bool {
        self.map[guest.slot()]
            .map(|host| self.bindings[host.0 as usize].dirty)
            .unwrap_or(false)
    }

    /// `GetCC() -> host_reg`: read-only view of the CCR host register.
    pub fn get_cc(&mut self, buf: &mut CodeBuffer) -> Result<HostReg> {
        self.map(buf, GuestReg::Ccr)
    }

    /// `ModifyCC() -> host_reg`: read/write view of the CCR host register;
    /// implies a pending writeback.
    pub fn modify_cc(&mut self, buf: &mut CodeBuffer) -> Result<HostReg> {
        self.map_for_write(buf, GuestReg::Ccr)
    }

    /// True if no guest register remains mapped and no dirty bit is set —
    /// the allocator-state-identity half of invariant §8.3 ("pre- and
    /// post-allocator-state are identical").
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.bindings.iter().all(|b| b.occupant == Occupant::Free && !b.dirty)
    }

    /// Snapshot used by property tests to assert invariant §8.3 across a
    /// handler invocation (every allocation freed before the handler returns).
    #[must_use]
    pub fn snapshot(&self) -> [Option<HostReg>; NUM_GUEST_SLOTS] {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_is_idempotent_within_a_block() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let r1 = ra.map(&mut buf, GuestReg::d(0)).unwrap();
        let r2 = ra.map(&mut buf, GuestReg::d(0)).unwrap();
        assert_eq!(r1, r2);
        // Idempotent remap must not re-issue the fill.
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn distinct_guest_regs_never_alias() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let d0 = ra.map(&mut buf, GuestReg::d(0)).unwrap();
        let d1 = ra.map(&mut buf, GuestReg::d(1)).unwrap();
        assert_ne!(d0, d1);
    }

    #[test]
    fn map_emits_a_fill_load_from_the_context_pointer() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let d0 = ra.map(&mut buf, GuestReg::d(0)).unwrap();
        assert_eq!(buf.as_slice(), &[arm64::ldr_offset(d0.0, CTX_PTR_REG, 0)]);
    }

    #[test]
    fn free_is_a_no_op_on_none() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        ra.free(&mut buf, None);
        assert!(ra.is_quiescent());
        assert!(buf.is_empty());
    }

    #[test]
    fn freeing_a_dirty_guest_binding_emits_a_spill_store() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let reg = ra.map_for_write(&mut buf, GuestReg::a(3)).unwrap();
        ra.free(&mut buf, Some(reg));
        let expected_offset = guest_regfile_offset(GuestReg::a(3).slot());
        assert_eq!(*buf.as_slice().last().unwrap(), arm64::str_offset(reg.0, CTX_PTR_REG, expected_offset));
    }

    #[test]
    fn freeing_a_clean_guest_binding_emits_no_store() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let reg = ra.map(&mut buf, GuestReg::d(1)).unwrap();
        let words_before = buf.len();
        ra.free(&mut buf, Some(reg));
        assert_eq!(buf.len(), words_before);
    }

    #[test]
    fn mapping_spills_a_guest_register_when_the_file_is_full_of_guests() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        for i in 0..16u8 {
            ra.map(&mut buf, GuestReg::d(i % 8)).unwrap();
            ra.map(&mut buf, GuestReg::a(i % 8)).unwrap();
        }
        // All 16 host registers are now bound to D/A guest registers; a
        // further guest mapping must spill one of them rather than erroring.
        assert!(ra.map(&mut buf, GuestReg::Ccr).is_ok());
    }

    #[test]
    fn spilling_a_dirty_guest_register_writes_it_back_before_reuse() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        for i in 0..8u8 {
            ra.map_for_write(&mut buf, GuestReg::d(i)).unwrap();
            ra.map_for_write(&mut buf, GuestReg::a(i)).unwrap();
        }
        // Every binding is dirty; mapping one more guest register must
        // spill (and thus writeback) one of them instead of discarding it.
        // `spill_one` always evicts the first occupied binding, host
        // register 0 (D0, mapped first above).
        let words_before = buf.len();
        ra.map(&mut buf, GuestReg::Ccr).unwrap();
        let emitted = &buf.as_slice()[words_before..];
        assert_eq!(emitted[0], arm64::str_offset(0, CTX_PTR_REG, guest_regfile_offset(GuestReg::d(0).slot())));
        assert_eq!(emitted[1], arm64::ldr_offset(0, CTX_PTR_REG, guest_regfile_offset(GuestReg::Ccr.slot())));
    }

    #[test]
    fn scratch_registers_are_never_spilled() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let mut scratch = Vec::new();
        for _ in 0..16u8 {
            scratch.push(ra.alloc_scratch(&mut buf).unwrap());
        }
        // Every host register is held by a live scratch allocation; a
        // guest mapping has nothing left to spill and must report
        // exhaustion rather than silently evicting a scratch register
        // some caller still holds a reference to.
        assert_eq!(ra.map(&mut buf, GuestReg::d(0)), Err(TranslateError::RegisterExhausted));
    }

    #[test]
    fn dirty_tracks_writes_and_clears_on_free() {
        let mut ra = RegisterAllocator::new();
        let mut buf = CodeBuffer::new();
        let reg = ra.map_for_write(&mut buf, GuestReg::d(2)).unwrap();
        assert!(ra.is_dirty(GuestReg::d(2)));
        ra.free(&mut buf, Some(reg));
        assert!(ra.is_quiescent());
    }
}
