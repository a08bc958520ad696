//! Register file with x86-style sub-register aliasing.
//!
//! Each thread owns 12 × 32-bit registers:
//!
//! | Index | Name | Purpose |
//! |-------|------|---------|
//! | 0-3 | EAX ECX EDX EBX | Accumulator-style general registers |
//! | 4-7 | ESP EBP ESI EDI | Stack/base pointers, index registers |
//! | 8 | EIP | Instruction pointer (informational) |
//! | 9 | EFLAGS | Flags word (informational) |
//! | 10-11 | CR0 CR1 | Control registers |
//!
//! The 16-bit names (AX..DI) view the low half-word of EAX..EDI, the low-byte
//! names (AL..BL) view bits 0..8 of EAX..EBX and the high-byte names (AH..BH)
//! view bits 8..16. Writes through an alias only touch the aliased bits.

use serde::Serialize;
use std::fmt;

/// Number of full-width registers per thread.
pub const NUM_REGS: usize = 12;

/// A full-width 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gpr {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
    Eip = 8,
    Eflags = 9,
    Cr0 = 10,
    Cr1 = 11,
}

impl Gpr {
    /// All registers in index order.
    pub const ALL: [Gpr; NUM_REGS] = [
        Gpr::Eax,
        Gpr::Ecx,
        Gpr::Edx,
        Gpr::Ebx,
        Gpr::Esp,
        Gpr::Ebp,
        Gpr::Esi,
        Gpr::Edi,
        Gpr::Eip,
        Gpr::Eflags,
        Gpr::Cr0,
        Gpr::Cr1,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Which bits of the owning register an alias covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegView {
    /// All 32 bits.
    Dword,
    /// Bits 0..16.
    Word,
    /// Bits 0..8.
    LowByte,
    /// Bits 8..16.
    HighByte,
}

/// Any register name an instruction can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Register {
    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
    Eip,
    Eflags,
    Cr0,
    Cr1,
    Ax,
    Cx,
    Dx,
    Bx,
    Sp,
    Bp,
    Si,
    Di,
    Al,
    Cl,
    Dl,
    Bl,
    Ah,
    Ch,
    Dh,
    Bh,
}

impl Register {
    const NAMES: [(Register, &'static str); 28] = [
        (Register::Eax, "EAX"),
        (Register::Ecx, "ECX"),
        (Register::Edx, "EDX"),
        (Register::Ebx, "EBX"),
        (Register::Esp, "ESP"),
        (Register::Ebp, "EBP"),
        (Register::Esi, "ESI"),
        (Register::Edi, "EDI"),
        (Register::Eip, "EIP"),
        (Register::Eflags, "EFLAGS"),
        (Register::Cr0, "CR0"),
        (Register::Cr1, "CR1"),
        (Register::Ax, "AX"),
        (Register::Cx, "CX"),
        (Register::Dx, "DX"),
        (Register::Bx, "BX"),
        (Register::Sp, "SP"),
        (Register::Bp, "BP"),
        (Register::Si, "SI"),
        (Register::Di, "DI"),
        (Register::Al, "AL"),
        (Register::Cl, "CL"),
        (Register::Dl, "DL"),
        (Register::Bl, "BL"),
        (Register::Ah, "AH"),
        (Register::Ch, "CH"),
        (Register::Dh, "DH"),
        (Register::Bh, "BH"),
    ];

    /// Owning full-width register and the bits this name covers.
    pub const fn location(self) -> (Gpr, RegView) {
        use Register::*;
        match self {
            Eax => (Gpr::Eax, RegView::Dword),
            Ecx => (Gpr::Ecx, RegView::Dword),
            Edx => (Gpr::Edx, RegView::Dword),
            Ebx => (Gpr::Ebx, RegView::Dword),
            Esp => (Gpr::Esp, RegView::Dword),
            Ebp => (Gpr::Ebp, RegView::Dword),
            Esi => (Gpr::Esi, RegView::Dword),
            Edi => (Gpr::Edi, RegView::Dword),
            Eip => (Gpr::Eip, RegView::Dword),
            Eflags => (Gpr::Eflags, RegView::Dword),
            Cr0 => (Gpr::Cr0, RegView::Dword),
            Cr1 => (Gpr::Cr1, RegView::Dword),
            Ax => (Gpr::Eax, RegView::Word),
            Cx => (Gpr::Ecx, RegView::Word),
            Dx => (Gpr::Edx, RegView::Word),
            Bx => (Gpr::Ebx, RegView::Word),
            Sp => (Gpr::Esp, RegView::Word),
            Bp => (Gpr::Ebp, RegView::Word),
            Si => (Gpr::Esi, RegView::Word),
            Di => (Gpr::Edi, RegView::Word),
            Al => (Gpr::Eax, RegView::LowByte),
            Cl => (Gpr::Ecx, RegView::LowByte),
            Dl => (Gpr::Edx, RegView::LowByte),
            Bl => (Gpr::Ebx, RegView::LowByte),
            Ah => (Gpr::Eax, RegView::HighByte),
            Ch => (Gpr::Ecx, RegView::HighByte),
            Dh => (Gpr::Edx, RegView::HighByte),
            Bh => (Gpr::Ebx, RegView::HighByte),
        }
    }

    /// Assembly name (upper case).
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(reg, _)| *reg == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }

    /// Parse an assembly name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(reg, _)| *reg)
    }
}

impl From<Gpr> for Register {
    fn from(gpr: Gpr) -> Self {
        match gpr {
            Gpr::Eax => Register::Eax,
            Gpr::Ecx => Register::Ecx,
            Gpr::Edx => Register::Edx,
            Gpr::Ebx => Register::Ebx,
            Gpr::Esp => Register::Esp,
            Gpr::Ebp => Register::Ebp,
            Gpr::Esi => Register::Esi,
            Gpr::Edi => Register::Edi,
            Gpr::Eip => Register::Eip,
            Gpr::Eflags => Register::Eflags,
            Gpr::Cr0 => Register::Cr0,
            Gpr::Cr1 => Register::Cr1,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-thread register file.
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [u32; NUM_REGS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Create a new zeroed register file.
    pub const fn new() -> Self {
        Self { regs: [0; NUM_REGS] }
    }

    /// Read a full-width register.
    #[inline]
    pub fn get(&self, reg: Gpr) -> u32 {
        self.regs[reg.index()]
    }

    /// Write a full-width register.
    #[inline]
    pub fn set(&mut self, reg: Gpr, value: u32) {
        self.regs[reg.index()] = value;
    }

    /// Read a register by name, extracting the aliased bits.
    #[inline]
    pub fn read(&self, reg: Register) -> u32 {
        let (owner, view) = reg.location();
        let full = self.get(owner);
        match view {
            RegView::Dword => full,
            RegView::Word => full & 0xFFFF,
            RegView::LowByte => full & 0xFF,
            RegView::HighByte => (full >> 8) & 0xFF,
        }
    }

    /// Write a register by name, merging the value into the aliased bits.
    #[inline]
    pub fn write(&mut self, reg: Register, value: u32) {
        let (owner, view) = reg.location();
        let cur = self.get(owner);
        let merged = match view {
            RegView::Dword => value,
            RegView::Word => (cur & 0xFFFF_0000) | (value & 0xFFFF),
            RegView::LowByte => (cur & 0xFFFF_FF00) | (value & 0xFF),
            RegView::HighByte => (cur & 0xFFFF_00FF) | ((value & 0xFF) << 8),
        };
        self.set(owner, merged);
    }

    /// Get a slice of all registers (for display).
    pub fn as_slice(&self) -> &[u32; NUM_REGS] {
        &self.regs
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show non-zero registers
        let non_zero: Vec<_> = Gpr::ALL
            .iter()
            .filter(|reg| self.get(**reg) != 0)
            .collect();

        if non_zero.is_empty() {
            write!(f, "RegisterFile {{ all zero }}")
        } else {
            write!(f, "RegisterFile {{ ")?;
            for (i, reg) in non_zero.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: 0x{:08X}", Register::from(**reg), self.get(**reg))?;
            }
            write!(f, " }}")
        }
    }
}
