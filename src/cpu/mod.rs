mod execute;
pub mod interrupts;
mod opcodes;
pub mod registers;

use crate::error::Error;
use crate::mmu::memory::Memory;
use crate::mmu::Mmu;
use log::info;
use registers::{Reg16, Registers};
use std::cell::RefCell;
use std::rc::Rc;

/// The DMG-01 had a Sharp LR35902 CPU (speculated to be a SM83 core), which
/// is a hybrid of the Z80 and the 8080.
/// https://gbdev.io/gb-opcodes/optables
#[derive(Debug)]
pub struct Cpu {
    /// Registers
    pub reg: Registers,

    /// Memory, shared with the rest of the board.
    mmu: Rc<RefCell<Mmu>>,

    /// Interrupt Master Enable: dictates whether the CPU jumps to one of
    /// the interrupt routines (clearing the request), or ignores pending
    /// interrupts entirely.
    pub ime: bool,

    /// Set by the HALT instruction; no instructions execute until an
    /// interrupt is dispatched, which clears it.
    pub halted: bool,
}

impl Cpu {
    /// Initialize the CPU.
    ///
    /// With a boot ROM mapped, execution starts from address 0 and the boot
    /// code sets the registers up itself. Without one, the registers get
    /// the post-boot power-up values and execution starts at the cartridge
    /// entry point.
    pub fn power_on(mmu: Rc<RefCell<Mmu>>, with_boot_rom: bool) -> Self {
        let mut reg = Registers::new();
        if !with_boot_rom {
            reg.write16(Reg16::AF, 0x0000);
            reg.write16(Reg16::BC, 0x0013);
            reg.write16(Reg16::DE, 0x00D8);
            reg.write16(Reg16::HL, 0x014D);
            reg.write16(Reg16::SP, 0xFFFE);
            reg.write16(Reg16::PC, 0x0100);
        }
        Self {
            reg,
            mmu,
            ime: false,
            halted: false,
        }
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// PC advances past every fetched byte; flags are updated per
    /// instruction. Fails on the unused holes in the opcode map.
    pub fn step(&mut self) -> Result<(), Error> {
        let pc = self.reg.read16(Reg16::PC);
        let op = self.fetch_byte();
        self.execute(pc, op)
    }

    /// Read the byte at PC and advance PC past it.
    fn fetch_byte(&mut self) -> u8 {
        let pc = self.reg.read16(Reg16::PC);
        let val = self.mmu.borrow().read8(pc);
        self.reg.write16(Reg16::PC, pc.wrapping_add(1));
        val
    }

    /// Read the little-endian word at PC and advance PC past it.
    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte();
        let hi = self.fetch_byte();
        u16::from_le_bytes([lo, hi])
    }

    /// Push a word: SP drops by 2, the word is stored little-endian at the
    /// new SP.
    fn push16(&mut self, val: u16) {
        let sp = self.reg.read16(Reg16::SP).wrapping_sub(2);
        self.reg.write16(Reg16::SP, sp);
        self.mmu.borrow_mut().write16(sp, val);
    }

    /// Pop a word from SP, little-endian, and bump SP back up by 2.
    fn pop16(&mut self) -> u16 {
        let sp = self.reg.read16(Reg16::SP);
        let val = self.mmu.borrow().read16(sp);
        self.reg.write16(Reg16::SP, sp.wrapping_add(2));
        val
    }

    /// Log the register file, the way a crash dump wants it.
    pub fn dump_registers(&self) {
        info!(
            "AF={:#06x} BC={:#06x} DE={:#06x} HL={:#06x} SP={:#06x} PC={:#06x} IME={} halted={}",
            self.reg.read16(Reg16::AF),
            self.reg.read16(Reg16::BC),
            self.reg.read16(Reg16::DE),
            self.reg.read16(Reg16::HL),
            self.reg.read16(Reg16::SP),
            self.reg.read16(Reg16::PC),
            self.ime,
            self.halted,
        );
    }
}
