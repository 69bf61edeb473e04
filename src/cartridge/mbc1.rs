use super::Cartridge;
use crate::mmu::memory::Memory;
use log::warn;

/// MBC1 (and, by fallback, MBC2) bank-switched cartridge.
///
/// Only the ROM-bank select register is implemented: writes to 2000-3FFF
/// latch the low 5 bits of the bank number, and 4000-7FFF reads go through
/// that bank. RAM enable (0000-1FFF), RAM/mode select (4000-7FFF writes),
/// and external RAM at A000-BFFF are logged and dropped.
///
/// https://gbdev.io/pandocs/MBC1.html
/// 2000-3FFF - ROM Bank Number (Write Only)
/// Writing to this address space selects the lower 5 bits of the ROM Bank
/// Number (in range 01-1Fh). When 00h is written, the MBC translates that
/// to bank 01h; bank 00h is always directly accessible at 0000-3FFF.
#[derive(Debug)]
pub struct Mbc1 {
    rom: Vec<u8>,
    bank: u8,
}

impl Mbc1 {
    pub fn new(rom: Vec<u8>) -> Self {
        Self { rom, bank: 0x01 }
    }

    /// Effective ROM bank for the switchable region; never 0.
    fn rom_bank(&self) -> usize {
        (self.bank & 0x1F).max(1) as usize
    }
}

impl Memory for Mbc1 {
    fn read8(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom[addr as usize % self.rom.len()],
            0x4000..=0x7FFF => {
                let offset = (self.rom_bank() - 1) * 0x4000;
                // A malformed bank select past the end of the ROM wraps.
                self.rom[(addr as usize + offset) % self.rom.len()]
            }
            _ => {
                warn!("MBC1 read outside ROM space: [{:#06x}]", addr);
                0xFF
            }
        }
    }

    fn write8(&mut self, addr: u16, val: u8) {
        match addr {
            0x2000..=0x3FFF => {
                let bank = val & 0x1F;
                self.bank = if bank == 0x00 { 0x01 } else { bank };
            }
            // RAM enable, mode select, external RAM: not implemented.
            _ => warn!(
                "dropping unimplemented MBC write: {:#04x} --> [{:#06x}]",
                val, addr
            ),
        }
    }
}

impl Cartridge for Mbc1 {}
