use super::opcodes;
use super::registers::{Cond, Flags, Reg16, Reg8};
use super::Cpu;
use crate::error::Error;
use crate::mmu::memory::Memory;
use log::trace;

/// Sub-register encoding used by most opcode families. Field 6 is the
/// memory operand (HL).
const R8_FIELDS: [Option<Reg8>; 8] = [
    Some(Reg8::B),
    Some(Reg8::C),
    Some(Reg8::D),
    Some(Reg8::E),
    Some(Reg8::H),
    Some(Reg8::L),
    None,
    Some(Reg8::A),
];

/// Register-pair encoding for LD rr,nn / INC rr / DEC rr / ADD HL,rr.
/// PUSH/POP replace SP with AF.
const R16_FIELDS: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP];

impl Cpu {
    /// Execute one fetched opcode. `pc` is the address the opcode was
    /// fetched from (for tracing and error reporting); operand fetches
    /// continue from the current PC.
    ///
    /// Decoding goes by bit-pattern family rather than a flat 256-arm
    /// table: singleton encodings match first, then the guard arms peel
    /// off whole families (the register field is `op & 7` or
    /// `(op >> 3) & 7`, the pair field `(op >> 4) & 3`, the condition
    /// field `(op >> 3) & 3`).
    pub(super) fn execute(&mut self, pc: u16, op: u8) -> Result<(), Error> {
        if let Some(opcode) = opcodes::OPCODES_MAP.get(&op) {
            trace!(
                "{:#06x}: {} ({} bytes, {} cycles)",
                pc,
                opcode.mnemonic,
                opcode.bytes,
                opcode.cycles
            );
        }

        match op {
            // NOP
            0x00 => {}
            // STOP consumes its pad byte and otherwise acts as NOP here.
            0x10 => {
                self.fetch_byte();
            }
            // HALT: idle until an interrupt is dispatched.
            0x76 => self.halted = true,

            // Accumulator rotates. Unlike the CB page these force Z=0.
            0x07 => self.rlca(),
            0x0F => self.rrca(),
            0x17 => self.rla(),
            0x1F => self.rra(),

            // LD (a16),SP
            0x08 => {
                let addr = self.fetch_word();
                let sp = self.reg.read16(Reg16::SP);
                self.mmu.borrow_mut().write16(addr, sp);
            }

            // LD (BC),A / LD (DE),A / LD A,(BC) / LD A,(DE)
            0x02 => self.store_a(self.reg.read16(Reg16::BC)),
            0x12 => self.store_a(self.reg.read16(Reg16::DE)),
            0x0A => self.load_a(self.reg.read16(Reg16::BC)),
            0x1A => self.load_a(self.reg.read16(Reg16::DE)),

            // LD (HL±),A / LD A,(HL±)
            0x22 => {
                self.store_a(self.reg.read16(Reg16::HL));
                self.bump_hl(1);
            }
            0x32 => {
                self.store_a(self.reg.read16(Reg16::HL));
                self.bump_hl(-1);
            }
            0x2A => {
                self.load_a(self.reg.read16(Reg16::HL));
                self.bump_hl(1);
            }
            0x3A => {
                self.load_a(self.reg.read16(Reg16::HL));
                self.bump_hl(-1);
            }

            0x27 => self.daa(),
            // CPL
            0x2F => {
                let a = self.reg.read8(Reg8::A);
                self.reg.write8(Reg8::A, !a);
                self.reg.set_flag(Flags::ADD_SUBTRACT, true);
                self.reg.set_flag(Flags::HALF_CARRY, true);
            }
            // SCF
            0x37 => {
                self.reg.set_flag(Flags::ADD_SUBTRACT, false);
                self.reg.set_flag(Flags::HALF_CARRY, false);
                self.reg.set_flag(Flags::CARRY, true);
            }
            // CCF
            0x3F => {
                let carry = self.reg.flag(Flags::CARRY);
                self.reg.set_flag(Flags::ADD_SUBTRACT, false);
                self.reg.set_flag(Flags::HALF_CARRY, false);
                self.reg.set_flag(Flags::CARRY, !carry);
            }

            // JR r8 (unconditional)
            0x18 => {
                let offset = self.fetch_byte() as i8;
                self.relative_jump(offset);
            }
            // JP a16 / JP HL
            0xC3 => {
                let target = self.fetch_word();
                self.reg.write16(Reg16::PC, target);
            }
            0xE9 => {
                let target = self.reg.read16(Reg16::HL);
                self.reg.write16(Reg16::PC, target);
            }
            // CALL a16 / RET / RETI
            0xCD => {
                let target = self.fetch_word();
                let ret = self.reg.read16(Reg16::PC);
                self.push16(ret);
                self.reg.write16(Reg16::PC, target);
            }
            0xC9 => {
                let ret = self.pop16();
                self.reg.write16(Reg16::PC, ret);
            }
            0xD9 => {
                let ret = self.pop16();
                self.reg.write16(Reg16::PC, ret);
                self.ime = true;
            }

            // LDH (a8),A / LDH A,(a8) / LD (C),A / LD A,(C)
            0xE0 => {
                let offset = self.fetch_byte();
                self.store_a(0xFF00 | offset as u16);
            }
            0xF0 => {
                let offset = self.fetch_byte();
                self.load_a(0xFF00 | offset as u16);
            }
            0xE2 => self.store_a(0xFF00 | self.reg.read8(Reg8::C) as u16),
            0xF2 => self.load_a(0xFF00 | self.reg.read8(Reg8::C) as u16),

            // LD (a16),A / LD A,(a16)
            0xEA => {
                let addr = self.fetch_word();
                self.store_a(addr);
            }
            0xFA => {
                let addr = self.fetch_word();
                self.load_a(addr);
            }

            // ADD SP,r8 / LD HL,SP+r8 / LD SP,HL
            0xE8 => {
                let result = self.sp_plus_offset();
                self.reg.write16(Reg16::SP, result);
            }
            0xF8 => {
                let result = self.sp_plus_offset();
                self.reg.write16(Reg16::HL, result);
            }
            0xF9 => {
                let hl = self.reg.read16(Reg16::HL);
                self.reg.write16(Reg16::SP, hl);
            }

            // DI / EI. The one-instruction enable delay of hardware is not
            // modeled; both take effect immediately.
            0xF3 => self.ime = false,
            0xFB => self.ime = true,

            // CB-prefixed page.
            0xCB => {
                let cb = self.fetch_byte();
                if let Some(mnemonic) = opcodes::CB_MNEMONICS.get(&cb) {
                    trace!("{:#06x}: {}", pc, mnemonic);
                }
                self.execute_cb(cb);
            }

            // LD r,r' (field 6 on either side is (HL); 0x76 is HALT above)
            op if op & 0xC0 == 0x40 => {
                let val = self.read_field(op & 0x07);
                self.write_field((op >> 3) & 0x07, val);
            }
            // ALU A,r
            op if op & 0xC0 == 0x80 => {
                let val = self.read_field(op & 0x07);
                self.alu((op >> 3) & 0x07, val);
            }
            // ALU A,d8
            op if op & 0xC7 == 0xC6 => {
                let val = self.fetch_byte();
                self.alu((op >> 3) & 0x07, val);
            }
            // INC r / DEC r (C flag preserved)
            op if op & 0xC7 == 0x04 => {
                let field = (op >> 3) & 0x07;
                let val = self.read_field(field);
                let result = self.inc8(val);
                self.write_field(field, result);
            }
            op if op & 0xC7 == 0x05 => {
                let field = (op >> 3) & 0x07;
                let val = self.read_field(field);
                let result = self.dec8(val);
                self.write_field(field, result);
            }
            // LD r,d8
            op if op & 0xC7 == 0x06 => {
                let val = self.fetch_byte();
                self.write_field((op >> 3) & 0x07, val);
            }
            // LD rr,d16
            op if op & 0xCF == 0x01 => {
                let val = self.fetch_word();
                self.reg.write16(R16_FIELDS[((op >> 4) & 0x03) as usize], val);
            }
            // INC rr / DEC rr (no flags)
            op if op & 0xCF == 0x03 => {
                let pair = R16_FIELDS[((op >> 4) & 0x03) as usize];
                let val = self.reg.read16(pair).wrapping_add(1);
                self.reg.write16(pair, val);
            }
            op if op & 0xCF == 0x0B => {
                let pair = R16_FIELDS[((op >> 4) & 0x03) as usize];
                let val = self.reg.read16(pair).wrapping_sub(1);
                self.reg.write16(pair, val);
            }
            // ADD HL,rr
            op if op & 0xCF == 0x09 => {
                let val = self.reg.read16(R16_FIELDS[((op >> 4) & 0x03) as usize]);
                self.add_hl(val);
            }
            // PUSH rr / POP rr (AF in the SP slot)
            op if op & 0xCF == 0xC5 => {
                let pair = Self::stack_pair(op);
                let val = self.reg.read16(pair);
                self.push16(val);
            }
            op if op & 0xCF == 0xC1 => {
                let val = self.pop16();
                // POP AF drops the low nibble on the floor, by way of the
                // flag register write mask.
                self.reg.write16(Self::stack_pair(op), val);
            }
            // JP cc,a16 / JR cc,r8 / RET cc / CALL cc,a16
            op if op & 0xE7 == 0xC2 => {
                let target = self.fetch_word();
                if self.reg.condition(Cond::from_opcode(op)) {
                    self.reg.write16(Reg16::PC, target);
                }
            }
            op if op & 0xE7 == 0x20 => {
                let offset = self.fetch_byte() as i8;
                if self.reg.condition(Cond::from_opcode(op)) {
                    self.relative_jump(offset);
                }
            }
            op if op & 0xE7 == 0xC0 => {
                if self.reg.condition(Cond::from_opcode(op)) {
                    let ret = self.pop16();
                    self.reg.write16(Reg16::PC, ret);
                }
            }
            op if op & 0xE7 == 0xC4 => {
                let target = self.fetch_word();
                if self.reg.condition(Cond::from_opcode(op)) {
                    let ret = self.reg.read16(Reg16::PC);
                    self.push16(ret);
                    self.reg.write16(Reg16::PC, target);
                }
            }
            // RST n
            op if op & 0xC7 == 0xC7 => {
                let ret = self.reg.read16(Reg16::PC);
                self.push16(ret);
                self.reg.write16(Reg16::PC, (op & 0x38) as u16);
            }

            // The 11 unused encodings.
            _ => {
                return Err(Error::UnknownOpcode {
                    cb_prefixed: false,
                    opcode: op,
                    pc,
                })
            }
        }
        Ok(())
    }

    /// The CB page: rotates/shifts, BIT, RES, SET. Fully populated, so it
    /// cannot fail.
    fn execute_cb(&mut self, cb: u8) {
        let field = cb & 0x07;
        let bit = (cb >> 3) & 0x07;
        match cb >> 6 {
            0b00 => {
                let val = self.read_field(field);
                let result = self.rotate_shift(bit, val);
                self.write_field(field, result);
            }
            // BIT n,r: Z from the tested bit, operand untouched.
            0b01 => {
                let val = self.read_field(field);
                self.reg.set_flag(Flags::ZERO, val & (1 << bit) == 0);
                self.reg.set_flag(Flags::ADD_SUBTRACT, false);
                self.reg.set_flag(Flags::HALF_CARRY, true);
            }
            0b10 => {
                let val = self.read_field(field);
                self.write_field(field, val & !(1 << bit));
            }
            _ => {
                let val = self.read_field(field);
                self.write_field(field, val | (1 << bit));
            }
        }
    }

    /// Read the operand a 3-bit register field denotes, going through
    /// memory at HL for field 6.
    fn read_field(&self, field: u8) -> u8 {
        match R8_FIELDS[(field & 0x07) as usize] {
            Some(reg) => self.reg.read8(reg),
            None => self.mmu.borrow().read8(self.reg.read16(Reg16::HL)),
        }
    }

    fn write_field(&mut self, field: u8, val: u8) {
        match R8_FIELDS[(field & 0x07) as usize] {
            Some(reg) => self.reg.write8(reg, val),
            None => {
                let addr = self.reg.read16(Reg16::HL);
                self.mmu.borrow_mut().write8(addr, val);
            }
        }
    }

    /// PUSH/POP pair field: AF takes the slot SP has elsewhere.
    fn stack_pair(op: u8) -> Reg16 {
        match (op >> 4) & 0x03 {
            0 => Reg16::BC,
            1 => Reg16::DE,
            2 => Reg16::HL,
            _ => Reg16::AF,
        }
    }

    fn load_a(&mut self, addr: u16) {
        let val = self.mmu.borrow().read8(addr);
        self.reg.write8(Reg8::A, val);
    }

    fn store_a(&mut self, addr: u16) {
        let val = self.reg.read8(Reg8::A);
        self.mmu.borrow_mut().write8(addr, val);
    }

    fn bump_hl(&mut self, delta: i16) {
        let hl = self.reg.read16(Reg16::HL).wrapping_add(delta as u16);
        self.reg.write16(Reg16::HL, hl);
    }

    fn relative_jump(&mut self, offset: i8) {
        let pc = self.reg.read16(Reg16::PC);
        self.reg.write16(Reg16::PC, pc.wrapping_add(offset as u16));
    }

    /// The 8-bit ALU family, op index from bits 5:3 of the opcode.
    fn alu(&mut self, index: u8, val: u8) {
        match index {
            0 => self.alu_add(val, false),
            1 => self.alu_add(val, true),
            2 => self.alu_sub(val, false, true),
            3 => self.alu_sub(val, true, true),
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            _ => self.alu_sub(val, false, false), // CP discards the result
        }
    }

    fn alu_add(&mut self, val: u8, with_carry: bool) {
        let a = self.reg.read8(Reg8::A);
        let carry = (with_carry && self.reg.flag(Flags::CARRY)) as u8;
        let result = a.wrapping_add(val).wrapping_add(carry);
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg
            .set_flag(Flags::HALF_CARRY, (a & 0x0F) + (val & 0x0F) + carry > 0x0F);
        self.reg
            .set_flag(Flags::CARRY, a as u16 + val as u16 + carry as u16 > 0xFF);
        self.reg.write8(Reg8::A, result);
    }

    fn alu_sub(&mut self, val: u8, with_carry: bool, write_back: bool) {
        let a = self.reg.read8(Reg8::A);
        let carry = (with_carry && self.reg.flag(Flags::CARRY)) as u8;
        let result = a.wrapping_sub(val).wrapping_sub(carry);
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, true);
        self.reg
            .set_flag(Flags::HALF_CARRY, (a & 0x0F) < (val & 0x0F) + carry);
        self.reg
            .set_flag(Flags::CARRY, (a as u16) < val as u16 + carry as u16);
        if write_back {
            self.reg.write8(Reg8::A, result);
        }
    }

    fn alu_and(&mut self, val: u8) {
        let result = self.reg.read8(Reg8::A) & val;
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, true);
        self.reg.set_flag(Flags::CARRY, false);
        self.reg.write8(Reg8::A, result);
    }

    fn alu_xor(&mut self, val: u8) {
        let result = self.reg.read8(Reg8::A) ^ val;
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, false);
        self.reg.set_flag(Flags::CARRY, false);
        self.reg.write8(Reg8::A, result);
    }

    fn alu_or(&mut self, val: u8) {
        let result = self.reg.read8(Reg8::A) | val;
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, false);
        self.reg.set_flag(Flags::CARRY, false);
        self.reg.write8(Reg8::A, result);
    }

    /// INC r: add-style Z/N/H, carry untouched.
    fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, (val & 0x0F) == 0x0F);
        result
    }

    /// DEC r: sub-style Z/N/H, carry untouched.
    fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, true);
        self.reg.set_flag(Flags::HALF_CARRY, (val & 0x0F) == 0x00);
        result
    }

    /// ADD HL,rr: H from bit 11, C from bit 15, Z preserved.
    fn add_hl(&mut self, val: u16) {
        let hl = self.reg.read16(Reg16::HL);
        let result = hl.wrapping_add(val);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg
            .set_flag(Flags::HALF_CARRY, (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF);
        self.reg
            .set_flag(Flags::CARRY, hl as u32 + val as u32 > 0xFFFF);
        self.reg.write16(Reg16::HL, result);
    }

    /// SP plus a signed immediate, shared by ADD SP,r8 and LD HL,SP+r8.
    /// H and C come from the low-byte sum; Z and N are forced clear.
    fn sp_plus_offset(&mut self) -> u16 {
        let sp = self.reg.read16(Reg16::SP);
        let offset = self.fetch_byte() as i8 as u16;
        self.reg.set_flag(Flags::ZERO, false);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg
            .set_flag(Flags::HALF_CARRY, (sp & 0x0F) + (offset & 0x0F) > 0x0F);
        self.reg
            .set_flag(Flags::CARRY, (sp & 0xFF) + (offset & 0xFF) > 0xFF);
        sp.wrapping_add(offset)
    }

    /// BCD adjust after an 8-bit add/subtract.
    fn daa(&mut self) {
        let mut a = self.reg.read8(Reg8::A);
        let mut carry = self.reg.flag(Flags::CARRY);
        if self.reg.flag(Flags::ADD_SUBTRACT) {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.reg.flag(Flags::HALF_CARRY) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.reg.flag(Flags::HALF_CARRY) || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }
        self.reg.set_flag(Flags::ZERO, a == 0);
        self.reg.set_flag(Flags::HALF_CARRY, false);
        self.reg.set_flag(Flags::CARRY, carry);
        self.reg.write8(Reg8::A, a);
    }

    fn rlca(&mut self) {
        let a = self.reg.read8(Reg8::A);
        self.set_rotate_flags(a & 0x80 != 0);
        self.reg.write8(Reg8::A, a.rotate_left(1));
    }

    fn rrca(&mut self) {
        let a = self.reg.read8(Reg8::A);
        self.set_rotate_flags(a & 0x01 != 0);
        self.reg.write8(Reg8::A, a.rotate_right(1));
    }

    fn rla(&mut self) {
        let a = self.reg.read8(Reg8::A);
        let carry_in = self.reg.flag(Flags::CARRY) as u8;
        self.set_rotate_flags(a & 0x80 != 0);
        self.reg.write8(Reg8::A, (a << 1) | carry_in);
    }

    fn rra(&mut self) {
        let a = self.reg.read8(Reg8::A);
        let carry_in = self.reg.flag(Flags::CARRY) as u8;
        self.set_rotate_flags(a & 0x01 != 0);
        self.reg.write8(Reg8::A, (a >> 1) | (carry_in << 7));
    }

    /// Accumulator rotates clear Z/N/H and put the shifted-out bit in C.
    fn set_rotate_flags(&mut self, carry: bool) {
        self.reg.set_flag(Flags::ZERO, false);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, false);
        self.reg.set_flag(Flags::CARRY, carry);
    }

    /// The CB rotate/shift group. Z reflects the result here, unlike the
    /// accumulator forms.
    fn rotate_shift(&mut self, index: u8, val: u8) -> u8 {
        let carry_in = self.reg.flag(Flags::CARRY) as u8;
        let (result, carry_out) = match index {
            0 => (val.rotate_left(1), val & 0x80 != 0),            // RLC
            1 => (val.rotate_right(1), val & 0x01 != 0),           // RRC
            2 => ((val << 1) | carry_in, val & 0x80 != 0),         // RL
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),  // RR
            4 => (val << 1, val & 0x80 != 0),                      // SLA
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),     // SRA
            6 => (val.rotate_left(4), false),                      // SWAP
            _ => (val >> 1, val & 0x01 != 0),                      // SRL
        };
        self.reg.set_flag(Flags::ZERO, result == 0);
        self.reg.set_flag(Flags::ADD_SUBTRACT, false);
        self.reg.set_flag(Flags::HALF_CARRY, false);
        self.reg.set_flag(Flags::CARRY, carry_out);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{cpu_with_rom, rom_with_code};
    use super::*;

    fn run(code: &[u8], steps: usize) -> (Cpu, std::rc::Rc<std::cell::RefCell<crate::mmu::Mmu>>) {
        let (mut cpu, mmu) = cpu_with_rom(rom_with_code(code));
        for _ in 0..steps {
            cpu.step().unwrap();
        }
        (cpu, mmu)
    }

    #[test]
    fn ld_then_xor_clears_a_and_sets_z() {
        // LD A,0x2A ; XOR A
        let (cpu, _) = run(&[0x3E, 0x2A, 0xAF], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x00);
        assert!(cpu.reg.flag(Flags::ZERO));
        assert!(!cpu.reg.flag(Flags::ADD_SUBTRACT));
        assert!(!cpu.reg.flag(Flags::HALF_CARRY));
        assert!(!cpu.reg.flag(Flags::CARRY));
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0103);
    }

    #[test]
    fn jr_minus_two_loops_in_place() {
        // JR -2 jumps back onto itself.
        let (cpu, _) = run(&[0x18, 0xFE], 1);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0100);
    }

    #[test]
    fn bit_6_of_a() {
        // LD A,0x40 ; BIT 6,A
        let (cpu, _) = run(&[0x3E, 0b0100_0000, 0xCB, 0x77], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0b0100_0000);
        assert!(!cpu.reg.flag(Flags::ZERO));
        assert!(!cpu.reg.flag(Flags::ADD_SUBTRACT));
        assert!(cpu.reg.flag(Flags::HALF_CARRY));

        // BIT 6 of a clear bit sets Z.
        let (cpu, _) = run(&[0x3E, 0x00, 0xCB, 0x77], 2);
        assert!(cpu.reg.flag(Flags::ZERO));
    }

    #[test]
    fn ld_r_r_and_ld_through_hl() {
        // LD B,0x5A ; LD HL,0xC000 ; LD (HL),B ; LD C,(HL)
        let (cpu, mmu) = run(&[0x06, 0x5A, 0x21, 0x00, 0xC0, 0x70, 0x4E], 4);
        assert_eq!(mmu.borrow().read8(0xC000), 0x5A);
        assert_eq!(cpu.reg.read8(Reg8::C), 0x5A);
    }

    #[test]
    fn add_sets_half_and_full_carry() {
        // LD A,0x0F ; ADD A,0x01
        let (cpu, _) = run(&[0x3E, 0x0F, 0xC6, 0x01], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x10);
        assert!(cpu.reg.flag(Flags::HALF_CARRY));
        assert!(!cpu.reg.flag(Flags::CARRY));

        // LD A,0xFF ; ADD A,0x02 wraps and carries.
        let (cpu, _) = run(&[0x3E, 0xFF, 0xC6, 0x02], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x01);
        assert!(cpu.reg.flag(Flags::CARRY));
        assert!(cpu.reg.flag(Flags::HALF_CARRY));
        assert!(!cpu.reg.flag(Flags::ZERO));
    }

    #[test]
    fn adc_includes_carry_even_when_result_wraps_onto_a() {
        // LD A,0x10 ; SCF ; ADC A,0xFF -> 0x10 again, with carry out.
        let (cpu, _) = run(&[0x3E, 0x10, 0x37, 0xCE, 0xFF], 3);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x10);
        assert!(cpu.reg.flag(Flags::CARRY));
    }

    #[test]
    fn sub_and_cp_flags() {
        // LD A,0x10 ; SUB 0x20
        let (cpu, _) = run(&[0x3E, 0x10, 0xD6, 0x20], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0xF0);
        assert!(cpu.reg.flag(Flags::ADD_SUBTRACT));
        assert!(cpu.reg.flag(Flags::CARRY));
        assert!(!cpu.reg.flag(Flags::HALF_CARRY));

        // CP leaves A alone: LD A,0x42 ; CP 0x42
        let (cpu, _) = run(&[0x3E, 0x42, 0xFE, 0x42], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x42);
        assert!(cpu.reg.flag(Flags::ZERO));
        assert!(cpu.reg.flag(Flags::ADD_SUBTRACT));
    }

    #[test]
    fn inc_dec_preserve_carry() {
        // SCF ; LD B,0xFF ; INC B
        let (cpu, _) = run(&[0x37, 0x06, 0xFF, 0x04], 3);
        assert_eq!(cpu.reg.read8(Reg8::B), 0x00);
        assert!(cpu.reg.flag(Flags::ZERO));
        assert!(cpu.reg.flag(Flags::HALF_CARRY));
        assert!(cpu.reg.flag(Flags::CARRY));

        // SCF ; LD B,0x10 ; DEC B
        let (cpu, _) = run(&[0x37, 0x06, 0x10, 0x05], 3);
        assert_eq!(cpu.reg.read8(Reg8::B), 0x0F);
        assert!(cpu.reg.flag(Flags::ADD_SUBTRACT));
        assert!(cpu.reg.flag(Flags::HALF_CARRY));
        assert!(cpu.reg.flag(Flags::CARRY));
    }

    #[test]
    fn add_hl_preserves_z() {
        // LD HL,0x0FFF ; LD BC,0x0001 ; XOR A (sets Z) ; ADD HL,BC
        let (cpu, _) = run(&[0x21, 0xFF, 0x0F, 0x01, 0x01, 0x00, 0xAF, 0x09], 4);
        assert_eq!(cpu.reg.read16(Reg16::HL), 0x1000);
        assert!(cpu.reg.flag(Flags::ZERO)); // untouched from XOR A
        assert!(cpu.reg.flag(Flags::HALF_CARRY));
        assert!(!cpu.reg.flag(Flags::CARRY));
    }

    #[test]
    fn rla_writes_back_and_shifts_carry_through() {
        // SCF ; LD A,0x80 ; RLA -> A = 0x01, carry out from bit 7.
        let (cpu, _) = run(&[0x37, 0x3E, 0x80, 0x17], 3);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x01);
        assert!(cpu.reg.flag(Flags::CARRY));
        assert!(!cpu.reg.flag(Flags::ZERO));
    }

    #[test]
    fn daa_adjusts_bcd_addition() {
        // LD A,0x15 ; ADD A,0x27 ; DAA -> 0x42 in BCD.
        let (cpu, _) = run(&[0x3E, 0x15, 0xC6, 0x27, 0x27], 3);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x42);
        assert!(!cpu.reg.flag(Flags::CARRY));

        // 0x99 + 0x01 -> 0x00 with carry.
        let (cpu, _) = run(&[0x3E, 0x99, 0xC6, 0x01, 0x27], 3);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x00);
        assert!(cpu.reg.flag(Flags::ZERO));
        assert!(cpu.reg.flag(Flags::CARRY));
    }

    #[test]
    fn conditional_jr_uses_carry_bit_4() {
        // SCF ; JR C,+2 skips the stuck loop and lands on the NOP.
        let (cpu, _) = run(&[0x37, 0x38, 0x02, 0x18, 0xFE, 0x00], 3);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0106);

        // With carry clear the branch falls through.
        let (cpu, _) = run(&[0x38, 0x02, 0x00], 1);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0102);
    }

    #[test]
    fn call_and_ret_roundtrip() {
        // CALL 0x0110 ; target: RET
        let mut code = vec![0xCD, 0x10, 0x01];
        code.resize(0x10, 0x00);
        code.push(0xC9); // at 0x0110
        let (mut cpu, mmu) = cpu_with_rom(rom_with_code(&code));

        cpu.step().unwrap();
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0110);
        assert_eq!(cpu.reg.read16(Reg16::SP), 0xFFFC);
        assert_eq!(mmu.borrow().read16(0xFFFC), 0x0103);

        cpu.step().unwrap();
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0103);
        assert_eq!(cpu.reg.read16(Reg16::SP), 0xFFFE);
    }

    #[test]
    fn conditional_call_not_taken_still_consumes_operand() {
        // SCF ; CALL NC,0x0200 ; NOP
        let (cpu, _) = run(&[0x37, 0xD4, 0x00, 0x02], 2);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0104);
        assert_eq!(cpu.reg.read16(Reg16::SP), 0xFFFE);
    }

    #[test]
    fn rst_pushes_and_vectors() {
        let (cpu, mmu) = run(&[0xEF], 1); // RST 28H
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0028);
        assert_eq!(mmu.borrow().read16(0xFFFC), 0x0101);
    }

    #[test]
    fn push_pop_af_masks_flag_nibble() {
        // LD BC,0x12FF ; PUSH BC ; POP AF
        let (cpu, _) = run(&[0x01, 0xFF, 0x12, 0xC5, 0xF1], 3);
        assert_eq!(cpu.reg.read16(Reg16::AF), 0x12F0);
    }

    #[test]
    fn ldi_ldd_move_hl() {
        // LD HL,0xC000 ; LD A,0x77 ; LD (HL+),A ; LD (HL-),A
        let (cpu, mmu) = run(&[0x21, 0x00, 0xC0, 0x3E, 0x77, 0x22, 0x32], 4);
        assert_eq!(mmu.borrow().read8(0xC000), 0x77);
        assert_eq!(mmu.borrow().read8(0xC001), 0x77);
        assert_eq!(cpu.reg.read16(Reg16::HL), 0xC000);
    }

    #[test]
    fn high_ram_loads_and_stores() {
        // LD A,0x99 ; LDH (0x80),A ; LD A,0x00 ; LDH A,(0x80)
        let (cpu, mmu) = run(&[0x3E, 0x99, 0xE0, 0x80, 0x3E, 0x00, 0xF0, 0x80], 4);
        assert_eq!(mmu.borrow().read8(0xFF80), 0x99);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x99);
    }

    #[test]
    fn jp_hl_and_ld_sp_hl() {
        // LD HL,0x0200 ; LD SP,HL ; JP HL
        let (cpu, _) = run(&[0x21, 0x00, 0x02, 0xF9, 0xE9], 3);
        assert_eq!(cpu.reg.read16(Reg16::SP), 0x0200);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0200);
    }

    #[test]
    fn add_sp_signed_offset() {
        // ADD SP,-2 from 0xFFFE
        let (cpu, _) = run(&[0xE8, 0xFE], 1);
        assert_eq!(cpu.reg.read16(Reg16::SP), 0xFFFC);
        assert!(!cpu.reg.flag(Flags::ZERO));

        // LD HL,SP-1 mirrors the flag rule.
        let (cpu, _) = run(&[0xF8, 0xFF], 1);
        assert_eq!(cpu.reg.read16(Reg16::HL), 0xFFFD);
    }

    #[test]
    fn ld_a16_sp_stores_little_endian() {
        // LD (0xC000),SP
        let (_, mmu) = run(&[0x08, 0x00, 0xC0], 1);
        assert_eq!(mmu.borrow().read8(0xC000), 0xFE);
        assert_eq!(mmu.borrow().read8(0xC001), 0xFF);
    }

    #[test]
    fn halt_stops_and_stop_consumes_pad_byte() {
        let (cpu, _) = run(&[0x76], 1);
        assert!(cpu.halted);

        let (cpu, _) = run(&[0x10, 0x00], 1);
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0102);
        assert!(!cpu.halted);
    }

    #[test]
    fn di_ei_toggle_ime() {
        let (mut cpu, _) = cpu_with_rom(rom_with_code(&[0xFB, 0xF3]));
        cpu.step().unwrap();
        assert!(cpu.ime);
        cpu.step().unwrap();
        assert!(!cpu.ime);
    }

    #[test]
    fn reti_pops_and_enables_interrupts() {
        // CALL 0x0110 ; at 0x0110: RETI
        let mut code = vec![0xCD, 0x10, 0x01];
        code.resize(0x10, 0x00);
        code.push(0xD9);
        let (mut cpu, _) = cpu_with_rom(rom_with_code(&code));
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.read16(Reg16::PC), 0x0103);
        assert!(cpu.ime);
    }

    #[test]
    fn cb_rotate_shift_group() {
        // LD A,0x81 ; CB RLC A
        let (cpu, _) = run(&[0x3E, 0x81, 0xCB, 0x07], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x03);
        assert!(cpu.reg.flag(Flags::CARRY));

        // LD A,0x01 ; CB SRL A -> zero with carry out.
        let (cpu, _) = run(&[0x3E, 0x01, 0xCB, 0x3F], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x00);
        assert!(cpu.reg.flag(Flags::ZERO));
        assert!(cpu.reg.flag(Flags::CARRY));

        // LD A,0xF0 ; CB SWAP A
        let (cpu, _) = run(&[0x3E, 0xF0, 0xCB, 0x37], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0x0F);
        assert!(!cpu.reg.flag(Flags::CARRY));

        // LD A,0x82 ; CB SRA A keeps the sign bit.
        let (cpu, _) = run(&[0x3E, 0x82, 0xCB, 0x2F], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0xC1);
        assert!(!cpu.reg.flag(Flags::CARRY));
    }

    #[test]
    fn cb_res_set_on_memory_operand() {
        // LD HL,0xC000 ; LD (HL),0xFF ; RES 3,(HL) ; SET 0,(HL)
        let (_, mmu) = run(&[0x21, 0x00, 0xC0, 0x36, 0xFF, 0xCB, 0x9E, 0xCB, 0xC6], 4);
        assert_eq!(mmu.borrow().read8(0xC000), 0xF7);
    }

    #[test]
    fn unknown_opcode_reports_page_and_pc() {
        let (mut cpu, _) = cpu_with_rom(rom_with_code(&[0xD3]));
        let err = cpu.step().unwrap_err();
        match err {
            Error::UnknownOpcode {
                cb_prefixed,
                opcode,
                pc,
            } => {
                assert!(!cb_prefixed);
                assert_eq!(opcode, 0xD3);
                assert_eq!(pc, 0x0100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cpl_scf_ccf() {
        // LD A,0x35 ; CPL
        let (cpu, _) = run(&[0x3E, 0x35, 0x2F], 2);
        assert_eq!(cpu.reg.read8(Reg8::A), 0xCA);
        assert!(cpu.reg.flag(Flags::ADD_SUBTRACT));
        assert!(cpu.reg.flag(Flags::HALF_CARRY));

        // SCF ; CCF clears it again.
        let (cpu, _) = run(&[0x37, 0x3F], 2);
        assert!(!cpu.reg.flag(Flags::CARRY));
        assert!(!cpu.reg.flag(Flags::HALF_CARRY));
    }
}
