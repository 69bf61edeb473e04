pub trait Memory {
    /// Read a byte (u8) from memory.
    fn read8(&self, addr: u16) -> u8;

    /// Write a byte (u8) to memory.
    fn write8(&mut self, addr: u16, val: u8);

    /// Read a word (u16) from memory, little-endian.
    fn read16(&self, addr: u16) -> u16 {
        u16::from(self.read8(addr)) | (u16::from(self.read8(addr.wrapping_add(1))) << 8)
    }

    /// Write a word (u16) to memory, little-endian.
    fn write16(&mut self, addr: u16, val: u16) {
        self.write8(addr, (val & 0xFF) as u8);
        self.write8(addr.wrapping_add(1), (val >> 8) as u8);
    }
}
