use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

/*
 The cartridge header fields this core reads:
 https://gbdev.io/pandocs/The_Cartridge_Header.html#the-cartridge-header
 Title - $0134—$0143
 Cartridge Type - $0147 (MBC)
 ROM Size - $0148
 RAM Size - $0149
*/

/// Cartridge Type
/// Indicates what kind of hardware is used in the cartridge, most importantly the Memory Bank Controller (MBC).
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CartridgeType {
    RomOnly = 0x00,
    Mbc1 = 0x01,
    Mbc1Ram = 0x02,
    Mbc1RamBattery = 0x03,
    Mbc2 = 0x05,
    Mbc2Battery = 0x06,
    RomRam = 0x08,
    RomRamBattery = 0x09,
}

/// ROM Size
/// The ROM size is usually defined by the following formula:
/// 32KiB x (1 << value).
/// The number of banks is then calculated by dividing the ROM size by 16KiB.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RomSize {
    Rom32Kb = 0x00,
    Rom64Kb = 0x01,
    Rom128Kb = 0x02,
    Rom256Kb = 0x03,
    Rom512Kb = 0x04,
    Rom1Mb = 0x05,
    Rom2Mb = 0x06,
    Rom4Mb = 0x07,
    Rom8Mb = 0x08,
}

/// RAM Size
/// NOTE: If the cartridge type does not have RAM in its name, the RAM size is 0.
/// This includes the MBC2, which has 512 x 4 bits of RAM (built directly into the mapper).
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RamSize {
    None = 0x00,
    Kb2Unused = 0x01,
    Kb8 = 0x02,
    Kb32 = 0x03,
    Kb128 = 0x04,
    Kb64 = 0x05,
}

const TITLE: std::ops::Range<usize> = 0x0134..0x0144;
const CARTRIDGE_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;

/// The subset of the cartridge header the core cares about. Carts shorter
/// than the header (test stubs mostly) parse as all-zero fields.
pub struct CartridgeHeader {
    title: String,
    cartridge_type: u8,
    rom_size: u8,
    ram_size: u8,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Self {
        let byte = |addr: usize| rom.get(addr).copied().unwrap_or(0);
        let title = rom
            .get(TITLE)
            .unwrap_or(&[])
            .iter()
            .copied()
            .take_while(|b| *b != 0)
            .map(|b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        Self {
            title,
            cartridge_type: byte(CARTRIDGE_TYPE),
            rom_size: byte(ROM_SIZE),
            ram_size: byte(RAM_SIZE),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cartridge_type(&self) -> Result<CartridgeType, u8> {
        CartridgeType::try_from(self.cartridge_type).map_err(|_| self.cartridge_type)
    }

    pub fn rom_size(&self) -> Option<RomSize> {
        RomSize::try_from(self.rom_size).ok()
    }

    pub fn ram_size(&self) -> Option<RamSize> {
        RamSize::try_from(self.ram_size).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_type() {
        let mut rom = vec![0u8; 0x150];
        rom[0x0134..0x0134 + 4].copy_from_slice(b"TEST");
        rom[CARTRIDGE_TYPE] = 0x01;
        rom[ROM_SIZE] = 0x02;
        rom[RAM_SIZE] = 0x03;

        let header = CartridgeHeader::parse(&rom);
        assert_eq!(header.title(), "TEST");
        assert_eq!(header.cartridge_type(), Ok(CartridgeType::Mbc1));
        assert_eq!(header.rom_size(), Some(RomSize::Rom128Kb));
        assert_eq!(header.ram_size(), Some(RamSize::Kb32));
    }

    #[test]
    fn short_rom_parses_as_rom_only() {
        let header = CartridgeHeader::parse(&[0x00, 0x00, 0x00]);
        assert_eq!(header.title(), "");
        assert_eq!(header.cartridge_type(), Ok(CartridgeType::RomOnly));
    }

    #[test]
    fn unknown_type_byte_is_surfaced() {
        let mut rom = vec![0u8; 0x150];
        rom[CARTRIDGE_TYPE] = 0xFC;
        let header = CartridgeHeader::parse(&rom);
        assert_eq!(header.cartridge_type(), Err(0xFC));
    }
}
