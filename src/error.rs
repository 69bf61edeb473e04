use thiserror::Error;

/// Everything that can end emulation, at startup or mid-run.
///
/// Decode errors are fatal: the main loop dumps the register file and the
/// process exits non-zero. Bad writes to ROM space are not errors; the MMU
/// logs and drops them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown opcode {opcode:#04x} (CB page: {cb_prefixed}) at {pc:#06x}")]
    UnknownOpcode {
        cb_prefixed: bool,
        opcode: u8,
        pc: u16,
    },

    #[error("failed to read ROM {path}: {source}")]
    Rom {
        path: String,
        source: std::io::Error,
    },

    #[error("boot ROM must be exactly 256 bytes, got {0}")]
    BootRomSize(usize),

    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedCartridge(u8),

    #[error("window error: {0}")]
    Screen(#[from] minifb::Error),
}
