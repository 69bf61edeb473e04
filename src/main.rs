use clap::{Arg, Command};
use log::{error, info, warn};
use std::path::Path;
use std::process::ExitCode;

mod cartridge;
mod cpu;
mod error;
mod gb;
mod mmu;
mod ppu;
mod screen;

use error::Error;
use screen::MinifbScreen;

/// Boot ROM picked up from the working directory when present.
const DEFAULT_BOOT_ROM: &str = "DMG_ROM.bin";

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("stannum")
        .version("0.1.0")
        .about("A Gameboy (DMG-01) emulator written in Rust.")
        .arg(
            Arg::new("rom")
                .value_name("ROM")
                .help("Cartridge ROM file to load.")
                .required(true),
        )
        .arg(
            Arg::new("boot")
                .short('b')
                .long("boot")
                .value_name("FILE")
                .help("DMG boot ROM (256 bytes). Skipped when the file does not exist.")
                .default_value(DEFAULT_BOOT_ROM),
        )
        .arg_required_else_help(true)
        .get_matches();

    let rom_path = matches.get_one::<String>("rom").expect("required arg");
    let boot_path = matches.get_one::<String>("boot").expect("defaulted arg");

    match run(rom_path, boot_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(rom_path: &str, boot_path: &str) -> Result<(), Error> {
    let rom = std::fs::read(rom_path).map_err(|source| Error::Rom {
        path: rom_path.to_string(),
        source,
    })?;
    info!("loaded ROM: {} ({} bytes)", rom_path, rom.len());

    let boot = if Path::new(boot_path).exists() {
        let bytes = std::fs::read(boot_path).map_err(|source| Error::Rom {
            path: boot_path.to_string(),
            source,
        })?;
        info!("loaded boot ROM: {}", boot_path);
        Some(bytes)
    } else {
        warn!("no boot ROM at {}; skipping the overlay", boot_path);
        None
    };

    let mut gameboy = gb::GameBoy::power_on(rom, boot)?;
    let mut screen = MinifbScreen::open("stannum")?;
    gameboy.run(&mut screen)
}
