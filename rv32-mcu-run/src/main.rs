use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::{debug, info, warn};
use rv32_mcu_core::core::csr::{INSTRET, MCAUSE, MEPC};
use rv32_mcu_core::core::{Config, Exception, ExecutionResult};
use rv32_mcu_core::resources::ram::Ram;
use rv32_mcu_core::resources::rom::Rom;
use rv32_mcu_core::{Machine, PAGE_SIZE};
use std::fs::File;
use std::io::{self, Read, Write};
use std::ops::Range;
use stderrlog::LogLevelNum;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Treat the image as an ELF file instead of a flat binary.
    #[arg(short, long)]
    elf: bool,
    /// Number of ROM pages mapped at address 0. Defaults to the smallest ROM that fits the image.
    #[arg(long)]
    rom_pages: Option<u32>,
    /// Number of RAM pages.
    #[arg(long, default_value_t = 16)]
    ram_pages: u32,
    /// Address the RAM is attached at.
    #[arg(long, default_value = "0x80000000", value_parser = parse_address)]
    ram_base: u32,
    /// Stop after this many steps if the program hasn't hit an SBREAK by then.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
    /// Increase logging verbosity (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Image to execute.
    image: String,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let verbosity = match args.verbose {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    stderrlog::new()
        .verbosity(verbosity)
        .modules([module_path!(), "rv32_mcu_core"])
        .init()
        .map_err(io::Error::other)?;

    let mut buf = Vec::new();
    let mut file = File::open(&args.image)?;
    file.read_to_end(&mut buf)?;

    let mut machine = if args.elf {
        load_elf(&args, &buf)?
    } else {
        let mut machine = Machine::new(Config::default());
        machine
            .attach(rom_for(&args, &buf), 0)
            .map_err(io::Error::other)?;
        attach_ram(&args, &mut machine)?;
        machine
    };

    let steps = machine.run(args.max_steps, |_, result| {
        result == ExecutionResult::Exception(Exception::Breakpoint)
    });
    if steps == args.max_steps {
        warn!("Step limit of {steps} reached");
    } else {
        info!("Halted on SBREAK after {steps} steps");
    }

    report(&machine)
}

fn rom_for(args: &Args, contents: &[u8]) -> Rom {
    match args.rom_pages {
        Some(pages) => Rom::new(pages, contents),
        None => Rom::fitting(contents),
    }
}

fn attach_ram(args: &Args, machine: &mut Machine) -> io::Result<()> {
    machine
        .attach(Ram::new(args.ram_pages), args.ram_base)
        .map_err(io::Error::other)?;
    debug!(
        "RAM: {} pages at {:#010x}",
        args.ram_pages, args.ram_base
    );
    Ok(())
}

/// Largest ROM sized from an ELF image when `--rom-pages` is not given.
const MAX_IMPLICIT_ROM_PAGES: u32 = 1024;

/// Build a machine from an ELF image.
///
/// Segments placed below the end of the ROM are burnt into the ROM image, all others are stored
/// through the bus after the RAM has been attached. Execution starts at the ELF entry point.
fn load_elf(args: &Args, program_elf: &[u8]) -> io::Result<Machine> {
    let elf_header = goblin::elf::Elf::parse(program_elf)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    let segments = elf_header
        .program_headers
        .iter()
        .filter(|h| h.p_type == PT_LOAD)
        .map(|h| -> io::Result<_> {
            Ok((h.p_paddr as u32, segment_data(program_elf, h.file_range())?))
        })
        .collect::<io::Result<Vec<_>>>()?;
    let (rom_image, ram_segments) = split_segments(args.ram_base, args.rom_pages, segments)?;

    let mut machine = Machine::new(Config {
        reset_vector: elf_header.entry as u32,
    });
    machine
        .attach(rom_for(args, &rom_image), 0)
        .map_err(io::Error::other)?;
    attach_ram(args, &mut machine)?;
    for (address, data) in ram_segments {
        debug!("Loading {} bytes at {address:#010x}", data.len());
        machine.load_physical(address, data);
    }
    Ok(machine)
}

fn segment_data(program_elf: &[u8], range: Range<usize>) -> io::Result<&[u8]> {
    let (start, end) = (range.start, range.end);
    program_elf.get(range).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("segment [{start:#x}, {end:#x}) lies outside the file"),
        )
    })
}

/// Burn the segments below `ram_base` that fit in the ROM into a ROM image, returning it along
/// with the segments left to load through the bus.
///
/// Without `rom_pages` the ROM is sized to the highest such segment, up to
/// [`MAX_IMPLICIT_ROM_PAGES`].
fn split_segments(
    ram_base: u32,
    rom_pages: Option<u32>,
    segments: Vec<(u32, &[u8])>,
) -> io::Result<(Vec<u8>, Vec<(u32, &[u8])>)> {
    let rom_len = match rom_pages {
        Some(pages) => pages as usize * PAGE_SIZE as usize,
        None => {
            let rom_end = segments
                .iter()
                .filter(|(address, _)| *address < ram_base)
                .map(|(address, data)| *address as usize + data.len())
                .max()
                .unwrap_or(0);
            let limit = MAX_IMPLICIT_ROM_PAGES as usize * PAGE_SIZE as usize;
            if rom_end > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("ROM segments end at {rom_end:#x}, past {limit:#x}; pass --rom-pages"),
                ));
            }
            rom_end
        }
    };

    let mut rom_image = vec![0u8; rom_len];
    let mut ram_segments = Vec::new();
    for (address, data) in segments {
        let start = address as usize;
        if start + data.len() <= rom_image.len() {
            rom_image[start..start + data.len()].copy_from_slice(data);
        } else {
            ram_segments.push((address, data));
        }
    }
    Ok((rom_image, ram_segments))
}

fn report(machine: &Machine) -> io::Result<()> {
    let core = machine.core();
    let mut out = io::stdout().lock();
    writeln!(out, "pc      = {:#010x}", core.pc())?;
    for csr in [("instret", INSTRET), ("mcause", MCAUSE), ("mepc", MEPC)] {
        if let Ok(value) = core.read_csr(csr.1) {
            writeln!(out, "{:<7} = {value:#010x}", csr.0)?;
        }
    }
    for index in 0..32u8 {
        writeln!(out, "x{index:<6} = {:#010x}", core.get_register(index))?;
    }
    Ok(())
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid address `{s}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments() {
        let text = [1u8, 2, 3, 4];
        let data = [5u8; 8];
        let (rom, ram) =
            split_segments(0x8000_0000, None, vec![(0x10, &text[..]), (0x8000_0000, &data[..])])
                .unwrap();
        assert_eq!(0x14, rom.len());
        assert_eq!(&text, &rom[0x10..]);
        assert_eq!(vec![(0x8000_0000, &data[..])], ram);
    }

    #[test]
    fn test_split_segments_explicit_rom() {
        let text = [1u8; 4];
        let (rom, ram) = split_segments(0x8000_0000, Some(1), vec![(0x3FE, &text[..])]).unwrap();
        assert_eq!(PAGE_SIZE as usize, rom.len());
        assert_eq!(vec![(0x3FE, &text[..])], ram);
    }

    #[test]
    fn test_split_segments_far_rom_rejected() {
        let text = [0u8; 4];
        let err = split_segments(0x8000_0000, None, vec![(0x4000_0000, &text[..])]).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());
    }

    #[test]
    fn test_segment_data_out_of_file() {
        let file = [0u8; 16];
        assert_eq!(4, segment_data(&file, 12..16).unwrap().len());
        let err = segment_data(&file, 12..20).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(Ok(0x8000_0000), parse_address("0x8000_0000"));
        assert_eq!(Ok(1024), parse_address("1024"));
        assert!(parse_address("0xZZ").is_err());
    }
}
