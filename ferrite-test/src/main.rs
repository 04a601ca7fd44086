mod htif;

use clap::Parser;
use ferrite_core::bus::{AccessSize, Bus};
use ferrite_core::memory_map::MemoryMap;
use ferrite_core::resources::ram::Ram;
use ferrite_core::{AddressRange, Config, Core};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use htif::Htif;
use log::{info, warn};
use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::ExitCode;

const RAM_BASE: u32 = 0x8000_0000;
const RAM_SIZE: u32 = 32 * 1024 * 1024;
/// Cycles to run between two checks of `tohost`.
const CYCLES_PER_STEP: u64 = 1000;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Signature file to output signature to
    #[arg(long, short)]
    signature: Option<String>,
    /// Give up after this many steps of 1000 cycles
    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,
    /// Increase logging verbosity, may be repeated
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Elf file to run
    elf: String,
}

fn invalid_data(error: impl Into<Box<dyn Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

/// Address of the `.tohost` section, falling back to the `tohost` symbol.
fn find_tohost(elf: &Elf) -> Option<u32> {
    let section = elf
        .section_headers
        .iter()
        .find(|header| elf.shdr_strtab.get_at(header.sh_name) == Some(".tohost"))
        .map(|header| header.sh_addr as u32);
    section.or_else(|| find_symbol(elf, "tohost"))
}

fn find_symbol(elf: &Elf, name: &str) -> Option<u32> {
    elf.syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
        .map(|sym| sym.st_value as u32)
}

/// RAM at `RAM_BASE`, with the HTIF window cut out of it when `.tohost` lies inside.
fn build_memory_map(tohost: u32) -> io::Result<MemoryMap> {
    let mut map = MemoryMap::new();
    let ram_end = RAM_BASE + RAM_SIZE;
    let htif_end = tohost.checked_add(htif::LEN).ok_or_else(|| invalid_data("bad tohost"))?;
    let attach_ram = |map: &mut MemoryMap, start: u32, end: u32| -> io::Result<()> {
        if start < end {
            let range = AddressRange::with_len(start, end - start).map_err(invalid_data)?;
            map.attach(range, Box::new(Ram::new(end - start))).map_err(invalid_data)?;
        }
        Ok(())
    };
    if tohost >= RAM_BASE && tohost < ram_end {
        attach_ram(&mut map, RAM_BASE, tohost)?;
        attach_ram(&mut map, htif_end.min(ram_end), ram_end)?;
    } else {
        attach_ram(&mut map, RAM_BASE, ram_end)?;
    }
    let range = AddressRange::with_len(tohost, htif::LEN).map_err(invalid_data)?;
    map.attach(range, Box::new(Htif::new())).map_err(invalid_data)?;
    Ok(map)
}

fn read_tohost(core: &mut Core<MemoryMap>, tohost: u32) -> u64 {
    let bus = core.bus_mut();
    let low = bus.load(tohost, AccessSize::Word) as u64;
    let high = bus.load(tohost + 4, AccessSize::Word) as u64;
    high << 32 | low
}

fn write_signature(core: &mut Core<MemoryMap>, elf: &Elf, path: &str) -> io::Result<()> {
    let start = find_symbol(elf, "begin_signature")
        .ok_or_else(|| invalid_data("missing symbol `begin_signature`"))?;
    let end = find_symbol(elf, "end_signature")
        .ok_or_else(|| invalid_data("missing symbol `end_signature`"))?;
    if start % 16 != 0 || end % 4 != 0 || start > end {
        return Err(invalid_data("malformed signature bounds"));
    }

    let mut file = File::create(path)?;
    for address in (start..end).step_by(4) {
        let word = core.bus_mut().load(address, AccessSize::Word);
        writeln!(file, "{word:08x}")?;
    }
    Ok(())
}

fn main() -> io::Result<ExitCode> {
    let args = Args::parse();

    stderrlog::new()
        .verbosity(args.verbose as usize)
        .modules([module_path!(), "ferrite_core"])
        .init()
        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;

    let mut buf = Vec::new();
    let mut file = File::open(&args.elf)?;
    file.read_to_end(&mut buf)?;

    let elf = Elf::parse(&buf).map_err(invalid_data)?;
    let tohost = find_tohost(&elf).ok_or_else(|| invalid_data("missing `.tohost` section"))?;

    let mut map = build_memory_map(tohost)?;
    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        map.write_bytes(header.p_paddr as u32, &buf[header.file_range()]);
    }

    let config = Config {
        reset_vector: elf.entry as u32,
        ..Config::default()
    };
    let mut core = Core::new(map, config);
    core.reset_hard();

    let mut result = 0;
    for _ in 0..args.max_steps {
        core.step(CYCLES_PER_STEP);
        result = read_tohost(&mut core, tohost);
        if result != 0 {
            break;
        }
    }

    if let Some(path) = &args.signature {
        write_signature(&mut core, &elf, path)?;
    }

    match result {
        1 => {
            info!("passed after {} cycles", core.mcycle());
            Ok(ExitCode::SUCCESS)
        }
        0 => {
            warn!("no result after {} steps", args.max_steps);
            eprintln!("timeout");
            Ok(ExitCode::FAILURE)
        }
        _ => {
            eprintln!("failed test {}", result >> 1);
            Ok(ExitCode::FAILURE)
        }
    }
}
