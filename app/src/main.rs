use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use flash_core::{FlashAbstractionLayer, FlashRegion};
use flash_ll::sim::SimEnv;
use flash_ll::{create_flash_abstraction_layer, TARGET_FAMILY};
use lfs_port::{erase_region, prepare_region, PortConfig};
use log::LevelFilter;
use simplelog::{ConfigBuilder, SimpleLogger};
use std::io::{self, Write};
use time::macros::format_description;

#[derive(Parser, Debug)]
#[command(name = "fal_demo", version, about = "Flash abstraction layer demo over simulated flash", disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// Region offset from the flash base (defaults to the family's filesystem region)
    #[arg(long, requires = "region_size")]
    region_offset: Option<String>,
    /// Region size in bytes
    #[arg(long, requires = "region_offset")]
    region_size: Option<String>,
    /// Log flash operations (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print family, region and filesystem geometry
    Info,
    /// Erase and verify the whole region
    Prepare,
    /// Erase the units covering a range of the region
    Erase { offset: String, len: String },
    /// Check that an absolute range reads as erased
    Verify { addr: Option<String>, len: Option<String> },
    /// Read bytes at a region offset
    Read { offset: String, len: String },
    /// Program bytes at a region offset
    Write(WriteArgs),
    /// Dump part of the region in hex
    Dump { offset: Option<String>, len: Option<String> },
    /// Interactive shell
    Repl,
    /// Mount littlefs (formatting if needed) and bump a boot counter file
    #[cfg(feature = "littlefs")]
    Boot {
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
}

#[derive(Args, Debug)]
struct WriteArgs {
    offset: String,
    #[arg(long, conflicts_with = "str")] hex: Option<String>,
    #[arg(long, conflicts_with = "hex")] str: Option<String>,
    /// Pad the data with the erased value up to the program width
    #[arg(long)] pad: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    run_cli(cli)
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();
    SimpleLogger::init(level, log_cfg)?;
    Ok(())
}

fn open(cli: &Cli) -> Result<Box<dyn FlashAbstractionLayer>> {
    let region = match (&cli.region_offset, &cli.region_size) {
        (Some(off), Some(size)) => Some(FlashRegion::new(TARGET_FAMILY, parse_u32(off)?, parse_u32(size)?)?),
        _ => None,
    };
    let env = SimEnv::new()?;
    Ok(create_flash_abstraction_layer(env.flash, region)?)
}

fn run_cli(cli: Cli) -> Result<()> {
    let mut fal = open(&cli)?;
    match cli.cmd {
        Command::Info => print_info(fal.as_ref()),
        Command::Prepare => {
            prepare_region(fal.as_mut())?;
            println!("Region erased and verified ({} bytes).", fal.region().size);
        }
        Command::Erase { offset, len } => {
            erase(fal.as_mut(), &offset, &len)?;
        }
        Command::Verify { addr, len } => verify(fal.as_mut(), addr.as_deref(), len.as_deref())?,
        Command::Read { offset, len } => {
            let mut buf = vec![0u8; parse_u32(&len)? as usize];
            fal.read(parse_u32(&offset)?, &mut buf)?;
            println!("{}", hex::encode(buf));
        }
        Command::Write(w) => {
            let offset = parse_u32(&w.offset)?;
            let data = if let Some(h) = w.hex { decode_hex(&h)? } else if let Some(s) = w.str { s.into_bytes() } else { bail!("Provide --hex or --str"); };
            let data = if w.pad { pad(fal.as_ref(), data) } else { data };
            fal.write(offset, &data)?;
            println!("Wrote {} bytes at offset 0x{:X}", data.len(), offset);
        }
        Command::Dump { offset, len } => {
            let off = offset.as_deref().map(parse_u32).transpose()?.unwrap_or(0);
            let ln = len.as_deref().map(parse_u32).transpose()?.unwrap_or(256);
            dump(fal.as_mut(), off, ln)?;
        }
        Command::Repl => repl(fal)?,
        #[cfg(feature = "littlefs")]
        Command::Boot { times } => boot(fal, times)?,
    }
    Ok(())
}

fn print_info(fal: &dyn FlashAbstractionLayer) {
    let family = fal.family();
    let region = fal.region();
    let base = region.base_addr(family);
    println!("Family:");
    println!("- name:          {}", family.name);
    println!("- flash:         0x{:08X}..0x{:08X} ({} KiB)", family.base_addr(), family.end_addr(), family.total_size() / 1024);
    println!("- erase unit:    {:?} x{}", family.erase_kind, family.unit_count());
    println!("- program width: {}", family.program_width);
    println!("Region:");
    println!("- base:          0x{:08X}", base);
    println!("- size:          {} KiB", region.size / 1024);
    if let Ok((first, last)) = family.units_covering(base, region.size) {
        for i in first.index..=last.index {
            if let Some(u) = family.unit(i) {
                println!("  - {:?} {:3} @ 0x{:08X} ({} KiB)", family.erase_kind, u.index, u.addr, u.size / 1024);
            }
        }
    }
    match PortConfig::for_family(family, region) {
        Ok(p) => {
            println!("Filesystem:");
            println!("- read/prog:     {}/{}", p.read_size, p.prog_size);
            println!("- blocks:        {} x {} bytes", p.block_count, p.block_size);
            println!("- cache/lookahead: {}/{}", p.cache_size, p.lookahead_size);
        }
        Err(e) => println!("Filesystem: n/a ({})", e),
    }
}

#[cfg(feature = "littlefs")]
fn boot(fal: Box<dyn FlashAbstractionLayer>, times: u32) -> Result<()> {
    use lfs_port::littlefs::{mount_and_then, Littlefs};
    use lfs_port::{mount_or_format, BlockDeviceConfig};
    use littlefs2::path;

    let port = PortConfig::for_family(fal.family(), fal.region())?;
    let cfg = BlockDeviceConfig::new(fal, port)?;
    let outcome = mount_or_format(&mut Littlefs, &cfg)?;
    println!("Filesystem {:?}", outcome);
    for _ in 0..times {
        let count = mount_and_then(&cfg, |fs| {
            let count = match fs.read::<4>(path!("boot_count")) {
                Ok(bytes) if bytes.len() == 4 => {
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                }
                _ => 0,
            } + 1;
            fs.write(path!("boot_count"), &count.to_le_bytes())?;
            Ok(count)
        })?;
        println!("Boot count: {}", count);
    }
    print_stats(&**cfg.context.borrow());
    Ok(())
}

fn print_stats(fal: &dyn FlashAbstractionLayer) {
    let d = fal.diagnostics();
    println!("Read operations:  {}", d.read_count());
    println!("Write operations: {}", d.write_count());
    println!("Port errors:      {}", d.error_count());
}

fn erase(fal: &mut dyn FlashAbstractionLayer, offset: &str, len: &str) -> Result<()> {
    let (offset, len) = (parse_u32(offset)?, parse_u32(len)?);
    erase_region(fal, offset, len)?;
    println!("Erased and verified {} bytes at offset 0x{:X}", len, offset);
    Ok(())
}

fn verify(fal: &mut dyn FlashAbstractionLayer, addr: Option<&str>, len: Option<&str>) -> Result<()> {
    let region = fal.region();
    let addr = addr.map(parse_u32).transpose()?.unwrap_or(region.base_addr(fal.family()));
    let len = len.map(parse_u32).transpose()?.unwrap_or(region.size);
    if fal.verify_erased(addr, len) {
        println!("0x{:08X}+0x{:X} is erased", addr, len);
    } else {
        println!("0x{:08X}+0x{:X} is NOT erased", addr, len);
    }
    Ok(())
}

fn pad(fal: &dyn FlashAbstractionLayer, mut data: Vec<u8>) -> Vec<u8> {
    let family = fal.family();
    let width = family.program_width as usize;
    let padded = (data.len() + width - 1) / width * width;
    data.resize(padded, family.erased_value);
    data
}

fn dump(fal: &mut dyn FlashAbstractionLayer, off: u32, len: u32) -> Result<()> {
    let mut buf = vec![0u8; len as usize];
    fal.read(off, &mut buf)?;
    hexdump(off as usize, &buf);
    Ok(())
}

fn repl(mut fal: Box<dyn FlashAbstractionLayer>) -> Result<()> {
    let mut rl = rustyline::Editor::<(), _>::new()?;
    println!("Flash abstraction layer REPL ({}). Type 'help' or 'quit'.", fal.family().name);
    loop {
        let line = rl.readline("fal> ");
        let line = match line {
            Ok(s) => s,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        rl.add_history_entry(line).ok();
        match handle_repl_line(fal.as_mut(), line) {
            Ok(Control::Continue) => {}
            Ok(Control::Quit) => break,
            Err(e) => eprintln!("error: {}", e),
        }
        io::stdout().flush().ok();
    }
    print_stats(fal.as_ref());
    Ok(())
}

enum Control { Continue, Quit }

fn handle_repl_line(fal: &mut dyn FlashAbstractionLayer, line: &str) -> Result<Control> {
    let parts = shellwords(line);
    if parts.is_empty() { return Ok(Control::Continue); }
    match parts[0] {
        "help" => {
            println!("commands: info, prepare, erase <off> <len>, verify [addr] [len], read <off> <len>, write <off> --hex <bytes>|--str <text> [--pad], dump [off] [len], stats, sync, quit");
        }
        "quit" | "exit" => return Ok(Control::Quit),
        "info" => print_info(fal),
        "stats" => print_stats(fal),
        "sync" => { fal.sync()?; println!("ok"); }
        "prepare" => {
            prepare_region(fal)?;
            println!("ok");
        }
        "erase" => {
            if parts.len() < 3 { bail!("usage: erase <off> <len>"); }
            erase(fal, parts[1], parts[2])?;
        }
        "verify" => verify(fal, parts.get(1).copied(), parts.get(2).copied())?,
        "read" => {
            if parts.len() < 3 { bail!("usage: read <off> <len>"); }
            let off = parse_u32(parts[1])?; let len = parse_u32(parts[2])?;
            let mut buf = vec![0u8; len as usize];
            fal.read(off, &mut buf)?;
            println!("{}", hex::encode(buf));
        }
        "write" => {
            if parts.len() < 3 { bail!("usage: write <off> (--hex <bytes> | --str <text>) [--pad]"); }
            let off = parse_u32(parts[1])?;
            let mut data: Option<Vec<u8>> = None;
            let mut padded = false;
            let mut i = 2;
            while i < parts.len() {
                match parts[i] {
                    "--hex" => { i+=1; if i>=parts.len() { bail!("missing hex"); } data = Some(decode_hex(parts[i])?); },
                    "--str" => { i+=1; if i>=parts.len() { bail!("missing str"); } data = Some(parts[i].as_bytes().to_vec()); },
                    "--pad" => padded = true,
                    _ => bail!("unknown flag {}", parts[i]),
                }
                i+=1;
            }
            let data = data.ok_or_else(|| anyhow!("provide --hex or --str"))?;
            let data = if padded { pad(fal, data) } else { data };
            fal.write(off, &data)?;
            println!("ok");
        }
        "dump" => {
            let off = parts.get(1).map(|s| parse_u32(s)).transpose()?.unwrap_or(0);
            let len = parts.get(2).map(|s| parse_u32(s)).transpose()?.unwrap_or(256);
            dump(fal, off, len)?;
        }
        other => bail!("unknown command {}", other),
    }
    Ok(Control::Continue)
}

fn parse_u32(s: &str) -> Result<u32> {
    if let Some(rest) = s.strip_prefix("0x") { u32::from_str_radix(rest, 16).map_err(|_| anyhow!("invalid u32")) }
    else { s.parse::<u32>().map_err(|_| anyhow!("invalid u32")) }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = s.replace(' ', "").replace('_', "");
    if s.len() % 2 != 0 { bail!("hex must have even length"); }
    hex::decode(s).map_err(|e| anyhow!("{}", e))
}

fn hexdump(start: usize, data: &[u8]) {
    let mut off = 0usize;
    while off < data.len() {
        let line = &data[off..data.len().min(off + 16)];
        print!("{:08X}: ", start + off);
        for i in 0..16 { if i < line.len() { print!("{:02X} ", line[i]); } else { print!("   "); } }
        print!(" | ");
        for &b in line { let c = if (0x20..=0x7E).contains(&b) { b as char } else { '.' }; print!("{}", c); }
        println!();
        off += 16;
    }
}

fn shellwords(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_u32("0x40").unwrap(), 64);
        assert_eq!(parse_u32("64").unwrap(), 64);
        assert!(parse_u32("zz").is_err());
        assert_eq!(decode_hex("0xDE AD_be").unwrap(), vec![0xDE, 0xAD, 0xBE]);
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn repl_write_read_and_erase() {
        let env = SimEnv::new().unwrap();
        let mut fal = create_flash_abstraction_layer(env.flash.clone(), None).unwrap();
        assert!(matches!(handle_repl_line(fal.as_mut(), "write 0 --str abc --pad").unwrap(), Control::Continue));
        let base = fal.region().base_addr(fal.family());
        assert_eq!(&env.flash.snapshot(base, 3)[..], b"abc");

        handle_repl_line(fal.as_mut(), "erase 0 16").unwrap();
        assert!(fal.verify_erased(base, 16));
        assert!(handle_repl_line(fal.as_mut(), "read 0").is_err());
        assert!(matches!(handle_repl_line(fal.as_mut(), "quit").unwrap(), Control::Quit));
        assert_eq!(fal.diagnostics().write_count(), 1);
    }

    #[test]
    fn erase_reports_failed_unit() {
        let env = SimEnv::new().unwrap();
        let mut fal = create_flash_abstraction_layer(env.flash.clone(), None).unwrap();
        let base = fal.region().base_addr(fal.family());
        let unit = fal.family().sector_of(base).unwrap();
        env.flash.fail_erase(unit.index);
        assert!(erase(fal.as_mut(), "0", "16").is_err());
        assert!(handle_repl_line(fal.as_mut(), "erase 0 16").is_err());
        assert_eq!(fal.diagnostics().error_count(), 2);
    }
}
