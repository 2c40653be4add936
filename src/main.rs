//! `readdna`: print the DNA of the FPGA at one position of a JTAG chain.
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

use jtag_dna::cable::{self, CableConfig, CableKind, CableSubtype};
use jtag_dna::chain;
use jtag_dna::devicedb::DeviceDb;
use jtag_dna::dna::{DnaReadout, DnaSession, PollPolicy, DEFAULT_MAX_POLLS};
use jtag_dna::report::{self, ChainReport};
use jtag_dna::statemachine::JtagSM;
use jtag_dna::taps::Taps;
use jtag_dna::transport::Transport;

/// Read the DNA of a Spartan-3A/3AN/3A DSP or Spartan-6 FPGA
#[derive(Parser, Debug)]
#[command(name = "readdna")]
pub struct Args {
    /// Cable type
    #[arg(short = 'c', long, value_enum, default_value = "pp")]
    pub cable: CableKind,

    /// Parallel port device
    #[arg(short = 'd', long)]
    pub device: Option<String>,

    /// USB vendor id
    #[arg(short = 'V', long, value_parser = parse_u16)]
    pub vendor: Option<u16>,

    /// USB product id
    #[arg(short = 'P', long, value_parser = parse_u16)]
    pub product: Option<u16>,

    /// USB product description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// USB serial number
    #[arg(short = 's', long, visible_short_alias = 'S')]
    pub serial: Option<String>,

    /// FTDI board type, or `int` for the internal chain of a Platform Cable
    #[arg(short = 't', long = "subtype", value_enum, default_value = "none")]
    pub subtype: CableSubtype,

    /// Chain position of the FPGA, counting from the TAP nearest TDO
    #[arg(short = 'p', long = "chainpos", default_value = "0", value_parser = parse_i64,
        allow_negative_numbers = true)]
    pub chainpos: i64,

    /// TCK frequency in hertz
    #[arg(long, default_value = "1000000", value_parser = parse_u32)]
    pub clock: u32,

    /// Give up waiting for the configuration memory to clear after this many polls
    #[arg(long, default_value_t = DEFAULT_MAX_POLLS, value_parser = parse_polls)]
    pub max_polls: u32,

    /// Device list to use instead of the built-in one
    #[arg(long, env = "JTAG_DNA_DEVICEDB")]
    pub db: Option<PathBuf>,

    /// Print the chain and every shift
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("`{}`: {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_number(s)?).map_err(|_| format!("`{}` is out of range", s))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    u32::try_from(parse_number(s)?).map_err(|_| format!("`{}` is out of range", s))
}

fn parse_i64(s: &str) -> Result<i64, String> {
    match s.strip_prefix('-') {
        Some(rest) => Ok(-i64::try_from(parse_number(rest)?)
            .map_err(|_| format!("`{}` is out of range", s))?),
        None => i64::try_from(parse_number(s)?).map_err(|_| format!("`{}` is out of range", s)),
    }
}

fn parse_polls(s: &str) -> Result<u32, String> {
    match parse_u32(s)? {
        0 => Err("at least one poll is needed".into()),
        n => Ok(n),
    }
}

impl Args {
    fn cable_config(&self) -> CableConfig {
        CableConfig {
            kind: self.cable,
            device: self.device.clone(),
            vendor: self.vendor,
            product: self.product,
            description: self.description.clone(),
            serial: self.serial.clone(),
            subtype: self.subtype,
            clock: self.clock,
        }
    }
}

fn load_db(path: Option<&PathBuf>) -> anyhow::Result<DeviceDb> {
    match path {
        Some(path) => {
            info!("Using {}", path.display());
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            DeviceDb::parse(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(DeviceDb::builtin()),
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let db = load_db(args.db.as_ref())?;
    debug!("{} known devices", db.len());

    let config = args.cable_config();
    let cable = cable::open(&config).with_context(|| {
        if config.kind.is_usb() {
            let (vendor, product) = config.usb_ids();
            format!("Could not access USB device {:04x}:{:04x}", vendor, product)
        } else {
            format!("Could not access parallel port {}",
                config.device.as_deref().unwrap_or("/dev/parport0"))
        }
    })?;

    let mut taps = Taps::new(JtagSM::new(cable));
    taps.set_verbose(args.verbose);

    let mut chain = chain::enumerate(&mut taps, &db)?;
    if args.verbose {
        print!("{}", ChainReport(&chain));
    }
    let device = chain.select(args.chainpos)?;
    let policy = PollPolicy {
        max_attempts: args.max_polls,
    };

    let readout = DnaSession::new(&mut taps, device, policy).run()?;
    match report::dna_line(&readout) {
        Some(line) => println!("{}", line),
        None => {
            debug_assert_eq!(readout, DnaReadout::NotAvailable);
            info!("no DNA available at chain position {}", device.position);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex() {
        assert_eq!(parse_u16("0x15ba"), Ok(0x15ba));
        assert_eq!(parse_u16("1027"), Ok(0x0403));
        assert!(parse_u16("0x10000").is_err());
        assert_eq!(parse_i64("-1"), Ok(-1));
        assert_eq!(parse_i64("0x2"), Ok(2));
        assert!(parse_polls("0").is_err());
    }

    #[test]
    fn command_line() {
        let args = Args::try_parse_from([
            "readdna", "-c", "ftdi", "-t", "olimex", "-P", "0x002b", "-p", "1", "-v",
        ]).unwrap();
        assert_eq!(args.cable, CableKind::Ftdi);
        assert_eq!(args.chainpos, 1);
        assert_eq!(args.max_polls, DEFAULT_MAX_POLLS);
        assert_eq!(args.cable_config().usb_ids(), (0x15ba, 0x002b));
    }

    #[test]
    fn usb_cables() {
        let args = Args::try_parse_from(["readdna", "-c", "fx2", "-S", "A1B2"]).unwrap();
        assert_eq!(args.cable, CableKind::Fx2);
        assert_eq!(args.serial.as_deref(), Some("A1B2"));
        assert_eq!(args.cable_config().usb_ids(), (0xfffe, 0x0018));

        let args = Args::try_parse_from(["readdna", "-c", "xpc", "-t", "int", "-s", "0001"]).unwrap();
        assert_eq!(args.subtype, CableSubtype::Internal);
        assert_eq!(args.serial.as_deref(), Some("0001"));
        assert_eq!(args.cable_config().usb_ids(), (0x03fd, 0x0008));

        assert!(Args::try_parse_from(["readdna", "-c", "jlink"]).is_err());
    }

    #[test]
    fn negative_position_parses() {
        let args = Args::try_parse_from(["readdna", "-p", "-1"]).unwrap();
        assert_eq!(args.chainpos, -1);
    }
}
