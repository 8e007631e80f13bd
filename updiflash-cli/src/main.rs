//! updiflash CLI - flash AVR tiny/mega-0/Dx devices over UPDI.
//!
//! The default job is "flash and verify": enter programming mode (unlocking
//! with a chip erase if the part is locked), erase, program the HEX image
//! page by page, read the range back and compare. Reset, erase-only, SIB
//! info and fuse access are available as smaller actions.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use updiflash::{
    port::{NativePort, SerialConfig},
    DeviceProfile, HexImage, NvmProgrammer, UpdiLink, UpdiPhy, UpdiSession,
};

/// updiflash - program UPDI AVR devices through a serial adapter.
#[derive(Parser)]
#[command(name = "updiflash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target device name (e.g. tiny416, mega4809, avr128db32).
    #[arg(short, long)]
    device: String,

    /// Serial port of the UPDI adapter (e.g. /dev/ttyUSB0).
    #[arg(short, long)]
    comport: String,

    /// Baud rate (300, 9600, 19200, 38400 or 115200).
    #[arg(short, long)]
    baudrate: u32,

    /// Intel HEX file to flash (implies chip erase and verify).
    #[arg(short, long)]
    flash: Option<PathBuf>,

    /// Perform a chip erase.
    #[arg(short, long)]
    erase: bool,

    /// Reset the target and exit without touching NVM.
    #[arg(short, long)]
    reset: bool,

    /// Read and print the System Information Block.
    #[arg(short, long)]
    info: bool,

    /// Fuse number to write; requires --fusebit.
    #[arg(long, value_name = "N")]
    writefuse: Option<u32>,

    /// Fuse value for --writefuse.
    #[arg(long, value_name = "V")]
    fusebit: Option<u8>,

    /// Fuse number to read.
    #[arg(long, value_name = "N")]
    readfuse: Option<u32>,

    /// Verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// At least one action must be requested, and a fuse write needs its
    /// value. Any non-negative fuse index counts as a request.
    fn validate(&self) -> Result<()> {
        let any_action = self.flash.is_some()
            || self.erase
            || self.reset
            || self.info
            || self.writefuse.is_some()
            || self.readfuse.is_some();
        if !any_action {
            bail!("no valid action (flash, erase, reset, info or fuse access)");
        }

        if self.writefuse.is_some() && self.fusebit.is_none() {
            bail!("--writefuse requires --fusebit");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .init();

    cli.validate()?;

    let profile = lookup_device(&cli.device)?;
    debug!(
        "{}: flash {:#x}+{:#x}, page {}",
        profile.name, profile.flash_base, profile.flash_size, profile.page_size
    );

    let config = SerialConfig::new(&cli.comport, cli.baudrate);
    let port = NativePort::open(&config)
        .with_context(|| format!("failed to open {}", cli.comport))?;
    let link = UpdiLink::new(port)?;
    let phy = UpdiPhy::new(link).context("UPDI interface did not come up")?;
    let session = UpdiSession::new(&profile, phy);
    let mut nvm = NvmProgrammer::new(&profile, session);

    if cli.reset {
        nvm.leave_progmode()?;
        eprintln!("{} Target reset", style("✓").green());
        return Ok(());
    }

    let result = run_actions(&cli, &profile, &mut nvm);

    // The interface is disabled on the way out even after a failed action,
    // so the target leaves reset and runs its firmware.
    if let Err(err) = nvm.leave_progmode() {
        warn!("failed to leave programming mode: {err}");
    }

    result
}

/// Resolve the device name, listing the supported parts on a miss.
fn lookup_device(name: &str) -> Result<DeviceProfile> {
    DeviceProfile::new(name).map_err(|err| {
        eprintln!("Supported devices:");
        for chunk in DeviceProfile::supported_devices().chunks(6) {
            eprintln!("  {}", chunk.join(" "));
        }
        anyhow::Error::from(err)
    })
}

fn run_actions(
    cli: &Cli,
    profile: &DeviceProfile,
    nvm: &mut NvmProgrammer<'_, NativePort>,
) -> Result<()> {
    let sib = nvm.get_device_info()?;
    if cli.info {
        eprintln!("SIB: {}", style(sib.trim_end()).cyan());
    }

    // The single documented recovery: a locked part rejects the NVMProg
    // key, so fall back to the chip-erase key.
    if let Err(err) = nvm.enter_progmode() {
        warn!("failed to enter programming mode: {err}");
        eprintln!(
            "{} Device appears locked, unlocking with chip erase",
            style("!").yellow()
        );
        nvm.unlock_device()
            .context("failed to unlock the device")?;
    }

    if cli.erase {
        info!("erasing chip");
        nvm.chip_erase().context("chip erase failed")?;
        eprintln!("{} Chip erased", style("✓").green());
    }

    if let Some(ref hex_file) = cli.flash {
        flash_file(profile, nvm, hex_file)?;
    } else if let Some(fuse) = cli.writefuse {
        // Validation guarantees the value is present.
        let value = cli.fusebit.context("--writefuse requires --fusebit")?;
        nvm.write_fuse(fuse, value)
            .with_context(|| format!("failed to write fuse {fuse}"))?;
        eprintln!("{} Fuse {fuse} set to {value:#04x}", style("✓").green());
    } else if let Some(fuse) = cli.readfuse {
        let value = nvm
            .read_fuse(fuse)
            .with_context(|| format!("failed to read fuse {fuse}"))?;
        println!("Fuse {fuse} value is {value:#04x}");
    }

    Ok(())
}

/// Erase, program and verify one HEX image.
fn flash_file(
    profile: &DeviceProfile,
    nvm: &mut NvmProgrammer<'_, NativePort>,
    hex_file: &Path,
) -> Result<()> {
    let mut image = HexImage::new(profile.flash_size, profile.page_size);
    let start = image
        .load_file(hex_file)
        .with_context(|| format!("failed to load {}", hex_file.display()))?;

    info!(
        "firmware {} bytes in {} pages, start offset {start:#x}",
        image.firmware_size(),
        image.pages().len()
    );

    nvm.chip_erase().context("chip erase failed")?;

    let pb = page_progress(image.pages().len() as u64);
    pb.set_message("programming");
    nvm.write_flash(start, image.pages(), |done, _| {
        pb.set_position(done as u64);
    })
    .context("flash programming failed")?;
    pb.finish_and_clear();

    // Read the whole programmed range back and compare bytewise.
    let size = (image.pages().len() as u32) * profile.page_size;
    let read_back = nvm
        .read_flash(profile.flash_base, size)
        .context("flash read-back failed")?;

    if read_back.as_slice() != image.flash_data() {
        bail!("flash verification failed");
    }

    eprintln!("{} Programming successful", style("✓").green());
    Ok(())
}

fn page_progress(pages: u64) -> ProgressBar {
    if !console::Term::stderr().is_term() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(pages);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}
