//! AVR device memory maps, resolved from the part name.
//!
//! UPDI-programmed AVR parts share one register layout but differ in where
//! flash is mapped, how big it is, and (for the Dx family) where the fuse
//! and lock blocks live. The tables below cover the tiny, mega-0 and Dx
//! families; lookup is case sensitive and an unknown name is an error.

use crate::error::{Error, Result};

const DEFAULT_SYSCFG_BASE: u32 = 0x0F00;
const DEFAULT_NVMCTRL_BASE: u32 = 0x1000;
const DEFAULT_SIGROW_BASE: u32 = 0x1100;
const DEFAULT_FUSES_BASE: u32 = 0x1280;
const DEFAULT_USERROW_BASE: u32 = 0x1300;

/// AVR Dx series parts. Flash size is encoded in the name (KiB before the
/// family letters), flash is mapped high at 0x800000.
const AVR_DX: &[&str] = &[
    "avr128da28", "avr128da32", "avr128da48", "avr128da64", "avr64da28",
    "avr64da32", "avr64da48", "avr64da64", "avr32da28", "avr32da32",
    "avr32da48", "avr128db28", "avr128db32", "avr128db48", "avr128db64",
    "avr64db28", "avr64db32", "avr64db48", "avr64db64", "avr32db28",
    "avr32db32", "avr32db48", "avr64dd14", "avr64dd20", "avr64dd28",
    "avr64dd32", "avr32dd14", "avr32dd20", "avr32dd28", "avr32dd32",
    "avr16dd14", "avr16dd20", "avr16dd28", "avr16dd32",
];

/// One tiny/mega bucket: names sharing a flash size and page size.
struct FamilyBucket {
    names: &'static [&'static str],
    flash_base: u32,
    flash_size: u32,
    page_size: u32,
}

const MEGA_FLASH_BASE: u32 = 0x4000;
const TINY_FLASH_BASE: u32 = 0x8000;

const BUCKETS: &[FamilyBucket] = &[
    FamilyBucket {
        names: &["mega4808", "mega4809"],
        flash_base: MEGA_FLASH_BASE,
        flash_size: 48 * 1024,
        page_size: 128,
    },
    FamilyBucket {
        names: &["mega3208", "mega3209"],
        flash_base: MEGA_FLASH_BASE,
        flash_size: 32 * 1024,
        page_size: 128,
    },
    FamilyBucket {
        names: &["mega1608", "mega1609"],
        flash_base: MEGA_FLASH_BASE,
        flash_size: 16 * 1024,
        page_size: 64,
    },
    FamilyBucket {
        names: &["mega808", "mega809"],
        flash_base: MEGA_FLASH_BASE,
        flash_size: 8 * 1024,
        page_size: 64,
    },
    FamilyBucket {
        names: &["tiny3216", "tiny3217"],
        flash_base: TINY_FLASH_BASE,
        flash_size: 32 * 1024,
        page_size: 128,
    },
    FamilyBucket {
        names: &["tiny1604", "tiny1606", "tiny1607", "tiny1614", "tiny1616", "tiny1617"],
        flash_base: TINY_FLASH_BASE,
        flash_size: 16 * 1024,
        page_size: 64,
    },
    FamilyBucket {
        names: &["tiny804", "tiny806", "tiny807", "tiny814", "tiny816", "tiny817"],
        flash_base: TINY_FLASH_BASE,
        flash_size: 8 * 1024,
        page_size: 64,
    },
    FamilyBucket {
        names: &["tiny402", "tiny404", "tiny406", "tiny412", "tiny414", "tiny416", "tiny417"],
        flash_base: TINY_FLASH_BASE,
        flash_size: 4 * 1024,
        page_size: 64,
    },
    FamilyBucket {
        names: &["tiny202", "tiny204", "tiny212", "tiny214"],
        flash_base: TINY_FLASH_BASE,
        flash_size: 2 * 1024,
        page_size: 64,
    },
];

/// Per-part memory map constants, resolved once at session construction.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Part name as given (e.g. "tiny416", "avr128db32").
    pub name: String,
    /// Logical address where flash begins in the UPDI address space.
    pub flash_base: u32,
    /// Flash size in bytes, a multiple of `page_size`.
    pub flash_size: u32,
    /// Page buffer size in bytes (64, 128 or 256).
    pub page_size: u32,
    /// SYSCFG block base.
    pub syscfg_base: u32,
    /// NVM controller block base.
    pub nvmctrl_base: u32,
    /// Signature row base.
    pub sigrow_base: u32,
    /// Fuse block base.
    pub fuses_base: u32,
    /// User row base.
    pub userrow_base: u32,
    /// Lock register address; 0 on parts without a dedicated one.
    pub lock_addr: u32,
}

impl DeviceProfile {
    /// Resolve a part name against the family tables.
    pub fn new(name: &str) -> Result<Self> {
        if AVR_DX.contains(&name) {
            // Flash size is the numeric infix of the name, in KiB.
            let digits: String = name
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            let kib: u32 = digits
                .parse()
                .map_err(|_| Error::UnknownDevice(name.to_string()))?;

            return Ok(Self {
                name: name.to_string(),
                flash_base: 0x800000,
                flash_size: kib * 1024,
                page_size: 256,
                syscfg_base: DEFAULT_SYSCFG_BASE,
                nvmctrl_base: DEFAULT_NVMCTRL_BASE,
                sigrow_base: DEFAULT_SIGROW_BASE,
                fuses_base: 0x1050,
                userrow_base: 0x1080,
                lock_addr: 0x1040,
            });
        }

        let bucket = BUCKETS
            .iter()
            .find(|b| b.names.contains(&name))
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            flash_base: bucket.flash_base,
            flash_size: bucket.flash_size,
            page_size: bucket.page_size,
            syscfg_base: DEFAULT_SYSCFG_BASE,
            nvmctrl_base: DEFAULT_NVMCTRL_BASE,
            sigrow_base: DEFAULT_SIGROW_BASE,
            fuses_base: DEFAULT_FUSES_BASE,
            userrow_base: DEFAULT_USERROW_BASE,
            lock_addr: 0,
        })
    }

    /// All part names the tables know about, sorted, for CLI diagnostics.
    pub fn supported_devices() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = AVR_DX
            .iter()
            .chain(BUCKETS.iter().flat_map(|b| b.names.iter()))
            .copied()
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dx_sizing() {
        let dev = DeviceProfile::new("avr128db32").unwrap();
        assert_eq!(dev.flash_base, 0x800000);
        assert_eq!(dev.flash_size, 131072);
        assert_eq!(dev.page_size, 256);
        assert_eq!(dev.fuses_base, 0x1050);
        assert_eq!(dev.userrow_base, 0x1080);
        assert_eq!(dev.lock_addr, 0x1040);
    }

    #[test]
    fn dx_size_from_name_infix() {
        assert_eq!(DeviceProfile::new("avr16dd14").unwrap().flash_size, 16 * 1024);
        assert_eq!(DeviceProfile::new("avr64da48").unwrap().flash_size, 64 * 1024);
    }

    #[test]
    fn tiny_sizing() {
        let dev = DeviceProfile::new("tiny416").unwrap();
        assert_eq!(dev.flash_base, 0x8000);
        assert_eq!(dev.flash_size, 4096);
        assert_eq!(dev.page_size, 64);
        assert_eq!(dev.fuses_base, 0x1280);
        assert_eq!(dev.lock_addr, 0);
    }

    #[test]
    fn mega_sizing() {
        let dev = DeviceProfile::new("mega4809").unwrap();
        assert_eq!(dev.flash_base, 0x4000);
        assert_eq!(dev.flash_size, 48 * 1024);
        assert_eq!(dev.page_size, 128);
        assert_eq!(dev.nvmctrl_base, 0x1000);
    }

    #[test]
    fn unknown_device_is_rejected() {
        assert!(matches!(
            DeviceProfile::new("tiny99999"),
            Err(Error::UnknownDevice(_))
        ));
        // Lookup is case sensitive.
        assert!(DeviceProfile::new("Tiny416").is_err());
    }

    #[test]
    fn table_invariants() {
        for name in DeviceProfile::supported_devices() {
            let dev = DeviceProfile::new(name).unwrap();
            assert!([64, 128, 256].contains(&dev.page_size), "{name}");
            assert_eq!(dev.flash_size % dev.page_size, 0, "{name}");
        }
    }
}
