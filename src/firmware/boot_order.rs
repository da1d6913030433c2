//! EEPROM `BOOT_ORDER` values.
//!
//! The bootloader reads the value one hex nibble at a time starting from the
//! least significant, so `0xf416` tries NVMe (6), then SD (1), then USB (4),
//! then restarts the sequence (f).

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSource {
    SdCardDetect,
    SdCard,
    Network,
    RpiBoot,
    UsbMassStorage,
    BcmUsbMassStorage,
    Nvme,
    Http,
    Stop,
    Restart,
}

impl BootSource {
    pub fn nibble(self) -> u8 {
        match self {
            Self::SdCardDetect => 0x0,
            Self::SdCard => 0x1,
            Self::Network => 0x2,
            Self::RpiBoot => 0x3,
            Self::UsbMassStorage => 0x4,
            Self::BcmUsbMassStorage => 0x5,
            Self::Nvme => 0x6,
            Self::Http => 0x7,
            Self::Stop => 0xe,
            Self::Restart => 0xf,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            0x0 => Self::SdCardDetect,
            0x1 => Self::SdCard,
            0x2 => Self::Network,
            0x3 => Self::RpiBoot,
            0x4 => Self::UsbMassStorage,
            0x5 => Self::BcmUsbMassStorage,
            0x6 => Self::Nvme,
            0x7 => Self::Http,
            0xe => Self::Stop,
            0xf => Self::Restart,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SdCardDetect => "SD card (detect)",
            Self::SdCard => "SD card",
            Self::Network => "network",
            Self::RpiBoot => "rpiboot",
            Self::UsbMassStorage => "USB mass storage",
            Self::BcmUsbMassStorage => "BCM USB mass storage",
            Self::Nvme => "NVMe",
            Self::Http => "HTTP",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

/// Boot sources in the order the bootloader tries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOrder {
    sources: Vec<BootSource>,
}

impl BootOrder {
    /// `preferred`, then `fallback`, then USB, then start over.
    pub fn preferring(preferred: BootSource, fallback: BootSource) -> Self {
        let mut sources = vec![preferred];
        for source in [fallback, BootSource::UsbMassStorage] {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources.push(BootSource::Restart);
        Self { sources }
    }

    /// NVMe first, falling back to the SD card the Pi booted from.
    pub fn nvme_first() -> Self {
        Self::preferring(BootSource::Nvme, BootSource::SdCard)
    }

    pub fn sources(&self) -> &[BootSource] {
        &self.sources
    }

    pub fn first(&self) -> BootSource {
        self.sources[0]
    }

    /// Human-readable order, e.g. "NVMe, SD card, USB mass storage, restart".
    pub fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BootOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for source in self.sources.iter().rev() {
            write!(f, "{:x}", source.nibble())?;
        }
        Ok(())
    }
}

impl FromStr for BootOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > 8 {
            bail!("boot order must have 1-8 hex digits: {:?}", s);
        }

        let mut sources = Vec::with_capacity(digits.len());
        for c in digits.chars().rev() {
            let Some(nibble) = c.to_digit(16) else {
                bail!("invalid hex digit {:?} in boot order {:?}", c, s);
            };
            let Some(source) = BootSource::from_nibble(nibble as u8) else {
                bail!("unknown boot mode {:x} in boot order {:?}", nibble, s);
            };
            sources.push(source);
        }
        Ok(Self { sources })
    }
}
