// Host platform and architecture detection

use crate::error::SetupError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> anyhow::Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> anyhow::Result<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" => Ok(Platform::MacOs),
            "windows" | "win32" => Ok(Platform::Windows),
            other => Err(SetupError::config(format!("Unsupported platform: {}", other)).into()),
        }
    }

    /// Name used in cache keys; matches the runner's platform names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "darwin",
            Platform::Windows => "win32",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
    X86,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Arch::Arm64,
            "x86" => Arch::X86,
            _ => Arch::X86_64,
        }
    }

    /// Parse the `arch` input; empty means the host architecture.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_lowercase()) {
            Some(h) if h == "arm64" || h == "aarch64" => Arch::Arm64,
            Some(h) if h.contains("64") => Arch::X86_64,
            Some(h) if h == "x86" || h == "i686" || h == "i386" || h == "32" => Arch::X86,
            _ => Self::current(),
        }
    }

    /// Spelling used in Neovim asset names
    pub fn neovim_name(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            _ => "x86_64",
        }
    }

    /// Spelling used by the Windows Vim installer and vcvarsall
    pub fn windows_name(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            _ => "x64",
        }
    }
}
