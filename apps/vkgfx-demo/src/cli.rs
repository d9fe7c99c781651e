//! Command line flags.

use std::path::PathBuf;

use anyhow::{bail, Context};
use vkgfx_app::AppConfig;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Parsed demo flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoArgs {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub validation: bool,
    pub shader_dir: PathBuf,
    /// Albedo texture. A generated checkerboard is used when absent.
    pub texture: Option<PathBuf>,
    pub help: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            vsync: true,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders")),
            texture: None,
            help: false,
        }
    }
}

impl DemoArgs {
    /// Parse the process arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse flags, program name excluded.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--width" => parsed.width = number(&arg, args.next())?,
                "--height" => parsed.height = number(&arg, args.next())?,
                "--no-vsync" => parsed.vsync = false,
                "--validation" => parsed.validation = true,
                "--shaders" => parsed.shader_dir = PathBuf::from(value(&arg, args.next())?),
                "--texture" => parsed.texture = Some(PathBuf::from(value(&arg, args.next())?)),
                other => bail!("unknown argument `{other}` (see --help)"),
            }
        }

        Ok(parsed)
    }

    pub fn config(&self) -> AppConfig {
        AppConfig::new("vkgfx demo")
            .with_size(self.width, self.height)
            .with_vsync(self.vsync)
            .with_validation(self.validation)
            .with_shader_dir(&self.shader_dir)
    }
}

fn value(flag: &str, next: Option<String>) -> anyhow::Result<String> {
    next.with_context(|| format!("{flag} expects a value"))
}

fn number(flag: &str, next: Option<String>) -> anyhow::Result<u32> {
    let raw = value(flag, next)?;
    let parsed: u32 = raw
        .parse()
        .with_context(|| format!("{flag} expects a positive integer, got `{raw}`"))?;
    if parsed == 0 {
        bail!("{flag} must be greater than zero");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<DemoArgs> {
        DemoArgs::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn no_flags_gives_defaults() {
        assert_eq!(parse(&[]).unwrap(), DemoArgs::default());
    }

    #[test]
    fn every_flag_is_applied() {
        let args = parse(&[
            "--width",
            "800",
            "--height",
            "600",
            "--no-vsync",
            "--validation",
            "--shaders",
            "build/spv",
            "--texture",
            "crate.png",
        ])
        .unwrap();

        assert_eq!((args.width, args.height), (800, 600));
        assert!(!args.vsync);
        assert!(args.validation);
        assert_eq!(args.shader_dir, PathBuf::from("build/spv"));
        assert_eq!(args.texture, Some(PathBuf::from("crate.png")));
        assert!(!args.help);

        let config = args.config();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.shader_dir, PathBuf::from("build/spv"));
    }

    #[test]
    fn help_flag_short_and_long() {
        assert!(parse(&["-h"]).unwrap().help);
        assert!(parse(&["--help"]).unwrap().help);
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse(&["--width"]).is_err());
        assert!(parse(&["--width", "wide"]).is_err());
        assert!(parse(&["--height", "0"]).is_err());
        assert!(parse(&["--fullscreen"]).is_err());
    }
}
