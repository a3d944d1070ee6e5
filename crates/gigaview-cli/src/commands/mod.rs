pub mod config;
pub mod convert;
pub mod grid;
pub mod info;
pub mod render;
pub mod synth;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use gigaview_core::config::ViewerConfig;
use gigaview_core::decoder::{open_source, ImageSource, SyntheticSource};
use gigaview_core::geometry::Size;
use gigaview_core::viewport::ScaleMode;

const SYNTHETIC_PREFIX: &str = "synthetic:";

#[derive(Clone, Copy, ValueEnum)]
pub enum ScaleModeArg {
    Fit,
    Fill,
    Origin,
}

impl From<ScaleModeArg> for ScaleMode {
    fn from(arg: ScaleModeArg) -> Self {
        match arg {
            ScaleModeArg::Fit => ScaleMode::Fit,
            ScaleModeArg::Fill => ScaleMode::Fill,
            ScaleModeArg::Origin => ScaleMode::Origin,
        }
    }
}

/// Viewer config from a TOML file, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    let config: ViewerConfig = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents).context("Invalid viewer config")?
        }
        None => ViewerConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// `input` is a file path, or `synthetic:WxH` for a procedural image.
pub fn open_input(input: &str) -> Result<Arc<dyn ImageSource>> {
    if let Some(size) = input.strip_prefix(SYNTHETIC_PREFIX) {
        return Ok(Arc::new(SyntheticSource::new(parse_size(size)?)));
    }
    let path = Path::new(input);
    open_source(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_size(s: &str) -> Result<Size> {
    let Some((w, h)) = s.trim().split_once(['x', 'X']) else {
        bail!("Invalid size '{s}', expected WIDTHxHEIGHT");
    };
    let width: u32 = w.trim().parse().with_context(|| format!("Invalid width in '{s}'"))?;
    let height: u32 = h.trim().parse().with_context(|| format!("Invalid height in '{s}'"))?;
    if width == 0 || height == 0 {
        bail!("Size '{s}' must be non-zero");
    }
    Ok(Size::new(width, height))
}

/// Parse `X,Y` in source pixels.
pub fn parse_point(s: &str) -> Result<(f64, f64)> {
    let Some((x, y)) = s.split_once(',') else {
        bail!("Invalid point '{s}', expected X,Y");
    };
    let x: f64 = x.trim().parse().with_context(|| format!("Invalid x in '{s}'"))?;
    let y: f64 = y.trim().parse().with_context(|| format!("Invalid y in '{s}'"))?;
    Ok((x, y))
}
