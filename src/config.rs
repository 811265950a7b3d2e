//! Per-function style options and global graph settings.
//!
//! Options are usually given partially. [`FunctionOptions::merged`] deep-merges a
//! partial TOML value over [`FunctionOptions::default`]:
//!
//! ```text
//! defaults:  { style = "grid", grid_step = 50, lines = { color = "#ff0000", width = 1, visible = true }, ... }
//! donor:     { grid_step = 40, lines = { visible = false } }
//! merged:    { style = "grid", grid_step = 40, lines = { color = "#ff0000", width = 1, visible = false }, ... }
//! ```

use serde::{Deserialize, Serialize};
use toml::{Table, Value as TomlValue};

use crate::{
    cell::SnapMode,
    error::{FlyGraphError, Result},
    types::Value,
};

/// How a function's surface is drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    /// Two perpendicular families of lines.
    #[default]
    Grid,
    /// Lines of constant `x`, running along `z`.
    XLines,
    /// Lines of constant `z`, running along `x`.
    ZLines,
    /// Two flat shaded triangles per grid cell.
    Plates,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinesOptions {
    pub color: String,
    pub width: Value,
    pub visible: bool,
}

impl Default for LinesOptions {
    fn default() -> Self {
        Self {
            color: "#ff0000".into(),
            width: 1.,
            visible: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DotsOptions {
    pub color: String,
    pub width: Value,
    pub visible: bool,
}

impl Default for DotsOptions {
    fn default() -> Self {
        Self {
            color: "#000000".into(),
            width: 2.,
            visible: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatesOptions {
    pub color: String,
}

impl Default for PlatesOptions {
    fn default() -> Self {
        Self {
            color: "#ff0000".into(),
        }
    }
}

/// Style configuration of one registered function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionOptions {
    pub style: Style,
    /// Sampling resolution in world units.
    #[serde(alias = "gridStep")]
    pub grid_step: Value,
    pub lines: LinesOptions,
    pub dots: DotsOptions,
    pub plates: PlatesOptions,
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            style: Style::Grid,
            grid_step: 50.,
            lines: LinesOptions::default(),
            dots: DotsOptions::default(),
            plates: PlatesOptions::default(),
        }
    }
}

impl FunctionOptions {
    /// Deep-merges `donor` over the defaults and validates the result.
    pub fn merged(donor: &TomlValue) -> Result<Self> {
        let defaults = TomlValue::try_from(Self::default())?;
        let options: Self = deep_merge(&defaults, donor).try_into()?;
        options.validate()?;
        Ok(options)
    }

    /// Parses a partial TOML document, e.g. `grid_step = 40`, and merges it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let donor: Table = toml::from_str(source)?;
        Self::merged(&TomlValue::Table(donor))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.grid_step.is_finite() || self.grid_step <= 0. {
            return Err(FlyGraphError::InvalidGridStep(self.grid_step));
        }
        parse_hex_color(&self.lines.color)?;
        parse_hex_color(&self.dots.color)?;
        parse_hex_color(&self.plates.color)?;
        Ok(())
    }
}

/// Global settings shared by every function of a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Edge length of a chunk, and the camera's far plane.
    #[serde(alias = "cameraFar")]
    pub camera_far: Value,
    /// Uniform scale applied to both the input and the output of every function.
    pub scale: Value,
    #[serde(alias = "bgColor")]
    pub bg_color: String,
    pub snap: SnapMode,
    /// Draw the world axes with gizmos.
    #[serde(alias = "showAxes")]
    pub show_axes: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            camera_far: 5000.,
            scale: 1.,
            bg_color: "#ffffff".into(),
            snap: SnapMode::Truncate,
            show_axes: true,
        }
    }
}

impl GraphSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.camera_far.is_finite() || self.camera_far <= 0. {
            return Err(FlyGraphError::InvalidCellSize(self.camera_far));
        }
        if !self.scale.is_finite() || self.scale == 0. {
            return Err(FlyGraphError::InvalidScale(self.scale));
        }
        parse_hex_color(&self.bg_color)?;
        Ok(())
    }
}

/// Merges `donor` over `defaults`, keyed by the defaults.
///
/// Tables present on both sides merge recursively; any other donor value replaces
/// the default outright; keys missing from the donor keep the default. A donor key
/// may also be spelled in camelCase (`gridStep` for `grid_step`). Keys matching
/// no default are dropped with a warning.
pub fn deep_merge(defaults: &TomlValue, donor: &TomlValue) -> TomlValue {
    let (TomlValue::Table(defaults), TomlValue::Table(donor)) = (defaults, donor) else {
        return defaults.clone();
    };

    for key in donor.keys() {
        if !defaults.keys().any(|known| known == key || camel_case(known) == *key) {
            log::warn!("options: unknown key `{key}` ignored");
        }
    }

    let merged = defaults
        .iter()
        .map(|(key, default)| {
            let given = donor.get(key).or_else(|| donor.get(&camel_case(key)));
            let value = match (default, given) {
                (TomlValue::Table(_), Some(given @ TomlValue::Table(_))) => {
                    deep_merge(default, given)
                }
                (_, Some(given)) => given.clone(),
                (_, None) => default.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    TomlValue::Table(merged)
}

/// `grid_step` → `gridStep`.
fn camel_case(key: &str) -> String {
    let mut parts = key.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Parses `#rrggbb` (leading `#` optional) into sRGB components in `0..=1`.
pub fn parse_hex_color(hex: &str) -> Result<[f32; 3]> {
    let invalid = || FlyGraphError::InvalidColor(hex.to_string());
    let s = hex.trim_start_matches('#');
    if s.len() != 6 || !s.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&s[range], 16)
            .map(|c| c as f32 / 255.0)
            .map_err(|_| invalid())
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}
