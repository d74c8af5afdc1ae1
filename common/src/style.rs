use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Column;

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("Unknown color {0}")]
    UnknownColor(String),
    #[error("Duplicate {column} style for {id}")]
    Duplicate { column: Column, id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Marker {
    Circle,
    Square,
    TriangleUp,
    TriangleDown,
    TriangleLeft,
    TriangleRight,
    Diamond,
    Pentagon,
    Hexagon,
    Octagon,
    Star,
    Plus,
    Cross,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    DashDot,
}

/// Marker cycle for series without a registry entry
pub const MARKERS: [Marker; 9] = [
    Marker::Circle,
    Marker::Square,
    Marker::TriangleUp,
    Marker::Diamond,
    Marker::Star,
    Marker::Pentagon,
    Marker::Hexagon,
    Marker::Octagon,
    Marker::TriangleDown,
];

/// Colour cycle for series without a registry colour (tab10)
pub const COLORS: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

const NAMED_COLORS: &[(&str, RGBColor)] = &[
    ("tab:blue", COLORS[0]),
    ("tab:orange", COLORS[1]),
    ("tab:green", COLORS[2]),
    ("tab:red", COLORS[3]),
    ("tab:purple", COLORS[4]),
    ("tab:brown", COLORS[5]),
    ("tab:pink", COLORS[6]),
    ("tab:gray", COLORS[7]),
    ("tab:olive", COLORS[8]),
    ("tab:cyan", COLORS[9]),
    ("black", RGBColor(0, 0, 0)),
    ("blue", RGBColor(0, 0, 255)),
    ("brown", RGBColor(165, 42, 42)),
    ("cyan", RGBColor(0, 255, 255)),
    ("gold", RGBColor(255, 215, 0)),
    ("green", RGBColor(0, 128, 0)),
    ("grey", RGBColor(128, 128, 128)),
    ("gray", RGBColor(128, 128, 128)),
    ("lightcoral", RGBColor(240, 128, 128)),
    ("lightskyblue", RGBColor(135, 206, 250)),
    ("limegreen", RGBColor(50, 205, 50)),
    ("magenta", RGBColor(255, 0, 255)),
    ("navy", RGBColor(0, 0, 128)),
    ("olive", RGBColor(128, 128, 0)),
    ("orange", RGBColor(255, 165, 0)),
    ("pink", RGBColor(255, 192, 203)),
    ("purple", RGBColor(128, 0, 128)),
    ("red", RGBColor(255, 0, 0)),
    ("royalblue", RGBColor(65, 105, 225)),
    ("turquoise", RGBColor(64, 224, 208)),
];

/// Accepts the names above or `#rrggbb`
pub fn parse_color(name: &str) -> Result<RGBColor, StyleError> {
    if let Some(hex) = name.strip_prefix('#')
        && hex.len() == 6
    {
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        if let (Ok(r), Ok(g), Ok(b)) = (channel(0), channel(2), channel(4)) {
            return Ok(RGBColor(r, g, b));
        }
    }
    NAMED_COLORS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, c)| *c)
        .ok_or_else(|| StyleError::UnknownColor(name.to_owned()))
}

/// Display properties of one implementation or mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeriesStyle {
    pub id: String,
    pub name: String,
    /// Output block size in bytes, used to derive key sizes
    #[serde(default)]
    pub block_size: Option<u64>,
    #[serde(default)]
    pub marker: Option<Marker>,
    #[serde(default)]
    pub line: LineStyle,
    #[serde(default)]
    pub color: Option<String>,
}

/// Style registry, in legend order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Styles {
    #[serde(default)]
    pub implementation: Vec<SeriesStyle>,
    #[serde(default)]
    pub enc_mode: Vec<SeriesStyle>,
}

impl Styles {
    pub fn registry(&self, column: Column) -> &[SeriesStyle] {
        match column {
            Column::Implementation => &self.implementation,
            Column::EncMode => &self.enc_mode,
            _ => &[],
        }
    }

    pub fn get(&self, column: Column, id: &str) -> Option<&SeriesStyle> {
        self.registry(column).iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<(), StyleError> {
        for column in [Column::Implementation, Column::EncMode] {
            let registry = self.registry(column);
            for (i, style) in registry.iter().enumerate() {
                if registry[..i].iter().any(|s| s.id == style.id) {
                    return Err(StyleError::Duplicate {
                        column,
                        id: style.id.clone(),
                    });
                }
                if let Some(color) = &style.color {
                    parse_color(color)?;
                }
            }
        }
        Ok(())
    }
}

/// Fully resolved drawing style of one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Look {
    pub marker: Marker,
    pub line: LineStyle,
    pub color: RGBColor,
}

impl Look {
    /// Registry values where present, otherwise the `index`th entry of the
    /// default cycles
    pub fn resolve(style: Option<&SeriesStyle>, index: usize) -> Result<Self, StyleError> {
        let color = match style.and_then(|s| s.color.as_deref()) {
            Some(name) => parse_color(name)?,
            None => COLORS[index % COLORS.len()],
        };
        Ok(Self {
            marker: style
                .and_then(|s| s.marker)
                .unwrap_or(MARKERS[index % MARKERS.len()]),
            line: style.map(|s| s.line).unwrap_or_default(),
            color,
        })
    }
}
