//! Extended Graphics State Dictionary support according to ISO 32000-1 Section 8.4
//!
//! An [`ExtGState`] is a typed view of an `/ExtGState` resource. It turns into
//! a [`Dictionary`] for registration in a document and can be read back
//! from one.

use crate::graphics::{LineCap, LineJoin};
use crate::objects::{Array, Dictionary, Name, Object};

/// Rendering intent values according to ISO 32000-1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    AbsoluteColorimetric,
    RelativeColorimetric,
    Saturation,
    Perceptual,
}

impl RenderingIntent {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            RenderingIntent::AbsoluteColorimetric => "AbsoluteColorimetric",
            RenderingIntent::RelativeColorimetric => "RelativeColorimetric",
            RenderingIntent::Saturation => "Saturation",
            RenderingIntent::Perceptual => "Perceptual",
        }
    }

    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "AbsoluteColorimetric" => Some(RenderingIntent::AbsoluteColorimetric),
            "RelativeColorimetric" => Some(RenderingIntent::RelativeColorimetric),
            "Saturation" => Some(RenderingIntent::Saturation),
            "Perceptual" => Some(RenderingIntent::Perceptual),
            _ => None,
        }
    }
}

/// Blend mode values for transparency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    ColorDodge,
    ColorBurn,
    Darken,
    Lighten,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    const ALL: [BlendMode; 16] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    pub fn pdf_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::SoftLight => "SoftLight",
            BlendMode::HardLight => "HardLight",
            BlendMode::ColorDodge => "ColorDodge",
            BlendMode::ColorBurn => "ColorBurn",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// `Compatible` is a deprecated alias of `Normal`.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        if name == "Compatible" {
            return Some(BlendMode::Normal);
        }
        Self::ALL.into_iter().find(|mode| mode.pdf_name() == name)
    }
}

/// Line dash pattern
#[derive(Debug, Clone, PartialEq)]
pub struct LineDashPattern {
    pub array: Vec<f64>,
    pub phase: f64,
}

impl LineDashPattern {
    pub fn new(array: Vec<f64>, phase: f64) -> Self {
        Self { array, phase }
    }

    pub fn solid() -> Self {
        Self {
            array: Vec::new(),
            phase: 0.0,
        }
    }

    pub fn dashed(dash_length: f64, gap_length: f64) -> Self {
        Self {
            array: vec![dash_length, gap_length],
            phase: 0.0,
        }
    }

    /// `[[dash gap ...] phase]`, the form used by the `/D` entry.
    pub fn to_object(&self) -> Object {
        let lengths: Array = self.array.iter().map(|&len| Object::Real(len)).collect();
        Object::Array(Array::from(vec![
            Object::Array(lengths),
            Object::Real(self.phase),
        ]))
    }

    pub fn from_object(object: &Object) -> Option<Self> {
        let outer = object.as_array()?;
        let lengths = outer.get(0)?.as_array()?;
        let phase = outer.get(1)?.as_real()?;
        let array = lengths.iter().map(Object::as_real).collect::<Option<Vec<f64>>>()?;
        Some(Self { array, phase })
    }
}

/// Extended Graphics State Dictionary according to ISO 32000-1 Section 8.4
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtGState {
    /// Line width (LW)
    pub line_width: Option<f64>,
    /// Line cap style (LC)
    pub line_cap: Option<LineCap>,
    /// Line join style (LJ)
    pub line_join: Option<LineJoin>,
    /// Miter limit (ML)
    pub miter_limit: Option<f64>,
    /// Line dash pattern (D)
    pub dash_pattern: Option<LineDashPattern>,
    /// Rendering intent (RI)
    pub rendering_intent: Option<RenderingIntent>,
    /// Overprint for stroking operations (OP)
    pub overprint_stroke: Option<bool>,
    /// Overprint for non-stroking operations (op)
    pub overprint_fill: Option<bool>,
    /// Overprint mode (OPM)
    pub overprint_mode: Option<u8>,
    /// Flatness tolerance (FL)
    pub flatness: Option<f64>,
    /// Automatic stroke adjustment (SA)
    pub stroke_adjustment: Option<bool>,
    /// Blend mode (BM)
    pub blend_mode: Option<BlendMode>,
    /// Alpha constant for stroking (CA)
    pub alpha_stroke: Option<f64>,
    /// Alpha constant for non-stroking (ca)
    pub alpha_fill: Option<f64>,
    /// Alpha source flag (AIS)
    pub alpha_is_shape: Option<bool>,
    /// Text knockout flag (TK)
    pub text_knockout: Option<bool>,
}

impl ExtGState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = Some(width.max(0.0));
        self
    }

    pub fn with_line_cap(mut self, cap: LineCap) -> Self {
        self.line_cap = Some(cap);
        self
    }

    pub fn with_line_join(mut self, join: LineJoin) -> Self {
        self.line_join = Some(join);
        self
    }

    pub fn with_miter_limit(mut self, limit: f64) -> Self {
        self.miter_limit = Some(limit.max(1.0));
        self
    }

    pub fn with_dash_pattern(mut self, pattern: LineDashPattern) -> Self {
        self.dash_pattern = Some(pattern);
        self
    }

    pub fn with_rendering_intent(mut self, intent: RenderingIntent) -> Self {
        self.rendering_intent = Some(intent);
        self
    }

    pub fn with_overprint_stroke(mut self, overprint: bool) -> Self {
        self.overprint_stroke = Some(overprint);
        self
    }

    pub fn with_overprint_fill(mut self, overprint: bool) -> Self {
        self.overprint_fill = Some(overprint);
        self
    }

    pub fn with_overprint_mode(mut self, mode: u8) -> Self {
        self.overprint_mode = Some(mode.min(1));
        self
    }

    pub fn with_flatness(mut self, flatness: f64) -> Self {
        self.flatness = Some(flatness.clamp(0.0, 100.0));
        self
    }

    pub fn with_stroke_adjustment(mut self, adjustment: bool) -> Self {
        self.stroke_adjustment = Some(adjustment);
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = Some(mode);
        self
    }

    pub fn with_alpha_stroke(mut self, alpha: f64) -> Self {
        self.alpha_stroke = Some(alpha.clamp(0.0, 1.0));
        self
    }

    pub fn with_alpha_fill(mut self, alpha: f64) -> Self {
        self.alpha_fill = Some(alpha.clamp(0.0, 1.0));
        self
    }

    /// Set alpha constant for both stroking and non-stroking operations
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        let clamped = alpha.clamp(0.0, 1.0);
        self.alpha_stroke = Some(clamped);
        self.alpha_fill = Some(clamped);
        self
    }

    pub fn with_alpha_is_shape(mut self, is_shape: bool) -> Self {
        self.alpha_is_shape = Some(is_shape);
        self
    }

    pub fn with_text_knockout(mut self, knockout: bool) -> Self {
        self.text_knockout = Some(knockout);
        self
    }

    pub fn uses_transparency(&self) -> bool {
        self.alpha_stroke.is_some_and(|a| a < 1.0)
            || self.alpha_fill.is_some_and(|a| a < 1.0)
            || self.blend_mode.is_some_and(|mode| mode != BlendMode::Normal)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("ExtGState"));

        if let Some(width) = self.line_width {
            dict.set("LW", width);
        }
        if let Some(cap) = self.line_cap {
            dict.set("LC", cap as i64);
        }
        if let Some(join) = self.line_join {
            dict.set("LJ", join as i64);
        }
        if let Some(limit) = self.miter_limit {
            dict.set("ML", limit);
        }
        if let Some(ref pattern) = self.dash_pattern {
            dict.set("D", pattern.to_object());
        }
        if let Some(intent) = self.rendering_intent {
            dict.set("RI", Name::from(intent.pdf_name()));
        }
        if let Some(op) = self.overprint_stroke {
            dict.set("OP", op);
        }
        if let Some(op) = self.overprint_fill {
            dict.set("op", op);
        }
        if let Some(mode) = self.overprint_mode {
            dict.set("OPM", mode as i64);
        }
        if let Some(flatness) = self.flatness {
            dict.set("FL", flatness);
        }
        if let Some(sa) = self.stroke_adjustment {
            dict.set("SA", sa);
        }
        if let Some(mode) = self.blend_mode {
            dict.set("BM", Name::from(mode.pdf_name()));
        }
        if let Some(alpha) = self.alpha_stroke {
            dict.set("CA", alpha);
        }
        if let Some(alpha) = self.alpha_fill {
            dict.set("ca", alpha);
        }
        if let Some(ais) = self.alpha_is_shape {
            dict.set("AIS", ais);
        }
        if let Some(tk) = self.text_knockout {
            dict.set("TK", tk);
        }

        dict
    }

    /// Reads the entries this type knows; everything else is ignored.
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let name_of = |key: &str| dict.get_name(key).and_then(|n| n.as_str());
        let real = |key: &str| dict.get(key).and_then(Object::as_real);
        let flag = |key: &str| dict.get(key).and_then(Object::as_bool);

        Self {
            line_width: real("LW"),
            line_cap: dict.get_integer("LC").and_then(LineCap::from_code),
            line_join: dict.get_integer("LJ").and_then(LineJoin::from_code),
            miter_limit: real("ML"),
            dash_pattern: dict.get("D").and_then(LineDashPattern::from_object),
            rendering_intent: name_of("RI").and_then(RenderingIntent::from_pdf_name),
            overprint_stroke: flag("OP"),
            overprint_fill: flag("op"),
            overprint_mode: dict
                .get_integer("OPM")
                .and_then(|mode| u8::try_from(mode).ok()),
            flatness: real("FL"),
            stroke_adjustment: flag("SA"),
            blend_mode: name_of("BM").and_then(BlendMode::from_pdf_name),
            alpha_stroke: real("CA"),
            alpha_fill: real("ca"),
            alpha_is_shape: flag("AIS"),
            text_knockout: flag("TK"),
        }
    }
}

impl From<ExtGState> for Object {
    fn from(state: ExtGState) -> Self {
        Object::Dictionary(state.to_dictionary())
    }
}
