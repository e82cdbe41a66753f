//! Paint processing options attached to a draw

use covpath_paint::{Color, IRect};
use smallvec::SmallVec;

use crate::backend::GpuCaps;

/// sRGB conversion flags of the destination
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SrgbFlags {
    pub disable_output_conversion: bool,
    pub allow_input_conversion: bool,
}

/// Blend modes. Everything from `Overlay` on needs an advanced blend
/// equation or a copy of the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Clear,
    Src,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
}

impl BlendMode {
    pub fn is_advanced(self) -> bool {
        matches!(
            self,
            BlendMode::Overlay
                | BlendMode::Darken
                | BlendMode::Lighten
                | BlendMode::ColorDodge
                | BlendMode::ColorBurn
                | BlendMode::HardLight
                | BlendMode::SoftLight
                | BlendMode::Difference
                | BlendMode::Exclusion
                | BlendMode::Multiply
        )
    }
}

/// Identity of an opaque fragment stage (gradient, image shader, ...)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FragmentKey(pub u32);

/// Color and coverage stages plus the blend of a draw
///
/// Two draws can share a batch only if their sets compare equal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessorSet {
    pub color_fragments: SmallVec<[FragmentKey; 2]>,
    pub coverage_fragments: SmallVec<[FragmentKey; 2]>,
    pub blend: BlendMode,
    /// A color the stages always produce, replacing the draw's own
    pub constant_color: Option<Color>,
}

impl ProcessorSet {
    /// Plain color fill with src-over blending
    pub fn simple() -> Self {
        Self::default()
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_color_fragment(mut self, key: FragmentKey) -> Self {
        self.color_fragments.push(key);
        self
    }

    pub fn with_constant_color(mut self, color: Color) -> Self {
        self.constant_color = Some(color);
        self
    }

    /// Resolve what the draw needs from the pipeline.
    pub fn analyze(&self, color: Color, caps: &GpuCaps, clip: Option<&AppliedClip>) -> Analysis {
        if !color.is_finite() || self.constant_color.is_some_and(|c| !c.is_finite()) {
            return Analysis::default();
        }
        let clip_coverage = clip.is_some_and(|c| c.coverage_fragments > 0);
        let has_coverage = clip_coverage || !self.coverage_fragments.is_empty();
        Analysis {
            requires_dst_texture: self.blend.is_advanced() && !caps.advanced_blend_support,
            overridden_color: self.constant_color,
            has_coverage,
        }
    }
}

/// The clip a draw ends up with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedClip {
    pub scissor: Option<IRect>,
    /// Coverage stages contributed by the clip (clip-path processors)
    pub coverage_fragments: usize,
}

/// Result of [`ProcessorSet::analyze`]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Analysis {
    pub requires_dst_texture: bool,
    pub overridden_color: Option<Color>,
    /// Some stage besides the path itself modulates coverage
    pub has_coverage: bool,
}

/// Color plus processing options of a draw
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Paint {
    pub color: Color,
    pub processors: ProcessorSet,
    pub srgb_flags: SrgbFlags,
}

impl Paint {
    pub fn color(color: Color) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }
}
