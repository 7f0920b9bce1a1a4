//! Face warping effects driven by 68-point landmarks.
//!
//! Every effect maps an image to a new image of the same size. Geometric
//! effects build a [`DisplacementField`] and resample through it; the cartoon
//! effect is a pure filter and ignores landmark positions.

mod cartoon;
mod field;
mod geometric;

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::Serialize;

use crate::error::MorphError;
use crate::geometry::Landmarks;

pub use field::DisplacementField;

/// A face warping effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Effect {
    #[default]
    Bulge,
    Cartoon,
    Squeeze,
    BigEyes,
    WideSmile,
}

impl Effect {
    /// All effects in catalogue order.
    pub const ALL: [Effect; 5] = [
        Effect::Bulge,
        Effect::Cartoon,
        Effect::Squeeze,
        Effect::BigEyes,
        Effect::WideSmile,
    ];

    /// Stable identifier used on the wire.
    pub const fn id(self) -> &'static str {
        match self {
            Effect::Bulge => "bulge",
            Effect::Cartoon => "cartoon",
            Effect::Squeeze => "squeeze",
            Effect::BigEyes => "big_eyes",
            Effect::WideSmile => "wide_smile",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Effect::Bulge => "Bulge",
            Effect::Cartoon => "Cartoon",
            Effect::Squeeze => "Squeeze",
            Effect::BigEyes => "Big Eyes",
            Effect::WideSmile => "Wide Smile",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Effect::Bulge => "Fish-eye inflation",
            Effect::Cartoon => "Comic book style",
            Effect::Squeeze => "Tall & thin",
            Effect::BigEyes => "Enlarged eyes",
            Effect::WideSmile => "Exaggerated grin",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.id() == id)
    }

    /// Lenient lookup: unknown ids fall back to [`Effect::Bulge`].
    pub fn from_id_or_default(id: &str) -> Self {
        Self::from_id(id).unwrap_or_else(|| {
            tracing::debug!(id, "unknown effect id, using bulge");
            Effect::Bulge
        })
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Effect {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| MorphError::InvalidInput(format!("unknown effect: {s}")))
    }
}

/// Catalogue entry describing one effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// The five available effects, in catalogue order.
pub fn list_effects() -> Vec<EffectInfo> {
    Effect::ALL
        .into_iter()
        .map(|e| EffectInfo {
            id: e.id(),
            name: e.display_name(),
            description: e.description(),
        })
        .collect()
}

/// Apply `effect` at `strength` and return a new image of the same size.
///
/// Without usable landmarks (`None`, or a face collapsed to a few pixels)
/// the input is returned unchanged.
pub fn apply_effect(
    image: &RgbImage,
    landmarks: Option<&Landmarks>,
    effect: Effect,
    strength: f32,
) -> RgbImage {
    let Some(landmarks) = landmarks else {
        return image.clone();
    };
    if landmarks.is_degenerate() || image.width() == 0 || image.height() == 0 {
        tracing::debug!(%effect, "no usable face, returning input");
        return image.clone();
    }

    tracing::debug!(%effect, strength, "applying effect");
    match effect {
        Effect::Bulge => geometric::bulge(image, landmarks, strength),
        Effect::Cartoon => cartoon::cartoon(image, strength),
        Effect::Squeeze => geometric::squeeze(image, landmarks, strength),
        Effect::BigEyes => geometric::big_eyes(image, landmarks, strength),
        Effect::WideSmile => geometric::wide_smile(image, landmarks, strength),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_str() {
        for effect in Effect::ALL {
            assert_eq!(effect.id().parse::<Effect>().unwrap(), effect);
            assert_eq!(effect.to_string(), effect.id());
        }
        assert!("sepia".parse::<Effect>().is_err());
    }

    #[test]
    fn unknown_id_falls_back_to_bulge() {
        assert_eq!(Effect::from_id_or_default("nope"), Effect::Bulge);
        assert_eq!(Effect::from_id_or_default("cartoon"), Effect::Cartoon);
        assert_eq!(Effect::default(), Effect::Bulge);
    }

    #[test]
    fn catalogue_has_five_entries_in_order() {
        let ids: Vec<_> = list_effects().iter().map(|e| e.id).collect();
        assert_eq!(ids, ["bulge", "cartoon", "squeeze", "big_eyes", "wide_smile"]);
        assert_eq!(list_effects()[3].name, "Big Eyes");
    }

    #[test]
    fn extreme_strengths_keep_dimensions() {
        let image = RgbImage::from_fn(40, 40, |x, y| image::Rgb([(x * 6) as u8, (y * 6) as u8, 90]));
        let face = crate::geometry::FaceBox::new(5, 5, 35, 35);
        let landmarks = crate::landmarks::estimate_landmarks(40, 40, Some(face));
        for effect in [Effect::Bulge, Effect::Squeeze, Effect::BigEyes, Effect::WideSmile] {
            for strength in [-100.0, 1e30, -1e30] {
                let out = apply_effect(&image, Some(&landmarks), effect, strength);
                assert_eq!(out.dimensions(), (40, 40), "{effect} at {strength}");
            }
        }
    }

    #[test]
    fn missing_landmarks_return_copy() {
        let image = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8, y as u8, 3]));
        for effect in Effect::ALL {
            assert_eq!(apply_effect(&image, None, effect, 1.0), image);
        }
    }
}
