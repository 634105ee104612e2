//! Materials and the per-object material table.
//!
//! Every property is stored in one of two flat arrays, one row per object id
//! with row 0 describing the medium the camera starts in (unless a root
//! object encloses it). Property `p` of object `id` sits at `p * (n + 1) + id`.

use std::collections::BTreeMap;

use crate::geometry::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorProperty {
    Diffuse,
    Emission,
    Reflection,
    Transparency,
    VolumeAbsorption,
}

impl ColorProperty {
    pub const ALL: [ColorProperty; 5] = [
        ColorProperty::Diffuse,
        ColorProperty::Emission,
        ColorProperty::Reflection,
        ColorProperty::Transparency,
        ColorProperty::VolumeAbsorption,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Upper-case name used for the OpenCL offset constants
    pub fn constant_name(self) -> &'static str {
        match self {
            ColorProperty::Diffuse => "DIFFUSE",
            ColorProperty::Emission => "EMISSION",
            ColorProperty::Reflection => "REFLECTION",
            ColorProperty::Transparency => "TRANSPARENCY",
            ColorProperty::VolumeAbsorption => "VOLUME_ABSORPTION",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarProperty {
    Ior,
    VolumeScattering,
    VolumeScatteringBlur,
    ReflectionBlur,
    TransparencyBlur,
}

impl ScalarProperty {
    pub const ALL: [ScalarProperty; 5] = [
        ScalarProperty::Ior,
        ScalarProperty::VolumeScattering,
        ScalarProperty::VolumeScatteringBlur,
        ScalarProperty::ReflectionBlur,
        ScalarProperty::TransparencyBlur,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn constant_name(self) -> &'static str {
        match self {
            ScalarProperty::Ior => "IOR",
            ScalarProperty::VolumeScattering => "VOLUME_SCATTERING",
            ScalarProperty::VolumeScatteringBlur => "VOLUME_SCATTERING_BLUR",
            ScalarProperty::ReflectionBlur => "REFLECTION_BLUR",
            ScalarProperty::TransparencyBlur => "TRANSPARENCY_BLUR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub diffuse: Vec3,
    pub emission: Vec3,
    pub reflection: Vec3,
    pub transparency: Vec3,
    pub volume_absorption: Vec3,

    pub ior: f32,
    pub volume_scattering: f32,
    pub volume_scattering_blur: f32,
    pub reflection_blur: f32,
    pub transparency_blur: f32,
}

// black, non-scattering and index-matched to air
impl Default for Material {
    fn default() -> Self {
        Material {
            diffuse: Vec3::zero(),
            emission: Vec3::zero(),
            reflection: Vec3::zero(),
            transparency: Vec3::zero(),
            volume_absorption: Vec3::zero(),
            ior: 1.0,
            volume_scattering: 0.0,
            volume_scattering_blur: 0.0,
            reflection_blur: 0.0,
            transparency_blur: 0.0,
        }
    }
}

impl Material {
    pub fn diffuse(color: Vec3) -> Material {
        Material { diffuse: color, ..Default::default() }
    }

    pub fn color(&self, property: ColorProperty) -> Vec3 {
        match property {
            ColorProperty::Diffuse => self.diffuse,
            ColorProperty::Emission => self.emission,
            ColorProperty::Reflection => self.reflection,
            ColorProperty::Transparency => self.transparency,
            ColorProperty::VolumeAbsorption => self.volume_absorption,
        }
    }

    pub fn scalar(&self, property: ScalarProperty) -> f32 {
        match property {
            ScalarProperty::Ior => self.ior,
            ScalarProperty::VolumeScattering => self.volume_scattering,
            ScalarProperty::VolumeScatteringBlur => self.volume_scattering_blur,
            ScalarProperty::ReflectionBlur => self.reflection_blur,
            ScalarProperty::TransparencyBlur => self.transparency_blur,
        }
    }

    /// Medium of row 0: air, shown magenta if anything ever shades it as a surface
    pub fn default_medium() -> Material {
        Material { diffuse: Vec3(1.0, 0.0, 1.0), volume_scattering_blur: 1.0, ..Default::default() }
    }

    pub fn preset(name: &str) -> Option<Material> {
        let m = match name {
            "default" => Material::default_medium(),
            "white" => Material::diffuse(Vec3::splat(0.8)),
            "green" => Material::diffuse(Vec3(0.4, 0.9, 0.4)),
            "red" => Material::diffuse(Vec3(0.7, 0.4, 0.4)),
            "mirror" => Material { diffuse: Vec3::splat(0.2), reflection: Vec3::splat(0.7), ..Default::default() },
            "light" => Material { diffuse: Vec3::splat(1.0), emission: Vec3(4.0, 2.0, 0.7), ..Default::default() },
            "sky" => Material { emission: Vec3(0.5, 0.5, 0.7), ..Default::default() },
            "glass" => Material {
                diffuse: Vec3::splat(0.1),
                transparency: Vec3::splat(0.7),
                reflection: Vec3::splat(0.2),
                ior: 1.5,
                ..Default::default()
            },
            "brushed_metal" => Material {
                diffuse: Vec3::splat(0.2),
                reflection: Vec3::splat(0.7),
                reflection_blur: 0.1,
                ..Default::default()
            },
            "wax" => Material {
                diffuse: Vec3::splat(0.02),
                reflection: Vec3::splat(0.05),
                reflection_blur: 0.3,
                transparency: Vec3::splat(0.9),
                transparency_blur: 0.7,
                volume_scattering: 0.5,
                volume_scattering_blur: 1.0,
                volume_absorption: (Vec3::splat(1.0) - Vec3(1.0, 0.8, 0.3)) * 4.0,
                ..Default::default()
            },
            _ => return None,
        };
        Some(m)
    }

    pub const PRESET_NAMES: [&'static str; 10] =
        ["default", "white", "green", "red", "mirror", "light", "sky", "glass", "brushed_metal", "wax"];

    /// Every preset, keyed by name
    pub fn presets() -> BTreeMap<String, Material> {
        Material::PRESET_NAMES
            .iter()
            .filter_map(|name| Some((name.to_string(), Material::preset(name)?)))
            .collect()
    }
}

/// Flattened material rows for objects `1..=n`, row 0 being the default medium
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialTable {
    rows: usize,
    pub colors: Vec<Vec3>,
    pub scalars: Vec<f32>,
}

impl MaterialTable {
    pub fn new(default: &Material, objects: &[Material]) -> Self {
        let rows = objects.len() + 1;
        let row = |id: usize| if id == 0 { default } else { &objects[id - 1] };

        let colors = ColorProperty::ALL
            .iter()
            .flat_map(|&p| (0..rows).map(move |id| (p, id)))
            .map(|(p, id)| row(id).color(p))
            .collect();
        let scalars = ScalarProperty::ALL
            .iter()
            .flat_map(|&p| (0..rows).map(move |id| (p, id)))
            .map(|(p, id)| row(id).scalar(p))
            .collect();

        MaterialTable { rows, colors, scalars }
    }

    /// Objects plus the default row
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn color(&self, property: ColorProperty, id: u32) -> Vec3 {
        self.view().color(property, id)
    }

    pub fn scalar(&self, property: ScalarProperty, id: u32) -> f32 {
        self.view().scalar(property, id)
    }

    pub fn view(&self) -> MaterialView<'_> {
        MaterialView { rows: self.rows, colors: &self.colors, scalars: &self.scalars }
    }
}

/// Borrowed material rows, as a kernel sees them
#[derive(Clone, Copy, Debug)]
pub struct MaterialView<'a> {
    pub rows: usize,
    pub colors: &'a [Vec3],
    pub scalars: &'a [f32],
}

impl MaterialView<'_> {
    pub fn color(&self, property: ColorProperty, id: u32) -> Vec3 {
        self.colors[color_index(self.rows, property, id)]
    }

    pub fn scalar(&self, property: ScalarProperty, id: u32) -> f32 {
        self.scalars[scalar_index(self.rows, property, id)]
    }
}

pub fn color_index(rows: usize, property: ColorProperty, id: u32) -> usize {
    property.index() * rows + id as usize
}

pub fn scalar_index(rows: usize, property: ScalarProperty, id: u32) -> usize {
    property.index() * rows + id as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_layout() {
        let glass = Material::preset("glass").unwrap();
        let light = Material::preset("light").unwrap();
        let table = MaterialTable::new(&Material::default_medium(), &[glass, light]);
        assert_eq!(table.rows(), 3);
        assert_eq!(table.colors.len(), 15);
        assert_eq!(table.scalars.len(), 15);

        // emission is the second color property
        assert_eq!(table.colors[3 + 2], Vec3(4.0, 2.0, 0.7));
        assert_eq!(table.color(ColorProperty::Emission, 2), Vec3(4.0, 2.0, 0.7));
        assert_eq!(table.color(ColorProperty::Diffuse, 0), Vec3(1.0, 0.0, 1.0));
        assert_eq!(table.scalar(ScalarProperty::Ior, 1), 1.5);
        assert_eq!(table.scalar(ScalarProperty::Ior, 2), 1.0);
        assert_eq!(table.scalar(ScalarProperty::VolumeScatteringBlur, 0), 1.0);
    }

    #[test]
    fn every_preset_name_resolves() {
        assert_eq!(Material::presets().len(), Material::PRESET_NAMES.len());
        assert!(Material::preset("unobtainium").is_none());
        let wax = Material::preset("wax").unwrap();
        assert!((wax.volume_absorption - Vec3(0.0, 0.8, 2.8)).length() < 1e-6);
    }
}
