//! Deterministic procedural stand-ins for unavailable remote assets.
//!
//! Generation is pure and offline: the same source identifier and
//! parameters always produce the same resource, nothing here performs I/O,
//! and nothing here can fail. When the network is down the whole experience
//! degrades to these stand-ins instead of breaking.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use noise::{NoiseFn, Perlin};
use tracing::debug;

use crate::mesh::{MeshAsset, MeshPrimitive};
use crate::texture::{TextureAsset, TextureFormat};

const FALLBACK_TEXTURE_SIZE: u32 = 64;

fn seed_for(source: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish() as u32
}

fn param(params: &BTreeMap<String, f64>, name: &str, default: f64) -> f64 {
    let value = params.get(name).copied().unwrap_or(default);
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Generate a substitute texture: a two-tone Perlin pattern seeded from the
/// source identifier. Tiling parameters (`u`, `v`) modulate the noise
/// frequency so distinct variants remain visually distinct.
pub fn fallback_texture(source: &str, params: &BTreeMap<String, f64>) -> TextureAsset {
    let perlin = Perlin::new(seed_for(source));
    let tile_u = param(params, "u", 1.0).abs().max(0.25);
    let tile_v = param(params, "v", 1.0).abs().max(0.25);

    let size = FALLBACK_TEXTURE_SIZE;
    let mut data = Vec::with_capacity((size * size * 4) as usize);

    for y in 0..size {
        for x in 0..size {
            let nx = x as f64 / size as f64 * 4.0 * tile_u;
            let ny = y as f64 / size as f64 * 4.0 * tile_v;
            // Perlin output is in [-1, 1]; remap to [0, 1].
            let n = (perlin.get([nx, ny]) + 1.0) * 0.5;
            let base = (64.0 + n * 128.0) as u8;
            data.push(base);
            data.push(base / 2 + 48);
            data.push(255 - base);
            data.push(255);
        }
    }

    debug!("generated fallback texture for '{}'", source);
    TextureAsset {
        width: size,
        height: size,
        data,
        format: TextureFormat::Rgba8,
    }
}

/// Venue object archetypes the generator can approximate. Picked from
/// hints in the source identifier; anything unrecognized becomes a plain
/// crate-sized box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Archetype {
    Console,
    Speaker,
    Box,
}

impl Archetype {
    fn from_source(source: &str) -> Self {
        let lower = source.to_lowercase();
        if lower.contains("console") || lower.contains("deck") {
            Archetype::Console
        } else if lower.contains("speaker") || lower.contains("monitor") {
            Archetype::Speaker
        } else {
            Archetype::Box
        }
    }

    /// Width, height, depth of the stand-in, before parameter scaling.
    fn dimensions(self) -> (f32, f32, f32) {
        match self {
            Archetype::Console => (1.4, 0.9, 0.6),
            Archetype::Speaker => (0.5, 1.2, 0.5),
            Archetype::Box => (1.0, 1.0, 1.0),
        }
    }

    fn color(self) -> [f32; 4] {
        match self {
            Archetype::Console => [0.15, 0.15, 0.18, 1.0],
            Archetype::Speaker => [0.08, 0.08, 0.08, 1.0],
            Archetype::Box => [0.45, 0.35, 0.25, 1.0],
        }
    }
}

/// Generate a substitute model: a flat-colored primitive approximating the
/// intended real-world object. The `scale` parameter, when present, scales
/// the stand-in uniformly.
pub fn fallback_model(source: &str, params: &BTreeMap<String, f64>) -> MeshAsset {
    let archetype = Archetype::from_source(source);
    let scale = param(params, "scale", 1.0).abs().max(0.01) as f32;
    let (w, h, d) = archetype.dimensions();

    debug!("generated fallback {:?} for '{}'", archetype, source);
    MeshAsset {
        name: format!("fallback:{}", source),
        primitives: vec![box_primitive(w * scale, h * scale, d * scale, archetype.color())],
    }
}

/// An axis-aligned box centered on the origin, four vertices per face so
/// normals stay flat.
fn box_primitive(width: f32, height: f32, depth: f32, color: [f32; 4]) -> MeshPrimitive {
    let (hw, hh, hd) = (width / 2.0, height / 2.0, depth / 2.0);

    // (normal, four corners in CCW order seen from outside)
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [0.0, 0.0, 1.0],
            [
                [-hw, -hh, hd],
                [hw, -hh, hd],
                [hw, hh, hd],
                [-hw, hh, hd],
            ],
        ),
        (
            [0.0, 0.0, -1.0],
            [
                [hw, -hh, -hd],
                [-hw, -hh, -hd],
                [-hw, hh, -hd],
                [hw, hh, -hd],
            ],
        ),
        (
            [1.0, 0.0, 0.0],
            [
                [hw, -hh, hd],
                [hw, -hh, -hd],
                [hw, hh, -hd],
                [hw, hh, hd],
            ],
        ),
        (
            [-1.0, 0.0, 0.0],
            [
                [-hw, -hh, -hd],
                [-hw, -hh, hd],
                [-hw, hh, hd],
                [-hw, hh, -hd],
            ],
        ),
        (
            [0.0, 1.0, 0.0],
            [
                [-hw, hh, hd],
                [hw, hh, hd],
                [hw, hh, -hd],
                [-hw, hh, -hd],
            ],
        ),
        (
            [0.0, -1.0, 0.0],
            [
                [-hw, -hh, -hd],
                [hw, -hh, -hd],
                [hw, -hh, hd],
                [-hw, -hh, hd],
            ],
        ),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut tex_coords = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, corners) in faces {
        let base = positions.len() as u32;
        for (i, corner) in corners.into_iter().enumerate() {
            positions.push(corner);
            normals.push(normal);
            let (u, v) = match i {
                0 => (0.0, 0.0),
                1 => (1.0, 0.0),
                2 => (1.0, 1.0),
                _ => (0.0, 1.0),
            };
            tex_coords.push([u, v]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let colors = vec![color; positions.len()];

    MeshPrimitive {
        positions,
        normals,
        tex_coords: Some(tex_coords),
        colors: Some(colors),
        indices: Some(indices),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_generation_is_deterministic() {
        let mut params = BTreeMap::new();
        params.insert("u".to_string(), 2.0);
        params.insert("v".to_string(), 2.0);
        let a = fallback_texture("brick", &params);
        let b = fallback_texture("brick", &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_sources_get_distinct_textures() {
        let params = BTreeMap::new();
        let a = fallback_texture("brick", &params);
        let b = fallback_texture("marble", &params);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_texture_survives_degenerate_params() {
        let mut params = BTreeMap::new();
        params.insert("u".to_string(), f64::NAN);
        params.insert("v".to_string(), 0.0);
        let tex = fallback_texture("brick", &params);
        assert_eq!(tex.data.len(), (tex.width * tex.height * 4) as usize);
    }

    #[test]
    fn test_model_generation_is_deterministic() {
        let params = BTreeMap::new();
        assert_eq!(
            fallback_model("dj_console", &params),
            fallback_model("dj_console", &params)
        );
    }

    #[test]
    fn test_archetype_selection() {
        assert_eq!(Archetype::from_source("dj_console"), Archetype::Console);
        assert_eq!(Archetype::from_source("main_speaker_l"), Archetype::Speaker);
        assert_eq!(Archetype::from_source("ficus_plant"), Archetype::Box);
    }

    #[test]
    fn test_box_primitive_is_well_formed() {
        let mesh = fallback_model("anything", &BTreeMap::new());
        let prim = &mesh.primitives[0];
        assert_eq!(prim.positions.len(), 24);
        assert_eq!(prim.normals.len(), 24);
        let indices = prim.indices.as_ref().unwrap();
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < prim.positions.len()));
    }
}
