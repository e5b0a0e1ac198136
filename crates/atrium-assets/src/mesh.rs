use tracing::debug;

use crate::error::DecodeError;

/// A decoded mesh asset (renderer-agnostic). Contains raw vertex data
/// extracted from a glTF document or built by the fallback generator.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub name: String,
    pub primitives: Vec<MeshPrimitive>,
}

/// A single draw primitive within a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPrimitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Option<Vec<u32>>,
}

/// Decode fetched glTF 2.0 bytes (.gltf or .glb) into the first mesh of the
/// document. A document with no meshes is a decode failure.
pub fn decode(bytes: &[u8]) -> Result<MeshAsset, DecodeError> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).map_err(|e| DecodeError::Gltf(e.to_string()))?;

    let mesh = document.meshes().next().ok_or(DecodeError::EmptyDocument)?;
    let name = mesh.name().unwrap_or("unnamed").to_string();

    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .map(|iter| iter.collect())
            .unwrap_or_default();

        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|iter| iter.collect())
            .unwrap_or_default();

        let tex_coords: Option<Vec<[f32; 2]>> = reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().collect());

        let colors: Option<Vec<[f32; 4]>> = reader
            .read_colors(0)
            .map(|c| c.into_rgba_f32().collect());

        let indices: Option<Vec<u32>> = reader.read_indices().map(|idx| idx.into_u32().collect());

        primitives.push(MeshPrimitive {
            positions,
            normals,
            tex_coords,
            colors,
            indices,
        });
    }

    debug!("decoded mesh '{}' with {} primitives", name, primitives.len());
    Ok(MeshAsset { name, primitives })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = decode(b"not a gltf document");
        assert!(matches!(result, Err(DecodeError::Gltf(_))));
    }

    #[test]
    fn test_meshless_document_fails_to_decode() {
        let gltf = br#"{"asset": {"version": "2.0"}}"#;
        let result = decode(gltf);
        assert!(matches!(result, Err(DecodeError::EmptyDocument)));
    }
}
