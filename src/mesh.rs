// Mesh data: vertex format and OBJ loading

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::mem::{offset_of, size_of};
use std::path::Path;

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// pos, color, tex_coord at locations 0, 1, 2
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }

    fn bits(&self) -> [u32; 8] {
        let [x, y, z] = self.pos;
        let [r, g, b] = self.color;
        let [u, v] = self.tex_coord;
        [x, y, z, r, g, b, u, v].map(f32::to_bits)
    }
}

// Bitwise equality so vertices can key a HashMap during de-duplication
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[derive(Debug, Default, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open mesh {:?}", path))?;
        let mut reader = BufReader::new(file);

        let mesh = Self::from_obj_reader(&mut reader)
            .with_context(|| format!("Failed to load mesh {:?}", path))?;

        log::info!(
            "Loaded mesh {:?}: {} vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Parse OBJ text. Materials are ignored; the texture comes from config.
    pub fn from_obj_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &tobj::GPU_LOAD_OPTIONS, |_| Ok(Default::default()))
                .context("Failed to parse OBJ data")?;

        let mut mesh = Self::default();
        let mut unique_vertices: HashMap<Vertex, u32> = HashMap::new();

        for model in &models {
            let positions = &model.mesh.positions;
            let texcoords = &model.mesh.texcoords;

            for &index in &model.mesh.indices {
                let index = index as usize;
                let pos = positions
                    .get(3 * index..3 * index + 3)
                    .with_context(|| format!("Vertex index {} out of range", index))?;

                // V runs bottom-up in OBJ and top-down in Vulkan
                let tex_coord = match texcoords.get(2 * index..2 * index + 2) {
                    Some(uv) => [uv[0], 1.0 - uv[1]],
                    None => [0.0, 0.0],
                };

                let vertex = Vertex {
                    pos: [pos[0], pos[1], pos[2]],
                    color: WHITE,
                    tex_coord,
                };

                let next = mesh.vertices.len() as u32;
                let index = *unique_vertices.entry(vertex).or_insert_with(|| {
                    mesh.vertices.push(vertex);
                    next
                });
                mesh.indices.push(index);
            }
        }

        if mesh.indices.is_empty() {
            anyhow::bail!("OBJ data contains no faces");
        }

        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";

    fn parse(obj: &str) -> Result<Mesh> {
        Mesh::from_obj_reader(&mut Cursor::new(obj.as_bytes()))
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let mesh = parse(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(mesh.indices[0], mesh.indices[3]);
        assert_eq!(mesh.indices[2], mesh.indices[4]);
    }

    #[test]
    fn texture_v_is_flipped_and_color_is_white() {
        let mesh = parse(QUAD).unwrap();
        let first = mesh.vertices[mesh.indices[0] as usize];
        assert_eq!(first.pos, [0.0, 0.0, 0.0]);
        assert_eq!(first.tex_coord, [0.0, 1.0]);
        assert_eq!(first.color, WHITE);

        let third = mesh.vertices[mesh.indices[2] as usize];
        assert_eq!(third.pos, [1.0, 1.0, 0.0]);
        assert_eq!(third.tex_coord, [1.0, 0.0]);
    }

    #[test]
    fn quads_are_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = parse(obj).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices.len(), 4);
    }

    #[test]
    fn missing_texcoords_default_to_origin() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse(obj).unwrap();
        assert!(mesh.vertices.iter().all(|v| v.tex_coord == [0.0, 0.0]));
    }

    #[test]
    fn same_position_with_different_uv_stays_separate() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vt 0.5 0.5
f 1/1 2/2 3/3
f 1/4 3/3 2/2
";
        let mesh = parse(obj).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn mesh_without_faces_is_an_error() {
        assert!(parse("v 0 0 0\nv 1 0 0\n").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attributes = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn bundled_mesh_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/mesh.obj");
        let mesh = Mesh::load_obj(path).unwrap();
        assert_eq!(mesh.indices.len(), 36);
        assert!(!mesh.vertices.is_empty());
    }
}
