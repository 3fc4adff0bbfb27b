use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Reconstruction mesh for a node, used to reproject the image during
/// transitions. Vertices are in the node's local frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Mesh with no geometry. Nodes without a reconstruction render flat.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshDecodeError {
    #[error("mesh payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("face references vertex {index} but mesh has {vertices} vertices")]
    FaceOutOfRange { index: u32, vertices: usize },
}

/// Decode the binary mesh layout: a u32 vertex count and u32 face count,
/// followed by vertex triples of f32 and face triples of u32, all little
/// endian.
pub fn decode(payload: &Bytes) -> Result<Mesh, MeshDecodeError> {
    let mut buf = payload.clone();

    check_remaining(&buf, 8, payload.len())?;
    let vertex_count = buf.get_u32_le() as usize;
    let face_count = buf.get_u32_le() as usize;

    let body = vertex_count
        .saturating_mul(12)
        .saturating_add(face_count.saturating_mul(12));
    check_remaining(&buf, body, payload.len())?;

    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push([buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()]);
    }

    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let face = [buf.get_u32_le(), buf.get_u32_le(), buf.get_u32_le()];
        for &index in &face {
            if index as usize >= vertex_count {
                return Err(MeshDecodeError::FaceOutOfRange {
                    index,
                    vertices: vertex_count,
                });
            }
        }
        faces.push(face);
    }

    Ok(Mesh { vertices, faces })
}

pub fn encode(mesh: &Mesh) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + 12 * (mesh.vertices.len() + mesh.faces.len()));
    buf.put_u32_le(mesh.vertices.len() as u32);
    buf.put_u32_le(mesh.faces.len() as u32);
    for vertex in &mesh.vertices {
        for &coord in vertex {
            buf.put_f32_le(coord);
        }
    }
    for face in &mesh.faces {
        for &index in face {
            buf.put_u32_le(index);
        }
    }
    buf.freeze()
}

fn check_remaining(buf: &Bytes, needed: usize, total: usize) -> Result<(), MeshDecodeError> {
    if buf.remaining() < needed {
        Err(MeshDecodeError::Truncated {
            expected: total - buf.remaining() + needed,
            actual: total,
        })
    } else {
        Ok(())
    }
}
