//! Static triangle mesh collider and its binary file format.
//!
//! Layout, all big-endian:
//!
//! | field            | type            |
//! |------------------|-----------------|
//! | magic            | `b"CMSH"`       |
//! | vertex count     | `u16`           |
//! | vertices         | `3 x f32` each  |
//! | triangle count   | `u16`           |
//! | indices          | `3 x u16` each  |
//! | triangle normals | `3 x f32` each  |

use std::{fs, path::Path};

use glam::Vec3;
use log::debug;
use thiserror::Error;

use crate::{
    collision::{bvh::AabbTree, gjk::SupportMap},
    core::aabb::Aabb,
};

pub const MESH_MAGIC: [u8; 4] = *b"CMSH";

#[derive(Debug, Error)]
pub enum MeshLoadError {
    #[error("failed to read mesh file: {0}")]
    Io(#[from] std::io::Error),
    #[error("mesh data truncated: needed {needed} bytes at offset {offset}, {available} available")]
    TooShort {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("bad mesh magic {0:?}, expected \"CMSH\"")]
    InvalidMagic([u8; 4]),
    #[error("triangle {triangle} references vertex {index} but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u16,
        vertex_count: usize,
    },
    #[error("mesh has {0} elements, the format stores at most 65535")]
    TooLarge(usize),
}

/// One world-space mesh triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub normal: Vec3,
}

impl Triangle {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    pub fn centroid(&self) -> Vec3 {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]) / 3.0
    }
}

impl SupportMap for Triangle {
    fn support(&self, direction: Vec3) -> Vec3 {
        let [a, b, c] = self.vertices;
        let (da, db, dc) = (a.dot(direction), b.dot(direction), c.dot(direction));
        if da >= db && da >= dc {
            a
        } else if db >= dc {
            b
        } else {
            c
        }
    }
}

/// Immutable level geometry with a triangle BVH for queries.
#[derive(Debug, Clone)]
pub struct MeshCollider {
    vertices: Vec<Vec3>,
    indices: Vec<[u16; 3]>,
    normals: Vec<Vec3>,
    tree: AabbTree<u16>,
    bounds: Aabb,
}

impl MeshCollider {
    /// Builds a collider from raw buffers, computing face normals from the
    /// counter-clockwise winding.
    pub fn from_triangles(vertices: Vec<Vec3>, indices: Vec<[u16; 3]>) -> Result<Self, MeshLoadError> {
        let normals = indices
            .iter()
            .map(|&[a, b, c]| {
                let fetch = |i: u16| vertices.get(i as usize).copied().unwrap_or(Vec3::ZERO);
                let (a, b, c) = (fetch(a), fetch(b), fetch(c));
                (b - a).cross(c - a).normalize_or_zero()
            })
            .collect();
        Self::from_parts(vertices, indices, normals)
    }

    fn from_parts(vertices: Vec<Vec3>, indices: Vec<[u16; 3]>, normals: Vec<Vec3>) -> Result<Self, MeshLoadError> {
        if vertices.len() > u16::MAX as usize {
            return Err(MeshLoadError::TooLarge(vertices.len()));
        }
        if indices.len() > u16::MAX as usize {
            return Err(MeshLoadError::TooLarge(indices.len()));
        }
        for (triangle, tri) in indices.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertices.len()) {
                return Err(MeshLoadError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count: vertices.len(),
                });
            }
        }

        let mut tree = AabbTree::with_capacity(indices.len(), 0.0, 0.0);
        let mut bounds = Aabb::empty();
        for (triangle, tri) in indices.iter().enumerate() {
            let corners = tri.map(|i| vertices[i as usize]);
            let triangle_bounds = Aabb::from_points(&corners);
            bounds = bounds.union(&triangle_bounds);
            tree.create_node(triangle_bounds, triangle as u16);
        }
        tree.rebuild();

        debug!(
            "mesh collider ready: {} vertices, {} triangles",
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            vertices,
            indices,
            normals,
            tree,
            bounds,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeshLoadError> {
        let mut reader = ByteReader::new(bytes);

        let magic: [u8; 4] = reader.array()?;
        if magic != MESH_MAGIC {
            return Err(MeshLoadError::InvalidMagic(magic));
        }

        let vertex_count = reader.u16()? as usize;
        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertices.push(reader.vec3()?);
        }

        let triangle_count = reader.u16()? as usize;
        let mut indices = Vec::with_capacity(triangle_count);
        for _ in 0..triangle_count {
            indices.push([reader.u16()?, reader.u16()?, reader.u16()?]);
        }

        let mut normals = Vec::with_capacity(triangle_count);
        for _ in 0..triangle_count {
            normals.push(reader.vec3()?);
        }

        Self::from_parts(vertices, indices, normals)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshLoadError> {
        let bytes = fs::read(path.as_ref())?;
        debug!("loading mesh collider from {}", path.as_ref().display());
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 2 + self.vertices.len() * 12 + 2 + self.indices.len() * 18);
        out.extend_from_slice(&MESH_MAGIC);
        out.extend_from_slice(&(self.vertices.len() as u16).to_be_bytes());
        for v in &self.vertices {
            push_vec3(&mut out, *v);
        }
        out.extend_from_slice(&(self.indices.len() as u16).to_be_bytes());
        for tri in &self.indices {
            for i in tri {
                out.extend_from_slice(&i.to_be_bytes());
            }
        }
        for n in &self.normals {
            push_vec3(&mut out, *n);
        }
        out
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn indices(&self) -> &[[u16; 3]] {
        &self.indices
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn tree(&self) -> &AabbTree<u16> {
        &self.tree
    }

    pub fn triangle(&self, index: u16) -> Option<Triangle> {
        let tri = self.indices.get(index as usize)?;
        Some(Triangle {
            vertices: tri.map(|i| self.vertices[i as usize]),
            normal: self.normals[index as usize],
        })
    }

    /// Triangles whose bounds overlap `bounds`, written into `results`.
    pub fn query_bounds(&self, bounds: &Aabb, results: &mut [u16]) -> usize {
        self.tree.query_bounds(bounds, results)
    }
}

fn push_vec3(out: &mut Vec<u8>, v: Vec3) {
    for component in v.to_array() {
        out.extend_from_slice(&component.to_be_bytes());
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MeshLoadError> {
        let end = self.offset + N;
        let slice = self.bytes.get(self.offset..end).ok_or(MeshLoadError::TooShort {
            offset: self.offset,
            needed: N,
            available: self.bytes.len().saturating_sub(self.offset),
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, MeshLoadError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, MeshLoadError> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    fn vec3(&mut self) -> Result<Vec3, MeshLoadError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}
