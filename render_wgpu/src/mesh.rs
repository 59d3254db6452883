//! CPU-side mesh assembly for flat-shaded boxes and planes.

use crate::{DrawBatch, MeshData, MeshError, MeshVertex, TextureKey};

/// Face normals and corner winding for a unit cube centred on the origin.
const BOX_FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
    (
        [1.0, 0.0, 0.0],
        [[1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [1.0, 1.0, 1.0], [1.0, -1.0, 1.0]],
    ),
    (
        [-1.0, 0.0, 0.0],
        [[-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0], [-1.0, -1.0, -1.0]],
    ),
    (
        [0.0, 1.0, 0.0],
        [[-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0]],
    ),
    (
        [0.0, -1.0, 0.0],
        [[-1.0, -1.0, 1.0], [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, -1.0, 1.0]],
    ),
    (
        [0.0, 0.0, 1.0],
        [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]],
    ),
    (
        [0.0, 0.0, -1.0],
        [[1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [1.0, 1.0, -1.0]],
    ),
];

const MAX_DIVISIONS: u32 = 64;

/// Oriented box in world space. `axes[i]` is the world direction of local axis `i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxPlacement {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
    pub axes: [[f32; 3]; 3],
    /// Faces are split into cells no larger than this, so per-vertex lighting
    /// has enough samples on large walls. Zero disables splitting.
    pub max_cell: f32,
    /// Mapped once across every face, the way a box primitive is UV-mapped.
    pub texture: Option<TextureKey>,
}

impl BoxPlacement {
    pub fn axis_aligned(center: [f32; 3], half_extents: [f32; 3]) -> Self {
        Self {
            center,
            half_extents,
            axes: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            max_cell: 0.0,
            texture: None,
        }
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        let (sin, cos) = yaw.sin_cos();
        self.axes = [[cos, 0.0, -sin], [0.0, 1.0, 0.0], [sin, 0.0, cos]];
        self
    }

    pub fn with_texture(mut self, texture: TextureKey) -> Self {
        self.texture = Some(texture);
        self
    }

    fn rotate(&self, v: [f32; 3]) -> [f32; 3] {
        let [x, y, z] = self.axes;
        [
            x[0] * v[0] + y[0] * v[1] + z[0] * v[2],
            x[1] * v[0] + y[1] * v[1] + z[1] * v[2],
            x[2] * v[0] + y[2] * v[1] + z[2] * v[2],
        ]
    }
}

#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    /// Index offset where each texture switch happened.
    switches: Vec<(u32, Option<TextureKey>)>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Texture for the triangles pushed from here on.
    pub fn set_texture(&mut self, texture: Option<TextureKey>) {
        let current = self.switches.last().and_then(|&(_, key)| key);
        if current == texture {
            return;
        }
        let start = u32::try_from(self.indices.len()).unwrap_or(u32::MAX);
        self.switches.push((start, texture));
    }

    /// Adds one quad split into a `divisions` x `divisions` grid. `shade` receives
    /// each vertex's world position and the face normal and returns its colour.
    /// Texture coordinates run left to right along `corners[0]..corners[1]` and
    /// top to bottom along `corners[3]..corners[0]`.
    pub fn push_quad<F>(
        &mut self,
        corners: [[f32; 3]; 4],
        normal: [f32; 3],
        divisions: u32,
        shade: &mut F,
    ) -> Result<(), MeshError>
    where
        F: FnMut([f32; 3], [f32; 3]) -> [f32; 3],
    {
        let divisions = divisions.clamp(1, MAX_DIVISIONS);
        let base = u32::try_from(self.vertices.len()).map_err(|_| MeshError::TooLarge)?;
        let row = divisions + 1;
        for j in 0..row {
            let v = j as f32 / divisions as f32;
            for i in 0..row {
                let u = i as f32 / divisions as f32;
                let position = bilerp(corners, u, v);
                self.vertices.push(MeshVertex {
                    position,
                    color: shade(position, normal),
                    uv: [u, 1.0 - v],
                });
            }
        }
        for j in 0..divisions {
            for i in 0..divisions {
                let a = base + j * row + i;
                let b = a + 1;
                let c = a + row + 1;
                let d = a + row;
                self.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        Ok(())
    }

    pub fn push_box<F>(&mut self, placement: BoxPlacement, mut shade: F) -> Result<(), MeshError>
    where
        F: FnMut([f32; 3], [f32; 3]) -> [f32; 3],
    {
        self.set_texture(placement.texture);
        for (normal, corners) in BOX_FACES {
            let world = corners.map(|corner| {
                let local = [
                    corner[0] * placement.half_extents[0],
                    corner[1] * placement.half_extents[1],
                    corner[2] * placement.half_extents[2],
                ];
                let r = placement.rotate(local);
                [
                    r[0] + placement.center[0],
                    r[1] + placement.center[1],
                    r[2] + placement.center[2],
                ]
            });
            let divisions = face_divisions(&world, placement.max_cell);
            self.push_quad(world, placement.rotate(normal), divisions, &mut shade)?;
        }
        self.set_texture(None);
        Ok(())
    }

    /// Horizontal square of side `extent` at height `y`, facing up or down.
    pub fn push_horizontal_plane<F>(
        &mut self,
        y: f32,
        extent: f32,
        facing_up: bool,
        max_cell: f32,
        mut shade: F,
    ) -> Result<(), MeshError>
    where
        F: FnMut([f32; 3], [f32; 3]) -> [f32; 3],
    {
        let h = extent * 0.5;
        let (normal, corners) = if facing_up {
            ([0.0, 1.0, 0.0], [[-h, y, -h], [-h, y, h], [h, y, h], [h, y, -h]])
        } else {
            ([0.0, -1.0, 0.0], [[-h, y, h], [-h, y, -h], [h, y, -h], [h, y, h]])
        };
        let divisions = face_divisions(&corners, max_cell);
        self.push_quad(corners, normal, divisions, &mut shade)
    }

    pub fn finish(self) -> Result<MeshData, MeshError> {
        let end = u32::try_from(self.indices.len()).map_err(|_| MeshError::TooLarge)?;
        let mut starts = vec![(0, None)];
        starts.extend(self.switches);
        let batches = starts
            .iter()
            .enumerate()
            .map(|(i, &(start, texture))| DrawBatch {
                indices: start..starts.get(i + 1).map_or(end, |&(next, _)| next),
                texture,
            })
            .collect();
        MeshData::batched(self.vertices, self.indices, batches)
    }
}

fn bilerp(corners: [[f32; 3]; 4], u: f32, v: f32) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (axis, value) in out.iter_mut().enumerate() {
        let bottom = corners[0][axis] + (corners[1][axis] - corners[0][axis]) * u;
        let top = corners[3][axis] + (corners[2][axis] - corners[3][axis]) * u;
        *value = bottom + (top - bottom) * v;
    }
    out
}

fn face_divisions(corners: &[[f32; 3]; 4], max_cell: f32) -> u32 {
    if max_cell <= 0.0 {
        return 1;
    }
    let edge = |a: [f32; 3], b: [f32; 3]| {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
    };
    let longest = edge(corners[0], corners[1]).max(edge(corners[0], corners[3]));
    ((longest / max_cell).ceil() as u32).clamp(1, MAX_DIVISIONS)
}
