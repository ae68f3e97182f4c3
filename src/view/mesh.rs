// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use cgmath::{InnerSpace, Vector2};
use tracing::instrument;

use super::Vertex;
use crate::audio::{AudioFrame, HistoryWindow};
use crate::config::LineConfig;

/// Width attenuation of a segment: short strokes draw at full width, long
/// jumps thin out in proportion to their length.
pub fn width_factor(length: f32, length_threshold: f32) -> f32 {
    (length_threshold / length).clamp(0.0, 1.0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshParams {
    pub length_threshold: f32,
    pub min_width_factor: f32,
}

impl From<&LineConfig> for MeshParams {
    fn from(config: &LineConfig) -> Self {
        MeshParams {
            length_threshold: config.length_threshold,
            min_width_factor: config.min_width_factor,
        }
    }
}

/// CPU side of the trace: pending points in, a ribbon of quads out.
///
/// Each kept segment becomes 4 vertices (both sides of each endpoint) and two
/// triangles. The mesh is only rebuilt when points are pending, otherwise the
/// previous geometry stays as is. Pending points always mirror the latest
/// history handed in, a history that never got built is replaced, not appended to.
pub struct LineMesh {
    params: MeshParams,
    points: Vec<Vector2<f32>>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl LineMesh {
    pub fn new(params: MeshParams, capacity: usize) -> LineMesh {
        LineMesh {
            params,
            points: Vec::with_capacity(capacity),
            vertices: Vec::with_capacity(capacity * 4),
            indices: Vec::with_capacity(capacity * 6),
        }
    }

    #[cfg(test)]
    pub fn add_point(&mut self, frame: AudioFrame) {
        self.points.push(Vector2::new(frame.left, frame.right));
    }

    pub fn add_history(&mut self, history: &HistoryWindow) {
        self.points.clear();
        self.points.extend(history.iter().map(|f| Vector2::new(f.left, f.right)));
    }

    #[cfg(test)]
    pub fn pending_points(&self) -> usize {
        self.points.len()
    }

    /// Rebuilds the geometry from the pending points mapped to pixels with `scale`,
    /// then clears them. Returns false and keeps the last mesh when nothing is pending.
    #[instrument(skip(self), fields(points = self.points.len()))]
    pub fn build(&mut self, scale: f32) -> bool {
        if self.points.is_empty() {
            return false;
        }
        self.vertices.clear();
        self.indices.clear();

        for pair in self.points.windows(2) {
            let a = pair[0] * scale;
            let b = pair[1] * scale;
            let delta = b - a;
            let length = delta.magnitude();
            if length == 0.0 || !length.is_finite() {
                continue;
            }
            let factor = width_factor(length, self.params.length_threshold);
            if factor < self.params.min_width_factor {
                continue;
            }
            let dir = delta / length;
            let normal = [-dir.y, dir.x];
            let flipped = [dir.y, -dir.x];

            let base = self.vertices.len() as u32;
            self.vertices.extend_from_slice(&[
                Vertex {
                    position: [a.x, a.y, factor],
                    normal,
                },
                Vertex {
                    position: [a.x, a.y, factor],
                    normal: flipped,
                },
                Vertex {
                    position: [b.x, b.y, factor],
                    normal,
                },
                Vertex {
                    position: [b.x, b.y, factor],
                    normal: flipped,
                },
            ]);
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
        }

        self.points.clear();
        true
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn segment_count(&self) -> usize {
        self.indices.len() / 6
    }
}
