use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::nullable::null_as_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box spanning the min/max of a polygon's vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y).max(0) as u32
    }
}

/// A recognized text span and the polygon it was read from.
///
/// Fields other than `vertices` and `text` are carried through untouched so
/// upstream OCR metadata survives refinement. A `null` polygon reads as
/// empty; an absent `text` stays absent when written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub vertices: Vec<Vertex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextRegion {
    pub fn new(vertices: Vec<Vertex>, text: impl Into<String>) -> Self {
        Self {
            vertices,
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    /// The recognized text, empty when the region carried none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.vertices.first()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for vertex in &self.vertices[1..] {
            bbox.min_x = bbox.min_x.min(vertex.x);
            bbox.min_y = bbox.min_y.min(vertex.y);
            bbox.max_x = bbox.max_x.max(vertex.x);
            bbox.max_y = bbox.max_y.max(vertex.y);
        }
        Some(bbox)
    }

    /// Copy of this region with only the text replaced.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            vertices: self.vertices.clone(),
            text: Some(text.into()),
            extra: self.extra.clone(),
        }
    }
}
