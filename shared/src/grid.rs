//! The fixed catalog of sea sectors.

use crate::config::GridConfig;
use crate::hex::{axial_round, point_in_polygon, Axial, HexLayout, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
    pub label: String,
    pub center: Point,
    pub corners: [Point; 6],
}

impl Hex {
    pub fn axial(&self) -> Axial {
        Axial::new(self.q, self.r)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        point_in_polygon(&self.corners, x, y)
    }
}

/// Grid description sent to clients so they can draw the sectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPayload {
    pub hex_size: f64,
    pub rows: usize,
    pub cols: usize,
    pub labels: Vec<Vec<String>>,
}

pub fn sector_label(row_label: &str, col: usize) -> String {
    format!("{}-{}", row_label, col + 1)
}

/// Every hex of the world, indexed by label and by axial coordinate.
///
/// Built once per process and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct GridCatalog {
    layout: HexLayout,
    row_labels: Vec<String>,
    cols: usize,
    hexes: Vec<Hex>,
    by_label: HashMap<String, usize>,
    by_coords: HashMap<Axial, usize>,
}

impl GridCatalog {
    /// Builds one hex per `(row, column)`; the row index is `r`, the column is `q`.
    pub fn build(row_labels: &[String], cols: usize, hex_size: f64) -> Self {
        let layout = HexLayout::new(hex_size);
        let mut hexes = Vec::with_capacity(row_labels.len() * cols);
        for (row, row_label) in row_labels.iter().enumerate() {
            for col in 0..cols {
                let (q, r) = (col as i32, row as i32);
                let center = layout.axial_to_pixel(q as f64, r as f64);
                hexes.push(Hex {
                    q,
                    r,
                    label: sector_label(row_label, col),
                    center,
                    corners: layout.corners(center),
                });
            }
        }

        let by_label = hexes
            .iter()
            .enumerate()
            .map(|(i, hex)| (hex.label.clone(), i))
            .collect();
        let by_coords = hexes
            .iter()
            .enumerate()
            .map(|(i, hex)| (hex.axial(), i))
            .collect();

        Self {
            layout,
            row_labels: row_labels.to_vec(),
            cols,
            hexes,
            by_label,
            by_coords,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::build(&config.row_labels, config.cols, config.hex_size)
    }

    pub fn hexes(&self) -> &[Hex] {
        &self.hexes
    }

    pub fn len(&self) -> usize {
        self.hexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hexes.is_empty()
    }

    pub fn layout(&self) -> HexLayout {
        self.layout
    }

    pub fn by_label(&self, label: &str) -> Option<&Hex> {
        self.by_label.get(label).map(|&i| &self.hexes[i])
    }

    pub fn by_coords(&self, coords: Axial) -> Option<&Hex> {
        self.by_coords.get(&coords).map(|&i| &self.hexes[i])
    }

    /// Finds the catalog hex that contains the plane point `(x, y)`.
    ///
    /// The rounded candidate must also pass the point-in-hex test, which
    /// rejects points that round onto a neighbour across an edge.
    pub fn find_hex_at(&self, x: f64, y: f64) -> Option<&Hex> {
        let (q, r) = self.layout.pixel_to_axial(x, y);
        let candidate = self.by_coords(axial_round(q, r))?;
        candidate.contains(x, y).then_some(candidate)
    }

    pub fn payload(&self) -> GridPayload {
        GridPayload {
            hex_size: self.layout.size,
            rows: self.row_labels.len(),
            cols: self.cols,
            labels: self
                .row_labels
                .iter()
                .map(|row| (0..self.cols).map(|col| sector_label(row, col)).collect())
                .collect(),
        }
    }
}
