//! Polygon outline validation and representative points

use crate::types::{Coordinate, Polygon, DEFAULT_COLOR};

/// Fewest vertices a drawn region may have
pub const MIN_VERTICES: usize = 3;

/// Most vertices a drawn region may have
pub const MAX_VERTICES: usize = 12;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeometryError {
    #[error("Polygon needs at least 3 points, got {0}")]
    TooFewVertices(usize),

    #[error("Polygon allows at most 12 points, got {0}")]
    TooManyVertices(usize),

    #[error("Coordinate out of range: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

pub type GeometryResult<T> = Result<T, GeometryError>;

/// Check a drawn outline before it becomes a polygon.
///
/// The ring is open: the first point is not repeated at the end.
pub fn validate_outline(coordinates: &[Coordinate]) -> GeometryResult<()> {
    match coordinates.len() {
        n if n < MIN_VERTICES => return Err(GeometryError::TooFewVertices(n)),
        n if n > MAX_VERTICES => return Err(GeometryError::TooManyVertices(n)),
        _ => {}
    }

    let in_range = |c: &Coordinate| {
        (-90.0..=90.0).contains(&c.latitude) && (-180.0..=180.0).contains(&c.longitude)
    };
    if let Some(bad) = coordinates.iter().find(|c| !in_range(c)) {
        return Err(GeometryError::InvalidCoordinate {
            latitude: bad.latitude,
            longitude: bad.longitude,
        });
    }

    Ok(())
}

/// Unweighted mean of the vertices; `None` for an empty outline
pub fn centroid(coordinates: &[Coordinate]) -> Option<Coordinate> {
    if coordinates.is_empty() {
        return None;
    }
    let n = coordinates.len() as f64;
    let (lat, lng) = coordinates
        .iter()
        .fold((0.0, 0.0), |(lat, lng), c| (lat + c.latitude, lng + c.longitude));
    Some(Coordinate::new(lat / n, lng / n))
}

impl Polygon {
    /// Build a polygon from a finished outline with the neutral color and no
    /// resolved value.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        coordinates: Vec<Coordinate>,
        data_source_id: impl Into<String>,
    ) -> GeometryResult<Self> {
        validate_outline(&coordinates)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            coordinates,
            data_source_id: data_source_id.into(),
            current_color: DEFAULT_COLOR.to_string(),
            current_value: None,
        })
    }

    pub fn centroid(&self) -> Option<Coordinate> {
        centroid(&self.coordinates)
    }
}
