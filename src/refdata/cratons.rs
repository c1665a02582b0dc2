//! Continental craton boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};
use crate::geo;

/// The boundary polygon of a single craton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Craton {
    pub name: String,
    /// Geographic latitudes of the boundary vertices in degrees
    pub latitudes: Vec<f64>,
    /// Longitudes of the boundary vertices in degrees
    pub longitudes: Vec<f64>,
}

impl Craton {
    pub fn new(name: impl Into<String>, latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            latitudes,
            longitudes,
        }
    }

    /// True when the epicenter lies inside this craton, by counting the
    /// crossings of the boundary polygon.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let mut latitude = latitude;
        let mut longitude = longitude;

        // Stay away from the poles and the date line.
        if (latitude.abs() - 90.0).abs() < geo::POLE_OFFSET {
            latitude -= geo::POLE_OFFSET.copysign(latitude);
        }
        if (longitude.abs() - 180.0).abs() < geo::POLE_OFFSET {
            longitude -= geo::POLE_OFFSET.copysign(longitude);
        }

        let mut crossings = 0usize;
        for j in 1..self.latitudes.len() {
            let slope = (self.longitudes[j] - self.longitudes[j - 1])
                / (self.latitudes[j] - self.latitudes[j - 1]);
            let test_lat =
                (longitude - self.longitudes[j - 1] + slope * self.latitudes[j - 1]) / slope;

            if test_lat >= latitude
                && (test_lat - self.latitudes[j]) * (test_lat - self.latitudes[j - 1]) <= 0.0
            {
                crossings += 1;
            }
        }

        crossings % 2 == 1
    }
}

/// The set of continental cratons. Immutable once loaded and safe to
/// share across engine instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cratons {
    cratons: Vec<Craton>,
}

impl Cratons {
    pub fn new(cratons: Vec<Craton>) -> Self {
        Self { cratons }
    }

    pub fn push(&mut self, craton: Craton) {
        self.cratons.push(craton);
    }

    pub fn len(&self) -> usize {
        self.cratons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cratons.is_empty()
    }

    /// True when the epicenter is inside any craton.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.cratons.iter().any(|c| c.contains(latitude, longitude))
    }

    /// Parse the craton boundary text format: a region name (words up to
    /// the first integer), the vertex count, then that many latitude and
    /// longitude pairs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split_whitespace().peekable();
        let mut cratons = Cratons::default();

        while tokens.peek().is_some() {
            let mut name_parts: Vec<&str> = Vec::new();
            let count: usize = loop {
                let token = tokens
                    .next()
                    .ok_or_else(|| LocatorError::ModelData("truncated craton file".into()))?;
                match token.parse::<usize>() {
                    Ok(count) => break count,
                    Err(_) => name_parts.push(token),
                }
            };
            if name_parts.is_empty() {
                return Err(LocatorError::ModelData("craton without a name".into()));
            }

            let mut latitudes = Vec::with_capacity(count);
            let mut longitudes = Vec::with_capacity(count);
            for _ in 0..count {
                let lat: f64 = tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| LocatorError::ModelData("bad craton vertex".into()))?;
                let lon: f64 = tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| LocatorError::ModelData("bad craton vertex".into()))?;
                latitudes.push(lat);
                longitudes.push(lon);
            }
            cratons.push(Craton::new(name_parts.join(" "), latitudes, longitudes));
        }

        Ok(cratons)
    }
}
