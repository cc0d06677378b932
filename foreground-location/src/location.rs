use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statute miles per degree of arc: 60 nautical miles, 1.1515 statute miles each.
const MILES_PER_DEGREE: f64 = 60. * 1.1515;

const METERS_PER_MILE: f64 = 1609.344;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn distance_to(&self, other: &Coordinate) -> Miles {
        distance(self, other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// A single location sample as reported by a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub time: DateTime<Utc>,
}

impl Fix {
    pub fn new(coordinate: Coordinate) -> Self {
        Self::at(coordinate, Utc::now())
    }

    pub fn at(coordinate: Coordinate, time: DateTime<Utc>) -> Self {
        Self { coordinate, time }
    }
}

/// A distance in statute miles, the unit [`distance`] produces.
///
/// Radii used to be handed around as bare numbers documented as meters while
/// being compared against miles. Carrying the unit in the type keeps callers
/// from mixing the two; use [`Miles::from_meters`] for metric input.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Miles(pub f64);

impl Miles {
    pub fn from_meters(meters: f64) -> Self {
        Miles(meters / METERS_PER_MILE)
    }

    pub fn from_kilometers(kilometers: f64) -> Self {
        Self::from_meters(kilometers * 1000.)
    }

    pub fn as_meters(&self) -> f64 {
        self.0 * METERS_PER_MILE
    }
}

impl fmt::Display for Miles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mi", self.0)
    }
}

/// Parses `"0.5mi"`, `"1.2km"` or `"250m"`. A bare number is taken as miles,
/// which is what untagged radius values have always been compared as.
impl FromStr for Miles {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (number, to_miles): (&str, fn(f64) -> Miles) = if let Some(n) = s.strip_suffix("mi") {
            (n, Miles)
        } else if let Some(n) = s.strip_suffix("km") {
            (n, Miles::from_kilometers)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, Miles::from_meters)
        } else {
            (s, Miles)
        };

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid distance '{s}': {e}"))?;
        if !(value >= 0.) || value.is_infinite() {
            return Err(anyhow!("distance '{s}' must be a finite, non-negative number"));
        }
        Ok(to_miles(value))
    }
}

/// Approximate great-circle distance between two points, in statute miles.
#[allow(non_snake_case)]
pub fn distance(a: &Coordinate, b: &Coordinate) -> Miles {
    // Spherical law of cosines:
    //
    // cos(c) = sin(φ1)*sin(φ2) + cos(φ1)*cos(φ2)*cos(Δλ)
    //
    // where:
    // φ1, φ2 are the latitudes of the two points,
    // Δλ is the difference of their longitudes, all in radians, and
    // c is the central angle between the points.
    //
    // The central angle in degrees is converted to arc minutes (nautical
    // miles) and from there to statute miles.
    //
    // Rounding can push the right hand side slightly beyond [-1, 1] for
    // identical or antipodal points, where acos would yield NaN. The value is
    // clamped so that those points get 0 and half the circumference instead.
    // NaN coordinates still produce NaN, which never compares as within any
    // radius.

    if a.latitude == b.latitude && a.longitude == b.longitude {
        return Miles(0.);
    }

    let φ1 = a.latitude.to_radians();
    let φ2 = b.latitude.to_radians();
    let Δλ = (a.longitude - b.longitude).to_radians();

    let cos_c = φ1.sin() * φ2.sin() + φ1.cos() * φ2.cos() * Δλ.cos();
    let c = cos_c.clamp(-1., 1.).acos();

    Miles((c.to_degrees() * MILES_PER_DEGREE).abs())
}

#[cfg(test)]
fn assert_close(actual: Miles, expected: f64, tolerance: f64) {
    assert!(
        (actual.0 - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

#[test]
fn test_identical_points_are_zero_apart() {
    let points = [
        Coordinate::new(40.0, -73.0),
        Coordinate::new(0.0, 0.0),
        Coordinate::new(-89.9, 179.9),
        Coordinate::new(48.48870120526846, 9.218084635543407),
    ];
    for p in points {
        assert_eq!(distance(&p, &p), Miles(0.));
    }
}

#[test]
fn test_distance_is_symmetric() {
    let pairs = [
        (Coordinate::new(40.7128, -74.0060), Coordinate::new(34.0522, -118.2437)),
        (Coordinate::new(10.0, 20.0), Coordinate::new(50.0, 60.0)),
        (Coordinate::new(-33.8688, 151.2093), Coordinate::new(51.5074, -0.1278)),
        (Coordinate::new(0.0, 179.5), Coordinate::new(0.0, -179.5)),
    ];
    for (a, b) in pairs {
        let ab = distance(&a, &b);
        let ba = distance(&b, &a);
        assert!(ab.0 >= 0.);
        assert_close(ab, ba.0, 1e-9);
    }
}

#[test]
fn test_new_york_to_los_angeles() {
    let new_york = Coordinate::new(40.7128, -74.0060);
    let los_angeles = Coordinate::new(34.0522, -118.2437);

    let d = distance(&new_york, &los_angeles);
    // roughly 2450 statute miles on a sphere
    assert!(d.0 > 2400. && d.0 < 2500., "got {d}");
    assert!(!(d <= Miles(100.)));
}

#[test]
fn test_one_degree_of_latitude() {
    let d = distance(&Coordinate::new(0.0, 0.0), &Coordinate::new(1.0, 0.0));
    assert_close(d, MILES_PER_DEGREE, 1e-6);
}

#[test]
fn test_antipodal_points_do_not_yield_nan() {
    let pairs = [
        (Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0)),
        (Coordinate::new(90.0, 0.0), Coordinate::new(-90.0, 0.0)),
        (Coordinate::new(45.0, 10.0), Coordinate::new(-45.0, -170.0)),
    ];
    for (a, b) in pairs {
        let d = distance(&a, &b);
        assert!(d.0.is_finite());
        assert_close(d, 180. * MILES_PER_DEGREE, 1e-3);
    }
}

#[test]
fn test_nearly_identical_points_do_not_yield_nan() {
    let a = Coordinate::new(48.48870120526846, 9.218084635543407);
    let b = Coordinate::new(48.48870120526846, 9.218084635543408);
    let d = distance(&a, &b);
    assert!(d.0.is_finite());
    assert!(d.0 < 0.001);
}

#[test]
fn test_nan_coordinates_never_fall_within_a_radius() {
    let a = Coordinate::new(f64::NAN, 0.0);
    let b = Coordinate::new(0.0, 0.0);
    let d = distance(&a, &b);
    assert!(d.0.is_nan());
    assert!(!(d <= Miles(f64::MAX)));
}

#[test]
fn test_parse_distances() {
    assert_eq!("0.5mi".parse::<Miles>().unwrap(), Miles(0.5));
    assert_eq!("100".parse::<Miles>().unwrap(), Miles(100.));
    assert_close("1609.344m".parse::<Miles>().unwrap(), 1.0, 1e-12);
    assert_close(" 1.609344 km ".parse::<Miles>().unwrap(), 1.0, 1e-12);

    assert!("".parse::<Miles>().is_err());
    assert!("-1mi".parse::<Miles>().is_err());
    assert!("NaN".parse::<Miles>().is_err());
    assert!("inf".parse::<Miles>().is_err());
    assert!("ten miles".parse::<Miles>().is_err());
}

#[test]
fn test_meters_round_trip_through_miles() {
    let radius = Miles::from_meters(500.);
    assert!((radius.as_meters() - 500.).abs() < 1e-9);
}

#[test]
fn test_coordinate_json_uses_lat_lng() {
    let c: Coordinate = serde_json::from_str(r#"{"lat": 10.5, "lng": -20.25}"#).unwrap();
    assert_eq!(c, Coordinate::new(10.5, -20.25));
}
