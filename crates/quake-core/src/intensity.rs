//! Local shaking estimate from an attenuation relation.

use crate::geo::haversine_km;

pub const MAX_INTENSITY: f64 = 12.0;
pub const DEFAULT_DEPTH_KM: f64 = 10.0;

const MIN_HYPOCENTRAL_KM: f64 = 5.0;
const NEAR_FIELD_KM: f64 = 25.0;
const WEST_CHINA_LONGITUDE: f64 = 105.0;

struct Coefficients {
    a: f64,
    b: f64,
    c: f64,
}

const EAST: Coefficients = Coefficients { a: 6.046, b: 1.480, c: 2.081 };
const WEST: Coefficients = Coefficients { a: 5.643, b: 1.538, c: 2.109 };

/// Estimate intensity at a site, returning `(epicentral_distance_km, intensity)`.
///
/// `depth_km` of `None` uses [`DEFAULT_DEPTH_KM`]. The result is clamped to
/// `0..=MAX_INTENSITY`.
pub fn estimate_intensity(
    magnitude: f64,
    depth_km: Option<f64>,
    epicenter: (f64, f64),
    site: (f64, f64),
) -> (f64, f64) {
    let distance = haversine_km(epicenter.0, epicenter.1, site.0, site.1);
    let depth = depth_km.unwrap_or(DEFAULT_DEPTH_KM).max(0.0);
    let hypocentral = (distance.powi(2) + depth.powi(2)).sqrt().max(MIN_HYPOCENTRAL_KM);

    let k = if epicenter.1 < WEST_CHINA_LONGITUDE { &WEST } else { &EAST };
    let intensity = k.a + k.b * magnitude - k.c * (hypocentral + NEAR_FIELD_KM).ln();

    (distance, intensity.clamp(0.0, MAX_INTENSITY))
}
