use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geojson::JsonObject;

use crate::error::GeometryLoadError;

/// GRS80 / WGS84 semi-major axis in metres. NAD83 and WGS84 are treated as the
/// same datum at map scale.
const SEMI_MAJOR: f64 = 6_378_137.0;
const GRS80_INV_FLATTENING: f64 = 298.257_222_101;

/// Coordinate reference systems a boundary source may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crs {
    /// Longitude/latitude degrees (EPSG:4326, OGC:CRS84, EPSG:4269).
    #[default]
    Wgs84,
    /// Spherical Web Mercator metres (EPSG:3857).
    WebMercator,
    /// NAD83 / Statistics Canada Lambert metres (EPSG:3347).
    StatCanLambert,
}

impl Crs {
    /// Parse a CRS name such as `EPSG:3857`, `urn:ogc:def:crs:EPSG::3347` or
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::Wgs84);
        }
        let code = upper.rsplit(':').next()?.trim();
        match code {
            "4326" | "4269" => Some(Self::Wgs84),
            "3857" | "900913" | "3785" => Some(Self::WebMercator),
            "3347" => Some(Self::StatCanLambert),
            _ => None,
        }
    }

    /// Read the legacy `crs` member of a GeoJSON object. No member means WGS84.
    pub fn from_foreign_members(members: Option<&JsonObject>) -> Result<Self, GeometryLoadError> {
        let Some(crs) = members.and_then(|m| m.get("crs")) else {
            return Ok(Self::Wgs84);
        };
        let name = crs
            .get("properties")
            .and_then(|props| props.get("name"))
            .and_then(|name| name.as_str())
            .ok_or_else(|| GeometryLoadError::UnsupportedCrs(crs.to_string()))?;
        Self::from_name(name).ok_or_else(|| GeometryLoadError::UnsupportedCrs(name.to_owned()))
    }

    pub fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// Convert a projected position to (longitude, latitude) degrees.
    pub fn to_wgs84(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (x, y),
            Self::WebMercator => web_mercator_inverse(x, y),
            Self::StatCanLambert => LambertConformalConic::statcan().inverse(x, y),
        }
    }

    /// Convert (longitude, latitude) degrees into this system.
    pub fn from_wgs84(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (lon, lat),
            Self::WebMercator => web_mercator_forward(lon, lat),
            Self::StatCanLambert => LambertConformalConic::statcan().forward(lon, lat),
        }
    }
}

fn web_mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / SEMI_MAJOR).to_degrees();
    let lat = (2.0 * (y / SEMI_MAJOR).exp().atan() - FRAC_PI_2).to_degrees();
    (lon, lat)
}

fn web_mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    let x = SEMI_MAJOR * lon.to_radians();
    let y = SEMI_MAJOR * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Two-standard-parallel Lambert conformal conic on an ellipsoid (Snyder, 15).
struct LambertConformalConic {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl LambertConformalConic {
    fn statcan() -> Self {
        Self::new(49.0, 77.0, 63.390_675, -91.866_666_666_666_67, 6_200_000.0, 3_000_000.0)
    }

    fn new(
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let f = 1.0 / GRS80_INV_FLATTENING;
        let e = (2.0 * f - f * f).sqrt();
        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());

        let m1 = Self::m(e, phi1);
        let m2 = Self::m(e, phi2);
        let t1 = Self::t(e, phi1);
        let t2 = Self::t(e, phi2);
        let t0 = Self::t(e, phi0);

        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let af = SEMI_MAJOR * m1 / (n * t1.powf(n));
        let rho0 = af * t0.powf(n);

        Self {
            e,
            n,
            af,
            rho0,
            lon0: lon0.to_radians(),
            false_easting,
            false_northing,
        }
    }

    fn m(e: f64, phi: f64) -> f64 {
        phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
    }

    fn t(e: f64, phi: f64) -> f64 {
        let es = e * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = self.af * Self::t(self.e, lat.to_radians()).powf(self.n);
        let theta = self.n * (lon.to_radians() - self.lon0);
        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + self.rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);
        let sign = self.n.signum();
        let rho = sign * dx.hypot(dy);
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / self.af).powf(1.0 / self.n);

        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = self.e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            let converged = (next - phi).abs() < 1e-12;
            phi = next;
            if converged {
                break;
            }
        }

        let lon = theta / self.n + self.lon0;
        (lon.to_degrees(), phi.to_degrees())
    }
}
