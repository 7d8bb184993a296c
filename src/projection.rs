//! Albers USA: a composite of three conic equal-area projections that places
//! Alaska and Hawaii as insets below the lower 48 states.

use geo::{Coord, MapCoords, MultiLineString, MultiPolygon};

/// Conic equal-area projection with rotation, center, scale and translation.
#[derive(Debug, Clone, Copy)]
pub struct ConicEqualArea {
    n: f64,
    c: f64,
    r0: f64,
    rotate: f64, // radians added to longitude
    k: f64,
    dx: f64,
    dy: f64,
}

impl ConicEqualArea {
    /// `parallels`, `rotate` and `center` are in degrees.
    pub fn new(parallels: [f64; 2], rotate: f64, center: [f64; 2], scale: f64, translate: [f64; 2]) -> Self {
        let sy0 = parallels[0].to_radians().sin();
        let n = (sy0 + parallels[1].to_radians().sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;

        let mut projection = Self { n, c, r0, rotate: rotate.to_radians(), k: scale, dx: 0.0, dy: 0.0 };
        let (cx, cy) = projection.raw(center[0].to_radians(), center[1].to_radians());
        projection.dx = translate[0] - cx * scale;
        projection.dy = translate[1] + cy * scale;
        projection
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        let x = lambda * self.n;
        (r * x.sin(), self.r0 - r * x.cos())
    }

    /// Projects longitude/latitude in degrees to screen coordinates (y down).
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lambda = wrap_longitude(lon.to_radians() + self.rotate);
        let (x, y) = self.raw(lambda, lat.to_radians());
        (self.dx + x * self.k, self.dy - y * self.k)
    }
}

fn wrap_longitude(lambda: f64) -> f64 {
    use std::f64::consts::PI;
    if lambda > PI {
        lambda - 2.0 * PI
    } else if lambda < -PI {
        lambda + 2.0 * PI
    } else {
        lambda
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Lower48,
    Alaska,
    Hawaii,
}

impl Region {
    pub fn of(lon: f64, lat: f64) -> Region {
        if lat >= 50.0 && (lon < -129.0 || lon > 170.0) {
            Region::Alaska
        } else if lat < 26.0 && lon < -150.0 {
            Region::Hawaii
        } else {
            Region::Lower48
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlbersUsa {
    lower48: ConicEqualArea,
    alaska: ConicEqualArea,
    hawaii: ConicEqualArea,
}

impl AlbersUsa {
    pub fn new(scale: f64, translate: [f64; 2]) -> Self {
        let [x, y] = translate;
        let k = scale;
        Self {
            lower48: ConicEqualArea::new([29.5, 45.5], 96.0, [-0.6, 38.7], k, [x, y]),
            alaska: ConicEqualArea::new([55.0, 65.0], 154.0, [-2.0, 58.5], k * 0.35, [x - 0.307 * k, y + 0.201 * k]),
            hawaii: ConicEqualArea::new([8.0, 18.0], 157.0, [-3.0, 19.9], k, [x - 0.205 * k, y + 0.212 * k]),
        }
    }

    fn part(&self, region: Region) -> &ConicEqualArea {
        match region {
            Region::Lower48 => &self.lower48,
            Region::Alaska => &self.alaska,
            Region::Hawaii => &self.hawaii,
        }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.part(Region::of(lon, lat)).project(lon, lat)
    }

    /// Projects a whole shape with a single sub-projection (the region most of
    /// its vertices fall in), so a state is never torn across insets.
    pub fn project_polygons(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let mut counts = [0usize; 3];
        for polygon in &geometry.0 {
            for c in polygon.exterior().coords() {
                counts[region_slot(Region::of(c.x, c.y))] += 1;
            }
        }
        let region = [Region::Lower48, Region::Alaska, Region::Hawaii]
            .into_iter()
            .max_by_key(|r| counts[region_slot(*r)])
            .unwrap_or(Region::Lower48);
        let part = *self.part(region);

        geometry.map_coords(|c: Coord<f64>| {
            let (x, y) = part.project(c.x, c.y);
            Coord { x, y }
        })
    }

    pub fn project_lines(&self, lines: &MultiLineString<f64>) -> MultiLineString<f64> {
        let projection = *self;
        lines.map_coords(|c: Coord<f64>| {
            let (x, y) = projection.project(c.x, c.y);
            Coord { x, y }
        })
    }
}

fn region_slot(region: Region) -> usize {
    match region {
        Region::Lower48 => 0,
        Region::Alaska => 1,
        Region::Hawaii => 2,
    }
}
