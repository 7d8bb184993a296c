//! Pan/zoom transforms, gesture clamping, focus framing and smooth zoom
//! transitions between two transforms.

use geo::Rect;
use serde::Serialize;
use std::f64::consts::SQRT_2;

/// `screen = world * k + (x, y)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomTransform {
    pub k: f64,
    pub x: f64,
    pub y: f64,
}

impl ZoomTransform {
    pub const IDENTITY: ZoomTransform = ZoomTransform { k: 1.0, x: 0.0, y: 0.0 };

    pub fn apply(&self, point: (f64, f64)) -> (f64, f64) {
        (point.0 * self.k + self.x, point.1 * self.k + self.y)
    }

    pub fn invert(&self, point: (f64, f64)) -> (f64, f64) {
        ((point.0 - self.x) / self.k, (point.1 - self.y) / self.k)
    }

    pub fn stroke_width(&self) -> f64 {
        1.0 / self.k
    }
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Gesture handling: every gesture result keeps `k` inside `scale_extent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomBehavior {
    pub scale_extent: [f64; 2],
}

impl ZoomBehavior {
    pub fn new(scale_extent: [f64; 2]) -> Self {
        Self { scale_extent }
    }

    pub fn clamp_scale(&self, k: f64) -> f64 {
        let [min, max] = self.scale_extent;
        if k.is_nan() {
            return min;
        }
        k.clamp(min, max)
    }

    /// Zooms by `factor`, keeping the world point under `point` fixed on screen.
    pub fn scale_by(&self, transform: ZoomTransform, factor: f64, point: (f64, f64)) -> ZoomTransform {
        let k = self.clamp_scale(transform.k * factor);
        let anchor = transform.invert(point);
        ZoomTransform {
            k,
            x: point.0 - anchor.0 * k,
            y: point.1 - anchor.1 * k,
        }
    }

    /// Pans by a screen-space delta.
    pub fn pan_by(&self, transform: ZoomTransform, dx: f64, dy: f64) -> ZoomTransform {
        ZoomTransform {
            k: transform.k,
            x: transform.x + dx,
            y: transform.y + dy,
        }
    }
}

/// Transform that frames `bounds` (projected coordinates) in a `width`x`height`
/// viewport. The scale is capped at `max_scale` but not clamped to the
/// gesture extent.
pub fn focus_transform(bounds: Rect<f64>, width: f64, height: f64, padding: f64, max_scale: f64) -> ZoomTransform {
    let (x0, y0) = (bounds.min().x, bounds.min().y);
    let (x1, y1) = (bounds.max().x, bounds.max().y);
    let fill = ((x1 - x0) / width).max((y1 - y0) / height);
    let k = max_scale.min(padding / fill);
    ZoomTransform {
        k,
        x: width / 2.0 - k * (x0 + x1) / 2.0,
        y: height / 2.0 - k * (y0 + y1) / 2.0,
    }
}

const RHO: f64 = SQRT_2;
const RHO2: f64 = 2.0;
const RHO4: f64 = 4.0;
const EPSILON2: f64 = 1e-12;

/// Smooth zoom path between two views `[ux, uy, w]` (view center and width)
/// after van Wijk and Nuij, "Smooth and efficient zooming and panning".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomInterpolator {
    ux0: f64,
    uy0: f64,
    w0: f64,
    dx: f64,
    dy: f64,
    path: ZoomPath,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ZoomPath {
    // Centers coincide: pure exponential zoom
    Straight { s: f64 },
    Curved { d1: f64, r0: f64, s: f64 },
}

impl ZoomInterpolator {
    pub fn new(from: [f64; 3], to: [f64; 3]) -> Self {
        let [ux0, uy0, w0] = from;
        let [ux1, uy1, w1] = to;
        let dx = ux1 - ux0;
        let dy = uy1 - uy0;
        let d2 = dx * dx + dy * dy;

        let path = if d2 < EPSILON2 {
            ZoomPath::Straight { s: (w1 / w0).ln() / RHO }
        } else {
            let d1 = d2.sqrt();
            let b0 = (w1 * w1 - w0 * w0 + RHO4 * d2) / (2.0 * w0 * RHO2 * d1);
            let b1 = (w1 * w1 - w0 * w0 - RHO4 * d2) / (2.0 * w1 * RHO2 * d1);
            let r0 = ((b0 * b0 + 1.0).sqrt() - b0).ln();
            let r1 = ((b1 * b1 + 1.0).sqrt() - b1).ln();
            ZoomPath::Curved { d1, r0, s: (r1 - r0) / RHO }
        };

        Self { ux0, uy0, w0, dx, dy, path }
    }

    pub fn at(&self, t: f64) -> [f64; 3] {
        match self.path {
            ZoomPath::Straight { s } => [
                self.ux0 + t * self.dx,
                self.uy0 + t * self.dy,
                self.w0 * (RHO * t * s).exp(),
            ],
            ZoomPath::Curved { d1, r0, s } => {
                let s = t * s;
                let cosh_r0 = r0.cosh();
                let u = self.w0 / (RHO2 * d1) * (cosh_r0 * (RHO * s + r0).tanh() - r0.sinh());
                [
                    self.ux0 + u * self.dx,
                    self.uy0 + u * self.dy,
                    self.w0 * cosh_r0 / (RHO * s + r0).cosh(),
                ]
            }
        }
    }
}

pub fn cubic_in_out(t: f64) -> f64 {
    let t = t * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

/// An animated change of view transform over a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomTransition {
    pub from: ZoomTransform,
    pub to: ZoomTransform,
    pub duration_ms: u64,
    point: (f64, f64),
    width: f64,
    interpolator: ZoomInterpolator,
}

impl ZoomTransition {
    /// `point` is the screen anchor of the interpolation; the viewport
    /// center is used when none is given.
    pub fn new(
        from: ZoomTransform,
        to: ZoomTransform,
        viewport: (f64, f64),
        point: Option<(f64, f64)>,
        duration_ms: u64,
    ) -> Self {
        let point = point.unwrap_or((viewport.0 / 2.0, viewport.1 / 2.0));
        let width = viewport.0.max(viewport.1);
        let a = from.invert(point);
        let b = to.invert(point);
        let interpolator = ZoomInterpolator::new([a.0, a.1, width / from.k], [b.0, b.1, width / to.k]);
        Self { from, to, duration_ms, point, width, interpolator }
    }

    /// Transform at normalized time `t` in `[0, 1]`, eased with cubic in-out.
    pub fn at(&self, t: f64) -> ZoomTransform {
        if t >= 1.0 {
            return self.to;
        }
        if t <= 0.0 {
            return self.from;
        }
        let [ux, uy, w] = self.interpolator.at(cubic_in_out(t));
        let k = self.width / w;
        ZoomTransform {
            k,
            x: self.point.0 - ux * k,
            y: self.point.1 - uy * k,
        }
    }

    /// `frames + 1` evenly timed samples from start to end inclusive.
    pub fn keyframes(&self, frames: usize) -> Vec<ZoomTransform> {
        let frames = frames.max(1);
        (0..=frames).map(|i| self.at(i as f64 / frames as f64)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn invert_undoes_apply() {
        let t = ZoomTransform { k: 2.5, x: -40.0, y: 12.0 };
        let p = t.invert(t.apply((13.0, -7.0)));
        assert!(close(p.0, 13.0) && close(p.1, -7.0));
    }

    #[test]
    fn gesture_scale_is_clamped() {
        let zoom = ZoomBehavior::new([0.2, 5.0]);
        let t = ZoomTransform::IDENTITY;
        assert_eq!(zoom.scale_by(t, 1e9, (0.0, 0.0)).k, 5.0);
        assert_eq!(zoom.scale_by(t, 1e-9, (0.0, 0.0)).k, 0.2);
        assert_eq!(zoom.scale_by(t, f64::INFINITY, (0.0, 0.0)).k, 5.0);
        assert_eq!(zoom.scale_by(t, f64::NAN, (0.0, 0.0)).k, 0.2);
        assert_eq!(zoom.scale_by(t, 2.0, (0.0, 0.0)).k, 2.0);

        // A focused view beyond the extent snaps back on the next gesture
        let focused = ZoomTransform { k: 8.0, x: 0.0, y: 0.0 };
        assert_eq!(zoom.scale_by(focused, 1.1, (0.0, 0.0)).k, 5.0);
    }

    #[test]
    fn scale_by_keeps_anchor_fixed() {
        let zoom = ZoomBehavior::new([0.2, 5.0]);
        let t = ZoomTransform { k: 1.5, x: 10.0, y: 20.0 };
        let anchor = (300.0, 200.0);
        let world = t.invert(anchor);
        let zoomed = zoom.scale_by(t, 2.0, anchor);
        let back = zoomed.apply(world);
        assert!(close(back.0, anchor.0) && close(back.1, anchor.1));
    }

    #[test]
    fn pan_keeps_scale() {
        let zoom = ZoomBehavior::new([0.2, 5.0]);
        let t = zoom.pan_by(ZoomTransform { k: 3.0, x: 1.0, y: 2.0 }, 10.0, -5.0);
        assert_eq!(t, ZoomTransform { k: 3.0, x: 11.0, y: -3.0 });
    }

    #[test]
    fn focus_frames_bounds_in_viewport() {
        let bounds = Rect::new(coord! { x: 100.0, y: 50.0 }, coord! { x: 172.0, y: 95.0 });
        let t = focus_transform(bounds, 720.0, 450.0, 0.9, 8.0);
        // 72 / 720 = 0.1 and 45 / 450 = 0.1 -> k = 9, capped to 8
        assert_eq!(t.k, 8.0);
        let center = t.apply((136.0, 72.5));
        assert!(close(center.0, 360.0) && close(center.1, 225.0));
    }

    #[test]
    fn focus_uses_padding_for_large_shapes() {
        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 360.0, y: 100.0 });
        let t = focus_transform(bounds, 720.0, 450.0, 0.9, 8.0);
        assert!(close(t.k, 1.8));
    }

    #[test]
    fn degenerate_bounds_use_max_scale() {
        let bounds = Rect::new(coord! { x: 5.0, y: 5.0 }, coord! { x: 5.0, y: 5.0 });
        assert_eq!(focus_transform(bounds, 720.0, 450.0, 0.9, 8.0).k, 8.0);
    }

    #[test]
    fn easing_hits_endpoints_and_midpoint() {
        assert_eq!(cubic_in_out(0.0), 0.0);
        assert_eq!(cubic_in_out(0.5), 0.5);
        assert_eq!(cubic_in_out(1.0), 1.0);
        assert!(cubic_in_out(0.25) < 0.25);
        assert!(cubic_in_out(0.75) > 0.75);
    }

    #[test]
    fn transition_starts_and_ends_on_its_transforms() {
        let to = ZoomTransform { k: 4.0, x: -900.0, y: -300.0 };
        let transition = ZoomTransition::new(ZoomTransform::IDENTITY, to, (720.0, 450.0), None, 750);
        let start = transition.at(0.0);
        assert_eq!(start, ZoomTransform::IDENTITY);
        assert_eq!(transition.at(1.0), to);

        let frames = transition.keyframes(10);
        assert_eq!(frames.len(), 11);
        assert_eq!(frames[10], to);

        // Just after the start the interpolated view is still near the origin view
        let early = transition.at(1e-6);
        assert!((early.k - 1.0).abs() < 1e-3);
        assert!(early.x.abs() < 1e-2 && early.y.abs() < 1e-2);
    }

    #[test]
    fn pure_zoom_about_center_grows_monotonically() {
        let zoom = ZoomBehavior::new([0.2, 5.0]);
        let to = zoom.scale_by(ZoomTransform::IDENTITY, 4.0, (360.0, 225.0));
        let transition = ZoomTransition::new(ZoomTransform::IDENTITY, to, (720.0, 450.0), None, 750);
        let ks: Vec<f64> = transition.keyframes(20).iter().map(|t| t.k).collect();
        assert!(ks.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        // The anchor stays put the whole way
        for t in transition.keyframes(20) {
            let p = t.apply((360.0, 225.0));
            assert!((p.0 - 360.0).abs() < 1e-6 && (p.1 - 225.0).abs() < 1e-6);
        }
    }

    #[test]
    fn interpolator_reaches_target_view() {
        let i = ZoomInterpolator::new([0.0, 0.0, 720.0], [300.0, 100.0, 90.0]);
        let end = i.at(1.0);
        assert!((end[0] - 300.0).abs() < 1e-6);
        assert!((end[1] - 100.0).abs() < 1e-6);
        assert!((end[2] - 90.0).abs() < 1e-6);
    }
}
