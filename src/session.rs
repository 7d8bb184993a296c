use crate::color::QuantizeScale;
use crate::config::MapConfig;
use crate::processing;
use crate::projection::AlbersUsa;
use crate::render::format_number;
use crate::types::{Datasets, GeoFeature};
use crate::view::{ZoomBehavior, ZoomTransform, ZoomTransition, focus_transform};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{MultiLineString, MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use tracing::debug;

// Wrapper for RTree indexing
pub struct FeatureEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// A joined feature with its projected shape and fill color.
#[derive(Debug, Clone)]
pub struct FeatureView {
    pub feature: GeoFeature,
    pub projected: MultiPolygon<f64>,
    pub bounds: Option<Rect<f64>>,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Overview,
    Focused(usize),
}

/// A view change that has not been shown to the client yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingTransition {
    pub zoom: ZoomTransition,
    pub highlight_from: Option<usize>,
    pub highlight_to: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Selected(usize),
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detail {
    pub name: String,
    pub jail_pop_per_cap: String,
    pub avg_daily_pop: String,
    pub mortality_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub mode: &'static str,
    pub focused: Option<usize>,
    pub transform: ZoomTransform,
    pub stroke_width: f64,
    pub detail: Option<Detail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub jail_pop_per_cap: Option<f64>,
    pub avg_daily_pop: Option<f64>,
    pub mortality_rate: Option<f64>,
    pub color: String,
    pub bounds: Option<[[f64; 2]; 2]>,
}

/// Owns everything the presentation needs: joined features, projection,
/// color scale, hit index and the current view state.
pub struct MapSession {
    config: MapConfig,
    scale: QuantizeScale,
    zoom: ZoomBehavior,
    features: Vec<FeatureView>,
    borders: MultiLineString<f64>,
    places: Vec<(String, (f64, f64))>,
    tree: RTree<FeatureEnvelope>,
    transform: ZoomTransform,
    mode: ViewMode,
    pending: Option<PendingTransition>,
}

impl MapSession {
    pub fn new(config: &MapConfig, datasets: Datasets) -> Self {
        let Datasets { mut features, borders, names, stats } = datasets;
        processing::join_features(&mut features, &names, &stats);

        let scale = QuantizeScale::from_config(config);
        let projection = AlbersUsa::new(config.projection_scale, [config.width / 2.0, config.height / 2.0]);

        let features: Vec<FeatureView> = features.into_iter().map(|feature| {
            let projected = projection.project_polygons(&feature.geometry);
            let bounds = projected.bounding_rect();
            let color = scale.color(feature.jail_pop_per_cap).to_string();
            FeatureView { feature, projected, bounds, color }
        }).collect();

        let tree_items: Vec<FeatureEnvelope> = features.iter().enumerate()
            .filter_map(|(index, view)| {
                let rect = view.bounds?;
                Some(FeatureEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        let places = config.places.iter()
            .map(|p| (p.name.clone(), projection.project(p.lon, p.lat)))
            .collect();

        Self {
            config: config.clone(),
            scale,
            zoom: ZoomBehavior::new(config.scale_extent),
            borders: projection.project_lines(&borders),
            features,
            places,
            tree: RTree::bulk_load(tree_items),
            transform: ZoomTransform::IDENTITY,
            mode: ViewMode::Overview,
            pending: None,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn scale(&self) -> &QuantizeScale {
        &self.scale
    }

    pub fn features(&self) -> &[FeatureView] {
        &self.features
    }

    pub fn borders(&self) -> &MultiLineString<f64> {
        &self.borders
    }

    pub fn places(&self) -> &[(String, (f64, f64))] {
        &self.places
    }

    pub fn transform(&self) -> ZoomTransform {
        self.transform
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn highlighted(&self) -> Option<usize> {
        match self.mode {
            ViewMode::Focused(index) => Some(index),
            ViewMode::Overview => None,
        }
    }

    fn viewport(&self) -> (f64, f64) {
        (self.config.width, self.config.height)
    }

    fn start_transition(&mut self, target: ZoomTransform, point: Option<(f64, f64)>, next: ViewMode) {
        let zoom = ZoomTransition::new(self.transform, target, self.viewport(), point, self.config.transition_ms);
        self.pending = Some(PendingTransition {
            zoom,
            highlight_from: self.highlighted(),
            highlight_to: match next {
                ViewMode::Focused(index) => Some(index),
                ViewMode::Overview => None,
            },
        });
        self.transform = target;
        self.mode = next;
    }

    /// Focuses the feature at `index`: frames its bounds and moves the
    /// highlight to it. Returns `None` for an unknown index.
    pub fn select(&mut self, index: usize, point: Option<(f64, f64)>) -> Option<&FeatureView> {
        let view = self.features.get(index)?;
        debug!(
            index,
            id = ?view.feature.id,
            name = ?view.feature.name,
            jail_pop_per_cap = ?view.feature.jail_pop_per_cap,
            "selected feature"
        );

        let (width, height) = self.viewport();
        let target = match view.bounds {
            Some(bounds) => focus_transform(bounds, width, height, self.config.focus_padding, self.config.max_focus_scale),
            None => self.transform,
        };
        self.start_transition(target, point, ViewMode::Focused(index));
        self.features.get(index)
    }

    /// Returns to the overview: identity transform, no highlight.
    pub fn reset(&mut self, point: Option<(f64, f64)>) {
        if self.mode == ViewMode::Overview && self.transform == ZoomTransform::IDENTITY {
            return;
        }
        self.start_transition(ZoomTransform::IDENTITY, point, ViewMode::Overview);
    }

    /// Feature under a screen point, if any.
    pub fn hit_test(&self, point: (f64, f64)) -> Option<usize> {
        let (x, y) = self.transform.invert(point);
        let target = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);

        let mut candidates: Vec<usize> = self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|c| c.index)
            .collect();
        candidates.sort_unstable();

        candidates.into_iter().find(|&index| self.features[index].projected.contains(&target))
    }

    /// Click at a screen point: selects the shape under it, or resets when
    /// the background was hit.
    pub fn click(&mut self, point: (f64, f64)) -> ClickOutcome {
        match self.hit_test(point) {
            Some(index) => {
                self.select(index, Some(point));
                ClickOutcome::Selected(index)
            }
            None => {
                self.reset(Some(point));
                ClickOutcome::Background
            }
        }
    }

    /// Gesture zoom about a screen point (viewport center by default).
    pub fn zoom_by(&mut self, factor: f64, point: Option<(f64, f64)>) {
        let (width, height) = self.viewport();
        let point = point.unwrap_or((width / 2.0, height / 2.0));
        self.transform = self.zoom.scale_by(self.transform, factor, point);
        self.pending = None;
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.transform = self.zoom.pan_by(self.transform, dx, dy);
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&PendingTransition> {
        self.pending.as_ref()
    }

    /// Hands out the pending transition once.
    pub fn take_pending(&mut self) -> Option<PendingTransition> {
        self.pending.take()
    }

    pub fn detail(&self) -> Option<Detail> {
        let view = self.features.get(self.highlighted()?)?;
        let feature = &view.feature;
        Some(Detail {
            name: feature.name.clone()
                .or_else(|| feature.id.as_ref().map(|id| format!("Feature {}", id)))
                .unwrap_or_else(|| "Unknown".to_string()),
            jail_pop_per_cap: format_number(feature.jail_pop_per_cap),
            avg_daily_pop: format_number(feature.avg_daily_pop),
            mortality_rate: format_number(feature.mortality_rate),
        })
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            mode: match self.mode {
                ViewMode::Overview => "overview",
                ViewMode::Focused(_) => "focused",
            },
            focused: self.highlighted(),
            transform: self.transform,
            stroke_width: self.transform.stroke_width(),
            detail: self.detail(),
        }
    }

    pub fn summaries(&self) -> Vec<FeatureSummary> {
        self.features.iter().enumerate().map(|(index, view)| FeatureSummary {
            index,
            id: view.feature.id.clone(),
            name: view.feature.name.clone(),
            jail_pop_per_cap: view.feature.jail_pop_per_cap,
            avg_daily_pop: view.feature.avg_daily_pop,
            mortality_rate: view.feature.mortality_rate,
            color: view.color.clone(),
            bounds: view.bounds.map(|r| [[r.min().x, r.min().y], [r.max().x, r.max().y]]),
        }).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{NameRecord, StatRecord};
    use geo::polygon;

    fn square(lon: f64, lat: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: lon, y: lat),
            (x: lon + size, y: lat),
            (x: lon + size, y: lat + size),
            (x: lon, y: lat + size),
        ]])
    }

    /// California-ish square with id 6, a Texas-ish square with id 48 and an
    /// unnamed square with id 99.
    pub(crate) fn datasets() -> Datasets {
        Datasets {
            features: vec![
                GeoFeature::new(Some("6".to_string()), square(-121.0, 36.0, 2.0)),
                GeoFeature::new(Some("48".to_string()), square(-100.0, 30.0, 3.0)),
                GeoFeature::new(Some("99".to_string()), square(-85.0, 40.0, 1.0)),
            ],
            borders: MultiLineString::new(Vec::new()),
            names: vec![
                NameRecord { id: "6".to_string(), name: "California".to_string() },
                NameRecord { id: "48".to_string(), name: "Texas".to_string() },
            ],
            stats: vec![
                StatRecord { state: "California".to_string(), jail_pop: 320.0, avg_daily_pop: 71000.0, mortality_rate: 3.0 },
                StatRecord { state: "Texas".to_string(), jail_pop: 410.0, avg_daily_pop: 64000.0, mortality_rate: 2.5 },
            ],
        }
    }

    pub(crate) fn session() -> MapSession {
        MapSession::new(&MapConfig::default(), datasets())
    }

    fn center_of(session: &MapSession, index: usize) -> (f64, f64) {
        let r = session.features()[index].bounds.unwrap();
        let world = ((r.min().x + r.max().x) / 2.0, (r.min().y + r.max().y) / 2.0);
        session.transform().apply(world)
    }

    #[test]
    fn california_gets_bucket_for_320() {
        let session = session();
        assert_eq!(session.features()[0].feature.name.as_deref(), Some("California"));
        assert_eq!(session.features()[0].color, "#ef3b2c");
    }

    #[test]
    fn unmatched_feature_uses_unknown_color_and_accepts_clicks() {
        let mut session = session();
        assert_eq!(session.features()[2].feature.name, None);
        assert_eq!(session.features()[2].color, "#000000");

        let point = center_of(&session, 2);
        assert_eq!(session.click(point), ClickOutcome::Selected(2));
        let detail = session.detail().unwrap();
        assert_eq!(detail.name, "Feature 99");
        assert_eq!(detail.avg_daily_pop, "n/a");
    }

    #[test]
    fn selecting_shows_formatted_detail() {
        let mut session = session();
        session.select(0, None).unwrap();
        let detail = session.detail().unwrap();
        assert_eq!(detail.name, "California");
        assert_eq!(detail.avg_daily_pop, "71,000");
        assert_eq!(detail.jail_pop_per_cap, "320");
        assert_eq!(detail.mortality_rate, "3");
    }

    #[test]
    fn selection_moves_the_single_highlight() {
        let mut session = session();
        assert_eq!(session.highlighted(), None);

        session.select(0, None);
        assert_eq!(session.highlighted(), Some(0));

        session.select(1, None);
        assert_eq!(session.highlighted(), Some(1));
        let pending = session.take_pending().unwrap();
        assert_eq!(pending.highlight_from, Some(0));
        assert_eq!(pending.highlight_to, Some(1));
        assert!(session.take_pending().is_none());
    }

    #[test]
    fn focus_frames_the_selected_shape() {
        let mut session = session();
        session.select(1, None);
        let t = session.transform();
        assert!(t.k > 1.0 && t.k <= 8.0);
        let center = center_of(&session, 1);
        assert!((center.0 - 360.0).abs() < 1e-6);
        assert!((center.1 - 225.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_index_is_rejected_without_state_change() {
        let mut session = session();
        assert!(session.select(42, None).is_none());
        assert_eq!(session.mode(), ViewMode::Overview);
        assert!(session.pending().is_none());
    }

    #[test]
    fn background_click_resets_to_overview() {
        let mut session = session();
        session.select(0, None);
        session.take_pending();

        assert_eq!(session.click((1.0, 1.0)), ClickOutcome::Background);
        assert_eq!(session.mode(), ViewMode::Overview);
        assert_eq!(session.transform(), ZoomTransform::IDENTITY);
        assert_eq!(session.take_pending().unwrap().highlight_from, Some(0));
    }

    #[test]
    fn reset_in_overview_is_a_no_op() {
        let mut session = session();
        session.reset(None);
        assert!(session.pending().is_none());
    }

    #[test]
    fn gestures_keep_selection_and_clamp_scale() {
        let mut session = session();
        session.select(0, None);
        for _ in 0..10 {
            session.zoom_by(10.0, None);
        }
        assert_eq!(session.transform().k, 5.0);
        session.zoom_by(1e-12, Some((10.0, 10.0)));
        assert_eq!(session.transform().k, 0.2);
        session.pan_by(40.0, -15.0);
        assert_eq!(session.highlighted(), Some(0));
        assert!(session.pending().is_none());
    }

    #[test]
    fn hit_test_follows_the_view_transform() {
        let mut session = session();
        let before = center_of(&session, 0);
        assert_eq!(session.hit_test(before), Some(0));

        session.pan_by(500.0, 0.0);
        let after = center_of(&session, 0);
        assert_eq!(session.hit_test(after), Some(0));
        assert_ne!(session.hit_test(before), Some(0));
    }

    #[test]
    fn summaries_expose_joined_rows() {
        let session = session();
        let summaries = session.summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[1].name.as_deref(), Some("Texas"));
        assert_eq!(summaries[1].avg_daily_pop, Some(64000.0));
        assert!(summaries[1].bounds.is_some());
    }
}
