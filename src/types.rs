use geo::MultiPolygon;

/// A state shape plus the display fields attached by the join.
#[derive(Debug, Clone)]
pub struct GeoFeature {
    pub id: Option<String>,
    pub geometry: MultiPolygon<f64>, // lon/lat
    pub name: Option<String>,
    pub jail_pop_per_cap: Option<f64>,
    pub avg_daily_pop: Option<f64>,
    pub mortality_rate: Option<f64>,
}

impl GeoFeature {
    pub fn new(id: Option<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            geometry,
            name: None,
            jail_pop_per_cap: None,
            avg_daily_pop: None,
            mortality_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub state: String,
    pub jail_pop: f64,
    pub avg_daily_pop: f64,
    pub mortality_rate: f64,
}

/// Everything acquisition hands to the join stage.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub features: Vec<GeoFeature>,
    pub borders: geo::MultiLineString<f64>, // Interior borders, lon/lat
    pub names: Vec<NameRecord>,
    pub stats: Vec<StatRecord>,
}
