use crate::types::{GeoFeature, NameRecord, StatRecord};
use tracing::info;

/// Attributes a feature picks up from the lookup tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub name: Option<String>,
    pub stats: Option<StatRecord>,
}

/// Looks up the feature's name by id, then its statistics by name.
/// First match wins in both tables.
pub fn enrich(feature_id: Option<&str>, names: &[NameRecord], stats: &[StatRecord]) -> Enrichment {
    let Some(id) = feature_id else {
        return Enrichment::default();
    };

    let Some(name_row) = names.iter().find(|row| row.id == id) else {
        return Enrichment::default();
    };

    let stat_row = stats.iter().find(|row| row.state == name_row.name);

    Enrichment {
        name: Some(name_row.name.clone()),
        stats: stat_row.cloned(),
    }
}

pub fn apply(feature: &mut GeoFeature, enrichment: Enrichment) {
    feature.name = enrichment.name;
    if let Some(stats) = enrichment.stats {
        feature.jail_pop_per_cap = Some(stats.jail_pop);
        feature.avg_daily_pop = Some(stats.avg_daily_pop);
        feature.mortality_rate = Some(stats.mortality_rate);
    }
}

pub fn join_features(features: &mut [GeoFeature], names: &[NameRecord], stats: &[StatRecord]) {
    let mut named = 0;
    let mut with_stats = 0;

    for feature in features.iter_mut() {
        let enrichment = enrich(feature.id.as_deref(), names, stats);
        named += usize::from(enrichment.name.is_some());
        with_stats += usize::from(enrichment.stats.is_some());
        apply(feature, enrichment);
    }

    info!(
        features = features.len(),
        named,
        with_stats,
        "joined features with state names and statistics"
    );
}
