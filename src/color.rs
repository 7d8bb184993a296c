use crate::config::MapConfig;

/// Maps a continuous domain onto a fixed list of colors in equal-width
/// buckets. Values outside the domain land in the first or last bucket;
/// missing or NaN values get the `unknown` color.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeScale {
    domain: [f64; 2],
    range: Vec<String>,
    thresholds: Vec<f64>,
    unknown: String,
}

impl QuantizeScale {
    pub fn new(domain: [f64; 2], range: Vec<String>, unknown: impl Into<String>) -> Self {
        let [x0, x1] = domain;
        let n = range.len().saturating_sub(1);
        let thresholds = (0..n)
            .map(|i| ((i + 1) as f64 * x1 - (i as f64 - n as f64) * x0) / (n + 1) as f64)
            .collect();
        Self { domain, range, thresholds, unknown: unknown.into() }
    }

    pub fn from_config(map: &MapConfig) -> Self {
        Self::new(map.color_domain, map.palette.clone(), map.unknown_color.clone())
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn bucket_count(&self) -> usize {
        self.range.len()
    }

    /// Bucket index for `value`, or `None` for missing/NaN input.
    pub fn bucket(&self, value: Option<f64>) -> Option<usize> {
        let value = value.filter(|v| !v.is_nan())?;
        Some(self.thresholds.partition_point(|t| *t <= value))
    }

    pub fn color(&self, value: Option<f64>) -> &str {
        match self.bucket(value).and_then(|i| self.range.get(i)) {
            Some(color) => color,
            None => &self.unknown,
        }
    }

    pub fn unknown(&self) -> &str {
        &self.unknown
    }

    /// `(lower, upper, color)` for each bucket, lightest first.
    pub fn legend(&self) -> Vec<(f64, f64, &str)> {
        let [x0, x1] = self.domain;
        self.range.iter().enumerate().map(|(i, color)| {
            let lower = if i == 0 { x0 } else { self.thresholds[i - 1] };
            let upper = self.thresholds.get(i).copied().unwrap_or(x1);
            (lower, upper, color.as_str())
        }).collect()
    }
}
