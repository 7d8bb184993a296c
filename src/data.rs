use crate::config::{AppConfig, RemoteConfig};
use crate::topology;
use crate::types::{Datasets, GeoFeature, NameRecord, StatRecord};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use geo::{MultiLineString, MultiPolygon};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Fetches boundaries, state names and statistics concurrently.
/// Any failure aborts the whole acquisition.
pub async fn acquire(config: &AppConfig) -> Result<Datasets> {
    let client = build_client(&config.remote)?;
    let api_key = config.api_key()?;

    let ((features, borders), names, stats) = tokio::try_join!(
        load_boundaries(&client, &config.input.topology, &config.input.topology_object),
        load_state_names(&client, &config.input.state_names),
        fetch_stats(&client, &config.remote, &api_key),
    )?;

    info!(
        features = features.len(),
        names = names.len(),
        stats = stats.len(),
        "acquired all datasets"
    );

    Ok(Datasets { features, borders, names, stats })
}

pub fn build_client(remote: &RemoteConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(remote.timeout_secs))
        .connect_timeout(Duration::from_secs(remote.connect_timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads a local file or fetches an http(s) URL as text.
async fn read_source(client: &reqwest::Client, source: &str) -> Result<String> {
    if is_remote(source) {
        let resp = client.get(source).send().await
            .with_context(|| format!("Request to {} failed", source))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned status {}", source, status));
        }
        resp.text().await.with_context(|| format!("Failed to read body of {}", source))
    } else {
        tokio::fs::read_to_string(source).await
            .with_context(|| format!("Failed to read file: {:?}", source))
    }
}

async fn load_boundaries(
    client: &reqwest::Client,
    source: &str,
    object: &str,
) -> Result<(Vec<GeoFeature>, MultiLineString<f64>)> {
    let text = read_source(client, source).await?;
    let parsed = parse_boundaries(&text, object)
        .with_context(|| format!("Failed to load boundaries from {}", source))?;
    info!(features = parsed.0.len(), borders = parsed.1.0.len(), "loaded boundaries from {}", source);
    Ok(parsed)
}

/// Accepts either a TopoJSON topology or a GeoJSON FeatureCollection.
pub fn parse_boundaries(text: &str, object: &str) -> Result<(Vec<GeoFeature>, MultiLineString<f64>)> {
    let doc: serde_json::Value = serde_json::from_str(text).context("Boundaries are not valid JSON")?;

    if topology::is_topology(&doc) {
        let decoded = topology::decode(doc, object)?;
        return Ok((decoded.features, decoded.borders));
    }

    let features = parse_geojson_features(text)?;
    Ok((features, MultiLineString::new(Vec::new())))
}

fn parse_geojson_features(text: &str) -> Result<Vec<GeoFeature>> {
    use geojson::{GeoJson, feature::Id};
    use std::convert::TryInto;

    let geojson: GeoJson = text.parse().context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        let id = match &feature.id {
            Some(Id::String(s)) => Some(s.clone()),
            Some(Id::Number(n)) => Some(n.to_string()),
            None => feature.properties.as_ref()
                .and_then(|props| props.get("id").cloned())
                .and_then(topology::id_to_string),
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            },
            None => continue,
        };

        features.push(GeoFeature::new(id, geometry));
    }

    Ok(features)
}

async fn load_state_names(client: &reqwest::Client, source: &str) -> Result<Vec<NameRecord>> {
    let text = read_source(client, source).await?;
    let names = parse_state_names(&text)
        .with_context(|| format!("Failed to load state names from {}", source))?;
    info!("loaded {} state names from {}", names.len(), source);
    Ok(names)
}

/// Parses the id/name lookup table. Extra columns are ignored; rows without
/// an id or a name are reported and dropped.
pub fn parse_state_names(text: &str) -> Result<Vec<NameRecord>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let id_idx = headers.iter().position(|h| h == "id")
        .ok_or_else(|| anyhow!("Column 'id' not found in state names CSV"))?;
    let name_idx = headers.iter().position(|h| h == "name")
        .ok_or_else(|| anyhow!("Column 'name' not found in state names CSV"))?;

    let mut names = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let id = record.get(id_idx).unwrap_or("");
        let name = record.get(name_idx).unwrap_or("");

        if id.is_empty() || name.is_empty() {
            warn!(row = row + 1, "skipping state name row without id or name");
            continue;
        }

        names.push(NameRecord { id: id.to_string(), name: name.to_string() });
    }

    Ok(names)
}

#[derive(Debug, Deserialize)]
struct StatsPage {
    records: Vec<serde_json::Value>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatRecord {
    fields: RawStatFields,
}

#[derive(Debug, Deserialize)]
struct RawStatFields {
    #[serde(rename = "State")]
    state: Option<String>,
    #[serde(rename = "Jail Population per capita")]
    jail_pop: Option<f64>,
    #[serde(rename = "Average number of people in jail")]
    avg_daily_pop: Option<f64>,
    #[serde(rename = "Mortality Rate")]
    mortality_rate: Option<f64>,
}

impl RawStatFields {
    fn into_record(self) -> Result<StatRecord, &'static str> {
        Ok(StatRecord {
            state: self.state.filter(|s| !s.is_empty()).ok_or("missing State")?,
            jail_pop: self.jail_pop.ok_or("missing Jail Population per capita")?,
            avg_daily_pop: self.avg_daily_pop.ok_or("missing Average number of people in jail")?,
            mortality_rate: self.mortality_rate.ok_or("missing Mortality Rate")?,
        })
    }
}

/// Parses one page of the remote table. Returns the valid rows and the
/// cursor for the next page, if any.
pub fn parse_stats_page(body: &str) -> Result<(Vec<StatRecord>, Option<String>)> {
    let page: StatsPage = serde_json::from_str(body).context("Failed to decode statistics page")?;

    let mut stats = Vec::with_capacity(page.records.len());
    for (index, raw) in page.records.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawStatRecord>(raw)
            .map_err(|e| e.to_string())
            .and_then(|r| r.fields.into_record().map_err(str::to_string));
        match parsed {
            Ok(record) => stats.push(record),
            Err(reason) => warn!(index, %reason, "skipping malformed statistics record"),
        }
    }

    Ok((stats, page.offset))
}

pub fn stats_url(remote: &RemoteConfig, offset: Option<&str>) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&remote.endpoint)
        .with_context(|| format!("Invalid remote endpoint: {}", remote.endpoint))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Remote endpoint cannot be a base URL: {}", remote.endpoint))?
        .pop_if_empty()
        .push(&remote.base_id)
        .push(&remote.table);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("maxRecords", &remote.max_records.to_string());
        query.append_pair("view", &remote.view);
        if let Some(offset) = offset {
            query.append_pair("offset", offset);
        }
    }
    Ok(url)
}

async fn fetch_stats(client: &reqwest::Client, remote: &RemoteConfig, api_key: &str) -> Result<Vec<StatRecord>> {
    let mut stats = Vec::new();
    let mut offset: Option<String> = None;

    loop {
        let url = stats_url(remote, offset.as_deref())?;
        let resp = client.get(url.clone()).bearer_auth(api_key).send().await
            .with_context(|| format!("Request to {} failed", url))?;
        let status = resp.status();
        let body = resp.text().await.context("Failed to read statistics response")?;
        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(anyhow!("Statistics API returned status {}; body preview: {}", status, preview));
        }

        let (page, next) = parse_stats_page(&body)?;
        stats.extend(page);

        match next {
            Some(cursor) if remote.all_pages => offset = Some(cursor),
            Some(_) => {
                info!("statistics table has more pages; fetching the first page only");
                break;
            }
            None => break,
        }
    }

    info!("loaded {} statistics records", stats.len());
    Ok(stats)
}
