use crate::session::{MapSession, PendingTransition};
use geo::{LineString, MultiLineString, MultiPolygon};
use std::fmt::Write;

const TRANSITION_FRAMES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Wrap shapes and controls in links back to the server.
    pub interactive: bool,
}

/// Formats a statistic with thousands separators and at most two decimals.
/// Missing values render as `n/a`.
pub fn format_number(value: Option<f64>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "n/a".to_string();
    };

    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let frac = frac_part.trim_end_matches('0');
    let negative = value < 0.0 && (grouped != "0" || !frac.is_empty());

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn ring_path(out: &mut String, ring: &LineString<f64>, close: bool) {
    let mut coords: Vec<_> = ring.coords().collect();
    if close && coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    for (i, c) in coords.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(out, "{}{:.2},{:.2}", cmd, c.x, c.y);
    }
    if close && !coords.is_empty() {
        out.push('Z');
    }
}

pub fn polygons_path(geometry: &MultiPolygon<f64>) -> String {
    let mut d = String::new();
    for polygon in &geometry.0 {
        ring_path(&mut d, polygon.exterior(), true);
        for interior in polygon.interiors() {
            ring_path(&mut d, interior, true);
        }
    }
    d
}

pub fn lines_path(lines: &MultiLineString<f64>) -> String {
    let mut d = String::new();
    for line in &lines.0 {
        ring_path(&mut d, line, false);
    }
    d
}

/// SVG for the session's current view. A pending transition is drawn as
/// SMIL animations that end on the current view.
pub fn render_svg(session: &MapSession, pending: Option<&PendingTransition>, options: RenderOptions) -> String {
    let config = session.config();
    let (width, height) = (config.width, config.height);
    let transform = session.transform();
    let highlighted = session.highlighted();

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    );

    if options.interactive {
        let _ = writeln!(
            svg,
            r##"<a href="/reset"><rect class="background" width="{}" height="{}" fill="#ffffff"/></a>"##,
            width, height
        );
    }

    // Outer group carries the translation, inner group the scale
    let _ = writeln!(svg, r#"<g transform="translate({:.3},{:.3})">"#, transform.x, transform.y);
    if let Some(p) = pending {
        let values: Vec<String> = p.zoom.keyframes(TRANSITION_FRAMES).iter()
            .map(|t| format!("{:.3} {:.3}", t.x, t.y))
            .collect();
        let _ = writeln!(
            svg,
            r#"<animateTransform attributeName="transform" type="translate" dur="{}ms" fill="freeze" values="{}"/>"#,
            p.zoom.duration_ms,
            values.join(";")
        );
    }

    let _ = writeln!(
        svg,
        r#"<g transform="scale({:.5})" stroke-width="{:.5}">"#,
        transform.k,
        transform.stroke_width()
    );
    if let Some(p) = pending {
        let frames = p.zoom.keyframes(TRANSITION_FRAMES);
        let values: Vec<String> = frames.iter().map(|t| format!("{:.5}", t.k)).collect();
        let widths: Vec<String> = frames.iter().map(|t| format!("{:.5}", t.stroke_width())).collect();
        let _ = writeln!(
            svg,
            r#"<animateTransform attributeName="transform" type="scale" dur="{}ms" fill="freeze" values="{}"/>"#,
            p.zoom.duration_ms,
            values.join(";")
        );
        let _ = writeln!(
            svg,
            r#"<animate attributeName="stroke-width" dur="{}ms" fill="freeze" values="{}"/>"#,
            p.zoom.duration_ms,
            widths.join(";")
        );
    }

    svg.push_str("<g class=\"states\" cursor=\"pointer\">\n");
    for (index, view) in session.features().iter().enumerate() {
        let is_highlighted = highlighted == Some(index);
        let fill = if is_highlighted { config.highlight_color.as_str() } else { view.color.as_str() };
        let title = view.feature.name.as_deref()
            .or(view.feature.id.as_deref())
            .unwrap_or("Unknown");

        if options.interactive {
            let _ = write!(svg, r#"<a href="/select/{}">"#, index);
        }
        let _ = write!(
            svg,
            r#"<path class="state{}" data-index="{}" d="{}" fill="{}"><title>{}</title>"#,
            if is_highlighted { " highlighted" } else { "" },
            index,
            polygons_path(&view.projected),
            escape(fill),
            escape(title)
        );

        if let Some(p) = pending {
            let from_to = if p.highlight_to == Some(index) {
                Some((view.color.as_str(), config.highlight_color.as_str()))
            } else if p.highlight_from == Some(index) {
                Some((config.highlight_color.as_str(), view.color.as_str()))
            } else {
                None
            };
            if let Some((from, to)) = from_to {
                let _ = write!(
                    svg,
                    r#"<animate attributeName="fill" from="{}" to="{}" dur="{}ms" fill="freeze"/>"#,
                    escape(from),
                    escape(to),
                    config.highlight_ms
                );
            }
        }

        svg.push_str("</path>");
        if options.interactive {
            svg.push_str("</a>");
        }
        svg.push('\n');
    }
    svg.push_str("</g>\n");

    let borders = lines_path(session.borders());
    if !borders.is_empty() {
        let _ = writeln!(
            svg,
            r#"<path class="borders" fill="none" stroke="white" stroke-linejoin="round" d="{}"/>"#,
            borders
        );
    }

    for (name, (x, y)) in session.places() {
        let _ = writeln!(
            svg,
            r#"<circle class="place" r="1" transform="translate({:.2},{:.2})"><title>{}</title></circle>"#,
            x,
            y,
            escape(name)
        );
    }

    svg.push_str("</g>\n</g>\n</svg>\n");
    svg
}

fn render_detail(session: &MapSession) -> String {
    let Some(detail) = session.detail() else {
        return String::new();
    };
    format!(
        r#"<aside class="detail">
<h2>{}</h2>
<dl>
<dt>Jail population per capita</dt><dd class="jail-pop">{}</dd>
<dt>Average daily population</dt><dd class="avg-daily-pop">{}</dd>
<dt>Mortality rate</dt><dd class="mortality-rate">{}</dd>
</dl>
</aside>
"#,
        escape(&detail.name),
        detail.jail_pop_per_cap,
        detail.avg_daily_pop,
        detail.mortality_rate
    )
}

fn render_legend(session: &MapSession) -> String {
    let scale = session.scale();
    let mut legend = String::from("<ul class=\"legend\">\n");
    for (lower, upper, color) in scale.legend() {
        let _ = writeln!(
            legend,
            r#"<li><span class="swatch" style="background:{}"></span>{} – {}</li>"#,
            escape(color),
            format_number(Some(lower.round())),
            format_number(Some(upper.round()))
        );
    }
    let _ = writeln!(
        legend,
        r#"<li><span class="swatch" style="background:{}"></span>No data</li>"#,
        escape(scale.unknown())
    );
    legend.push_str("</ul>\n");
    legend
}

fn render_controls(session: &MapSession) -> String {
    let config = session.config();
    let step = (config.width.min(config.height) / 6.0).round();
    format!(
        r#"<nav class="controls">
<a href="/zoom?factor=2">Zoom in</a>
<a href="/zoom?factor=0.5">Zoom out</a>
<a href="/pan?dx=0&amp;dy={step}">Up</a>
<a href="/pan?dx=0&amp;dy=-{step}">Down</a>
<a href="/pan?dx={step}&amp;dy=0">Left</a>
<a href="/pan?dx=-{step}&amp;dy=0">Right</a>
<a href="/reset">Reset</a>
</nav>
"#
    )
}

/// Full HTML page: map, legend, detail panel and (when interactive) controls.
pub fn render_page(session: &MapSession, pending: Option<&PendingTransition>, options: RenderOptions) -> String {
    let mut page = String::from(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Jail population per capita by state</title>
<style>
body { font-family: sans-serif; margin: 1rem; }
.layout { display: flex; gap: 1rem; align-items: flex-start; }
.controls a { margin-right: 0.5rem; }
.detail { min-width: 14rem; border: 1px solid #ccc; padding: 0.5rem 1rem; }
.legend { list-style: none; padding: 0; font-size: 0.8rem; }
.swatch { display: inline-block; width: 1rem; height: 0.8rem; margin-right: 0.4rem; }
</style>
</head>
<body>
<h1>Jail population per capita by state</h1>
"#,
    );

    if options.interactive {
        page.push_str(&render_controls(session));
    }
    page.push_str("<div class=\"layout\">\n<div class=\"map\">\n");
    page.push_str(&render_svg(session, pending, options));
    page.push_str("</div>\n");
    page.push_str(&render_detail(session));
    page.push_str("</div>\n");
    page.push_str(&render_legend(session));
    page.push_str("</body>\n</html>\n");
    page
}
