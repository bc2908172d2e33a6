//! Shared value/time domain for the per-client PnL lines and the pure
//! domain-to-pixel transform every renderer draws through.
//!
//! Nothing here is cached: a frame is rebuilt from the current series on
//! every call.

use crate::feed::series::{ClientSeries, TimeSeriesSample};
use crate::feed::types::{ChartGeometry, ClientId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMetric {
    Realized,
    #[default]
    Unrealized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
    pub micro_scale: bool,
}

impl ValueDomain {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeDomain {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPath {
    pub client_id: ClientId,
    pub name: String,
    pub color: String,
    pub points: Vec<ChartPoint>,
    pub marker: Option<ChartPoint>,
    pub last_value: Option<f64>,
    pub label: Option<String>,
}

impl SeriesPath {
    /// `M x y L x y ...` for an SVG `<path d=...>`; empty when there are no points.
    pub fn svg_path(&self) -> String {
        let mut path = String::new();
        for (index, point) in self.points.iter().enumerate() {
            let command = if index == 0 { 'M' } else { 'L' };
            if index > 0 {
                path.push(' ');
            }
            let _ = write!(path, "{command}{:.2},{:.2}", point.x, point.y);
        }
        path
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gridline {
    pub value: f64,
    pub y: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFrame {
    pub metric: ChartMetric,
    pub value_domain: ValueDomain,
    pub time_domain: TimeDomain,
    pub series: Vec<SeriesPath>,
    pub gridlines: Vec<Gridline>,
    pub zero_line: Option<f64>,
}

/// Linear time → x and value → y mappings over a fixed canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartScale {
    pub value: ValueDomain,
    pub time: TimeDomain,
    pub geometry: ChartGeometry,
}

impl ChartScale {
    /// A zero-width time domain pins every sample to the right edge.
    pub fn x(&self, t: i64) -> f64 {
        let span = self.time.max.saturating_sub(self.time.min);
        if span <= 0 {
            return self.geometry.width;
        }
        let offset = t.saturating_sub(self.time.min) as f64;
        offset / span as f64 * self.geometry.width
    }

    /// Higher values map to smaller y.
    pub fn y(&self, value: f64) -> f64 {
        let geometry = &self.geometry;
        let plot_height = (geometry.height - geometry.margin_top - geometry.margin_bottom).max(0.0);
        let span = self.value.span();
        if !span.is_finite() || span <= 0.0 || !value.is_finite() {
            return self.geometry.margin_top + plot_height / 2.0;
        }
        self.geometry.margin_top + (self.value.max - value) / span * plot_height
    }
}

fn metric_value(sample: &TimeSeriesSample, metric: ChartMetric) -> f64 {
    match metric {
        ChartMetric::Realized => sample.realized,
        ChartMetric::Unrealized => sample.unrealized,
    }
}

pub fn value_domain(
    series: &BTreeMap<ClientId, ClientSeries>,
    metric: ChartMetric,
    geometry: &ChartGeometry,
) -> ValueDomain {
    let mut bounds: Option<(f64, f64)> = None;
    for sample in series.values().flat_map(|entry| entry.samples.iter()) {
        let value = metric_value(sample, metric);
        if !value.is_finite() {
            continue;
        }
        bounds = Some(match bounds {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
    }

    let (mut min, mut max) = bounds.unwrap_or((0.0, 0.0));
    if min == max {
        min -= geometry.flat_epsilon;
        max += geometry.flat_epsilon;
    }

    let padding = (max - min) * geometry.padding_ratio;
    min -= padding;
    max += padding;

    if max - min < geometry.micro_span {
        let center = (min + max) / 2.0;
        let half = geometry.micro_span / 2.0;
        return ValueDomain {
            min: center - half,
            max: center + half,
            micro_scale: true,
        };
    }

    ValueDomain {
        min,
        max,
        micro_scale: false,
    }
}

pub fn time_domain(series: &BTreeMap<ClientId, ClientSeries>) -> TimeDomain {
    let mut instants = series
        .values()
        .flat_map(|entry| entry.samples.iter())
        .map(|sample| sample.t);
    let Some(first) = instants.next() else {
        return TimeDomain { min: 0, max: 0 };
    };
    instants.fold(
        TimeDomain {
            min: first,
            max: first,
        },
        |domain, t| TimeDomain {
            min: domain.min.min(t),
            max: domain.max.max(t),
        },
    )
}

pub fn format_value(value: f64, micro_scale: bool) -> String {
    let decimals: i32 = if micro_scale { 4 } else { 2 };
    let half_unit = 0.5 * 10_f64.powi(-decimals);
    let value = if value.abs() < half_unit { 0.0 } else { value };
    format!("{value:.prec$}", prec = decimals as usize)
}

pub fn build_chart(
    series: &BTreeMap<ClientId, ClientSeries>,
    metric: ChartMetric,
    geometry: &ChartGeometry,
) -> ChartFrame {
    let scale = ChartScale {
        value: value_domain(series, metric, geometry),
        time: time_domain(series),
        geometry: *geometry,
    };
    let micro_scale = scale.value.micro_scale;

    let paths = series
        .values()
        .map(|entry| {
            let points: Vec<ChartPoint> = entry
                .samples
                .iter()
                .map(|sample| ChartPoint {
                    x: scale.x(sample.t),
                    y: scale.y(metric_value(sample, metric)),
                })
                .collect();
            let last_value = entry
                .samples
                .last()
                .map(|sample| metric_value(sample, metric));
            SeriesPath {
                client_id: entry.client_id.clone(),
                name: entry.name.clone(),
                color: entry.color.clone(),
                marker: points.last().copied(),
                points,
                last_value,
                label: last_value.map(|value| format_value(value, micro_scale)),
            }
        })
        .collect();

    let steps = geometry.gridlines.max(2);
    let gridlines = (0..steps)
        .map(|step| {
            let value = scale.value.min + scale.value.span() * step as f64 / (steps - 1) as f64;
            Gridline {
                value,
                y: scale.y(value),
                label: format_value(value, micro_scale),
            }
        })
        .collect();

    ChartFrame {
        metric,
        value_domain: scale.value,
        time_domain: scale.time,
        series: paths,
        gridlines,
        zero_line: scale.value.contains(0.0).then(|| scale.y(0.0)),
    }
}
