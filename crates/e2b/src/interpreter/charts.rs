//! Decoder for chart data extracted by the interpreter from plotting
//! libraries. Charts arrive as a loose JSON mapping dispatched on its
//! `type` field; the original mapping is kept on every variant for
//! fidelity.

use serde_json::{Map, Value};

type RawMap = Map<String, Value>;

/// Axis scale reported by the plotting library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    Linear,
    Datetime,
    Categorical,
    Log,
    Symlog,
    Logit,
    Function,
    FunctionLog,
    Asinh,
    Unknown,
}

impl ScaleType {
    fn from_str(scale: &str) -> Self {
        match scale {
            "linear" => ScaleType::Linear,
            "datetime" => ScaleType::Datetime,
            "categorical" => ScaleType::Categorical,
            "log" => ScaleType::Log,
            "symlog" => ScaleType::Symlog,
            "logit" => ScaleType::Logit,
            "function" => ScaleType::Function,
            "functionlog" => ScaleType::FunctionLog,
            "asinh" => ScaleType::Asinh,
            _ => ScaleType::Unknown,
        }
    }
}

/// Fields shared by every chart.
#[derive(Debug, Clone)]
pub struct ChartBase {
    pub title: String,
    raw: RawMap,
}

/// Axis labels and units of 2D charts.
#[derive(Debug, Clone, Default)]
pub struct Axes2D {
    pub x_label: String,
    pub y_label: String,
    pub x_unit: String,
    pub y_unit: String,
}

/// A labeled series of (x, y) points.
#[derive(Debug, Clone)]
pub struct PointSeries {
    pub label: String,
    pub points: Vec<(Value, Value)>,
}

/// Line and scatter charts.
#[derive(Debug, Clone)]
pub struct PointChart {
    pub base: ChartBase,
    pub axes: Axes2D,
    pub x_ticks: Vec<Value>,
    pub x_tick_labels: Vec<String>,
    pub x_scale: ScaleType,
    pub y_ticks: Vec<Value>,
    pub y_tick_labels: Vec<String>,
    pub y_scale: ScaleType,
    pub elements: Vec<PointSeries>,
}

/// One bar of a bar chart. Values may arrive as strings or numbers and are
/// kept as text.
#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    pub group: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct BarChart {
    pub base: ChartBase,
    pub axes: Axes2D,
    pub elements: Vec<BarData>,
}

#[derive(Debug, Clone)]
pub struct PieData {
    pub label: String,
    pub angle: f64,
    pub radius: f64,
}

#[derive(Debug, Clone)]
pub struct PieChart {
    pub base: ChartBase,
    pub elements: Vec<PieData>,
}

#[derive(Debug, Clone)]
pub struct BoxAndWhiskerData {
    pub label: String,
    pub min: f64,
    pub first_quartile: f64,
    pub median: f64,
    pub third_quartile: f64,
    pub max: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct BoxAndWhiskerChart {
    pub base: ChartBase,
    pub axes: Axes2D,
    pub elements: Vec<BoxAndWhiskerData>,
}

/// Chart whose elements are themselves charts.
#[derive(Debug, Clone)]
pub struct SuperChart {
    pub base: ChartBase,
    pub elements: Vec<Chart>,
}

/// Chart extracted from an execution result.
#[derive(Debug, Clone)]
pub enum Chart {
    Line(PointChart),
    Scatter(PointChart),
    Bar(BarChart),
    Pie(PieChart),
    BoxAndWhisker(BoxAndWhiskerChart),
    Super(SuperChart),
    /// Unrecognized chart type; only the raw mapping is available.
    Unknown(ChartBase),
}

impl Chart {
    /// Decodes a chart mapping. Fails only when the `type` field is missing
    /// or not a string.
    pub fn decode(data: &RawMap) -> Option<Chart> {
        let chart_type = data.get("type")?.as_str()?;
        let base = ChartBase {
            title: get_string(data, "title"),
            raw: data.clone(),
        };

        let chart = match chart_type {
            "line" => Chart::Line(decode_point_chart(base, data)),
            "scatter" => Chart::Scatter(decode_point_chart(base, data)),
            "bar" => Chart::Bar(BarChart {
                axes: decode_axes(data),
                elements: elements(data)
                    .map(|element| BarData {
                        label: get_string(element, "label"),
                        group: get_string(element, "group"),
                        value: get_string_or_number(element, "value"),
                    })
                    .collect(),
                base,
            }),
            "pie" => Chart::Pie(PieChart {
                elements: elements(data)
                    .map(|element| PieData {
                        label: get_string(element, "label"),
                        angle: get_f64(element, "angle"),
                        radius: get_f64(element, "radius"),
                    })
                    .collect(),
                base,
            }),
            "box_and_whisker" => Chart::BoxAndWhisker(BoxAndWhiskerChart {
                axes: decode_axes(data),
                elements: elements(data)
                    .map(|element| BoxAndWhiskerData {
                        label: get_string(element, "label"),
                        min: get_f64(element, "min"),
                        first_quartile: get_f64(element, "first_quartile"),
                        median: get_f64(element, "median"),
                        third_quartile: get_f64(element, "third_quartile"),
                        max: get_f64(element, "max"),
                        outliers: element
                            .get("outliers")
                            .and_then(Value::as_array)
                            .map(|outliers| {
                                outliers.iter().filter_map(Value::as_f64).collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect(),
                base,
            }),
            "superchart" => Chart::Super(SuperChart {
                elements: elements(data)
                    .filter_map(|element| Chart::decode(element))
                    .collect(),
                base,
            }),
            _ => Chart::Unknown(base),
        };
        Some(chart)
    }

    pub fn title(&self) -> &str {
        &self.base().title
    }

    /// The original mapping the chart was decoded from.
    pub fn to_map(&self) -> &RawMap {
        &self.base().raw
    }

    fn base(&self) -> &ChartBase {
        match self {
            Chart::Line(chart) | Chart::Scatter(chart) => &chart.base,
            Chart::Bar(chart) => &chart.base,
            Chart::Pie(chart) => &chart.base,
            Chart::BoxAndWhisker(chart) => &chart.base,
            Chart::Super(chart) => &chart.base,
            Chart::Unknown(base) => base,
        }
    }
}

impl serde::Serialize for Chart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

fn decode_point_chart(base: ChartBase, data: &RawMap) -> PointChart {
    PointChart {
        axes: decode_axes(data),
        x_ticks: get_array(data, "x_ticks"),
        x_tick_labels: get_string_array(data, "x_tick_labels"),
        x_scale: ScaleType::from_str(&get_string(data, "x_scale")),
        y_ticks: get_array(data, "y_ticks"),
        y_tick_labels: get_string_array(data, "y_tick_labels"),
        y_scale: ScaleType::from_str(&get_string(data, "y_scale")),
        elements: elements(data)
            .map(|element| PointSeries {
                label: get_string(element, "label"),
                points: element
                    .get("points")
                    .and_then(Value::as_array)
                    .map(|points| {
                        points
                            .iter()
                            .filter_map(Value::as_array)
                            .filter(|point| point.len() >= 2)
                            .map(|point| (point[0].clone(), point[1].clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect(),
        base,
    }
}

fn decode_axes(data: &RawMap) -> Axes2D {
    Axes2D {
        x_label: get_string(data, "x_label"),
        y_label: get_string(data, "y_label"),
        x_unit: get_string(data, "x_unit"),
        y_unit: get_string(data, "y_unit"),
    }
}

fn elements(data: &RawMap) -> impl Iterator<Item = &RawMap> {
    data.get("elements")
        .and_then(Value::as_array)
        .map(|elements| elements.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_object)
}

fn get_string(map: &RawMap, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_string_or_number(map: &RawMap, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn get_f64(map: &RawMap, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn get_array(map: &RawMap, key: &str) -> Vec<Value> {
    map.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn get_string_array(map: &RawMap, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> RawMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn line_chart_decodes_points_and_scales() {
        let data = map(json!({
            "type": "line",
            "title": "speed",
            "x_label": "t", "y_label": "v", "x_unit": "s", "y_unit": "m/s",
            "x_ticks": [0, 1, 2], "x_tick_labels": ["0", "1", "2"], "x_scale": "linear",
            "y_ticks": [0.0, 4.5], "y_tick_labels": ["0", "4.5"], "y_scale": "log",
            "elements": [
                {"label": "a", "points": [[0, 1], [1, 4]]},
                {"label": "b", "points": [[0, 2]]}
            ]
        }));
        let chart = Chart::decode(&data).unwrap();
        let Chart::Line(line) = &chart else {
            panic!("expected line chart");
        };
        assert_eq!(line.base.title, "speed");
        assert_eq!(line.axes.x_label, "t");
        assert_eq!(line.x_scale, ScaleType::Linear);
        assert_eq!(line.y_scale, ScaleType::Log);
        assert_eq!(line.elements.len(), 2);
        assert_eq!(line.elements[0].points.len(), 2);
        assert_eq!(line.elements[0].points[1].1, json!(4));
        // Fidelity: the decoded chart keeps the original mapping.
        assert_eq!(chart.to_map(), &data);
    }

    #[test]
    fn bar_value_accepts_string_or_number() {
        let data = map(json!({
            "type": "bar",
            "title": "counts",
            "elements": [
                {"label": "a", "group": "g", "value": "12"},
                {"label": "b", "group": "g", "value": 7}
            ]
        }));
        let Chart::Bar(bar) = Chart::decode(&data).unwrap() else {
            panic!("expected bar chart");
        };
        assert_eq!(bar.elements[0].value, "12");
        assert_eq!(bar.elements[1].value, "7");
    }

    #[test]
    fn pie_and_box_charts_decode() {
        let pie = map(json!({
            "type": "pie",
            "title": "share",
            "elements": [{"label": "a", "angle": 180.0, "radius": 1.0}]
        }));
        let Chart::Pie(pie) = Chart::decode(&pie).unwrap() else {
            panic!("expected pie chart");
        };
        assert_eq!(pie.elements[0].angle, 180.0);

        let bw = map(json!({
            "type": "box_and_whisker",
            "title": "dist",
            "elements": [{
                "label": "a", "min": 1.0, "first_quartile": 2.0, "median": 3.0,
                "third_quartile": 4.0, "max": 5.0, "outliers": [0.1, 9.9]
            }]
        }));
        let Chart::BoxAndWhisker(bw) = Chart::decode(&bw).unwrap() else {
            panic!("expected box and whisker chart");
        };
        assert_eq!(bw.elements[0].median, 3.0);
        assert_eq!(bw.elements[0].outliers, vec![0.1, 9.9]);
    }

    #[test]
    fn superchart_decodes_children_recursively() {
        let data = map(json!({
            "type": "superchart",
            "title": "grid",
            "elements": [
                {"type": "line", "title": "l", "elements": []},
                {"type": "pie", "title": "p", "elements": []}
            ]
        }));
        let Chart::Super(chart) = Chart::decode(&data).unwrap() else {
            panic!("expected superchart");
        };
        assert_eq!(chart.elements.len(), 2);
        assert!(matches!(chart.elements[0], Chart::Line(_)));
        assert!(matches!(chart.elements[1], Chart::Pie(_)));
    }

    #[test]
    fn unknown_type_keeps_raw_mapping() {
        let data = map(json!({"type": "heatmap", "title": "h", "cells": [[1, 2]]}));
        let chart = Chart::decode(&data).unwrap();
        assert!(matches!(chart, Chart::Unknown(_)));
        assert_eq!(chart.to_map(), &data);
        assert_eq!(chart.title(), "h");
    }

    #[test]
    fn missing_type_fails() {
        assert!(Chart::decode(&map(json!({"title": "t"}))).is_none());
    }

    #[test]
    fn round_trip_preserves_mapping_for_every_known_type() {
        for type_name in ["line", "scatter", "bar", "pie", "box_and_whisker", "superchart"] {
            let data = map(json!({"type": type_name, "title": "t", "elements": []}));
            let chart = Chart::decode(&data).unwrap();
            assert_eq!(
                serde_json::to_value(chart.to_map()).unwrap(),
                serde_json::to_value(&data).unwrap(),
                "mapping changed for {type_name}"
            );
        }
    }
}
