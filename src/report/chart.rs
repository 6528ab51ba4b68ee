//! Scatter chart of the two selected features, rendered as inline SVG.

use crate::detect::Label;
use crate::pipeline::ScoredDataset;
use askama::Template;

pub const NORMAL_COLOR: &str = "#00CC96";
pub const SUSPICIOUS_COLOR: &str = "#EF553B";

const WIDTH: f64 = 900.0;
const HEIGHT: f64 = 540.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 150.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 60.0;
const MARKER_RADIUS: f64 = 5.0;
const TARGET_TICKS: f64 = 6.0;
const MAX_TICKS: usize = 50;
/// Ranges narrower than this fraction of the values' magnitude are drawn as
/// a single value.
const DEGENERATE_TOLERANCE: f64 = 1e-9;

/// One marker on the chart.
#[derive(Debug, Clone)]
pub struct ChartPoint {
    pub cx: f64,
    pub cy: f64,
    pub status: Label,
    pub color: &'static str,
    /// SVG path for diamond markers; empty for circles.
    pub diamond: String,
    /// Hover text listing every column of the row.
    pub tooltip: String,
}

/// An axis tick: pixel position and label.
#[derive(Debug, Clone)]
pub struct Tick {
    pub pos: f64,
    pub label: String,
}

#[derive(Debug, Clone, Template)]
#[template(path = "chart.svg", escape = "html")]
pub struct ScatterChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: f64,
    pub height: f64,
    pub plot_left: f64,
    pub plot_right: f64,
    pub plot_top: f64,
    pub plot_bottom: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    /// Baseline of the x tick labels.
    pub x_tick_label_y: f64,
    /// Right edge of the y tick labels.
    pub y_tick_label_x: f64,
    pub x_title_x: f64,
    pub x_title_y: f64,
    pub y_title_y: f64,
    pub legend_x: f64,
    pub legend_y: f64,
    pub x_ticks: Vec<Tick>,
    pub y_ticks: Vec<Tick>,
    pub points: Vec<ChartPoint>,
    pub normal_color: &'static str,
    pub suspicious_color: &'static str,
}

/// Linear map from a data range onto a pixel range.
#[derive(Debug, Clone, Copy)]
struct Scale {
    lo: f64,
    hi: f64,
    px_lo: f64,
    px_hi: f64,
}

impl Scale {
    /// Pad the data range by 5% on each side. A range that is tiny relative
    /// to its magnitude is widened so the values land in the middle of the
    /// axis.
    fn new(values: impl Iterator<Item = f64>, px_lo: f64, px_hi: f64) -> Self {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !min.is_finite() || !max.is_finite() {
            return Self { lo: 0.0, hi: 1.0, px_lo, px_hi };
        }
        // Half-widths keep the arithmetic finite near f64::MAX.
        let half_span = max / 2.0 - min / 2.0;
        let magnitude = min.abs().max(max.abs()).max(1.0);
        let pad = if half_span <= DEGENERATE_TOLERANCE * magnitude / 2.0 {
            if min == 0.0 {
                1.0
            } else {
                min.abs() * 0.1
            }
        } else {
            half_span * 0.1
        };
        Self {
            lo: (min - pad).max(f64::MIN),
            hi: (max + pad).min(f64::MAX),
            px_lo,
            px_hi,
        }
    }

    fn map(&self, v: f64) -> f64 {
        let frac = (v / 2.0 - self.lo / 2.0) / (self.hi / 2.0 - self.lo / 2.0);
        self.px_lo + frac * (self.px_hi - self.px_lo)
    }

    fn ticks(&self) -> Vec<Tick> {
        let step = nice_step((self.hi / 2.0 - self.lo / 2.0) / TARGET_TICKS * 2.0);
        let first = (self.lo / step).ceil();
        let last = (self.hi / step).floor();
        if !first.is_finite() || !last.is_finite() || last < first {
            return Vec::new();
        }
        let count = ((last - first) as usize + 1).min(MAX_TICKS);
        (0..count)
            .map(|i| {
                let k = first + i as f64;
                // Avoid printing "-0".
                let v = if k == 0.0 { 0.0 } else { k * step };
                Tick {
                    pos: self.map(v),
                    label: tick_label(v, step),
                }
            })
            .collect()
    }
}

fn tick_label(v: f64, step: f64) -> String {
    if step >= 1e6 {
        format!("{:e}", v)
    } else if step >= 1.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.*}", (-step.log10().floor()) as usize, v)
    }
}

/// Round a raw step up to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let residual = raw / magnitude;
    let nice = if residual <= 1.0 {
        1.0
    } else if residual <= 2.0 {
        2.0
    } else if residual <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn diamond_path(cx: f64, cy: f64) -> String {
    let r = MARKER_RADIUS * 1.4;
    format!(
        "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} Z",
        cx,
        cy - r,
        cx + r,
        cy,
        cx,
        cy + r,
        cx - r,
        cy
    )
}

impl ScatterChart {
    /// Lay out every row of a scored dataset as a marker.
    pub fn build(scored: &ScoredDataset) -> Self {
        let params = scored.params();
        let dataset = scored.dataset();
        let columns = scored.scored_columns();
        let x_idx = dataset.column_index(&params.feature_x);
        let y_idx = dataset.column_index(&params.feature_y);

        let coords: Vec<(f64, f64)> = dataset
            .rows()
            .iter()
            .map(|row| {
                let x = x_idx.and_then(|i| row[i].as_f64()).unwrap_or(f64::NAN);
                let y = y_idx.and_then(|i| row[i].as_f64()).unwrap_or(f64::NAN);
                (x, y)
            })
            .collect();

        let plot_left = MARGIN_LEFT;
        let plot_right = WIDTH - MARGIN_RIGHT;
        let plot_top = MARGIN_TOP;
        let plot_bottom = HEIGHT - MARGIN_BOTTOM;
        let x_scale = Scale::new(coords.iter().map(|c| c.0).filter(|v| v.is_finite()), plot_left, plot_right);
        let y_scale = Scale::new(coords.iter().map(|c| c.1).filter(|v| v.is_finite()), plot_bottom, plot_top);

        let mut points: Vec<ChartPoint> = coords
            .iter()
            .zip(scored.labels())
            .enumerate()
            .filter(|(_, ((x, y), _))| x.is_finite() && y.is_finite())
            .map(|(idx, (&(x, y), status))| {
                let cx = x_scale.map(x);
                let cy = y_scale.map(y);
                let cells = scored.scored_row(idx);
                let tooltip = columns
                    .iter()
                    .zip(cells.iter())
                    .map(|(c, v)| format!("{}: {}", c, v))
                    .collect::<Vec<_>>()
                    .join("\n");
                let (color, diamond) = match status {
                    Label::Normal => (NORMAL_COLOR, String::new()),
                    Label::Suspicious => (SUSPICIOUS_COLOR, diamond_path(cx, cy)),
                };
                ChartPoint {
                    cx,
                    cy,
                    status,
                    color,
                    diamond,
                    tooltip,
                }
            })
            .collect();
        // Suspicious markers are drawn last so they stay on top.
        points.sort_by_key(|p| p.status == Label::Suspicious);

        Self {
            title: format!("Anomaly Detection: {} vs {}", params.feature_x, params.feature_y),
            x_label: params.feature_x.clone(),
            y_label: params.feature_y.clone(),
            width: WIDTH,
            height: HEIGHT,
            plot_left,
            plot_right,
            plot_top,
            plot_bottom,
            plot_width: plot_right - plot_left,
            plot_height: plot_bottom - plot_top,
            x_tick_label_y: plot_bottom + 18.0,
            y_tick_label_x: plot_left - 8.0,
            x_title_x: (plot_left + plot_right) / 2.0,
            x_title_y: HEIGHT - 16.0,
            y_title_y: (plot_top + plot_bottom) / 2.0,
            legend_x: plot_right + 20.0,
            legend_y: plot_top + 10.0,
            x_ticks: x_scale.ticks(),
            y_ticks: y_scale.ticks(),
            points,
            normal_color: NORMAL_COLOR,
            suspicious_color: SUSPICIOUS_COLOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::IsolationForest;
    use crate::pipeline::{run, ParamRequest, RunResult};

    fn scored(csv: &[u8], x: &str, y: &str) -> ScoredDataset {
        let req = ParamRequest {
            feature_x: Some(x.into()),
            feature_y: Some(y.into()),
            contamination: Some(0.1),
        };
        match run(csv, &req, &IsolationForest::new()).unwrap() {
            RunResult::Scored(s) => s,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    const CSV: &[u8] = b"a,b,tag\n1,2,x\n2,3,y\n3,1,z\n2,2,w\n1,3,v\n3,3,u\n2,1,t\n1,1,s\n3,2,r\n40,-30,q\n";

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.3), 0.5);
        assert_eq!(nice_step(1.0), 1.0);
        assert_eq!(nice_step(13.0), 20.0);
        assert_eq!(nice_step(0.0), 1.0);
    }

    #[test]
    fn test_points_stay_inside_plot() {
        let chart = ScatterChart::build(&scored(CSV, "a", "b"));
        assert_eq!(chart.points.len(), 10);
        for p in &chart.points {
            assert!(p.cx >= chart.plot_left && p.cx <= chart.plot_right);
            assert!(p.cy >= chart.plot_top && p.cy <= chart.plot_bottom);
        }
        assert_eq!(chart.title, "Anomaly Detection: a vs b");
        assert!(!chart.x_ticks.is_empty());
    }

    #[test]
    fn test_suspicious_points_are_diamonds_on_top() {
        let chart = ScatterChart::build(&scored(CSV, "a", "b"));
        let last = chart.points.last().unwrap();
        assert_eq!(last.status, Label::Suspicious);
        assert_eq!(last.color, SUSPICIOUS_COLOR);
        assert!(!last.diamond.is_empty());
        assert!(last.tooltip.contains("tag: q"));
        assert!(last.tooltip.contains("Status: Suspicious"));
    }

    #[test]
    fn test_same_feature_on_both_axes_renders() {
        let chart = ScatterChart::build(&scored(CSV, "a", "a"));
        let svg = chart.render().unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Anomaly Detection: a vs a"));
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_tooltips_are_escaped() {
        let csv = b"a,b,note\n1,1,<b>x</b>\n2,2,ok\n3,3,ok\n";
        let svg = ScatterChart::build(&scored(csv, "a", "b")).render().unwrap();
        assert!(svg.contains("&lt;b&gt;x"));
        assert!(!svg.contains("<b>x</b>"));
    }

    fn assert_sane_axes(chart: &ScatterChart) {
        for ticks in [&chart.x_ticks, &chart.y_ticks] {
            assert!(!ticks.is_empty() && ticks.len() <= MAX_TICKS);
            assert!(ticks.iter().all(|t| t.pos.is_finite()));
        }
        for p in &chart.points {
            assert!(p.cx >= chart.plot_left && p.cx <= chart.plot_right);
            assert!(p.cy >= chart.plot_top && p.cy <= chart.plot_bottom);
        }
    }

    #[test]
    fn test_near_equal_large_values_render() {
        let mut csv = String::from("x,y\n");
        for i in 0..20 {
            let x = if i % 2 == 0 { "1000000" } else { "1000000.0000000002" };
            csv.push_str(&format!("{},{}\n", x, i));
        }
        let chart = ScatterChart::build(&scored(csv.as_bytes(), "x", "y"));
        assert_eq!(chart.points.len(), 20);
        assert_sane_axes(&chart);
        assert!(!chart.render().unwrap().contains("NaN"));
    }

    #[test]
    fn test_extreme_magnitudes_render() {
        let mut csv = String::from("x,y\n");
        for i in 0..20 {
            csv.push_str(&format!("{},{}\n", i, i % 4));
        }
        csv.push_str("-1e308,1\n1e308,1\n");
        let chart = ScatterChart::build(&scored(csv.as_bytes(), "x", "y"));
        assert_eq!(chart.points.len(), 22);
        assert_sane_axes(&chart);
        let svg = chart.render().unwrap();
        assert!(!svg.contains("NaN") && !svg.contains("inf"));
    }

    #[test]
    fn test_ticks_cover_range() {
        let scale = Scale::new([0.0, 10.0].into_iter(), 0.0, 100.0);
        let ticks = scale.ticks();
        let labels: Vec<&str> = ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "2", "4", "6", "8", "10"]);
        assert!((scale.map(0.0) - 100.0 * 0.5 / 11.0).abs() < 1e-9);
    }
}
