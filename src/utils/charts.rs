//! SVG charts for a finished run
//!
//! Loss and accuracy curves per epoch and the per-class error bar chart,
//! written as standalone SVG files.

use std::fmt::Write as _;
use std::path::Path;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const LEFT: f64 = 80.0;
const RIGHT: f64 = 40.0;
const TOP: f64 = 60.0;
const BOTTOM: f64 = 80.0;
const FONT: &str = "Arial, sans-serif";

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#2ecc71";
pub const COLOR_TERTIARY: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_INK: &str = "#2c3e50";

/// One named line, x is the 1-based epoch
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>,
    pub color: String,
}

impl DataSeries {
    pub fn from_epochs(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| ((i + 1) as f64, y))
                .collect(),
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YAxis {
    /// 0 to at least 100, ticks with a percent sign
    Percent,
    /// 0 to 110% of the largest value
    Linear,
}

#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    /// Percentage
    pub value: f64,
    pub color: String,
}

/// Plot area of a fixed-size chart plus the SVG text written so far
struct Canvas {
    svg: String,
    y_max: f64,
}

impl Canvas {
    fn new(title: &str, y_max: f64) -> Self {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="white"/>"#,
            w = WIDTH,
            h = HEIGHT
        );
        let mut canvas = Self { svg, y_max };
        canvas.text(WIDTH / 2.0, 35.0, 18, "middle", title, true);
        canvas
    }

    fn plot_width() -> f64 {
        WIDTH - LEFT - RIGHT
    }

    fn plot_height() -> f64 {
        HEIGHT - TOP - BOTTOM
    }

    fn baseline() -> f64 {
        TOP + Self::plot_height()
    }

    fn y(&self, value: f64) -> f64 {
        Self::baseline() - (value / self.y_max) * Self::plot_height()
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: u32) {
        let _ = write!(
            self.svg,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{}"/>"#,
            x1, y1, x2, y2, color, width
        );
    }

    fn text(&mut self, x: f64, y: f64, size: u32, anchor: &str, content: &str, bold: bool) {
        let weight = if bold { r#" font-weight="bold""# } else { "" };
        let _ = write!(
            self.svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="{}" font-family="{}" font-size="{}"{} fill="{}">{}</text>"#,
            x,
            y,
            anchor,
            FONT,
            size,
            weight,
            COLOR_INK,
            escape_xml(content)
        );
    }

    /// Horizontal grid with five steps and tick labels on the left
    fn grid(&mut self, axis: YAxis) {
        for step in 0..=5 {
            let value = self.y_max * step as f64 / 5.0;
            let y = self.y(value);
            self.line(LEFT, y, LEFT + Self::plot_width(), y, COLOR_GRID, 1);
            let tick = match axis {
                YAxis::Percent => format!("{:.0}%", value),
                YAxis::Linear => format!("{:.2}", value),
            };
            self.text(LEFT - 10.0, y + 4.0, 12, "end", &tick, false);
        }
    }

    fn y_label(&mut self, label: &str) {
        let _ = write!(
            self.svg,
            r#"<text x="20" y="{c}" text-anchor="middle" font-family="{}" font-size="14" fill="{}" transform="rotate(-90 20 {c})">{}</text>"#,
            FONT,
            COLOR_INK,
            escape_xml(label),
            c = HEIGHT / 2.0
        );
    }

    fn finish(mut self, path: &Path) -> std::io::Result<()> {
        self.svg.push_str("</svg>");
        std::fs::write(path, self.svg)
    }
}

/// Line chart with one polyline per series and a legend in the top right
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    axis: YAxis,
    path: &Path,
) -> std::io::Result<()> {
    let points = series.iter().flat_map(|s| s.points.iter());
    let (x_min, x_max, data_max) = points.fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0_f64),
        |(lo, hi, top), &(x, y)| (lo.min(x), hi.max(x), top.max(y)),
    );
    let (x_min, x_span) = if x_min.is_finite() && x_max > x_min {
        (x_min, x_max - x_min)
    } else {
        (x_min.min(1.0), 1.0)
    };

    let y_max = match axis {
        YAxis::Percent => data_max.max(100.0),
        YAxis::Linear if data_max > 0.0 => data_max * 1.1,
        YAxis::Linear => 1.0,
    };
    let to_x = |x: f64| LEFT + (x - x_min) / x_span * Canvas::plot_width();

    let mut canvas = Canvas::new(title, y_max);
    canvas.grid(axis);
    canvas.line(LEFT, Canvas::baseline(), LEFT + Canvas::plot_width(), Canvas::baseline(), COLOR_INK, 2);
    canvas.line(LEFT, TOP, LEFT, Canvas::baseline(), COLOR_INK, 2);
    canvas.text(LEFT + Canvas::plot_width() / 2.0, HEIGHT - 20.0, 14, "middle", x_label, false);
    canvas.y_label(y_label);

    for s in series.iter().filter(|s| !s.points.is_empty()) {
        let d: Vec<String> = s
            .points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| format!("{}{:.2} {:.2}", if i == 0 { "M" } else { "L" }, to_x(x), canvas.y(y)))
            .collect();
        let _ = write!(
            canvas.svg,
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            d.join(" "),
            s.color
        );
    }

    if let Some(first) = series.first() {
        let stride = (first.points.len() / 10).max(1);
        for &(x, _) in first.points.iter().step_by(stride) {
            canvas.text(to_x(x), Canvas::baseline() + 20.0, 11, "middle", &format!("{:.0}", x), false);
        }
    }

    for (i, s) in series.iter().enumerate() {
        let y = TOP + 10.0 + i as f64 * 25.0;
        let _ = write!(
            canvas.svg,
            r#"<rect x="{:.2}" y="{:.2}" width="15" height="15" fill="{}"/>"#,
            WIDTH - RIGHT - 140.0,
            y,
            s.color
        );
        canvas.text(WIDTH - RIGHT - 120.0, y + 12.0, 12, "start", &s.name, false);
    }

    canvas.finish(path)
}

/// Bar chart of percentages, each bar labelled with its value
pub fn generate_bar_chart(title: &str, y_label: &str, bars: &[BarData], path: &Path) -> std::io::Result<()> {
    let y_max = bars.iter().map(|b| b.value).fold(100.0_f64, f64::max);
    let slot = Canvas::plot_width() / bars.len().max(1) as f64;
    let bar_width = slot * 0.7;

    let mut canvas = Canvas::new(title, y_max);
    canvas.grid(YAxis::Percent);
    canvas.line(LEFT, Canvas::baseline(), LEFT + Canvas::plot_width(), Canvas::baseline(), COLOR_INK, 2);
    canvas.y_label(y_label);

    for (i, bar) in bars.iter().enumerate() {
        let x = LEFT + i as f64 * slot + (slot - bar_width) / 2.0;
        let top = canvas.y(bar.value.max(0.0));
        let _ = write!(
            canvas.svg,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" rx="4"/>"#,
            x,
            top,
            bar_width,
            Canvas::baseline() - top,
            bar.color
        );
        let center = x + bar_width / 2.0;
        canvas.text(center, top - 8.0, 12, "middle", &format!("{:.1}%", bar.value), true);
        canvas.text(center, Canvas::baseline() + 25.0, 11, "middle", &bar.label, false);
    }

    canvas.finish(path)
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
