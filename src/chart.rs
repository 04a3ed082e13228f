//! Time series rendering.

use chrono::NaiveDate;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const WIDTH: u32 = 960;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: f64 = 40.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 30.0;
const X_TICKS: usize = 6;
const Y_TICKS: usize = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0x44, 0x44, 0x44]);
const GRID: Rgb<u8> = Rgb([0xe0, 0xe0, 0xe0]);
const PALETTE: [Rgb<u8>; 4] = [
    Rgb([0xf2, 0xb7, 0x05]),
    Rgb([0x2f, 0x66, 0x90]),
    Rgb([0xd9, 0x48, 0x0f]),
    Rgb([0x2b, 0x8a, 0x3e]),
];
/// Emoji closest to each palette color, for legends written as text.
const SWATCHES: [&str; 4] = ["🟨", "🟦", "🟧", "🟩"];

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartMeta {
    pub title: String,
    pub y_label: String,
}

/// Turns time series into an image file.
pub trait ChartRenderer: Send + Sync {
    /// File extension of the produced image.
    fn extension(&self) -> &'static str;

    fn render(&self, series: &[Series]) -> anyhow::Result<Vec<u8>>;
}

/// Line chart as a PNG, which Discord previews inline.
///
/// The image only holds the plot. Title, legend and scales go in
/// [`caption`], sent alongside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngChart;

impl ChartRenderer for PngChart {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn render(&self, series: &[Series]) -> anyhow::Result<Vec<u8>> {
        let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
        let bounds = Bounds::of(series);

        if let Some(bounds) = &bounds {
            draw_grid(&mut img, bounds);
        }
        let (left, bottom) = (MARGIN_LEFT, HEIGHT as f64 - MARGIN_BOTTOM);
        line(&mut img, (left, MARGIN_TOP), (left, bottom), AXIS);
        line(&mut img, (left, bottom), (WIDTH as f64 - MARGIN_RIGHT, bottom), AXIS);

        if let Some(bounds) = &bounds {
            for (i, s) in series.iter().enumerate() {
                let color = PALETTE[i % PALETTE.len()];
                let points: Vec<(f64, f64)> = s
                    .points
                    .iter()
                    .map(|(d, v)| (bounds.x(*d), bounds.y(*v)))
                    .collect();
                match points.as_slice() {
                    [only] => dot(&mut img, *only, color),
                    _ => {
                        for pair in points.windows(2) {
                            thick_line(&mut img, pair[0], pair[1], color);
                        }
                    }
                }
            }
        }

        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Text sent with a chart: title, legend and the scales of both axes.
pub fn caption(series: &[Series], meta: &ChartMeta) -> String {
    let mut lines = vec![format!("📈 **{}**", meta.title)];
    let Some(bounds) = Bounds::of(series) else {
        lines.push("No data".to_string());
        return lines.join("\n");
    };
    if series.len() > 1 {
        for (i, s) in series.iter().enumerate() {
            lines.push(format!("{} {}", SWATCHES[i % SWATCHES.len()], s.label));
        }
    }
    lines.push(format!(
        "{}: 0 to {} | {} to {}",
        meta.y_label,
        format_value(bounds.max),
        bounds.start.format("%Y-%m-%d"),
        bounds.end.format("%Y-%m-%d")
    ));
    lines.join("\n")
}

struct Bounds {
    start: NaiveDate,
    end: NaiveDate,
    days: f64,
    max: f64,
}

impl Bounds {
    fn of(series: &[Series]) -> Option<Self> {
        let mut points = series.iter().flat_map(|s| s.points.iter());
        let first = points.next()?;
        let (mut start, mut end, mut max) = (first.0, first.0, first.1);
        for (d, v) in points {
            start = start.min(*d);
            end = end.max(*d);
            max = max.max(*v);
        }
        Some(Self {
            start,
            end,
            days: ((end - start).num_days().max(1)) as f64,
            max: if max > 0.0 { max } else { 1.0 },
        })
    }

    fn x(&self, date: NaiveDate) -> f64 {
        let plot = WIDTH as f64 - MARGIN_LEFT - MARGIN_RIGHT;
        MARGIN_LEFT + plot * (date - self.start).num_days() as f64 / self.days
    }

    fn y(&self, value: f64) -> f64 {
        let plot = HEIGHT as f64 - MARGIN_TOP - MARGIN_BOTTOM;
        HEIGHT as f64 - MARGIN_BOTTOM - plot * value / self.max
    }
}

fn draw_grid(img: &mut RgbImage, bounds: &Bounds) {
    let right = WIDTH as f64 - MARGIN_RIGHT;
    let bottom = HEIGHT as f64 - MARGIN_BOTTOM;
    for i in 1..=Y_TICKS {
        let y = bounds.y(bounds.max * i as f64 / Y_TICKS as f64);
        line(img, (MARGIN_LEFT, y), (right, y), GRID);
    }
    for i in 0..=X_TICKS {
        let offset = (bounds.days * i as f64 / X_TICKS as f64).round() as i64;
        let x = bounds.x(bounds.start + chrono::Duration::days(offset));
        line(img, (x, bottom), (x, bottom + 6.0), AXIS);
    }
}

fn put(img: &mut RgbImage, x: f64, y: f64, color: Rgb<u8>) {
    let (x, y) = (x.round(), y.round());
    if x >= 0.0 && y >= 0.0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn line(img: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0);
    for i in 0..=steps as u32 {
        let t = i as f64 / steps;
        put(img, from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t, color);
    }
}

fn thick_line(img: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    line(img, from, to, color);
    line(img, (from.0, from.1 + 1.0), (to.0, to.1 + 1.0), color);
}

fn dot(img: &mut RgbImage, at: (f64, f64), color: Rgb<u8>) {
    for dx in -2..=2 {
        for dy in -2..=2 {
            put(img, at.0 + dx as f64, at.1 + dy as f64, color);
        }
    }
}

fn format_value(value: f64) -> String {
    if value != 0.0 && value.abs() < 0.01 {
        format!("{:.1e}", value)
    } else {
        format!("{:.2}", value)
    }
}
