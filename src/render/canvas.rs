//! Rasterizes a [`Figure`] into a packed RGB buffer.
//!
//! Data artists are drawn through a plotters chart in data coordinates, so
//! the chart's plotting area bounds them; frame, legend and pie go straight
//! to the root area in pixels. All text is queued as [`TextItem`]s and
//! stamped with the bitmap font once plotters has released the buffer.

use std::f64::consts::PI;

use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::data::float::FloatPrettyPrinter;
use plotters::element::DashedPathElement;
use plotters::prelude::{
    BitMapBackend, Cartesian2d, ChartBuilder, ChartContext, Circle, Color, DrawingArea,
    EmptyElement, IntoDrawingArea, PathElement, Polygon, RGBAColor, RGBColor, Ranged, Rectangle,
    WHITE,
};

use super::figure::{Artist, Axes, COLOR_CYCLE, Figure, LineStyle, Marker, Rgb};
use super::text::{Anchor, GLYPH, Raster, TextItem, text_width, truncate};
use crate::error::RenderError;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type Point = (f64, f64);

const GRID: Rgb = Rgb(176, 176, 176);
const FRAME: Rgb = Rgb(0, 0, 0);
const LEGEND_EDGE: Rgb = Rgb(204, 204, 204);
/// matplotlib's default marker size for `plot`, in points.
const LINE_MARKER_PT: f64 = 6.0;
/// Fraction of the data span added on each side of the view.
const VIEW_MARGIN: f64 = 0.05;

fn drawn<T, E: std::fmt::Debug>(result: Result<T, E>) -> Result<(), RenderError> {
    result.map(|_| ()).map_err(|e| RenderError::Draw(format!("{:?}", e)))
}

fn color(c: Rgb) -> RGBColor {
    RGBColor(c.0, c.1, c.2)
}

fn pixel(p: Point) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

/// Visible data rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

impl View {
    fn contains(&self, (x, y): Point) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// True when every point lies past the same edge.
    fn excludes(&self, points: &[Point]) -> bool {
        !points.is_empty()
            && (points.iter().all(|p| p.0 < self.x0)
                || points.iter().all(|p| p.0 > self.x1)
                || points.iter().all(|p| p.1 < self.y0)
                || points.iter().all(|p| p.1 > self.y1))
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    lo: f64,
    hi: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            lo: f64::INFINITY,
            hi: f64::NEG_INFINITY,
        }
    }
}

impl Extent {
    fn include(&mut self, v: f64) {
        if v.is_finite() {
            self.lo = self.lo.min(v);
            self.hi = self.hi.max(v);
        }
    }

    /// Padded range; bars resting on zero keep zero as a hard edge.
    fn padded(self, sticky_zero: bool) -> (f64, f64) {
        if self.lo > self.hi {
            return (0.0, 1.0);
        }
        if self.lo == self.hi {
            let d = if self.lo == 0.0 { 0.5 } else { self.lo.abs() * VIEW_MARGIN };
            return (self.lo - d, self.hi + d);
        }
        let m = (self.hi - self.lo) * VIEW_MARGIN;
        let lo = if sticky_zero && self.lo == 0.0 { 0.0 } else { self.lo - m };
        let hi = if sticky_zero && self.hi == 0.0 { 0.0 } else { self.hi + m };
        (lo, hi)
    }
}

fn limited((lo, hi): (f64, f64), limits: Option<(f64, f64)>) -> (f64, f64) {
    let (mut lo, mut hi) = match limits {
        Some((a, b)) => (if a.is_finite() { a } else { lo }, if b.is_finite() { b } else { hi }),
        None => (lo, hi),
    };
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    (lo, hi)
}

/// Data view covering every artist, then the explicit limits.
pub fn data_view(axes: &Axes) -> View {
    let (mut xs, mut ys) = (Extent::default(), Extent::default());
    let (mut sticky_x, mut sticky_y) = (false, false);
    for artist in &axes.artists {
        match artist {
            Artist::Line { xs: ax, ys: ay, .. } | Artist::Scatter { xs: ax, ys: ay, .. } => {
                for (x, y) in ax.iter().zip(ay) {
                    if x.is_finite() && y.is_finite() {
                        xs.include(*x);
                        ys.include(*y);
                    }
                }
            }
            Artist::Bars {
                positions,
                lengths,
                bases,
                thickness,
                horizontal,
                ..
            } => {
                let (along, across) = if *horizontal { (&mut ys, &mut xs) } else { (&mut xs, &mut ys) };
                for ((p, l), b) in positions.iter().zip(lengths).zip(bases) {
                    if !(p.is_finite() && l.is_finite() && b.is_finite()) {
                        continue;
                    }
                    along.include(p - thickness / 2.0);
                    along.include(p + thickness / 2.0);
                    across.include(*b);
                    across.include(b + l);
                }
                if bases.iter().any(|b| *b == 0.0) {
                    if *horizontal {
                        sticky_x = true;
                    } else {
                        sticky_y = true;
                    }
                }
            }
            Artist::Area { xs: ax, upper, lower, .. } => {
                ax.iter().for_each(|x| xs.include(*x));
                upper.iter().chain(lower).for_each(|y| ys.include(*y));
            }
            Artist::HLine { y, .. } => ys.include(*y),
            Artist::VLine { x, .. } => xs.include(*x),
            Artist::Text { x, y, .. } => {
                xs.include(*x);
                ys.include(*y);
            }
            Artist::Pie { .. } => {}
        }
    }
    let (x0, x1) = limited(xs.padded(sticky_x), axes.xlim);
    let (y0, y1) = limited(ys.padded(sticky_y), axes.ylim);
    View { x0, x1, y0, y1 }
}

fn axis_ticks(
    lo: f64,
    hi: f64,
    explicit: Option<&Vec<(f64, String)>>,
    categories: &[String],
    target: usize,
) -> Vec<(f64, String)> {
    let within = |p: f64| p >= lo - 1e-9 && p <= hi + 1e-9;
    if let Some(ticks) = explicit {
        return ticks.iter().filter(|(p, _)| within(*p)).cloned().collect();
    }
    if !categories.is_empty() {
        return categories
            .iter()
            .enumerate()
            .map(|(i, label)| (i as f64, label.clone()))
            .filter(|(p, _)| within(*p))
            .collect();
    }
    key_ticks(lo, hi, target)
}

/// At most `target` round ticks, placed by plotters' f64 axis.
fn key_ticks(lo: f64, hi: f64, target: usize) -> Vec<(f64, String)> {
    if !(hi > lo && (hi - lo).is_finite()) {
        return Vec::new();
    }
    let printer = FloatPrettyPrinter {
        allow_scientific: true,
        min_decimal: 0,
        max_decimal: 6,
    };
    // Key points can land a rounding error away from zero.
    let tiny = (hi - lo) * 1e-9;
    RangedCoordf64::from(lo..hi)
        .key_points(target)
        .into_iter()
        .map(|v| if v.abs() < tiny { 0.0 } else { v })
        .map(|v| (v, printer.print(v)))
        .collect()
}

/// Finite runs of a polyline, without the segments that sit wholly past one
/// edge of the view. Whatever else strays outside is pinned to the plotting
/// area when plotters maps it.
fn visible_runs(xs: &[f64], ys: &[f64], view: &View) -> Vec<Vec<Point>> {
    let mut runs = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let points: Vec<Point> = xs.iter().copied().zip(ys.iter().copied()).collect();
    for pair in points.windows(2) {
        let finite = pair.iter().all(|p| p.0.is_finite() && p.1.is_finite());
        if !finite || view.excludes(pair) {
            if current.len() >= 2 {
                runs.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }
        if current.is_empty() {
            current.push(pair[0]);
        }
        current.push(pair[1]);
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// Pixel sizes derived from the figure's dpi and the raster it was fit into.
struct Scale {
    px_per_pt: f64,
    text: i32,
    show_text: bool,
}

impl Scale {
    fn new(figure: &Figure, width: u32, height: u32) -> Self {
        let nominal = (figure.width_in * figure.dpi).max(1.0);
        let fit = width as f64 / nominal;
        Self {
            px_per_pt: figure.dpi / 72.0 * fit,
            text: ((height as f64 / 300.0).round() as i32).clamp(1, 3),
            show_text: width >= 120 && height >= 90,
        }
    }

    fn pt(&self, points: f64) -> f64 {
        points * self.px_per_pt
    }

    fn stroke(&self, points: f64) -> u32 {
        self.pt(points).round().max(1.0) as u32
    }

    fn title(&self) -> i32 {
        self.text + 1
    }

    fn pad(&self) -> i32 {
        5 * self.text
    }

    fn tick_len(&self) -> i32 {
        4 * self.text
    }
}

struct Layout {
    top: i32,
    bottom: i32,
    left: i32,
    right: i32,
}

impl Layout {
    fn new(figure: &Figure, y_ticks: &[(f64, String)], width: u32, height: u32, scale: &Scale) -> Self {
        let axes = &figure.axes;
        if !scale.show_text {
            return Self { top: 2, bottom: 2, left: 2, right: 2 };
        }
        let pad = scale.pad();
        let title_h = GLYPH * scale.title();
        let label_h = GLYPH * scale.text;
        let mut top = pad * 2;
        if figure.suptitle.is_some() {
            top += title_h + pad;
        }
        if axes.title.is_some() {
            top += title_h + pad;
        }
        let mut layout = if axes.frameless {
            Self { top, bottom: pad * 2, left: pad * 2, right: pad * 2 }
        } else {
            let widest = y_ticks
                .iter()
                .map(|(_, label)| text_width(&truncate(label, 16), scale.text))
                .max()
                .unwrap_or(0);
            let mut bottom = pad + scale.tick_len() + label_h + pad;
            if axes.xlabel.is_some() {
                bottom += label_h + pad;
            }
            let mut left = pad + widest + scale.tick_len() + pad;
            if axes.ylabel.is_some() {
                left += label_h + pad;
            }
            Self { top, bottom, left, right: pad * 4 }
        };
        // Keep a usable plotting area on small rasters.
        if (width as i32) - layout.left - layout.right < 16 {
            layout.left = 2;
            layout.right = 2;
        }
        if (height as i32) - layout.top - layout.bottom < 16 {
            layout.top = 2;
            layout.bottom = 2;
        }
        layout
    }
}

/// Draw `figure` into `pixels`, a packed RGB buffer of `width × height`.
pub fn rasterize(figure: &Figure, pixels: &mut [u8], width: u32, height: u32) -> Result<(), RenderError> {
    let expected = width as usize * height as usize * 3;
    if pixels.len() != expected {
        return Err(RenderError::Draw(format!(
            "framebuffer holds {} bytes, expected {}",
            pixels.len(),
            expected
        )));
    }
    let scale = Scale::new(figure, width, height);
    let axes = &figure.axes;
    let view = data_view(axes);
    let y_ticks = if axes.frameless {
        Vec::new()
    } else {
        axis_ticks(view.y0, view.y1, axes.yticks.as_ref(), &axes.y_categories, 6)
    };
    let layout = Layout::new(figure, &y_ticks, width, height, &scale);
    let mut labels = Vec::new();

    {
        let root = BitMapBackend::with_buffer(pixels, (width, height)).into_drawing_area();
        drawn(root.fill(&WHITE))?;

        let mut chart = ChartBuilder::on(&root)
            .margin_top(layout.top)
            .margin_bottom(layout.bottom)
            .margin_left(layout.left)
            .margin_right(layout.right)
            .build_cartesian_2d(view.x0..view.x1, view.y0..view.y1)
            .map_err(|e| RenderError::Draw(format!("{:?}", e)))?;
        let (xr, yr) = chart.plotting_area().get_pixel_range();
        let plot = PlotRect {
            left: xr.start,
            right: xr.end - 1,
            top: yr.start,
            bottom: yr.end - 1,
        };

        if axes.frameless {
            for artist in &axes.artists {
                if let Artist::Pie { .. } = artist {
                    draw_pie(&root, artist, &plot, &scale, &mut labels)?;
                }
            }
        } else {
            let x_ticks = axis_ticks(view.x0, view.x1, axes.xticks.as_ref(), &axes.x_categories, 7);
            let x_marks: Vec<(i32, String)> = x_ticks
                .iter()
                .map(|(x, label)| (chart.backend_coord(&(*x, view.y0)).0, label.clone()))
                .collect();
            let y_marks: Vec<(i32, String)> = y_ticks
                .iter()
                .map(|(y, label)| (chart.backend_coord(&(view.x0, *y)).1, label.clone()))
                .collect();
            if axes.grid {
                draw_grid(&mut chart, &view, &x_ticks, &y_ticks)?;
            }
            let mut painter = Painter { chart: &mut chart, view, scale: &scale };
            for artist in &axes.artists {
                painter.artist(artist, &mut labels)?;
            }
            draw_frame(&root, &plot, &x_marks, &y_marks, &scale, &mut labels)?;
            if axes.legend && scale.show_text {
                draw_legend(&root, axes, &plot, &scale, &mut labels)?;
            }
            axis_labels(axes, &plot, &scale, &mut labels);
        }
        titles(figure, &plot, width, &scale, &mut labels);
        drawn(root.present())?;
    }

    if scale.show_text {
        let mut raster = Raster::new(pixels, width, height);
        for item in &labels {
            raster.draw(item);
        }
    }
    Ok(())
}

struct PlotRect {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
}

impl PlotRect {
    fn center_x(&self) -> i32 {
        (self.left + self.right) / 2
    }

    fn center_y(&self) -> i32 {
        (self.top + self.bottom) / 2
    }
}

/// One marker, sized in pixels around a data point.
struct Glyph {
    at: Point,
    radius: f64,
    fill: RGBAColor,
}

struct Painter<'c, 'a, 'b> {
    chart: &'c mut Chart<'a, 'b>,
    view: View,
    scale: &'c Scale,
}

impl Painter<'_, '_, '_> {
    fn artist(&mut self, artist: &Artist, labels: &mut Vec<TextItem>) -> Result<(), RenderError> {
        match artist {
            Artist::Line { xs, ys, color: c, width, style, marker, .. } => {
                let stroke = self.scale.stroke(*width);
                for run in visible_runs(xs, ys, &self.view) {
                    stroke_path(self.chart, run, *c, stroke, *style)?;
                }
                if *marker != Marker::Hidden {
                    let radius = self.scale.pt(LINE_MARKER_PT) / 2.0;
                    let glyphs: Vec<Glyph> = xs
                        .iter()
                        .zip(ys)
                        .map(|(x, y)| (*x, *y))
                        .filter(|p| self.view.contains(*p))
                        .map(|at| Glyph { at, radius, fill: color(*c).mix(1.0) })
                        .collect();
                    draw_markers(self.chart, *marker, &glyphs)?;
                }
            }
            Artist::Scatter { xs, ys, sizes, colors, marker, alpha, .. } => {
                let glyphs: Vec<Glyph> = xs
                    .iter()
                    .zip(ys)
                    .enumerate()
                    .filter(|(_, (x, y))| self.view.contains((**x, **y)))
                    .map(|(i, (x, y))| {
                        let area = pick(sizes, i).unwrap_or(36.0).max(0.0);
                        let c = pick(colors, i).unwrap_or(COLOR_CYCLE[0]);
                        Glyph {
                            at: (*x, *y),
                            radius: self.scale.pt(area.sqrt() / 2.0),
                            fill: color(c).mix(*alpha),
                        }
                    })
                    .collect();
                draw_markers(self.chart, *marker, &glyphs)?;
            }
            Artist::Bars { positions, lengths, bases, thickness, colors, horizontal, alpha, .. } => {
                let view = self.view;
                let bars = positions
                    .iter()
                    .zip(lengths)
                    .zip(bases)
                    .enumerate()
                    .filter(|(_, ((p, l), b))| p.is_finite() && l.is_finite() && b.is_finite())
                    .filter_map(|(i, ((p, l), b))| {
                        let (lo, hi) = (b.min(b + l), b.max(b + l));
                        let (a0, a1) = (p - thickness / 2.0, p + thickness / 2.0);
                        let (x0, x1, y0, y1) = if *horizontal { (lo, hi, a0, a1) } else { (a0, a1, lo, hi) };
                        if view.excludes(&[(x0, y0), (x1, y1)]) {
                            return None;
                        }
                        let c = pick(colors, i).unwrap_or(COLOR_CYCLE[0]);
                        Some(Rectangle::new([(x0, y1), (x1, y0)], color(c).mix(*alpha).filled()))
                    });
                drawn(self.chart.draw_series(bars))?;
            }
            Artist::Area { xs, upper, lower, color: c, alpha, .. } => {
                let outline: Vec<Point> = xs
                    .iter()
                    .zip(upper)
                    .map(|(x, y)| (*x, *y))
                    .chain(xs.iter().zip(lower).rev().map(|(x, y)| (*x, *y)))
                    .filter(|p| p.0.is_finite() && p.1.is_finite())
                    .collect();
                if outline.len() >= 3 && !self.view.excludes(&outline) {
                    let fill = color(*c).mix(*alpha).filled();
                    drawn(self.chart.draw_series(std::iter::once(Polygon::new(outline, fill))))?;
                }
            }
            Artist::HLine { y, color: c, style, width } => {
                if *y >= self.view.y0 && *y <= self.view.y1 {
                    let points = vec![(self.view.x0, *y), (self.view.x1, *y)];
                    stroke_path(self.chart, points, *c, self.scale.stroke(*width), *style)?;
                }
            }
            Artist::VLine { x, color: c, style, width } => {
                if *x >= self.view.x0 && *x <= self.view.x1 {
                    let points = vec![(*x, self.view.y0), (*x, self.view.y1)];
                    stroke_path(self.chart, points, *c, self.scale.stroke(*width), *style)?;
                }
            }
            Artist::Text { x, y, text, color: c } => {
                if self.view.contains((*x, *y)) {
                    let (px, py) = self.chart.backend_coord(&(*x, *y));
                    labels.push(
                        TextItem::new(px, py, text.clone(), self.scale.text)
                            .anchored(Anchor::Start, Anchor::End)
                            .colored(*c),
                    );
                }
            }
            Artist::Pie { .. } => {}
        }
        Ok(())
    }
}

/// Item `i`, or the single shared value.
fn pick<T: Copy>(values: &[T], i: usize) -> Option<T> {
    match values.len() {
        0 => None,
        1 => Some(values[0]),
        n => Some(values[i % n]),
    }
}

/// Dash and gap lengths in pixels. They scale with the line width, as
/// matplotlib's do.
fn dash_lengths(style: LineStyle, width: u32) -> (i32, i32) {
    let (on, off) = match style {
        LineStyle::Dashed => (3.7, 1.6),
        LineStyle::Dotted => (1.0, 1.65),
        // plotters has no dash-dot element; long dashes stand in for it.
        LineStyle::DashDot => (6.4, 2.6),
        LineStyle::Solid | LineStyle::Hidden => (1.0, 0.0),
    };
    let unit = f64::from(width.max(1));
    ((on * unit).round().max(1.0) as i32, (off * unit).round() as i32)
}

fn stroke_path(chart: &mut Chart<'_, '_>, points: Vec<Point>, c: Rgb, width: u32, style: LineStyle) -> Result<(), RenderError> {
    if points.len() < 2 {
        return Ok(());
    }
    let shape = color(c).stroke_width(width);
    match style {
        LineStyle::Hidden => Ok(()),
        LineStyle::Solid => drawn(chart.draw_series(std::iter::once(PathElement::new(points, shape)))),
        LineStyle::Dashed | LineStyle::Dotted | LineStyle::DashDot => {
            let (on, off) = dash_lengths(style, width);
            drawn(chart.draw_series(std::iter::once(DashedPathElement::new(points, on, off, shape))))
        }
    }
}

/// Pixel outline of a filled marker, relative to its center.
fn marker_outline(marker: Marker, r: f64) -> Vec<(i32, i32)> {
    let corners: Vec<Point> = match marker {
        Marker::Square => vec![(-r, -r), (r, -r), (r, r), (-r, r)],
        Marker::Triangle => vec![(0.0, -r), (-r * 0.87, r * 0.5), (r * 0.87, r * 0.5)],
        Marker::TriangleDown => vec![(0.0, r), (-r * 0.87, -r * 0.5), (r * 0.87, -r * 0.5)],
        Marker::Diamond => vec![(0.0, -r), (r * 0.7, 0.0), (0.0, r), (-r * 0.7, 0.0)],
        Marker::Star => (0..10)
            .map(|k| {
                let radius = if k % 2 == 0 { r } else { r * 0.4 };
                let angle = PI / 2.0 + k as f64 * PI / 5.0;
                (radius * angle.cos(), -radius * angle.sin())
            })
            .collect(),
        Marker::Hidden | Marker::Circle | Marker::Point | Marker::Cross | Marker::Plus => Vec::new(),
    };
    corners.into_iter().map(pixel).collect()
}

/// The two strokes of a `x` or `+` marker.
fn marker_arms(marker: Marker, r: f64) -> [Vec<(i32, i32)>; 2] {
    if marker == Marker::Cross {
        let d = r * 0.75;
        [vec![pixel((-d, -d)), pixel((d, d))], vec![pixel((-d, d)), pixel((d, -d))]]
    } else {
        [vec![pixel((-r, 0.0)), pixel((r, 0.0))], vec![pixel((0.0, -r)), pixel((0.0, r))]]
    }
}

fn draw_markers(chart: &mut Chart<'_, '_>, marker: Marker, glyphs: &[Glyph]) -> Result<(), RenderError> {
    match marker {
        Marker::Hidden => Ok(()),
        Marker::Circle | Marker::Point => {
            let shrink = if marker == Marker::Point { 0.5 } else { 1.0 };
            drawn(chart.draw_series(glyphs.iter().map(|g| {
                let r = (g.radius.max(1.0) * shrink).round().max(1.0) as i32;
                Circle::new(g.at, r, g.fill.filled())
            })))
        }
        Marker::Cross | Marker::Plus => drawn(chart.draw_series(glyphs.iter().map(|g| {
            let r = g.radius.max(1.0);
            let style = g.fill.stroke_width((r / 3.0).round().max(1.0) as u32);
            let [first, second] = marker_arms(marker, r);
            EmptyElement::at(g.at) + PathElement::new(first, style) + PathElement::new(second, style)
        }))),
        _ => drawn(chart.draw_series(glyphs.iter().map(|g| {
            EmptyElement::at(g.at) + Polygon::new(marker_outline(marker, g.radius.max(1.0)), g.fill.filled())
        }))),
    }
}

fn draw_grid(
    chart: &mut Chart<'_, '_>,
    view: &View,
    x_ticks: &[(f64, String)],
    y_ticks: &[(f64, String)],
) -> Result<(), RenderError> {
    let style = color(GRID).stroke_width(1);
    let verticals = x_ticks.iter().map(|(x, _)| vec![(*x, view.y0), (*x, view.y1)]);
    let horizontals = y_ticks.iter().map(|(y, _)| vec![(view.x0, *y), (view.x1, *y)]);
    drawn(chart.draw_series(verticals.chain(horizontals).map(|line| PathElement::new(line, style))))
}

fn draw_frame(
    root: &Area<'_>,
    plot: &PlotRect,
    x_marks: &[(i32, String)],
    y_marks: &[(i32, String)],
    scale: &Scale,
    labels: &mut Vec<TextItem>,
) -> Result<(), RenderError> {
    let style = color(FRAME).stroke_width(1);
    drawn(root.draw(&Rectangle::new([(plot.left, plot.top), (plot.right, plot.bottom)], style)))?;

    let tick = scale.tick_len();
    let gap = scale.pad() / 2;
    let mut last_right = i32::MIN;
    for (px, label) in x_marks {
        let px = *px;
        drawn(root.draw(&PathElement::new(vec![(px, plot.bottom), (px, plot.bottom + tick)], style)))?;
        let label = truncate(label, 16);
        let half = text_width(&label, scale.text) / 2;
        // Crowded category labels are thinned rather than overprinted.
        if px - half <= last_right + gap {
            continue;
        }
        last_right = px + half;
        labels.push(
            TextItem::new(px, plot.bottom + tick + gap, label, scale.text).anchored(Anchor::Center, Anchor::Start),
        );
    }
    let mut last_top = i32::MAX;
    for (py, label) in y_marks {
        let py = *py;
        drawn(root.draw(&PathElement::new(vec![(plot.left - tick, py), (plot.left, py)], style)))?;
        let half = GLYPH * scale.text / 2;
        if py + half >= last_top {
            continue;
        }
        last_top = py - half;
        labels.push(
            TextItem::new(plot.left - tick - gap, py, truncate(label, 16), scale.text)
                .anchored(Anchor::End, Anchor::Center),
        );
    }
    Ok(())
}

fn draw_legend(
    root: &Area<'_>,
    axes: &Axes,
    plot: &PlotRect,
    scale: &Scale,
    labels: &mut Vec<TextItem>,
) -> Result<(), RenderError> {
    let entries: Vec<(String, Rgb, bool)> = axes
        .artists
        .iter()
        .filter_map(|a| {
            let label = a.label()?;
            let swatch = a.legend_color()?;
            Some((truncate(label, 24), swatch, matches!(a, Artist::Line { .. })))
        })
        .collect();
    if entries.is_empty() {
        return Ok(());
    }
    let pad = scale.pad();
    let row = GLYPH * scale.text + pad;
    let swatch = GLYPH * scale.text * 2;
    let widest = entries.iter().map(|(l, _, _)| text_width(l, scale.text)).max().unwrap_or(0);
    let width = pad + swatch + pad + widest + pad;
    let height = pad + row * entries.len() as i32;
    let right = plot.right - pad;
    let left = right - width;
    let top = plot.top + pad;
    drawn(root.draw(&Rectangle::new([(left, top), (right, top + height)], WHITE.mix(0.8).filled())))?;
    drawn(root.draw(&Rectangle::new([(left, top), (right, top + height)], color(LEGEND_EDGE).stroke_width(1))))?;

    for (i, (label, c, is_line)) in entries.into_iter().enumerate() {
        let cy = top + pad + row * i as i32 + (row - pad) / 2;
        let x0 = left + pad;
        if is_line {
            let line = PathElement::new(vec![(x0, cy), (x0 + swatch, cy)], color(c).stroke_width(scale.stroke(1.5)));
            drawn(root.draw(&line))?;
        } else {
            let half = GLYPH * scale.text / 2;
            drawn(root.draw(&Rectangle::new([(x0, cy - half), (x0 + swatch, cy + half)], color(c).filled())))?;
        }
        labels.push(TextItem::new(x0 + swatch + pad, cy, label, scale.text).anchored(Anchor::Start, Anchor::Center));
    }
    Ok(())
}

fn draw_pie(
    root: &Area<'_>,
    artist: &Artist,
    plot: &PlotRect,
    scale: &Scale,
    labels: &mut Vec<TextItem>,
) -> Result<(), RenderError> {
    let Artist::Pie { values, labels: names, colors, wedge_text, start_angle } = artist else {
        return Ok(());
    };
    let total: f64 = values.iter().sum();
    if !(total > 0.0) {
        return Ok(());
    }
    let (cx, cy) = (plot.center_x() as f64, plot.center_y() as f64);
    let room = ((plot.right - plot.left).min(plot.bottom - plot.top) as f64) / 2.0;
    let radius = (room * if names.is_empty() { 0.9 } else { 0.75 }).max(1.0);
    let at = |angle: f64, r: f64| (cx + r * angle.cos(), cy - r * angle.sin());

    let mut angle = start_angle.to_radians();
    for (i, value) in values.iter().enumerate() {
        let sweep = value / total * 2.0 * PI;
        if !(sweep > 0.0) {
            continue;
        }
        let steps = ((sweep.to_degrees() / 2.0).ceil() as usize).max(1);
        let mut points = vec![(cx, cy)];
        points.extend((0..=steps).map(|k| at(angle + sweep * k as f64 / steps as f64, radius)));
        let fill = pick(colors, i).unwrap_or(COLOR_CYCLE[i % COLOR_CYCLE.len()]);
        let wedge = Polygon::new(points.into_iter().map(pixel).collect::<Vec<_>>(), color(fill).filled());
        drawn(root.draw(&wedge))?;

        let middle = angle + sweep / 2.0;
        if let Some(name) = names.get(i) {
            let (lx, ly) = pixel(at(middle, radius * 1.1));
            let h = if middle.cos() >= 0.0 { Anchor::Start } else { Anchor::End };
            labels.push(TextItem::new(lx, ly, truncate(name, 20), scale.text).anchored(h, Anchor::Center));
        }
        if let Some(text) = wedge_text.get(i) {
            let (tx, ty) = pixel(at(middle, radius * 0.6));
            labels.push(TextItem::new(tx, ty, text.clone(), scale.text).anchored(Anchor::Center, Anchor::Center));
        }
        angle += sweep;
    }
    Ok(())
}

fn axis_labels(axes: &Axes, plot: &PlotRect, scale: &Scale, labels: &mut Vec<TextItem>) {
    let pad = scale.pad();
    if let Some(xlabel) = &axes.xlabel {
        let y = plot.bottom + scale.tick_len() + GLYPH * scale.text + pad * 2;
        labels.push(TextItem::new(plot.center_x(), y, xlabel.clone(), scale.text).anchored(Anchor::Center, Anchor::Start));
    }
    if let Some(ylabel) = &axes.ylabel {
        labels.push(
            TextItem::new(pad, plot.center_y(), ylabel.clone(), scale.text)
                .anchored(Anchor::Start, Anchor::Center)
                .rotated(),
        );
    }
}

fn titles(figure: &Figure, plot: &PlotRect, width: u32, scale: &Scale, labels: &mut Vec<TextItem>) {
    let size = scale.title();
    let max_chars = (width as i32 / (GLYPH * size)).max(1) as usize;
    let pad = scale.pad();
    if let Some(suptitle) = &figure.suptitle {
        labels.push(
            TextItem::new(width as i32 / 2, pad, truncate(suptitle, max_chars), size).anchored(Anchor::Center, Anchor::Start),
        );
    }
    if let Some(title) = &figure.axes.title {
        labels.push(
            TextItem::new(plot.center_x(), plot.top - pad, truncate(title, max_chars), size)
                .anchored(Anchor::Center, Anchor::End),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::figure::Axes;

    const BLUE: [u8; 3] = [31, 119, 180];

    fn unit() -> View {
        View { x0: 0.0, x1: 1.0, y0: 0.0, y1: 1.0 }
    }

    fn line(xs: Vec<f64>, ys: Vec<f64>) -> Artist {
        Artist::Line {
            xs,
            ys,
            color: COLOR_CYCLE[0],
            width: 1.5,
            style: LineStyle::Solid,
            marker: Marker::Hidden,
            label: None,
        }
    }

    fn render(figure: &Figure) -> (Vec<u8>, u32, u32) {
        let (w, h) = figure.pixel_size(1600, 1200);
        let mut pixels = vec![0u8; (w * h * 3) as usize];
        rasterize(figure, &mut pixels, w, h).unwrap();
        (pixels, w, h)
    }

    fn unit_figure() -> Figure {
        let mut figure = Figure::new();
        figure.width_in = 4.0;
        figure.height_in = 3.0;
        figure.axes.xlim = Some((0.0, 1.0));
        figure.axes.ylim = Some((0.0, 1.0));
        figure
    }

    /// (x, y) of every pixel painted in the first cycle color.
    fn blue_pixels(pixels: &[u8], w: u32) -> Vec<(u32, u32)> {
        pixels
            .chunks(3)
            .enumerate()
            .filter(|(_, px)| *px == BLUE)
            .map(|(i, _)| (i as u32 % w, i as u32 / w))
            .collect()
    }

    #[test]
    fn test_key_ticks_are_round() {
        let ticks = key_ticks(0.0, 10.0, 6);
        let labels: Vec<&str> = ticks.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["0", "2", "4", "6", "8", "10"]);

        let ticks = key_ticks(-0.3, 0.3, 6);
        assert!(ticks.iter().any(|(v, l)| *v == 0.0 && l == "0"));
        assert!(ticks.iter().all(|(_, l)| !l.contains('e')));
        assert!(key_ticks(1.0, 1.0, 5).is_empty());
    }

    #[test]
    fn test_explicit_and_category_ticks_win() {
        let explicit = vec![(0.5, "half".to_string()), (7.0, "far".to_string())];
        let ticks = axis_ticks(0.0, 1.0, Some(&explicit), &[], 6);
        assert_eq!(ticks, vec![(0.5, "half".to_string())]);

        let categories = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ticks = axis_ticks(-0.4, 1.4, None, &categories, 6);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].1, "b");
    }

    #[test]
    fn test_visible_runs_break_at_nan_and_outside() {
        let runs = visible_runs(&[0.1, 0.5, 0.9, f64::NAN, 0.2, 0.3], &[0.1, 0.5, 0.9, 0.0, 0.2, 0.3], &unit());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], vec![(0.1, 0.1), (0.5, 0.5), (0.9, 0.9)]);

        // The middle segment runs entirely above the view.
        let runs = visible_runs(&[0.5, 0.6, 0.7, 0.8], &[0.5, 3.0, 4.0, 0.5], &unit());
        assert_eq!(runs, vec![vec![(0.5, 0.5), (0.6, 3.0)], vec![(0.7, 4.0), (0.8, 0.5)]]);
    }

    #[test]
    fn test_view_excludes_only_one_sided_sets() {
        assert!(unit().excludes(&[(2.0, 0.5), (3.0, 0.1)]));
        assert!(!unit().excludes(&[(-1.0, 0.5), (2.0, 0.5)]));
        assert!(!unit().excludes(&[(0.5, 0.5), (9.0, 9.0)]));
    }

    #[test]
    fn test_view_pads_and_honors_limits() {
        let mut axes = Axes::default();
        axes.artists.push(line(vec![0.0, 10.0], vec![0.0, 100.0]));
        let view = data_view(&axes);
        assert_eq!((view.x0, view.x1), (-0.5, 10.5));
        axes.xlim = Some((2.0, f64::NAN));
        let view = data_view(&axes);
        assert_eq!((view.x0, view.x1), (2.0, 10.5));
    }

    #[test]
    fn test_bars_stick_to_zero() {
        let mut axes = Axes::default();
        axes.artists.push(Artist::Bars {
            positions: vec![0.0, 1.0],
            lengths: vec![5.0, 10.0],
            bases: vec![0.0, 0.0],
            thickness: 0.8,
            colors: vec![COLOR_CYCLE[0]],
            horizontal: false,
            alpha: 1.0,
            label: None,
        });
        let view = data_view(&axes);
        assert_eq!(view.y0, 0.0);
        assert!(view.y1 > 10.0);
    }

    #[test]
    fn test_rasterize_draws_something() {
        let mut figure = Figure::new();
        figure.width_in = 4.0;
        figure.height_in = 3.0;
        figure.axes.title = Some("Sales".to_string());
        figure.push(line(vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 2.0]));
        let (pixels, w, _) = render(&figure);
        assert!(blue_pixels(&pixels, w).len() > 10);
    }

    #[test]
    fn test_lines_stay_inside_the_plot() {
        let mut figure = unit_figure();
        figure.push(line(vec![0.5, 40.0], vec![0.5, 0.5]));
        figure.push(line(vec![-3.0, 3.0], vec![2.0, 2.0]));
        let (pixels, w, h) = render(&figure);

        let scale = Scale::new(&figure, w, h);
        let layout = Layout::new(&figure, &key_ticks(0.0, 1.0, 6), w, h, &scale);
        let blue = blue_pixels(&pixels, w);
        assert!(!blue.is_empty());
        let right_edge = (w as i32 - layout.right) as u32;
        assert!(blue.iter().all(|(x, _)| *x <= right_edge + 2));

        // Only the horizontal line at mid height shows; the one above the
        // view is not smeared along the top edge.
        let mut rows: Vec<u32> = blue.iter().map(|(_, y)| *y).collect();
        rows.sort_unstable();
        rows.dedup();
        assert!(rows.len() <= 4, "rows {:?}", rows);
    }

    #[test]
    fn test_dashed_line_leaves_gaps() {
        let styled = |style: LineStyle| {
            let mut figure = unit_figure();
            figure.push(Artist::Line {
                xs: vec![0.0, 1.0],
                ys: vec![0.5, 0.5],
                color: COLOR_CYCLE[0],
                width: 1.5,
                style,
                marker: Marker::Hidden,
                label: None,
            });
            let (pixels, w, _) = render(&figure);
            blue_pixels(&pixels, w).len()
        };
        let solid = styled(LineStyle::Solid);
        let dashed = styled(LineStyle::Dashed);
        let dotted = styled(LineStyle::Dotted);
        assert!(dashed > solid / 3 && dashed < solid, "solid {solid}, dashed {dashed}");
        assert!(dotted > 0 && dotted < solid, "solid {solid}, dotted {dotted}");
        assert_eq!(styled(LineStyle::Hidden), 0);
    }

    #[test]
    fn test_markers_outside_view_are_skipped() {
        let scatter = |xs: Vec<f64>| Artist::Scatter {
            ys: vec![0.5; xs.len()],
            xs,
            sizes: vec![36.0],
            colors: vec![COLOR_CYCLE[0]],
            marker: Marker::Square,
            alpha: 1.0,
            label: None,
        };
        let mut figure = unit_figure();
        figure.push(scatter(vec![5.0, -2.0]));
        let (pixels, w, _) = render(&figure);
        assert!(blue_pixels(&pixels, w).is_empty());

        let mut figure = unit_figure();
        figure.push(scatter(vec![0.5]));
        let (pixels, w, _) = render(&figure);
        assert!(!blue_pixels(&pixels, w).is_empty());
    }

    #[test]
    fn test_every_marker_shape_renders() {
        for marker in [
            Marker::Circle,
            Marker::Point,
            Marker::Square,
            Marker::Triangle,
            Marker::TriangleDown,
            Marker::Diamond,
            Marker::Star,
            Marker::Cross,
            Marker::Plus,
        ] {
            let mut figure = unit_figure();
            figure.push(Artist::Line {
                xs: vec![0.5],
                ys: vec![0.5],
                color: COLOR_CYCLE[0],
                width: 1.5,
                style: LineStyle::Hidden,
                marker,
                label: None,
            });
            let (pixels, w, _) = render(&figure);
            assert!(!blue_pixels(&pixels, w).is_empty(), "{:?}", marker);
        }
    }

    #[test]
    fn test_rasterize_rejects_wrong_buffer() {
        let figure = Figure::new();
        let mut pixels = vec![0u8; 10];
        assert!(rasterize(&figure, &mut pixels, 4, 4).is_err());
    }
}
