//! The `plt` namespace, axes/figure methods and `DataFrame.plot`.
//!
//! Every call records artists or labels on the execution's [`Figure`]; nothing
//! is rasterized until the snippet has finished.
//!
//! [`Figure`]: crate::render::Figure

use super::builtins::Args;
use super::error::ScriptError;
use super::format;
use super::interpreter::Interpreter;
use super::value::{Column, Frame, Value};
use crate::render::figure::{Artist, FormatSpec, LineStyle, Marker, Rgb, parse_color};

/// Default line width in points, as matplotlib's.
const DEFAULT_LINE_WIDTH: f64 = 1.5;
/// Default scatter marker area in points squared.
const DEFAULT_MARKER_AREA: f64 = 36.0;
const DEFAULT_BAR_WIDTH: f64 = 0.8;
const DEFAULT_BINS: usize = 10;
/// Largest figure edge accepted, in inches.
const MAX_FIGURE_INCHES: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyplotFn {
    Figure,
    Subplots,
    AddSubplot,
    Plot,
    Scatter,
    Bar,
    Barh,
    Hist,
    Pie,
    FillBetween,
    Axhline,
    Axvline,
    Text,
    Annotate,
    Title,
    Suptitle,
    XLabel,
    YLabel,
    Grid,
    Legend,
    XLim,
    YLim,
    XTicks,
    YTicks,
    XTickLabels,
    YTickLabels,
    Close,
    Clf,
    Gca,
    Gcf,
    SetSizeInches,
    Use,
    /// Accepted for compatibility; changes nothing in the raster.
    NoOp(&'static str),
}

const COSMETIC: &[&str] = &[
    "show", "savefig", "tight_layout", "subplots_adjust", "tick_params", "margins", "autoscale",
    "axis", "set_aspect", "minorticks_on", "ion", "ioff", "draw", "pause", "set_facecolor",
    "colorbar", "set_axisbelow",
];

impl PyplotFn {
    /// Functions of `plt`.
    pub fn from_name(name: &str) -> Option<PyplotFn> {
        Some(match name {
            "figure" => Self::Figure,
            "subplots" => Self::Subplots,
            "subplot" => Self::AddSubplot,
            "suptitle" => Self::Suptitle,
            "xlabel" => Self::XLabel,
            "ylabel" => Self::YLabel,
            "xlim" => Self::XLim,
            "ylim" => Self::YLim,
            "xticks" => Self::XTicks,
            "yticks" => Self::YTicks,
            "close" => Self::Close,
            "clf" | "cla" => Self::Clf,
            "gca" => Self::Gca,
            "gcf" => Self::Gcf,
            "title" => Self::Title,
            other => return Self::drawing(other).or_else(|| Self::cosmetic(other)),
        })
    }

    /// Methods of an axes handle.
    pub fn axes_method(name: &str) -> Option<PyplotFn> {
        Some(match name {
            "set_title" => Self::Title,
            "set_xlabel" => Self::XLabel,
            "set_ylabel" => Self::YLabel,
            "set_xlim" => Self::XLim,
            "set_ylim" => Self::YLim,
            "set_xticks" => Self::XTicks,
            "set_yticks" => Self::YTicks,
            "set_xticklabels" => Self::XTickLabels,
            "set_yticklabels" => Self::YTickLabels,
            "cla" | "clear" => Self::Clf,
            "get_figure" => Self::Gcf,
            other => return Self::drawing(other).or_else(|| Self::cosmetic(other)),
        })
    }

    /// Methods of a figure handle.
    pub fn figure_method(name: &str) -> Option<PyplotFn> {
        Some(match name {
            "suptitle" => Self::Suptitle,
            "add_subplot" => Self::AddSubplot,
            "gca" => Self::Gca,
            "set_size_inches" => Self::SetSizeInches,
            "clf" | "clear" => Self::Clf,
            "legend" => Self::Legend,
            "text" => Self::Text,
            other => return Self::cosmetic(other),
        })
    }

    /// Bare pylab-style names available without `plt.`.
    pub fn pylab(name: &str) -> Option<PyplotFn> {
        match name {
            "plot" | "scatter" | "bar" | "barh" | "hist" | "pie" | "grid" | "legend" => Self::drawing(name),
            "title" => Some(Self::Title),
            "xlabel" => Some(Self::XLabel),
            "ylabel" => Some(Self::YLabel),
            _ => None,
        }
    }

    fn drawing(name: &str) -> Option<PyplotFn> {
        Some(match name {
            "plot" => Self::Plot,
            "scatter" => Self::Scatter,
            "bar" => Self::Bar,
            "barh" => Self::Barh,
            "hist" => Self::Hist,
            "pie" => Self::Pie,
            "fill_between" => Self::FillBetween,
            "axhline" => Self::Axhline,
            "axvline" => Self::Axvline,
            "text" => Self::Text,
            "annotate" => Self::Annotate,
            "grid" => Self::Grid,
            "legend" => Self::Legend,
            _ => return None,
        })
    }

    fn cosmetic(name: &str) -> Option<PyplotFn> {
        COSMETIC.iter().find(|n| **n == name).map(|n| Self::NoOp(n))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Figure => "figure",
            Self::Subplots => "subplots",
            Self::AddSubplot => "add_subplot",
            Self::Plot => "plot",
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Barh => "barh",
            Self::Hist => "hist",
            Self::Pie => "pie",
            Self::FillBetween => "fill_between",
            Self::Axhline => "axhline",
            Self::Axvline => "axvline",
            Self::Text => "text",
            Self::Annotate => "annotate",
            Self::Title => "title",
            Self::Suptitle => "suptitle",
            Self::XLabel => "xlabel",
            Self::YLabel => "ylabel",
            Self::Grid => "grid",
            Self::Legend => "legend",
            Self::XLim => "xlim",
            Self::YLim => "ylim",
            Self::XTicks => "xticks",
            Self::YTicks => "yticks",
            Self::XTickLabels => "set_xticklabels",
            Self::YTickLabels => "set_yticklabels",
            Self::Close => "close",
            Self::Clf => "clf",
            Self::Gca => "gca",
            Self::Gcf => "gcf",
            Self::SetSizeInches => "set_size_inches",
            Self::Use => "use",
            Self::NoOp(name) => name,
        }
    }
}

pub fn call_pyplot(interp: &mut Interpreter<'_>, func: PyplotFn, args: Args) -> Result<Value, ScriptError> {
    match func {
        PyplotFn::Figure => {
            interp.figure().clear();
            apply_size(interp, &args)?;
            Ok(Value::Figure)
        }
        PyplotFn::Subplots => {
            let rows = args.integer(0, "nrows")?.unwrap_or(1);
            let cols = args.integer(1, "ncols")?.unwrap_or(1);
            if rows != 1 || cols != 1 {
                return Err(single_axes());
            }
            interp.figure().clear();
            apply_size(interp, &args)?;
            Ok(Value::tuple(vec![Value::Figure, Value::Axes]))
        }
        PyplotFn::AddSubplot => {
            let spec: Vec<i64> = args
                .positional()
                .iter()
                .map(Value::as_index)
                .collect::<Result<_, _>>()?;
            match spec.as_slice() {
                [] | [111] | [1, 1, 1] => Ok(Value::Axes),
                _ => Err(single_axes()),
            }
        }
        PyplotFn::Plot => plot(interp, &args),
        PyplotFn::Scatter => scatter(interp, &args),
        PyplotFn::Bar => bar(interp, &args, false),
        PyplotFn::Barh => bar(interp, &args, true),
        PyplotFn::Hist => hist(interp, &args),
        PyplotFn::Pie => pie(interp, &args),
        PyplotFn::FillBetween => {
            let xs = coords(interp, args.require(0, "x")?, false)?;
            let upper = broadcast(interp, args.require(1, "y1")?, xs.len(), "y1")?;
            let lower = match args.get(2, "y2") {
                Some(v) => broadcast(interp, v, xs.len(), "y2")?,
                None => vec![0.0; xs.len()],
            };
            let color = color_kw(interp, &args)?;
            let alpha = alpha_kw(&args, 1.0)?;
            interp.figure().push(Artist::Area {
                xs,
                upper,
                lower,
                color,
                alpha,
                label: label_kw(&args),
            });
            Ok(Value::None)
        }
        PyplotFn::Axhline | PyplotFn::Axvline => {
            let at = args.number(0, if func == PyplotFn::Axhline { "y" } else { "x" })?.unwrap_or(0.0);
            let color = color_kw(interp, &args)?;
            let style = line_style_kw(&args)?.unwrap_or(LineStyle::Solid);
            let width = width_kw(&args)?;
            let artist = if func == PyplotFn::Axhline {
                Artist::HLine { y: at, color, style, width }
            } else {
                Artist::VLine { x: at, color, style, width }
            };
            interp.figure().push(artist);
            Ok(Value::None)
        }
        PyplotFn::Text => {
            let x = args.number(0, "x")?.ok_or_else(|| missing(&args, "x"))?;
            let y = args.number(1, "y")?.ok_or_else(|| missing(&args, "y"))?;
            let text = args.require(2, "s")?.py_str();
            push_text(interp, &args, x, y, text)
        }
        PyplotFn::Annotate => {
            let text = args.require(0, "text")?.py_str();
            let point = args
                .get(1, "xy")
                .ok_or_else(|| missing(&args, "xy"))?
                .to_numbers(2)?;
            let [x, y] = point[..] else {
                return Err(ScriptError::value("xy must be an (x, y) pair"));
            };
            push_text(interp, &args, x, y, text)
        }
        PyplotFn::Title => {
            let text = label_arg(&args)?;
            interp.figure().axes.title = text;
            Ok(Value::None)
        }
        PyplotFn::Suptitle => {
            let text = label_arg(&args)?;
            interp.figure().suptitle = text;
            Ok(Value::None)
        }
        PyplotFn::XLabel => {
            let text = label_arg(&args)?;
            interp.figure().axes.xlabel = text;
            Ok(Value::None)
        }
        PyplotFn::YLabel => {
            let text = label_arg(&args)?;
            interp.figure().axes.ylabel = text;
            Ok(Value::None)
        }
        PyplotFn::Grid => {
            let visible = match args.positional().first().or_else(|| args.kw_any(&["visible", "b"])) {
                Some(value) => value.truthy()?,
                None => true,
            };
            interp.figure().axes.grid = visible;
            Ok(Value::None)
        }
        PyplotFn::Legend => {
            if let Some(labels) = args.get(0, "labels") {
                let labels: Vec<String> = labels.iter_values(interp.max_len())?.iter().map(Value::py_str).collect();
                relabel(interp, labels);
            }
            interp.figure().axes.legend = true;
            Ok(Value::None)
        }
        PyplotFn::XLim | PyplotFn::YLim => {
            let horizontal = func == PyplotFn::XLim;
            let names = if horizontal { ["left", "right"] } else { ["bottom", "top"] };
            let limits = limits_arg(&args, names)?;
            let axes = &mut interp.figure().axes;
            let slot = if horizontal { &mut axes.xlim } else { &mut axes.ylim };
            match limits {
                Some(limits) => {
                    *slot = Some(limits);
                    Ok(Value::tuple(vec![Value::Num(limits.0), Value::Num(limits.1)]))
                }
                None => {
                    let (lo, hi) = slot.unwrap_or((0.0, 1.0));
                    Ok(Value::tuple(vec![Value::Num(lo), Value::Num(hi)]))
                }
            }
        }
        PyplotFn::XTicks | PyplotFn::YTicks => {
            let Some(ticks) = args.get(0, "ticks") else {
                return Ok(Value::None);
            };
            let positions = ticks.to_numbers(interp.max_len())?;
            let labels = match args.get(1, "labels") {
                Some(labels) => {
                    let labels: Vec<String> =
                        labels.iter_values(interp.max_len())?.iter().map(Value::py_str).collect();
                    if labels.len() != positions.len() {
                        return Err(ScriptError::value(format!(
                            "The number of FixedLocator locations ({}), usually from a call to set_ticks, does not match the number of labels ({}).",
                            positions.len(),
                            labels.len()
                        )));
                    }
                    labels
                }
                None => positions.iter().map(|p| super::value::format_number(*p)).collect(),
            };
            let ticks = positions.into_iter().zip(labels).collect();
            let axes = &mut interp.figure().axes;
            if func == PyplotFn::XTicks {
                axes.xticks = Some(ticks);
            } else {
                axes.yticks = Some(ticks);
            }
            Ok(Value::None)
        }
        PyplotFn::XTickLabels | PyplotFn::YTickLabels => {
            let labels: Vec<String> = args
                .require(0, "labels")?
                .iter_values(interp.max_len())?
                .iter()
                .map(Value::py_str)
                .collect();
            let axes = &mut interp.figure().axes;
            let horizontal = func == PyplotFn::XTickLabels;
            let slot = if horizontal { &mut axes.xticks } else { &mut axes.yticks };
            let positions: Vec<f64> = match slot {
                Some(existing) => existing.iter().map(|(p, _)| *p).collect(),
                None => (0..labels.len()).map(|i| i as f64).collect(),
            };
            *slot = Some(positions.into_iter().zip(labels).collect());
            Ok(Value::None)
        }
        PyplotFn::Close => {
            interp.figure().clear();
            Ok(Value::None)
        }
        PyplotFn::Clf => {
            let figure = interp.figure();
            figure.axes = Default::default();
            figure.suptitle = None;
            Ok(Value::None)
        }
        PyplotFn::Gca => Ok(Value::Axes),
        PyplotFn::Gcf => Ok(Value::Figure),
        PyplotFn::SetSizeInches => {
            let size = match args.get(0, "w") {
                Some(Value::Tuple(_)) | Some(Value::List(_)) => args.require(0, "w")?.to_numbers(2)?,
                _ => vec![
                    args.number(0, "w")?.ok_or_else(|| missing(&args, "w"))?,
                    args.number(1, "h")?.ok_or_else(|| missing(&args, "h"))?,
                ],
            };
            set_size(interp, &size)?;
            Ok(Value::None)
        }
        PyplotFn::Use | PyplotFn::NoOp(_) => Ok(Value::None),
    }
}

fn single_axes() -> ScriptError {
    ScriptError::value("only a single set of axes is supported; draw one chart per snippet")
}

fn missing(args: &Args, name: &str) -> ScriptError {
    ScriptError::type_error(format!(
        "{}() missing required argument: '{}'",
        args.name(),
        name
    ))
}

fn apply_size(interp: &mut Interpreter<'_>, args: &Args) -> Result<(), ScriptError> {
    if let Some(size) = args.kw("figsize") {
        let size = size.to_numbers(2)?;
        set_size(interp, &size)?;
    }
    if let Some(dpi) = args.number(usize::MAX, "dpi")? {
        if !(dpi.is_finite() && dpi > 0.0 && dpi <= 1000.0) {
            return Err(ScriptError::value("dpi must be a positive number"));
        }
        interp.figure().dpi = dpi;
    }
    Ok(())
}

fn set_size(interp: &mut Interpreter<'_>, size: &[f64]) -> Result<(), ScriptError> {
    let [width, height] = size[..] else {
        return Err(ScriptError::value("figure size must be a (width, height) pair"));
    };
    let valid = |v: f64| v.is_finite() && v > 0.0 && v <= MAX_FIGURE_INCHES;
    if !valid(width) || !valid(height) {
        return Err(ScriptError::value(format!(
            "figure size must be positive and at most {} inches",
            MAX_FIGURE_INCHES
        )));
    }
    let figure = interp.figure();
    figure.width_in = width;
    figure.height_in = height;
    Ok(())
}

fn label_arg(args: &Args) -> Result<Option<String>, ScriptError> {
    Ok(args.get(0, "label").map(Value::py_str))
}

fn label_kw(args: &Args) -> Option<String> {
    args.kw("label").map(Value::py_str).filter(|l| !l.starts_with('_'))
}

fn number_kw(args: &Args, names: &[&str]) -> Result<Option<f64>, ScriptError> {
    match args.kw_any(names) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() argument '{}' must be a number, not '{}'",
                args.name(),
                names[0],
                value.type_name()
            ))
        }),
    }
}

fn alpha_kw(args: &Args, default: f64) -> Result<f64, ScriptError> {
    let alpha = number_kw(args, &["alpha"])?.unwrap_or(default);
    if !(0.0..=1.0).contains(&alpha) {
        return Err(ScriptError::value(format!("alpha ({}) is outside 0-1 range", alpha)));
    }
    Ok(alpha)
}

fn width_kw(args: &Args) -> Result<f64, ScriptError> {
    Ok(number_kw(args, &["linewidth", "lw"])?
        .unwrap_or(DEFAULT_LINE_WIDTH)
        .clamp(0.0, 50.0))
}

fn line_style_kw(args: &Args) -> Result<Option<LineStyle>, ScriptError> {
    match args.kw_any(&["linestyle", "ls"]) {
        None => Ok(None),
        Some(value) => {
            let spec = value.py_str();
            LineStyle::parse(&spec)
                .map(Some)
                .ok_or_else(|| ScriptError::value(format!("'{}' is not a valid value for ls", spec)))
        }
    }
}

fn marker_kw(args: &Args) -> Result<Option<Marker>, ScriptError> {
    match args.kw("marker") {
        None => Ok(None),
        Some(value) => {
            let spec = value.py_str();
            Marker::parse(&spec)
                .map(Some)
                .ok_or_else(|| ScriptError::value(format!("Unrecognized marker style '{}'", spec)))
        }
    }
}

/// A color from a name, hex string or an RGB(A) tuple of floats.
fn color_value(value: &Value) -> Result<Rgb, ScriptError> {
    let invalid = || ScriptError::value(format!("{} is not a valid color value", value.repr()));
    match value {
        Value::Str(spec) => parse_color(spec).ok_or_else(invalid),
        Value::Tuple(_) | Value::List(_) => {
            let parts = value.to_numbers(4).map_err(|_| invalid())?;
            if !(parts.len() == 3 || parts.len() == 4) || parts.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(invalid());
            }
            let channel = |v: f64| (v * 255.0).round() as u8;
            Ok(Rgb(channel(parts[0]), channel(parts[1]), channel(parts[2])))
        }
        _ => Err(invalid()),
    }
}

fn explicit_color(args: &Args) -> Result<Option<Rgb>, ScriptError> {
    args.kw_any(&["color", "c"]).map(color_value).transpose()
}

/// The `color=` keyword, or the next color of the cycle.
fn color_kw(interp: &mut Interpreter<'_>, args: &Args) -> Result<Rgb, ScriptError> {
    match explicit_color(args)? {
        Some(color) => Ok(color),
        None => Ok(interp.figure().next_color()),
    }
}

/// One color per item, or a single shared color.
fn colors_kw(interp: &mut Interpreter<'_>, args: &Args, key: &str) -> Result<Vec<Rgb>, ScriptError> {
    match args.kw(key) {
        Some(value @ (Value::List(_) | Value::Tuple(_))) if color_value(value).is_err() => value
            .iter_values(interp.max_len())?
            .iter()
            .map(color_value)
            .collect(),
        Some(value) => Ok(vec![color_value(value)?]),
        None => Ok(vec![interp.figure().next_color()]),
    }
}

/// Coordinates for one axis; string sequences become category positions.
fn coords(interp: &mut Interpreter<'_>, value: &Value, vertical: bool) -> Result<Vec<f64>, ScriptError> {
    let limit = interp.max_len();
    match value {
        Value::Array(items) => Ok(items.as_ref().clone()),
        Value::Num(_) | Value::Bool(_) => value.to_numbers(limit),
        Value::Str(label) => Ok(vec![interp.figure().axes.category_position(label, vertical)]),
        other => {
            let items = other.iter_values(limit)?;
            if items.iter().any(|v| matches!(v, Value::Str(_))) {
                let axes = &mut interp.figure().axes;
                Ok(items
                    .iter()
                    .map(|v| axes.category_position(&v.py_str(), vertical))
                    .collect())
            } else {
                other.to_numbers(limit)
            }
        }
    }
}

/// Numbers for a data argument: a scalar is repeated `len` times.
fn broadcast(interp: &Interpreter<'_>, value: &Value, len: usize, name: &str) -> Result<Vec<f64>, ScriptError> {
    let values = value.to_numbers(interp.max_len())?;
    match values.len() {
        1 => Ok(vec![values[0]; len]),
        n if n == len => Ok(values),
        n => Err(ScriptError::value(format!(
            "{} has {} elements, expected {}",
            name, n, len
        ))),
    }
}

fn same_length(xs: &[f64], ys: &[f64]) -> Result<(), ScriptError> {
    if xs.len() != ys.len() {
        return Err(ScriptError::value(format!(
            "x and y must have same first dimension, but have shapes ({},) and ({},)",
            xs.len(),
            ys.len()
        )));
    }
    Ok(())
}

fn index_positions(len: usize) -> Vec<f64> {
    (0..len).map(|i| i as f64).collect()
}

fn plot(interp: &mut Interpreter<'_>, args: &Args) -> Result<Value, ScriptError> {
    let positional = args.positional();
    if positional.is_empty() {
        return Ok(Value::list(Vec::new()));
    }
    let label = label_kw(args);
    let width = width_kw(args)?;
    let kw_color = explicit_color(args)?;
    let kw_style = line_style_kw(args)?;
    let kw_marker = marker_kw(args)?;

    let mut lines = 0;
    let mut i = 0;
    while i < positional.len() {
        let first = &positional[i];
        if matches!(first, Value::Str(_)) {
            return Err(ScriptError::value(format!(
                "plot() expected data before the format string {}",
                first.repr()
            )));
        }
        i += 1;
        let second = positional.get(i).filter(|v| !matches!(v, Value::Str(_)));
        if second.is_some() {
            i += 1;
        }
        let fmt = match positional.get(i) {
            Some(Value::Str(fmt)) => {
                i += 1;
                FormatSpec::parse(fmt).ok_or_else(|| {
                    ScriptError::value(format!("'{}' is not a valid format string", fmt))
                })?
            }
            _ => FormatSpec::default(),
        };

        let (xs, ys) = match second {
            Some(ys) => {
                let xs = coords(interp, first, false)?;
                let ys = coords(interp, ys, true)?;
                (xs, ys)
            }
            None => {
                let ys = coords(interp, first, true)?;
                (index_positions(ys.len()), ys)
            }
        };
        same_length(&xs, &ys)?;
        interp.meter().charge(xs.len())?;
        interp.meter().allocate(xs.len() * 2)?;

        let color = match fmt.color.or(kw_color) {
            Some(color) => color,
            None => interp.figure().next_color(),
        };
        interp.figure().push(Artist::Line {
            xs,
            ys,
            color,
            width,
            style: fmt.line.or(kw_style).unwrap_or(LineStyle::Solid),
            marker: fmt.marker.or(kw_marker).unwrap_or(Marker::Hidden),
            label: label.clone(),
        });
        lines += 1;
    }
    Ok(Value::list(vec![Value::None; lines]))
}

/// A perceptually ordered colormap close to matplotlib's default.
fn viridis(t: f64) -> Rgb {
    const STOPS: [(f64, f64, f64); 5] = [
        (68.0, 1.0, 84.0),
        (59.0, 82.0, 139.0),
        (33.0, 145.0, 140.0),
        (94.0, 201.0, 98.0),
        (253.0, 231.0, 37.0),
    ];
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (STOPS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(STOPS.len() - 2);
    let f = scaled - i as f64;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    let mix = |x: f64, y: f64| (x + (y - x) * f).round() as u8;
    Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

fn colormap(values: &[f64]) -> Vec<Rgb> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let lo = finite.clone().fold(f64::INFINITY, f64::min);
    let hi = finite.fold(f64::NEG_INFINITY, f64::max);
    let span = if hi > lo { hi - lo } else { 1.0 };
    values.iter().map(|v| viridis((v - lo) / span)).collect()
}

fn scatter(interp: &mut Interpreter<'_>, args: &Args) -> Result<Value, ScriptError> {
    let xs = coords(interp, args.require(0, "x")?, false)?;
    let ys = coords(interp, args.require(1, "y")?, true)?;
    same_length(&xs, &ys)?;
    interp.meter().charge(xs.len())?;
    interp.meter().allocate(xs.len() * 2)?;

    let sizes = match args.get(2, "s") {
        Some(s) => broadcast(interp, s, xs.len(), "s")?,
        None => vec![DEFAULT_MARKER_AREA],
    };
    let colors = match args.get(3, "c").or_else(|| args.kw("color")) {
        None => vec![interp.figure().next_color()],
        Some(value @ Value::Str(_)) => vec![color_value(value)?],
        Some(value) => {
            let items = value.iter_values(interp.max_len())?;
            if items.len() == xs.len() && items.iter().all(|v| v.as_f64().is_some()) {
                colormap(&value.to_numbers(interp.max_len())?)
            } else if let Ok(color) = color_value(value) {
                vec![color]
            } else if items.len() == xs.len() {
                items.iter().map(color_value).collect::<Result<_, _>>()?
            } else {
                return Err(ScriptError::value(format!(
                    "'c' argument has {} elements, which is inconsistent with 'x' and 'y' with size {}",
                    items.len(),
                    xs.len()
                )));
            }
        }
    };
    let marker = marker_kw(args)?.unwrap_or(Marker::Circle);
    let alpha = alpha_kw(args, 1.0)?;
    interp.figure().push(Artist::Scatter {
        xs,
        ys,
        sizes,
        colors,
        marker,
        alpha,
        label: label_kw(args),
    });
    Ok(Value::None)
}

fn bar(interp: &mut Interpreter<'_>, args: &Args, horizontal: bool) -> Result<Value, ScriptError> {
    let (pos_name, len_name, thick_name, base_name) = if horizontal {
        ("y", "width", "height", "left")
    } else {
        ("x", "height", "width", "bottom")
    };
    let positions = coords(interp, args.require(0, pos_name)?, horizontal)?;
    let lengths = broadcast(interp, args.require(1, len_name)?, positions.len(), len_name)?;
    let thickness = args.number(2, thick_name)?.unwrap_or(DEFAULT_BAR_WIDTH);
    let bases = match args.get(3, base_name) {
        Some(base) => broadcast(interp, base, positions.len(), base_name)?,
        None => vec![0.0; positions.len()],
    };
    interp.meter().charge(positions.len())?;
    interp.meter().allocate(positions.len() * 2)?;
    let colors = colors_kw(interp, args, "color")?;
    let alpha = alpha_kw(args, 1.0)?;
    let count = positions.len();
    interp.figure().push(Artist::Bars {
        positions,
        lengths,
        bases,
        thickness,
        colors,
        horizontal,
        alpha,
        label: label_kw(args),
    });
    Ok(Value::list(vec![Value::None; count]))
}

/// Bin edges and counts, numpy-style: the last bin is closed on the right.
pub fn histogram(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0; bins];
    if bins == 0 {
        return counts;
    }
    let (lo, hi) = (edges[0], edges[bins]);
    for v in values.iter().copied().filter(|v| v.is_finite()) {
        if v < lo || v > hi {
            continue;
        }
        let idx = match edges.partition_point(|e| *e <= v) {
            0 => 0,
            n => (n - 1).min(bins - 1),
        };
        counts[idx] += 1.0;
    }
    counts
}

/// `bins` evenly spaced edges covering the finite values (or `range`).
pub fn even_edges(values: &[f64], bins: usize, range: Option<(f64, f64)>) -> Vec<f64> {
    let (mut lo, mut hi) = range.unwrap_or_else(|| {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let lo = finite.clone().fold(f64::INFINITY, f64::min);
        let hi = finite.fold(f64::NEG_INFINITY, f64::max);
        if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) }
    });
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let step = (hi - lo) / bins as f64;
    (0..=bins)
        .map(|i| if i == bins { hi } else { lo + step * i as f64 })
        .collect()
}

fn hist(interp: &mut Interpreter<'_>, args: &Args) -> Result<Value, ScriptError> {
    let values = args.require(0, "x")?.to_numbers(interp.max_len())?;
    interp.meter().charge(values.len())?;
    interp.meter().allocate(values.len())?;
    let range = match args.kw("range") {
        Some(range) => match range.to_numbers(2)?[..] {
            [lo, hi] if lo < hi => Some((lo, hi)),
            _ => return Err(ScriptError::value("max must be larger than min in range parameter")),
        },
        None => None,
    };
    let edges = match args.get(1, "bins") {
        None => even_edges(&values, DEFAULT_BINS, range),
        Some(Value::Num(_)) | Some(Value::Bool(_)) => {
            let bins = args.integer(1, "bins")?.unwrap_or(DEFAULT_BINS as i64);
            if bins < 1 {
                return Err(ScriptError::value("`bins` must be positive, when an integer"));
            }
            interp.meter().check_len(bins as usize)?;
            even_edges(&values, bins as usize, range)
        }
        Some(edges) => {
            let edges = edges.to_numbers(interp.max_len())?;
            if edges.len() < 2 || edges.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ScriptError::value("`bins` must increase monotonically"));
            }
            edges
        }
    };
    let mut counts = histogram(&values, &edges);
    if args.flag("density", false)? {
        let total: f64 = counts.iter().sum();
        for (count, w) in counts.iter_mut().zip(edges.windows(2)) {
            *count = if total > 0.0 { *count / (total * (w[1] - w[0])) } else { 0.0 };
        }
    }

    let horizontal = args.text("orientation")?.as_deref() == Some("horizontal");
    let colors = colors_kw(interp, args, "color")?;
    let alpha = alpha_kw(args, 1.0)?;
    let mut label = label_kw(args);
    // Consecutive bins of equal width share one artist.
    let mut start = 0;
    while start < counts.len() {
        let width = edges[start + 1] - edges[start];
        let mut end = start + 1;
        while end < counts.len() && ((edges[end + 1] - edges[end]) - width).abs() <= width * 1e-9 {
            end += 1;
        }
        interp.figure().push(Artist::Bars {
            positions: (start..end).map(|b| (edges[b] + edges[b + 1]) / 2.0).collect(),
            lengths: counts[start..end].to_vec(),
            bases: vec![0.0; end - start],
            thickness: width,
            colors: colors.clone(),
            horizontal,
            alpha,
            label: label.take(),
        });
        start = end;
    }

    Ok(Value::tuple(vec![Value::array(counts), Value::array(edges), Value::None]))
}

fn pie(interp: &mut Interpreter<'_>, args: &Args) -> Result<Value, ScriptError> {
    let values = args.require(0, "x")?.to_numbers(interp.max_len())?;
    if values.iter().any(|v| *v < 0.0 || !v.is_finite()) {
        return Err(ScriptError::value("Wedge sizes 'x' must be non negative values"));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(ScriptError::value("Wedge sizes 'x' must sum to a positive value"));
    }
    let labels: Vec<String> = match args.kw("labels").or_else(|| args.positional().get(2)) {
        Some(labels) => {
            let labels: Vec<String> = labels.iter_values(interp.max_len())?.iter().map(Value::py_str).collect();
            if labels.len() != values.len() {
                return Err(ScriptError::value("'label' must be of length 'x'"));
            }
            labels
        }
        None => Vec::new(),
    };
    let colors = match args.kw("colors") {
        Some(colors) => colors
            .iter_values(interp.max_len())?
            .iter()
            .map(color_value)
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            let figure = interp.figure();
            values.iter().map(|_| figure.next_color()).collect()
        }
    };
    let wedge_text = match args.kw("autopct") {
        Some(Value::Str(template)) => values
            .iter()
            .map(|v| format::percent_format(template, &[Value::Num(v / total * 100.0)]))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "autopct must be a format string, not '{}'",
                other.type_name()
            )));
        }
        None => Vec::new(),
    };
    let start_angle = number_kw(args, &["startangle"])?.unwrap_or(0.0);

    let figure = interp.figure();
    figure.axes.frameless = true;
    figure.push(Artist::Pie {
        values,
        labels,
        colors,
        wedge_text,
        start_angle,
    });
    Ok(Value::None)
}

fn push_text(interp: &mut Interpreter<'_>, args: &Args, x: f64, y: f64, text: String) -> Result<Value, ScriptError> {
    let color = explicit_color(args)?.unwrap_or(Rgb::BLACK);
    interp.figure().push(Artist::Text { x, y, text, color });
    Ok(Value::None)
}

fn relabel(interp: &mut Interpreter<'_>, labels: Vec<String>) {
    let mut labels = labels.into_iter();
    for artist in interp.figure().axes.artists.iter_mut() {
        let slot = match artist {
            Artist::Line { label, .. }
            | Artist::Scatter { label, .. }
            | Artist::Bars { label, .. }
            | Artist::Area { label, .. } => label,
            _ => continue,
        };
        match labels.next() {
            Some(text) => *slot = Some(text),
            None => break,
        }
    }
}

fn limits_arg(args: &Args, names: [&str; 2]) -> Result<Option<(f64, f64)>, ScriptError> {
    if let Some(Value::Tuple(_) | Value::List(_)) = args.positional().first() {
        let pair = args.positional()[0].to_numbers(2)?;
        let [lo, hi] = pair[..] else {
            return Err(ScriptError::value("limits must be a (min, max) pair"));
        };
        return Ok(Some((lo, hi)));
    }
    let lo = args.number(0, names[0])?;
    let hi = args.number(1, names[1])?;
    if lo.is_none() && hi.is_none() {
        return Ok(None);
    }
    // A missing side stays automatic.
    Ok(Some((lo.unwrap_or(f64::NAN), hi.unwrap_or(f64::NAN))))
}

/// `DataFrame.plot` (and `ndarray.plot`): one artist per plotted column.
pub fn frame_plot(interp: &mut Interpreter<'_>, frame: &Frame, args: Args) -> Result<Value, ScriptError> {
    let kind = args.text("kind")?.unwrap_or_else(|| "line".to_string());
    let x_name = args.text("x")?;

    let x_column = match &x_name {
        Some(name) => Some(
            frame
                .column(name)
                .ok_or_else(|| ScriptError::key(format!("'{}'", name)))?
                .clone(),
        ),
        None => None,
    };
    let y_names: Vec<String> = match args.kw("y") {
        Some(Value::Str(name)) => vec![name.to_string()],
        Some(names) => names.iter_values(interp.max_len())?.iter().map(Value::py_str).collect(),
        None => frame
            .columns
            .iter()
            .filter(|(name, column)| Some(name) != x_name.as_ref() && matches!(column, Column::Numbers(_)))
            .map(|(name, _)| name.clone())
            .collect(),
    };
    let mut series: Vec<(String, Vec<f64>)> = Vec::with_capacity(y_names.len());
    for name in &y_names {
        match frame.column(name) {
            Some(Column::Numbers(values)) => series.push((name.clone(), values.as_ref().clone())),
            Some(Column::Labels(_)) => {
                return Err(ScriptError::type_error(format!("column '{}' is not numeric", name)));
            }
            None => return Err(ScriptError::key(format!("'{}'", name))),
        }
    }
    if series.is_empty() {
        return Err(ScriptError::type_error("no numeric data to plot"));
    }
    interp.meter().charge(frame.rows() * series.len())?;
    interp.meter().allocate(frame.rows() * series.len())?;

    if let Some(size) = args.kw("figsize") {
        set_size(interp, &size.to_numbers(2)?)?;
    }
    let colors = match args.kw("color") {
        Some(value @ (Value::List(_) | Value::Tuple(_))) if color_value(value).is_err() => value
            .iter_values(interp.max_len())?
            .iter()
            .map(color_value)
            .collect::<Result<Vec<_>, _>>()?,
        Some(value) => vec![color_value(value)?],
        None => Vec::new(),
    };
    let labelled = |name: &str| (!name.is_empty()).then(|| name.to_string());
    let rows = frame.rows();

    match kind.as_str() {
        "line" => {
            let xs = match &x_column {
                Some(column) => coords(interp, &column.to_value(), false)?,
                None => index_positions(rows),
            };
            for (i, (name, ys)) in series.into_iter().enumerate() {
                let color = series_color(interp, &colors, i);
                interp.figure().push(Artist::Line {
                    xs: xs.clone(),
                    ys,
                    color,
                    width: DEFAULT_LINE_WIDTH,
                    style: LineStyle::Solid,
                    marker: marker_kw(&args)?.unwrap_or(Marker::Hidden),
                    label: labelled(&name),
                });
            }
        }
        "bar" | "barh" => {
            let horizontal = kind == "barh";
            let categories: Vec<String> = match &x_column {
                Some(column) => column.to_value().iter_values(interp.max_len())?.iter().map(Value::py_str).collect(),
                None => (0..rows).map(|i| i.to_string()).collect(),
            };
            let base: Vec<f64> = {
                let axes = &mut interp.figure().axes;
                categories.iter().map(|c| axes.category_position(c, horizontal)).collect()
            };
            let count = series.len();
            let thickness = DEFAULT_BAR_WIDTH / count as f64;
            for (i, (name, lengths)) in series.into_iter().enumerate() {
                let offset = (i as f64 - (count as f64 - 1.0) / 2.0) * thickness;
                let color = series_color(interp, &colors, i);
                interp.figure().push(Artist::Bars {
                    positions: base.iter().map(|p| p + offset).collect(),
                    bases: vec![0.0; lengths.len()],
                    lengths,
                    thickness,
                    colors: vec![color],
                    horizontal,
                    alpha: 1.0,
                    label: labelled(&name),
                });
            }
        }
        "scatter" => {
            let Some(column) = &x_column else {
                return Err(ScriptError::value("scatter requires an x and y column"));
            };
            let xs = coords(interp, &column.to_value(), false)?;
            let (name, ys) = series.swap_remove(0);
            let color = series_color(interp, &colors, 0);
            interp.figure().push(Artist::Scatter {
                xs,
                ys,
                sizes: vec![DEFAULT_MARKER_AREA],
                colors: vec![color],
                marker: Marker::Circle,
                alpha: 1.0,
                label: labelled(&name),
            });
        }
        "hist" => {
            let bins = args.integer(usize::MAX, "bins")?.unwrap_or(DEFAULT_BINS as i64).max(1) as usize;
            interp.meter().check_len(bins)?;
            for (i, (name, values)) in series.into_iter().enumerate() {
                let edges = even_edges(&values, bins, None);
                let counts = histogram(&values, &edges);
                let color = series_color(interp, &colors, i);
                interp.figure().push(Artist::Bars {
                    positions: edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect(),
                    bases: vec![0.0; counts.len()],
                    lengths: counts,
                    thickness: edges[1] - edges[0],
                    colors: vec![color],
                    horizontal: false,
                    alpha: 0.5,
                    label: labelled(&name),
                });
            }
        }
        "pie" => {
            let (_, values) = series.swap_remove(0);
            let labels: Vec<String> = match &x_column {
                Some(column) => column.to_value().iter_values(interp.max_len())?.iter().map(Value::py_str).collect(),
                None => (0..rows).map(|i| i.to_string()).collect(),
            };
            let pie_args = Args::new(
                "pie",
                vec![Value::array(values)],
                vec![(
                    "labels".to_string(),
                    Value::list(labels.into_iter().map(Value::str).collect()),
                )],
            );
            pie(interp, &pie_args)?;
        }
        other => {
            return Err(ScriptError::value(format!("{} is not a valid plot kind", other)));
        }
    }

    let figure = interp.figure();
    if let Some(title) = args.kw("title") {
        figure.axes.title = Some(title.py_str());
    }
    if let Some(name) = &x_name {
        figure.axes.xlabel = Some(name.clone());
    }
    if let Some(label) = args.kw("xlabel") {
        figure.axes.xlabel = Some(label.py_str());
    }
    if let Some(label) = args.kw("ylabel") {
        figure.axes.ylabel = Some(label.py_str());
    }
    if args.flag("grid", false)? {
        figure.axes.grid = true;
    }
    let multi = kind != "pie" && figure.axes.artists.iter().any(|a| a.label().is_some());
    figure.axes.legend = args.flag("legend", multi)?;
    Ok(Value::Axes)
}

/// Explicit series colors cycle by position; without any, the figure's cycle.
fn series_color(interp: &mut Interpreter<'_>, colors: &[Rgb], i: usize) -> Rgb {
    match colors.get(i).or(colors.first()) {
        Some(color) => *color,
        None => interp.figure().next_color(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Figure;
    use crate::sandbox::{InterruptHandle, ResourceLimits, SandboxEnvironment};
    use crate::script::interpreter::Meter;
    use crate::script::{ScriptErrorKind, parse_program};

    fn draw(source: &str) -> Result<Figure, ScriptError> {
        let program = parse_program(source)?;
        let mut env = SandboxEnvironment::new();
        let meter = Meter::new(&ResourceLimits::default(), InterruptHandle::new());
        Interpreter::new(&mut env, meter).run(&program)?;
        Ok(env.take_figure())
    }

    #[test]
    fn test_name_tables() {
        assert_eq!(PyplotFn::from_name("plot"), Some(PyplotFn::Plot));
        assert_eq!(PyplotFn::from_name("show"), Some(PyplotFn::NoOp("show")));
        assert_eq!(PyplotFn::axes_method("set_title"), Some(PyplotFn::Title));
        assert_eq!(PyplotFn::pylab("figure"), None);
        assert_eq!(PyplotFn::from_name("system"), None);
    }

    #[test]
    fn test_plot_with_format_string() {
        let figure = draw("plt.plot([1, 2, 3], [4, 5, 6], 'r--', label='a')").unwrap();
        let Artist::Line { color, style, marker, label, xs, .. } = &figure.axes.artists[0] else {
            panic!("expected a line");
        };
        assert_eq!(*color, Rgb(255, 0, 0));
        assert_eq!(*style, LineStyle::Dashed);
        assert_eq!(*marker, Marker::Hidden);
        assert_eq!(label.as_deref(), Some("a"));
        assert_eq!(xs, &vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_plot_single_series_uses_index() {
        let figure = draw("plot([1, 2, 3])").unwrap();
        let Artist::Line { xs, .. } = &figure.axes.artists[0] else { panic!("expected a line") };
        assert_eq!(xs, &vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_plot_multiple_groups_cycle_colors() {
        let figure = draw("plt.plot([1, 2], [1, 2], [1, 2], [2, 1])").unwrap();
        assert_eq!(figure.axes.artists.len(), 2);
        assert_ne!(figure.axes.artists[0].legend_color(), figure.axes.artists[1].legend_color());
    }

    #[test]
    fn test_length_mismatch_faults() {
        let err = draw("plt.plot([1, 2, 3], [1, 2])").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::ValueError);
    }

    #[test]
    fn test_categorical_bars() {
        let figure = draw("plt.bar(['Jan', 'Feb', 'Jan'], [1, 2, 3], color='green')").unwrap();
        assert_eq!(figure.axes.x_categories, vec!["Jan", "Feb"]);
        let Artist::Bars { positions, .. } = &figure.axes.artists[0] else { panic!("expected bars") };
        assert_eq!(positions, &vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_labels_and_limits() {
        let figure = draw("fig, ax = plt.subplots(figsize=(8, 4))\nax.plot([1, 2])\nax.set_title('T')\nax.set_xlim(0, 5)\nplt.ylabel('y')")
            .unwrap();
        assert_eq!(figure.axes.title.as_deref(), Some("T"));
        assert_eq!(figure.axes.ylabel.as_deref(), Some("y"));
        assert_eq!(figure.axes.xlim, Some((0.0, 5.0)));
        assert_eq!((figure.width_in, figure.height_in), (8.0, 4.0));
    }

    #[test]
    fn test_multiple_axes_rejected() {
        let err = draw("fig, axes = plt.subplots(2, 2)").unwrap_err();
        assert!(err.message.contains("single set of axes"));
    }

    #[test]
    fn test_hist_counts() {
        assert_eq!(histogram(&[1.0, 2.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), vec![1.0, 3.0]);
        let edges = even_edges(&[5.0, 5.0], 2, None);
        assert_eq!(edges, vec![4.5, 5.0, 5.5]);
        let figure = draw("counts, edges, _ = plt.hist([1, 2, 2, 3, 4], bins=3)").unwrap();
        assert_eq!(figure.axes.artists.len(), 1);
    }

    #[test]
    fn test_pie_validation() {
        let figure = draw("plt.pie([1, 3], labels=['a', 'b'], autopct='%1.1f%%')").unwrap();
        assert!(figure.axes.frameless);
        let Artist::Pie { wedge_text, .. } = &figure.axes.artists[0] else { panic!("expected a pie") };
        assert_eq!(wedge_text, &vec!["25.0%".to_string(), "75.0%".to_string()]);
        assert!(draw("plt.pie([1, -1])").is_err());
        assert!(draw("plt.pie([0, 0])").is_err());
    }

    #[test]
    fn test_unknown_color_faults() {
        let err = draw("plt.plot([1, 2], color='blurple')").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::ValueError);
    }

    #[test]
    fn test_scatter_numeric_colors_use_colormap() {
        let figure = draw("plt.scatter([1, 2, 3], [1, 2, 3], c=[0, 5, 10])").unwrap();
        let Artist::Scatter { colors, .. } = &figure.axes.artists[0] else { panic!("expected scatter") };
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[0], viridis(0.0));
        assert_eq!(colors[2], viridis(1.0));
    }

    #[test]
    fn test_close_discards_drawing() {
        let figure = draw("plt.plot([1, 2])\nplt.close()").unwrap();
        assert!(figure.is_empty());
    }

    #[test]
    fn test_frame_plot_kinds() {
        let figure = draw(
            "df = pd.DataFrame({'m': ['a', 'b'], 'x': [1, 2], 'y': [3, 4]})\ndf.plot(x='m', kind='bar', title='Sales')",
        )
        .unwrap();
        assert_eq!(figure.axes.artists.len(), 2);
        assert_eq!(figure.axes.title.as_deref(), Some("Sales"));
        assert_eq!(figure.axes.xlabel.as_deref(), Some("m"));
        assert!(figure.axes.legend);
        assert!(draw("df = pd.DataFrame({'x': [1]})\ndf.plot(kind='violin')").is_err());
    }
}
