//! Display list built by a snippet's plotting calls.
//!
//! A [`Figure`] is plain owned data: the interpreter appends artists to it
//! while the snippet runs, and the rasterizer reads its final state once the
//! snippet has completed. It holds no handles into the snippet's runtime, so
//! it can be moved off the worker thread.

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Blend toward white; `alpha` of 1.0 keeps the color unchanged.
    pub fn over_white(self, alpha: f64) -> Rgb {
        let a = alpha.clamp(0.0, 1.0);
        let mix = |c: u8| (c as f64 * a + 255.0 * (1.0 - a)).round() as u8;
        Rgb(mix(self.0), mix(self.1), mix(self.2))
    }
}

/// matplotlib's default "tab10" color cycle.
pub const COLOR_CYCLE: [Rgb; 10] = [
    Rgb(31, 119, 180),
    Rgb(255, 127, 14),
    Rgb(44, 160, 44),
    Rgb(214, 39, 40),
    Rgb(148, 103, 189),
    Rgb(140, 86, 75),
    Rgb(227, 119, 194),
    Rgb(127, 127, 127),
    Rgb(188, 189, 34),
    Rgb(23, 190, 207),
];

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb(0, 0, 0)),
    ("white", Rgb(255, 255, 255)),
    ("red", Rgb(255, 0, 0)),
    ("green", Rgb(0, 128, 0)),
    ("blue", Rgb(0, 0, 255)),
    ("yellow", Rgb(255, 255, 0)),
    ("cyan", Rgb(0, 255, 255)),
    ("magenta", Rgb(255, 0, 255)),
    ("orange", Rgb(255, 165, 0)),
    ("purple", Rgb(128, 0, 128)),
    ("pink", Rgb(255, 192, 203)),
    ("brown", Rgb(165, 42, 42)),
    ("gray", Rgb(128, 128, 128)),
    ("grey", Rgb(128, 128, 128)),
    ("lightgray", Rgb(211, 211, 211)),
    ("lightgrey", Rgb(211, 211, 211)),
    ("darkgray", Rgb(169, 169, 169)),
    ("darkgrey", Rgb(169, 169, 169)),
    ("navy", Rgb(0, 0, 128)),
    ("teal", Rgb(0, 128, 128)),
    ("olive", Rgb(128, 128, 0)),
    ("maroon", Rgb(128, 0, 0)),
    ("lime", Rgb(0, 255, 0)),
    ("gold", Rgb(255, 215, 0)),
    ("coral", Rgb(255, 127, 80)),
    ("salmon", Rgb(250, 128, 114)),
    ("crimson", Rgb(220, 20, 60)),
    ("indigo", Rgb(75, 0, 130)),
    ("violet", Rgb(238, 130, 238)),
    ("turquoise", Rgb(64, 224, 208)),
    ("skyblue", Rgb(135, 206, 235)),
    ("steelblue", Rgb(70, 130, 180)),
    ("darkblue", Rgb(0, 0, 139)),
    ("darkgreen", Rgb(0, 100, 0)),
    ("darkred", Rgb(139, 0, 0)),
    ("darkorange", Rgb(255, 140, 0)),
    ("lightblue", Rgb(173, 216, 230)),
    ("lightgreen", Rgb(144, 238, 144)),
    ("seagreen", Rgb(46, 139, 87)),
    ("tomato", Rgb(255, 99, 71)),
    ("orchid", Rgb(218, 112, 214)),
    ("tan", Rgb(210, 180, 140)),
];

/// Resolve a matplotlib color spec: names, `tab:` names, hex, single letters
/// and `C0`..`C9`.
pub fn parse_color(spec: &str) -> Option<Rgb> {
    let spec = spec.trim().to_ascii_lowercase();

    if let Some(hex) = spec.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(idx) = spec.strip_prefix('c').and_then(|d| d.parse::<usize>().ok()) {
        return Some(COLOR_CYCLE[idx % COLOR_CYCLE.len()]);
    }
    if let Some(name) = spec.strip_prefix("tab:") {
        const TAB_NAMES: [&str; 10] = [
            "blue", "orange", "green", "red", "purple", "brown", "pink", "gray", "olive", "cyan",
        ];
        return TAB_NAMES
            .iter()
            .position(|n| *n == name || (name == "grey" && *n == "gray"))
            .map(|i| COLOR_CYCLE[i]);
    }
    if let Some(c) = single_letter_color(&spec) {
        return Some(c);
    }
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == spec)
        .map(|(_, c)| *c)
}

fn single_letter_color(spec: &str) -> Option<Rgb> {
    Some(match spec {
        "b" => Rgb(0, 0, 255),
        "g" => Rgb(0, 128, 0),
        "r" => Rgb(255, 0, 0),
        "c" => Rgb(0, 191, 191),
        "m" => Rgb(191, 0, 191),
        "y" => Rgb(191, 191, 0),
        "k" => Rgb(0, 0, 0),
        "w" => Rgb(255, 255, 255),
        _ => return None,
    })
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 | 8 => Some(Rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgb(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
    DashDot,
    /// Markers only.
    Hidden,
}

impl LineStyle {
    pub fn parse(spec: &str) -> Option<LineStyle> {
        Some(match spec {
            "-" | "solid" => LineStyle::Solid,
            "--" | "dashed" => LineStyle::Dashed,
            ":" | "dotted" => LineStyle::Dotted,
            "-." | "dashdot" => LineStyle::DashDot,
            "" | " " | "none" | "None" => LineStyle::Hidden,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Hidden,
    Circle,
    Point,
    Square,
    Triangle,
    TriangleDown,
    Diamond,
    Cross,
    Plus,
    Star,
}

impl Marker {
    pub fn parse(spec: &str) -> Option<Marker> {
        let mut chars = spec.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return match spec {
                "" | "none" | "None" => Some(Marker::Hidden),
                _ => None,
            };
        };
        Self::from_char(c)
    }

    fn from_char(c: char) -> Option<Marker> {
        Some(match c {
            'o' => Marker::Circle,
            '.' | ',' => Marker::Point,
            's' => Marker::Square,
            '^' => Marker::Triangle,
            'v' => Marker::TriangleDown,
            'd' | 'D' => Marker::Diamond,
            'x' | 'X' => Marker::Cross,
            '+' | 'P' => Marker::Plus,
            '*' => Marker::Star,
            _ => return None,
        })
    }
}

/// A parsed `plot` format string such as `"r--"` or `"o-"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatSpec {
    pub color: Option<Rgb>,
    pub marker: Option<Marker>,
    pub line: Option<LineStyle>,
}

impl FormatSpec {
    pub fn parse(fmt: &str) -> Option<FormatSpec> {
        let mut spec = FormatSpec::default();
        let mut rest = fmt;

        while !rest.is_empty() {
            if let Some(style) = ["--", "-.", "-", ":"]
                .iter()
                .find(|s| rest.starts_with(**s))
            {
                spec.line = LineStyle::parse(style);
                rest = &rest[style.len()..];
                continue;
            }
            let mut chars = rest.chars();
            let c = chars.next()?;
            if let Some(color) = single_letter_color(&c.to_string()) {
                spec.color = Some(color);
            } else if let Some(marker) = Marker::from_char(c) {
                spec.marker = Some(marker);
            } else {
                return None;
            }
            rest = chars.as_str();
        }

        if spec.marker.is_some() && spec.line.is_none() {
            spec.line = Some(LineStyle::Hidden);
        }
        Some(spec)
    }
}

/// Something drawn inside the axes.
#[derive(Debug, Clone, PartialEq)]
pub enum Artist {
    Line {
        xs: Vec<f64>,
        ys: Vec<f64>,
        color: Rgb,
        width: f64,
        style: LineStyle,
        marker: Marker,
        label: Option<String>,
    },
    Scatter {
        xs: Vec<f64>,
        ys: Vec<f64>,
        /// Marker areas in points squared, one per point or a single shared value.
        sizes: Vec<f64>,
        /// One per point or a single shared color.
        colors: Vec<Rgb>,
        marker: Marker,
        alpha: f64,
        label: Option<String>,
    },
    Bars {
        positions: Vec<f64>,
        lengths: Vec<f64>,
        /// Bars start here (stacked bars).
        bases: Vec<f64>,
        thickness: f64,
        colors: Vec<Rgb>,
        horizontal: bool,
        alpha: f64,
        label: Option<String>,
    },
    Area {
        xs: Vec<f64>,
        upper: Vec<f64>,
        lower: Vec<f64>,
        color: Rgb,
        alpha: f64,
        label: Option<String>,
    },
    HLine {
        y: f64,
        color: Rgb,
        style: LineStyle,
        width: f64,
    },
    VLine {
        x: f64,
        color: Rgb,
        style: LineStyle,
        width: f64,
    },
    Pie {
        values: Vec<f64>,
        labels: Vec<String>,
        colors: Vec<Rgb>,
        /// Text drawn inside each wedge, already formatted.
        wedge_text: Vec<String>,
        start_angle: f64,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: Rgb,
    },
}

impl Artist {
    pub fn label(&self) -> Option<&str> {
        match self {
            Artist::Line { label, .. }
            | Artist::Scatter { label, .. }
            | Artist::Bars { label, .. }
            | Artist::Area { label, .. } => label.as_deref(),
            _ => None,
        }
    }

    /// Representative color for a legend swatch.
    pub fn legend_color(&self) -> Option<Rgb> {
        match self {
            Artist::Line { color, .. } | Artist::Area { color, .. } => Some(*color),
            Artist::Scatter { colors, .. } | Artist::Bars { colors, .. } => colors.first().copied(),
            _ => None,
        }
    }
}

/// The single set of axes a figure carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Axes {
    pub artists: Vec<Artist>,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
    pub grid: bool,
    pub legend: bool,
    /// Labels of a categorical x axis, in position order.
    pub x_categories: Vec<String>,
    /// Labels of a categorical y axis, in position order.
    pub y_categories: Vec<String>,
    /// Explicit x tick positions and labels from `xticks`.
    pub xticks: Option<Vec<(f64, String)>>,
    /// Explicit y tick positions and labels from `yticks`.
    pub yticks: Option<Vec<(f64, String)>>,
    /// Pie charts hide the cartesian frame.
    pub frameless: bool,
}

impl Axes {
    /// Position of a category label, appending it if new.
    pub fn category_position(&mut self, label: &str, vertical: bool) -> f64 {
        let categories = if vertical {
            &mut self.y_categories
        } else {
            &mut self.x_categories
        };
        match categories.iter().position(|c| c == label) {
            Some(idx) => idx as f64,
            None => {
                categories.push(label.to_string());
                (categories.len() - 1) as f64
            }
        }
    }
}

/// Default figure size in inches and resolution, as matplotlib's.
pub const DEFAULT_FIGSIZE: (f64, f64) = (10.0, 6.0);
pub const DEFAULT_DPI: f64 = 100.0;

/// The drawing surface of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: f64,
    pub suptitle: Option<String>,
    pub axes: Axes,
    cycle: usize,
}

impl Default for Figure {
    fn default() -> Self {
        Self::new()
    }
}

impl Figure {
    pub fn new() -> Self {
        Self {
            width_in: DEFAULT_FIGSIZE.0,
            height_in: DEFAULT_FIGSIZE.1,
            dpi: DEFAULT_DPI,
            suptitle: None,
            axes: Axes::default(),
            cycle: 0,
        }
    }

    /// Whether nothing has been drawn. Titles and labels alone don't count.
    pub fn is_empty(&self) -> bool {
        self.axes.artists.is_empty()
    }

    /// Reset to a blank figure, keeping nothing.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Next color of the default cycle.
    pub fn next_color(&mut self) -> Rgb {
        let color = COLOR_CYCLE[self.cycle % COLOR_CYCLE.len()];
        self.cycle += 1;
        color
    }

    /// Raster size in pixels, scaled down to fit within the bounds while
    /// keeping the aspect ratio.
    pub fn pixel_size(&self, max_width: u32, max_height: u32) -> (u32, u32) {
        let width = (self.width_in * self.dpi).max(1.0);
        let height = (self.height_in * self.dpi).max(1.0);
        let scale = (max_width as f64 / width)
            .min(max_height as f64 / height)
            .min(1.0);
        let w = (width * scale).round().clamp(1.0, max_width as f64) as u32;
        let h = (height * scale).round().clamp(1.0, max_height as f64) as u32;
        (w, h)
    }

    pub fn push(&mut self, artist: Artist) {
        self.axes.artists.push(artist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("red"), Some(Rgb(255, 0, 0)));
        assert_eq!(parse_color("#1f77b4"), Some(COLOR_CYCLE[0]));
        assert_eq!(parse_color("#fff"), Some(Rgb::WHITE));
        assert_eq!(parse_color("C1"), Some(COLOR_CYCLE[1]));
        assert_eq!(parse_color("tab:green"), Some(COLOR_CYCLE[2]));
        assert_eq!(parse_color("k"), Some(Rgb::BLACK));
        assert_eq!(parse_color("SkyBlue"), Some(Rgb(135, 206, 235)));
        assert_eq!(parse_color("not-a-color"), None);
    }

    #[test]
    fn test_format_spec() {
        let spec = FormatSpec::parse("r--").unwrap();
        assert_eq!(spec.color, Some(Rgb(255, 0, 0)));
        assert_eq!(spec.line, Some(LineStyle::Dashed));
        assert_eq!(spec.marker, None);

        let spec = FormatSpec::parse("o").unwrap();
        assert_eq!(spec.marker, Some(Marker::Circle));
        assert_eq!(spec.line, Some(LineStyle::Hidden));

        let spec = FormatSpec::parse("go-").unwrap();
        assert_eq!(spec.line, Some(LineStyle::Solid));
        assert_eq!(spec.marker, Some(Marker::Circle));

        assert!(FormatSpec::parse("zz").is_none());
    }

    #[test]
    fn test_pixel_size_default_and_clamped() {
        let fig = Figure::new();
        assert_eq!(fig.pixel_size(1600, 1200), (1000, 600));
        assert_eq!(fig.pixel_size(500, 1200), (500, 300));

        let mut big = Figure::new();
        big.width_in = 40.0;
        big.height_in = 40.0;
        assert_eq!(big.pixel_size(1600, 1200), (1200, 1200));
    }

    #[test]
    fn test_color_cycle_advances() {
        let mut fig = Figure::new();
        assert_eq!(fig.next_color(), COLOR_CYCLE[0]);
        assert_eq!(fig.next_color(), COLOR_CYCLE[1]);
        fig.clear();
        assert_eq!(fig.next_color(), COLOR_CYCLE[0]);
    }

    #[test]
    fn test_categories_are_stable() {
        let mut axes = Axes::default();
        assert_eq!(axes.category_position("a", false), 0.0);
        assert_eq!(axes.category_position("b", false), 1.0);
        assert_eq!(axes.category_position("a", false), 0.0);
        assert_eq!(axes.x_categories, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_until_artist() {
        let mut fig = Figure::new();
        fig.axes.title = Some("t".into());
        assert!(fig.is_empty());
        fig.push(Artist::HLine { y: 0.0, color: Rgb::BLACK, style: LineStyle::Solid, width: 1.0 });
        assert!(!fig.is_empty());
    }

    #[test]
    fn test_over_white() {
        assert_eq!(Rgb(0, 0, 0).over_white(0.5), Rgb(128, 128, 128));
        assert_eq!(Rgb(10, 20, 30).over_white(1.0), Rgb(10, 20, 30));
    }
}
