//! `command`
//!
//! Builds the argument vectors passed to the drawing tool.
//!
//! Commands are always argument vectors, never shell strings. Every command starts with the
//! configured tool command and, when a plotter model is known, the `-L<n>` model flag.

use std::{
    fmt::{self, Display},
    path::Path,
    process::Command,
};

use serde::{Deserialize, Serialize};

/// Plotter model names understood by the drawing tool and their `-L` codes.
const MODEL_CODES: [(&str, u8); 10] = [
    ("AxiDraw V2, V3, or SE/A4", 1),
    ("AxiDraw V3/A3 or SE/A3", 2),
    ("AxiDraw V3 XLX", 3),
    ("AxiDraw MiniKit", 4),
    ("AxiDraw SE/A1", 5),
    ("AxiDraw SE/A2", 6),
    ("AxiDraw V3/B6", 7),
    ("Bantam Tools NextDraw™ 8511 (Default)", 8),
    ("Bantam Tools NextDraw™ 1117", 9),
    ("Bantam Tools NextDraw™ 2234", 10),
];

/// The model code used when a model name isn't recognised.
pub const DEFAULT_MODEL_CODE: u8 = 8;

/// Resolves a plotter model name to its `-L` code.
///
/// Accepts the full model name or the code itself as a string. Unknown names fall back to
/// [`DEFAULT_MODEL_CODE`].
///
/// # Returns
/// `None` if no model was given.
pub fn model_code(model: Option<&str>) -> Option<u8> {
    let model = model.filter(|model| !model.is_empty())?;

    if let Some((_, code)) = MODEL_CODES.iter().find(|(name, _)| *name == model) {
        return Some(*code);
    }
    if let Ok(code) = model.trim().parse::<u8>() {
        if (1..=10).contains(&code) {
            return Some(code);
        }
    }

    log::warn!("Unknown plotter model '{model}', defaulting to model {DEFAULT_MODEL_CODE}");
    Some(DEFAULT_MODEL_CODE)
}

/// How the tool paces pen-down motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Handling {
    /// Precise technical drawing.
    #[default]
    Technical,
    /// Faster, looser handwriting.
    Handwriting,
    /// Fastest sketching.
    Sketching,
    /// Constant speed, given by [`PlotSettings::speed`].
    ConstantSpeed,
    /// Leave the tool's own setting alone.
    ToolDefault,
}

impl Handling {
    /// The `--handling` value for this mode, `None` if no flag should be passed.
    pub fn flag_value(self) -> Option<u8> {
        match self {
            Handling::ToolDefault => None,
            mode => Some(u8::from(mode)),
        }
    }
}

impl TryFrom<u8> for Handling {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Handling::Technical),
            2 => Ok(Handling::Handwriting),
            3 => Ok(Handling::Sketching),
            4 => Ok(Handling::ConstantSpeed),
            5 => Ok(Handling::ToolDefault),
            _ => Err(format!("handling mode must be between 1 and 5, got {value}")),
        }
    }
}

impl From<Handling> for u8 {
    fn from(value: Handling) -> Self {
        match value {
            Handling::Technical => 1,
            Handling::Handwriting => 2,
            Handling::Sketching => 3,
            Handling::ConstantSpeed => 4,
            Handling::ToolDefault => 5,
        }
    }
}

/// Page sizes that designs can be centred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    /// ISO A3.
    A3,
    /// ISO A4.
    A4,
    /// ISO A5.
    #[default]
    A5,
    /// ISO A6.
    A6,
}

impl PageSize {
    /// Reads a page size name, falling back to A5 for anything unrecognised.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "a3" => PageSize::A3,
            "a4" => PageSize::A4,
            "a6" => PageSize::A6,
            _ => PageSize::A5,
        }
    }

    /// The name passed to the page centering utility.
    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A3 => "a3",
            PageSize::A4 => "a4",
            PageSize::A5 => "a5",
            PageSize::A6 => "a6",
        }
    }
}

impl Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for a single plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    /// Page the design is centred on.
    pub page: String,
    /// Pen-down speed, percent of maximum.
    pub speed_down: u32,
    /// Pen-up speed, percent of maximum.
    pub speed_up: u32,
    /// Pen-down height, percent.
    pub pen_down: u32,
    /// Pen-up height, percent.
    pub pen_up: u32,
    /// Handling mode.
    pub handling: Handling,
    /// Speed used by [`Handling::ConstantSpeed`].
    pub speed: u32,
    /// Pen-lift mode, only 1, 2 and 3 are passed on.
    pub pen_lift: Option<u8>,
    /// Skip homing at the end of the plot.
    pub no_homing: bool,
    /// Plotter model name.
    pub model: Option<String>,
    /// Only plot this layer.
    pub layer: Option<String>,
}

impl Default for PlotSettings {
    fn default() -> Self {
        PlotSettings {
            page: PageSize::default().as_str().to_string(),
            speed_down: 30,
            speed_up: 70,
            pen_down: 40,
            pen_up: 70,
            handling: Handling::default(),
            speed: 70,
            pen_lift: None,
            no_homing: false,
            model: None,
            layer: None,
        }
    }
}

impl PlotSettings {
    /// The page size to centre the design on.
    pub fn page_size(&self) -> PageSize {
        PageSize::from_name(&self.page)
    }

    /// The pen-lift mode, if it is one the tool accepts.
    pub fn valid_pen_lift(&self) -> Option<u8> {
        self.pen_lift.filter(|mode| (1..=3).contains(mode))
    }
}

/// An argument vector for the drawing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Program followed by its arguments.
    args: Vec<String>,
}

impl ToolCommand {
    /// Starts a command from the configured tool command and an optional model code.
    ///
    /// # Arguments
    /// * `base`: The tool program, possibly followed by fixed arguments.
    /// * `model_code`: Adds `-L<code>` if present.
    pub fn new(base: &[String], model_code: Option<u8>) -> Self {
        let mut args = base.to_vec();
        if let Some(code) = model_code {
            args.push(format!("-L{code}"));
        }
        ToolCommand { args }
    }

    /// Appends an argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a flag followed by its value.
    pub fn flag(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(value.to_string());
        self
    }

    /// The program and its arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The program being run.
    pub fn program(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }

    /// Creates a [`Command`] for this argument vector.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(self.program());
        command.args(self.args.iter().skip(1));
        command
    }

    /// Appends the handling and pen-lift flags shared by plots and previews.
    fn pacing(&mut self, settings: &PlotSettings) -> &mut Self {
        if let Some(handling) = settings.handling.flag_value() {
            self.flag("--handling", handling);
            if settings.handling == Handling::ConstantSpeed {
                self.flag("-s", settings.speed);
            }
        }
        if let Some(pen_lift) = settings.valid_pen_lift() {
            self.flag("--penlift", pen_lift);
        }
        self
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Builds the command that plots a design.
///
/// # Arguments
/// * `base`: The tool program, possibly followed by fixed arguments.
/// * `svg`: The design to plot.
/// * `settings`: Plot settings.
pub fn plot_command(base: &[String], svg: &Path, settings: &PlotSettings) -> ToolCommand {
    let mut command = ToolCommand::new(base, model_code(settings.model.as_deref()));
    command
        .arg(svg.to_string_lossy())
        .flag("--speed_pendown", settings.speed_down)
        .flag("--speed_penup", settings.speed_up)
        .flag("--pen_pos_down", settings.pen_down)
        .flag("--pen_pos_up", settings.pen_up)
        .arg("--progress")
        .pacing(settings);
    if settings.no_homing {
        command.arg("--no_homing");
    }
    if let Some(layer) = settings.layer.as_deref().filter(|layer| !layer.is_empty()) {
        command.flag("--layer", layer);
    }
    command
}

/// Builds the command that estimates plot time and distance without moving the plotter.
pub fn preview_command(
    base: &[String],
    svg: &Path,
    settings: &PlotSettings,
    model: Option<&str>,
) -> ToolCommand {
    let mut command = ToolCommand::new(base, model_code(model));
    command
        .arg(svg.to_string_lossy())
        .arg("--preview")
        .arg("--report_time")
        .pacing(settings);
    command
}

/// One-shot commands run in the tool's utility mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UtilityCommand {
    /// Raise the pen.
    RaisePen,
    /// Lower the pen.
    LowerPen,
    /// Toggle the pen between up and down.
    TogglePen,
    /// Energise the XY motors.
    EnableMotors,
    /// Release the XY motors.
    DisableMotors,
    /// Move back to the home position.
    WalkHome,
    /// Jog along X by this many mm.
    WalkX(f64),
    /// Jog along Y by this many mm.
    WalkY(f64),
}

impl UtilityCommand {
    /// The name of the utility command.
    pub fn name(self) -> &'static str {
        match self {
            UtilityCommand::RaisePen => "raise_pen",
            UtilityCommand::LowerPen => "lower_pen",
            UtilityCommand::TogglePen => "toggle",
            UtilityCommand::EnableMotors => "enable_xy",
            UtilityCommand::DisableMotors => "disable_xy",
            UtilityCommand::WalkHome => "walk_home",
            UtilityCommand::WalkX(_) => "walk_mmx",
            UtilityCommand::WalkY(_) => "walk_mmy",
        }
    }

    /// Builds the argument vector for this command.
    pub fn command(self, base: &[String], model_code: Option<u8>) -> ToolCommand {
        let mut command = ToolCommand::new(base, model_code);
        command.flag("-m", "utility").flag("-M", self.name());
        if let UtilityCommand::WalkX(distance) | UtilityCommand::WalkY(distance) = self {
            command.flag("--dist", distance);
        }
        command
    }
}

/// Commands run in the tool's manual mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualCommand {
    /// Raise the pen.
    RaisePen,
    /// Energise the XY motors.
    EnableMotors,
    /// Release the XY motors.
    DisableMotors,
    /// Move to an absolute position, in mm.
    MoveTo {
        /// Horizontal position.
        x: f64,
        /// Vertical position.
        y: f64,
    },
}

impl Display for ManualCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualCommand::RaisePen => f.write_str("raise_pen"),
            ManualCommand::EnableMotors => f.write_str("enable_xy"),
            ManualCommand::DisableMotors => f.write_str("disable_xy"),
            ManualCommand::MoveTo { x, y } => write!(f, "move_to {x:.2} {y:.2}"),
        }
    }
}

impl ManualCommand {
    /// Builds the argument vector for this command.
    pub fn command(self, base: &[String], model_code: Option<u8>) -> ToolCommand {
        let mut command = ToolCommand::new(base, model_code);
        command
            .flag("--mode", "manual")
            .flag("--manual_cmd", self);
        command
    }
}

/// Works out whether the pen ended up raised or lowered from the output of a toggle.
///
/// # Returns
/// `"up"` or `"down"` when the output mentions the pen and exactly one of the two states.
pub fn infer_pen_state(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    if !lowered.contains("pen") {
        return None;
    }
    match (lowered.contains("up"), lowered.contains("down")) {
        (false, true) => Some("down"),
        (true, false) => Some("up"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn base() -> Vec<String> {
        vec!["nextdraw".to_string()]
    }

    #[test]
    fn test_model_code() {
        assert_eq!(model_code(None), None, "no model");
        assert_eq!(model_code(Some("")), None, "empty model");
        assert_eq!(model_code(Some("AxiDraw MiniKit")), Some(4), "by name");
        assert_eq!(model_code(Some("10")), Some(10), "by code");
        assert_eq!(model_code(Some("11")), Some(DEFAULT_MODEL_CODE), "code out of range");
        assert_eq!(model_code(Some("Etch A Sketch")), Some(DEFAULT_MODEL_CODE), "unknown");
    }

    #[test]
    fn test_handling_from_number() {
        assert_eq!(Handling::try_from(4), Ok(Handling::ConstantSpeed));
        assert!(Handling::try_from(0).is_err());
        assert!(Handling::try_from(6).is_err());
        assert_eq!(Handling::ToolDefault.flag_value(), None);
        assert_eq!(Handling::Sketching.flag_value(), Some(3));
    }

    #[test]
    fn test_page_size_from_name() {
        assert_eq!(PageSize::from_name("A4"), PageSize::A4);
        assert_eq!(PageSize::from_name("letter"), PageSize::A5);
        assert_eq!(PageSize::from_name(""), PageSize::A5);
    }

    #[test]
    fn test_plot_command_defaults() {
        let settings = PlotSettings {
            model: Some("AxiDraw V3/B6".to_string()),
            ..PlotSettings::default()
        };
        let command = plot_command(&base(), &PathBuf::from("/tmp/logo.svg"), &settings);
        assert_eq!(
            command.to_string(),
            "nextdraw -L7 /tmp/logo.svg --speed_pendown 30 --speed_penup 70 \
             --pen_pos_down 40 --pen_pos_up 70 --progress --handling 1"
        );
    }

    #[test]
    fn test_plot_command_options() {
        let settings = PlotSettings {
            handling: Handling::ConstantSpeed,
            speed: 55,
            pen_lift: Some(3),
            no_homing: true,
            layer: Some("2".to_string()),
            ..PlotSettings::default()
        };
        let command = plot_command(&base(), &PathBuf::from("a.svg"), &settings);
        assert_eq!(
            &command.args()[11..],
            ["--handling", "4", "-s", "55", "--penlift", "3", "--no_homing", "--layer", "2"]
        );
    }

    #[test]
    fn test_plot_command_skips_tool_default_handling_and_bad_pen_lift() {
        let settings = PlotSettings {
            handling: Handling::ToolDefault,
            pen_lift: Some(7),
            ..PlotSettings::default()
        };
        let command = plot_command(&base(), &PathBuf::from("a.svg"), &settings);
        assert_eq!(command.args().last().map(String::as_str), Some("--progress"));
        assert_eq!(command.program(), "nextdraw");
    }

    #[test]
    fn test_utility_and_manual_commands() {
        assert_eq!(
            UtilityCommand::WalkX(12.5).command(&base(), Some(8)).to_string(),
            "nextdraw -L8 -m utility -M walk_mmx --dist 12.5"
        );
        assert_eq!(
            UtilityCommand::TogglePen.command(&base(), None).to_string(),
            "nextdraw -m utility -M toggle"
        );
        assert_eq!(
            ManualCommand::MoveTo { x: 10.0, y: 5.126 }
                .command(&base(), Some(2))
                .args(),
            ["nextdraw", "-L2", "--mode", "manual", "--manual_cmd", "move_to 10.00 5.13"]
        );
    }

    #[test]
    fn test_infer_pen_state() {
        assert_eq!(infer_pen_state("Pen is now up"), Some("up"));
        assert_eq!(infer_pen_state("pen lowered: down"), Some("down"));
        assert_eq!(infer_pen_state("Pen up then down"), None);
        assert_eq!(infer_pen_state("toggled"), None);
    }
}
