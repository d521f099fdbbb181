use std::{
    io,
    net::{SocketAddr, TcpStream},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum as _};
use deltabot_geom::{Point, Unit};
use deltabot_planner::MotionPlan;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use reedline::{DefaultPrompt, DefaultPromptSegment, Prompt, Reedline, Signal};

use deltabot_feeder::{
    connection::TcpChannel,
    drawings::Builtin,
    preview,
    session::{DrawingBot, ErrorCode, OnUnreachable, RunError},
    settings::Settings,
    stream::{Confirm, Outcome, StreamReport},
    supervisor::BridgeSupervisor,
};

const TICK: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(version, about = "Plans drawings and streams them to the delta drawing bot")]
struct Args {
    /// Settings file (JSON). Flags given here take precedence over it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Unit for drawing coordinates: m, cm or mm.
    #[arg(long)]
    unit: Option<String>,
    /// Pen speed, in units per second.
    #[arg(long)]
    speed: Option<f64>,
    /// Where the serial bridge listens.
    #[arg(long)]
    bridge: Option<SocketAddr>,
    /// Don't start the serial bridge automatically.
    #[arg(long)]
    no_autostart: bool,
    /// Draw without asking for confirmation first.
    #[arg(short, long)]
    yes: bool,
    #[arg(long, value_enum)]
    on_unreachable: Option<OnUnreachable>,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Draw one of the built-in drawings.
    Draw {
        #[arg(value_enum)]
        name: Builtin,
        /// Save a preview here before drawing.
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Move the pen to a point.
    Move {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },
    /// Save a picture of a built-in drawing, without drawing it.
    Preview {
        #[arg(value_enum)]
        name: Builtin,
        out: PathBuf,
    },
    /// Save a map of the points the arm can reach.
    Domain { out: PathBuf },
    /// Restart the bridge, which also restarts the bot.
    Reset,
}

#[derive(Debug)]
enum Error {
    Exit,
    Err(anyhow::Error),
}

impl<E> From<E> for Error
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Error::Err(e.into())
    }
}

type Result<T> = std::result::Result<T, Error>;

fn string_prompt(s: &str) -> DefaultPrompt {
    DefaultPrompt::new(
        DefaultPromptSegment::Basic(s.to_owned()),
        DefaultPromptSegment::Empty,
    )
}

struct Terminal {
    reed: Reedline,
}

impl Terminal {
    fn read(&mut self, prompt: &dyn Prompt) -> Result<String> {
        match self.reed.read_line(prompt)? {
            Signal::Success(s) => Ok(s),
            Signal::CtrlC | Signal::CtrlD => Err(Error::Exit),
        }
    }
}

impl Confirm for Terminal {
    fn confirm(&mut self, question: &str) -> bool {
        match self.read(&string_prompt(&format!("{question} [y/N]"))) {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(Error::Exit) => false,
            Err(Error::Err(e)) => {
                log::warn!("couldn't read an answer: {e}");
                false
            }
        }
    }
}

fn log_error(code: ErrorCode, msg: impl std::fmt::Display) {
    log::error!("*** ERROR {}: {msg}", code as u8);
}

fn log_report(report: &StreamReport) {
    match report.outcome {
        Outcome::Completed if report.failed == 0 => {
            log::info!("drawing finished, sent {} commands", report.sent)
        }
        Outcome::Completed => log::warn!(
            "drawing finished, but {} of {} commands were lost",
            report.failed,
            report.sent + report.failed
        ),
        Outcome::Declined => {}
        Outcome::Interrupted => log_error(
            ErrorCode::Communication,
            format_args!(
                "lost the connection to the bridge, {} commands were never sent",
                report.skipped
            ),
        ),
    }
}

fn connect(settings: &Settings, bridge: &mut BridgeSupervisor) -> io::Result<TcpChannel> {
    if settings.autostart_bridge {
        if let Err(e) = bridge.ensure_started() {
            log::warn!("couldn't start the bridge: {e}");
        }
    }

    let bar = ProgressBar::new_spinner().with_message("Waiting for the bridge...");
    bar.enable_steady_tick(TICK);
    let channel = TcpChannel::connect(settings.connect_options());
    match &channel {
        Ok(_) => bar.finish_with_message("connected!"),
        Err(_) => bar.abandon_with_message("failed"),
    }
    channel
}

fn save_svg(path: &Path, doc: &svg::Document) -> anyhow::Result<()> {
    svg::save(path, doc)?;
    log::info!("saved {}", path.display());
    Ok(())
}

struct App {
    settings: Settings,
    bot: DrawingBot,
    bridge: BridgeSupervisor,
    terminal: Terminal,
}

impl App {
    fn new(settings: Settings) -> anyhow::Result<App> {
        let bridge = BridgeSupervisor::new(BridgeSupervisor::locate()?, settings.bridge_args());
        Ok(App {
            bot: DrawingBot::new(&settings),
            settings,
            bridge,
            terminal: Terminal {
                reed: Reedline::create(),
            },
        })
    }

    fn unit(&self) -> Unit {
        self.settings.unit
    }

    fn draw(
        &mut self,
        builtin: Builtin,
        preview_to: Option<&Path>,
    ) -> anyhow::Result<Option<ErrorCode>> {
        for shape in builtin.shapes(self.unit())? {
            self.bot.add_shape(shape);
        }
        if let Some(path) = preview_to {
            save_svg(path, &preview::render(&self.bot.plan(), self.unit())?)?;
        }

        let bar = ProgressBar::new(0).with_style(ProgressStyle::with_template(
            "{spinner} [{bar:40}] {pos}/{len} commands ({eta})",
        )?);
        self.bot.set_progress(bar);

        let settings = &self.settings;
        let bridge = &mut self.bridge;
        let result = self
            .bot
            .execute(|| connect(settings, bridge), &mut self.terminal);
        Ok(self.finish(result))
    }

    fn move_to(&mut self, x: f64, y: f64) -> Option<ErrorCode> {
        let settings = &self.settings;
        let bridge = &mut self.bridge;
        let result = self
            .bot
            .move_to(Point::new(x, y), || connect(settings, bridge));
        self.finish(result)
    }

    fn finish(
        &mut self,
        result: std::result::Result<StreamReport, RunError>,
    ) -> Option<ErrorCode> {
        self.bot.set_progress(ProgressBar::hidden());
        match result {
            Ok(report) => {
                log_report(&report);
                (report.outcome == Outcome::Interrupted).then_some(ErrorCode::Communication)
            }
            Err(e) => {
                log_error(e.code(), &e);
                if let Some(source) = std::error::Error::source(&e) {
                    log::debug!("caused by: {source}");
                }
                Some(e.code())
            }
        }
    }

    fn preview(&self, builtin: Builtin, out: &Path) -> anyhow::Result<()> {
        let shapes = builtin.shapes(self.unit())?;
        let plan = MotionPlan::plan(&shapes, &self.settings.planner());
        save_svg(out, &preview::render(&plan, self.unit())?)
    }

    fn domain(&self, out: &Path) -> anyhow::Result<()> {
        save_svg(out, &preview::render_domain(&self.settings.geometry, self.unit())?)
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        if !self.bridge.is_running() && TcpStream::connect(self.settings.bridge_addr).is_ok() {
            log::warn!(
                "a bridge that we didn't start is listening at {}, it needs to be stopped by hand",
                self.settings.bridge_addr
            );
        }
        self.bridge.hard_reset()?;
        log::info!("bridge restarted, the drawing bot is resetting");
        Ok(())
    }

    fn run(&mut self, cmd: Command) -> anyhow::Result<Option<ErrorCode>> {
        match cmd {
            Command::Draw { name, preview } => return self.draw(name, preview.as_deref()),
            Command::Move { x, y } => return Ok(self.move_to(x, y)),
            Command::Preview { name, out } => self.preview(name, &out)?,
            Command::Domain { out } => self.domain(&out)?,
            Command::Reset => self.reset()?,
        }
        Ok(None)
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let builtin = |name: &str| {
            Builtin::from_str(name, true).map_err(|_| {
                let names: Vec<_> = Builtin::value_variants()
                    .iter()
                    .filter_map(|b| b.to_possible_value())
                    .map(|v| v.get_name().to_owned())
                    .collect();
                anyhow!("unknown drawing \"{name}\", try one of: {}", names.join(", "))
            })
        };
        let number = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| anyhow!("expected a number, got \"{s}\""))
        };

        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => return Err(Error::Exit),
            ["draw", name] => {
                self.draw(builtin(*name)?, None)?;
            }
            ["move", x, y] => {
                self.move_to(number(*x)?, number(*y)?);
            }
            ["preview", name, out] => self.preview(builtin(*name)?, Path::new(out))?,
            ["domain", out] => self.domain(Path::new(out))?,
            ["reset"] => self.reset()?,
            _ => {
                eprintln!(
                    "commands: draw <name>, move <x> <y>, preview <name> <file>, \
                     domain <file>, reset, quit"
                );
            }
        }
        Ok(())
    }

    fn command_mode(&mut self) -> anyhow::Result<()> {
        let prompt = DefaultPrompt::default();
        loop {
            let line = match self.terminal.read(&prompt) {
                Ok(line) => line,
                Err(Error::Exit) => break,
                Err(Error::Err(e)) => return Err(e),
            };
            match self.handle_line(line.trim()) {
                Ok(()) => {}
                Err(Error::Exit) => break,
                Err(Error::Err(e)) => eprintln!("error: {e}"),
            }
        }
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            });
        }
    }
    builder.init();
}

fn settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(unit) = &args.unit {
        settings.unit = Unit::parse_or_default(unit);
    }
    if let Some(speed) = args.speed {
        settings.speed = speed;
    }
    if let Some(addr) = args.bridge {
        settings.bridge_addr = addr;
    }
    if let Some(policy) = args.on_unreachable {
        settings.on_unreachable = policy;
    }
    if args.yes {
        settings.prompt = false;
    }
    if args.no_autostart {
        settings.autostart_bridge = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut app = App::new(settings(&args)?)?;
    let code = match args.cmd {
        Some(cmd) => app.run(cmd)?,
        None => {
            app.command_mode()?;
            None
        }
    };
    Ok(code.map_or(ExitCode::SUCCESS, |c| ExitCode::from(c as u8)))
}
