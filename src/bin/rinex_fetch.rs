use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rinex_fetch::archive::HttpArchiveClient;
use rinex_fetch::config::{ConfigLoader, Settings};
use rinex_fetch::domain::{Rate, StationId};
use rinex_fetch::engine::{DayStatus, DownloadReport, Downloader};
use rinex_fetch::error::RinexError;
use rinex_fetch::output::{JsonOutput, LogSink, OutputMode};
use rinex_fetch::request::{DownloadInput, DownloadRequest, parse_flag};
use rinex_fetch::station::{JsonStationDatabase, StationDatabase};
use rinex_fetch::tools::{ConversionTools, SystemTools, ToolInfo, ToolStatus};

#[derive(Parser)]
#[command(name = "rinex-fetch")]
#[command(about = "Download and normalize daily GNSS RINEX observation files")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch observation files for a station and day range")]
    Download(DownloadArgs),
    #[command(about = "Show station coordinates from the station database")]
    Station(StationArgs),
    #[command(about = "Report which conversion executables are available")]
    Tools(ToolsArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// 4-character (RINEX 2) or 9-character (RINEX 3) station name
    station: String,
    year: i32,
    /// Month, or day of year when DAY is 0
    month: u32,
    day: u32,

    #[arg(long, value_enum, default_value_t = Rate::Low)]
    rate: Rate,

    #[arg(long)]
    archive: Option<String>,

    #[arg(long)]
    version: Option<u8>,

    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    strip: bool,

    /// Last day of year to fetch (inclusive)
    #[arg(long)]
    doy_end: Option<u32>,

    #[arg(long)]
    stream: Option<String>,

    /// Sample rate in seconds (RINEX 3 file names)
    #[arg(long = "samplerate")]
    sample_rate: Option<u32>,

    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    strip_snr: bool,

    /// Fetch again even when the observation file exists
    #[arg(long)]
    force: bool,

    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    debug: bool,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct StationArgs {
    station: String,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct ToolsArgs {
    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RinexError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RinexError) -> u8 {
    match error {
        RinexError::InvalidInput(_)
        | RinexError::InvalidYear(_)
        | RinexError::InvalidStationId { .. }
        | RinexError::UnsupportedArchive { .. }
        | RinexError::StationNotFound(_) => 2,
        RinexError::ArchiveHttp(_)
        | RinexError::ArchiveStatus { .. }
        | RinexError::MissingTool(_)
        | RinexError::Conversion(_) => 3,
        RinexError::Config(_) | RinexError::ConfigRead(_) | RinexError::ConfigParse(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Commands::Download(args) if args.debug);
    init_tracing(debug);

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Download(args) => run_download(args, output_mode),
        Commands::Station(args) => run_station(args, output_mode),
        Commands::Tools(args) => run_tools(args, output_mode),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_download(args: DownloadArgs, output_mode: OutputMode) -> miette::Result<()> {
    let settings = ConfigLoader::resolve(args.config.as_deref())?;
    let request = DownloadRequest::from_input(DownloadInput {
        station: args.station,
        year: args.year,
        month: args.month,
        day: args.day,
        rate: args.rate,
        archive: args.archive,
        version: args.version,
        strip: args.strip,
        doy_end: args.doy_end,
        stream: args.stream,
        sample_rate: args.sample_rate,
        strip_snr: args.strip_snr,
        force: args.force,
    })?;

    let archive = HttpArchiveClient::new(settings.endpoints.clone(), settings.timeout)?;
    let tools = system_tools(&settings);
    let downloader = Downloader::new(&settings, archive, tools);

    match output_mode {
        OutputMode::Interactive => {
            let report = downloader.run(&request, &LogSink)?;
            print_download_summary(&report);
        }
        OutputMode::NonInteractive => {
            let report = downloader.run(&request, &JsonOutput)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_station(args: StationArgs, output_mode: OutputMode) -> miette::Result<()> {
    let settings = ConfigLoader::resolve(args.config.as_deref())?;
    let station: StationId = args.station.parse()?;
    let path = settings.station_db.as_deref().ok_or_else(|| {
        RinexError::Config("no station database configured".to_string())
    })?;
    let database = JsonStationDatabase::load(path)?;
    let coordinates = database.require(&station)?;

    match output_mode {
        OutputMode::Interactive => {
            println!(
                "{station}: lat {:.4} lon {:.4} height {:.2} m",
                coordinates.lat, coordinates.lon, coordinates.height
            );
        }
        OutputMode::NonInteractive => {
            JsonOutput::print_station(station.as_str(), &coordinates).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_tools(args: ToolsArgs, output_mode: OutputMode) -> miette::Result<()> {
    let settings = ConfigLoader::resolve(args.config.as_deref())?;
    let tools = system_tools(&settings);
    let info = tools.tool_info();
    match output_mode {
        OutputMode::Interactive => {
            print_tool_summary(&info);
            if let ToolStatus::Missing { message } = tools.tool_status() {
                println!("\x1b[33m{message}\x1b[0m");
            }
        }
        OutputMode::NonInteractive => JsonOutput::print_tools(&info).into_diagnostic()?,
    }
    Ok(())
}

fn system_tools(settings: &Settings) -> SystemTools {
    SystemTools::new(settings.exe_dir.as_deref())
}

fn print_download_summary(report: &DownloadReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}{} RINEX {} ({} rate) from {}{reset}",
        report.station,
        report.version,
        report.rate,
        report.selection.label()
    );
    for notice in &report.notices {
        println!("{yellow}{notice}{reset}");
    }
    for day in &report.days {
        match day.status {
            DayStatus::Retrieved => println!("{green}SUCCESS: {}{reset}", day.path),
            DayStatus::Existing => {
                println!("{green}SUCCESS: {} (already present){reset}", day.path)
            }
            DayStatus::NotFound => println!("{red}FAILURE: {} was not found{reset}", day.path),
            DayStatus::ConversionFailed => {
                println!("{red}FAILURE: {} could not be converted{reset}", day.path);
                for note in &day.notes {
                    println!("{red}   {note}{reset}");
                }
            }
        }
    }
    println!(
        "{cyan}{} of {} days retrieved{reset}",
        report.succeeded(),
        report.days.len()
    );
}

fn print_tool_summary(info: &ToolInfo) {
    let tools = [
        ("CRX2RNX", &info.crx2rnx),
        ("gzip", &info.gzip),
        ("teqc", &info.teqc),
        ("gfzrnx", &info.gfzrnx),
    ];
    for (name, path) in tools {
        match path {
            Some(path) => println!("{name:<8} {path}"),
            None => println!("{name:<8} not found"),
        }
    }
}
