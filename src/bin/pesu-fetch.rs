//! PESU Academy downloader CLI
//!
//! Interactive by default; every prompt can be answered up front with a flag
//! or its environment variable.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::builder::styling::AnsiColor;
use clap::builder::Styles;
use clap::Parser;
use colored::Colorize;

use pesu_fetch::config::{load_dotenv, Credentials, PortalConfig};
use pesu_fetch::convert::ConverterChain;
use pesu_fetch::error::is_authentication;
use pesu_fetch::logging::init_logging;
use pesu_fetch::model::slugify;
use pesu_fetch::pipeline::{process_selection, PipelineOptions};
use pesu_fetch::portal::catalog::write_catalog_json;
use pesu_fetch::portal::{filter_by_year, Portal, PortalSession};
use pesu_fetch::report::{print_run_summary, print_unit_report};
use pesu_fetch::select::{choose_years, run_selection, Presets, Terminal};

/// Exit status for a rejected login
const EXIT_AUTH: i32 = 2;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
        .valid(AnsiColor::Cyan.on_default())
}

/// Download PESU Academy course resources as one PDF per unit
#[derive(Parser)]
#[command(name = "pesu-fetch")]
#[command(author, version, about, long_about = None)]
#[command(styles = cli_styles())]
#[command(after_help = "ENVIRONMENT:
    SRN / PESU_USERNAME, PASSWORD / PESU_PASSWORD   credentials (also read from .env)
    PESU_BASE_URL                                   portal root
    PESU_CONVERTER                                  office | unoserver | libreoffice
    SOFFICE_PATH                                    LibreOffice binary

EXAMPLES:
    # Pick everything interactively
    pesu-fetch

    # Slides and notes of units 1-2 of one course
    pesu-fetch --year UE23 --course UE23CS341A --units 1-2 --resources 2,3")]
struct Cli {
    /// Root directory for downloads
    #[arg(short, long, env = "PESU_OUTPUT_DIR", default_value = "downloads")]
    output_dir: PathBuf,

    /// Academic batch to list (UE23, 2023, or "all")
    #[arg(long, env = "PESU_YEAR")]
    year: Option<String>,

    /// Course by subject code or menu number
    #[arg(long, env = "PESU_COURSE", value_name = "CODE|NUMBER")]
    course: Option<String>,

    /// Units to fetch: "all", "1,3" or "1-3"
    #[arg(long, env = "PESU_UNITS", value_name = "LIST|all")]
    units: Option<String>,

    /// Resource types by portal id (2=Slides ... 8=References) or "all"
    #[arg(long, env = "PESU_RESOURCES", value_name = "LIST|all")]
    resources: Option<String>,

    /// One combined PDF per resource type instead of one per unit
    #[arg(long, env = "PESU_BY_KIND")]
    by_kind: bool,

    /// Keep the per-resource PDFs after merging
    #[arg(long, env = "PESU_KEEP_INTERMEDIATES")]
    keep_intermediates: bool,

    /// Also write the filtered course list as JSON
    #[arg(long, value_name = "PATH")]
    catalog_json: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenv.log();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let auth_failed = e.chain().any(is_authentication);
        process::exit(if auth_failed { EXIT_AUTH } else { 1 });
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PortalConfig::from_env();
    let credentials = Credentials::load_or_prompt().context("reading credentials")?;

    eprintln!("[1/4] Logging in as {}...", credentials.srn);
    let mut session = PortalSession::login(&config, credentials)?;

    eprintln!("[2/4] Loading course catalog...");
    let catalog = session.list_courses().context("listing courses")?;
    let presets = Presets {
        year: cli.year,
        course: cli.course,
        units: cli.units,
        kinds: cli.resources,
    };
    let mut terminal = Terminal;
    let years = choose_years(&mut terminal, &presets)?;
    let courses = filter_by_year(&catalog, &years);
    if courses.is_empty() {
        println!("{}", "No courses found for the selected year.".yellow());
        return Ok(());
    }
    println!("{} {} course(s)", "Found".green(), courses.len());

    if let Some(path) = &cli.catalog_json {
        write_catalog_json(&courses, path)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    eprintln!("[3/4] Selecting course...");
    let Some(selection) = run_selection(&mut session, &courses, &mut terminal, &presets)? else {
        println!("{}", "No course selected.".yellow());
        return Ok(());
    };

    eprintln!("[4/4] Downloading {} unit(s)...", selection.units.len());
    let converter = ConverterChain::probe();
    if converter.is_empty() {
        eprintln!(
            "{} no PDF converter found; office files will be kept as downloaded",
            "Warning:".yellow()
        );
    } else {
        eprintln!("Converters: {}", converter.backend_names().join(", "));
    }
    let options = PipelineOptions {
        output_dir: cli.output_dir,
        by_kind: cli.by_kind,
        keep_intermediates: cli.keep_intermediates,
        download_attempts: config.download_attempts,
    };
    let reports = process_selection(&mut session, &converter, &selection, &options, print_unit_report)
        .context("processing units")?;

    let location = options.output_dir.join(slugify(&selection.course.code, 40));
    print_run_summary(&reports, &location);
    Ok(())
}
