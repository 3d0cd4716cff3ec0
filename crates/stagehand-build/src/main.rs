use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use stagehand_build::{Build, BuildConfig};
use stagehand_stage::{ProfileLog, Profiler};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("stagehand")
        .version(stagehand_build::VERSION)
        .about("Incremental build orchestrator")
        .arg(
            Arg::new("build-dir")
                .value_name("BUILD_DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory whose subdirectories are the stages [default: .]"),
        )
        .arg(
            Arg::new("store-dir")
                .long("store-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Root of the action store [default: BUILD_DIR/.stagehand/actions]"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_parser(value_parser!(usize))
                .help("Number of worker threads [default: available cores]"),
        )
        .arg(
            Arg::new("stage-file")
                .long("stage-file")
                .help("Stage file read in every stage [default: stage.yml]"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write profiling events to FILE as YAML"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<BuildConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => BuildConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BuildConfig::new(),
    };
    if let Some(dir) = matches.get_one::<PathBuf>("build-dir") {
        config = config.with_build_dir(dir);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("store-dir") {
        config = config.with_store_dir(dir);
    }
    if let Some(jobs) = matches.get_one::<usize>("jobs") {
        config = config.with_parallelism(*jobs);
    }
    if let Some(file) = matches.get_one::<String>("stage-file") {
        config = config.with_stage_file(file);
    }
    config.validate()?;
    Ok(config)
}

fn write_profile(path: &Path, log: &ProfileLog) -> anyhow::Result<()> {
    let text = serde_yaml::to_string(&log.events()).context("encoding profile")?;
    fs::write(path, text).with_context(|| format!("writing profile {}", path.display()))
}

fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"), matches.get_flag("json"));

    let config = load_config(&matches)?;
    let profile = matches.get_one::<PathBuf>("profile");
    let log = Arc::new(ProfileLog::new());

    let mut build = Build::new(config);
    if profile.is_some() {
        build = build.with_profile_log(Arc::clone(&log));
    }
    let result = build.run();
    if let Some(path) = profile {
        write_profile(path, &log)?;
    }
    let summary = result.context("build aborted")?;
    println!("{}", summary.render_text());

    Ok(if summary.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
