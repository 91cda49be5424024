use anyhow::{bail, Context, Result};
use ipeds_loader::{
    code::load_cip_reference,
    store::init_schema,
    ArchiveDirectory, DuckStore, LoadConfig, Orchestrator, StagedTables, YearSummary,
};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: ipeds-loader [stage|transform|staged] <year|start-end>...\n       ipeds-loader cip <path>";

enum Command {
    Stage(Vec<i32>),
    Transform(Vec<i32>),
    TransformStaged(Vec<i32>),
    Cip(String),
}

/// `2019` or `2015-2019`.
fn parse_years(args: &[String]) -> Result<Vec<i32>> {
    let mut years = Vec::new();
    for arg in args {
        match arg.split_once('-') {
            Some((a, b)) => {
                let start: i32 = a.parse().with_context(|| format!("bad year `{a}`"))?;
                let end: i32 = b.parse().with_context(|| format!("bad year `{b}`"))?;
                if end < start {
                    bail!("empty range `{arg}`");
                }
                years.extend(start..=end);
            }
            None => years.push(arg.parse().with_context(|| format!("bad year `{arg}`"))?),
        }
    }
    if years.is_empty() {
        bail!("no years given\n{USAGE}");
    }
    Ok(years)
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(first) = args.first() else {
        bail!(USAGE);
    };
    Ok(match first.as_str() {
        "stage" => Command::Stage(parse_years(&args[1..])?),
        "transform" => Command::Transform(parse_years(&args[1..])?),
        "staged" => Command::TransformStaged(parse_years(&args[1..])?),
        "cip" => match args.get(1) {
            Some(path) => Command::Cip(path.clone()),
            None => bail!(USAGE),
        },
        _ => Command::Transform(parse_years(args)?),
    })
}

fn report(summaries: &[YearSummary]) {
    for s in summaries {
        info!("{s}");
        for failed in s.failed() {
            warn!(year = s.year, survey = failed, "survey failed");
        }
        match serde_json::to_string(s) {
            Ok(json) => info!(target: "summary", "{json}"),
            Err(e) => error!(error = %e, "summary not serializable"),
        }
    }
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let cfg = match env::var("IPEDS_CONFIG") {
        Ok(path) => LoadConfig::from_yaml_file(&path).with_context(|| format!("reading {path}"))?,
        Err(_) => LoadConfig::from_env(),
    };
    let encodings = cfg.encodings()?;
    info!(
        raw_dir = %cfg.raw_dir.display(),
        database = %cfg.database.display(),
        "startup"
    );
    let store = DuckStore::open(&cfg.database)
        .with_context(|| format!("opening {}", cfg.database.display()))?;

    match command {
        Command::Cip(path) => {
            init_schema(&store)?;
            let n = load_cip_reference(&store, &path, &encodings)
                .with_context(|| format!("loading CIP reference {path}"))?;
            info!(rows = n, "CIP reference loaded");
        }
        Command::Stage(years) => {
            let orch = Orchestrator::new(&store, cfg.alias_table()?)?;
            let mut dir = ArchiveDirectory::new(&cfg.raw_dir, encodings);
            let summaries = years
                .iter()
                .map(|&y| orch.stage_year(&mut dir, y))
                .collect::<ipeds_loader::Result<Vec<_>>>()?;
            report(&summaries);
        }
        Command::Transform(years) => {
            let orch = Orchestrator::new(&store, cfg.alias_table()?)?;
            let mut dir = ArchiveDirectory::new(&cfg.raw_dir, encodings);
            report(&orch.run_all(&mut dir, &years)?);
        }
        Command::TransformStaged(years) => {
            let orch = Orchestrator::new(&store, cfg.alias_table()?)?;
            let mut staged = StagedTables::new(&store);
            report(&orch.run_all(&mut staged, &years)?);
        }
    }
    Ok(())
}
