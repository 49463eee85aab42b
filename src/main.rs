use std::path::PathBuf;
use anyhow::Result;
use env_logger::Builder;
use gumdrop::Options;
use log::{info, trace, warn, LevelFilter};
use geonetstat::config::Config;
use geonetstat::emit::Document;
use geonetstat::marker::Variant;
use geonetstat::platform::Platform;
use geonetstat::scan::Scan;
use geonetstat::sink::Sink;
use geonetstat::source::Source;

#[derive(Options)]
pub struct Args {
    #[options()]
    help: bool,
    #[options(help = "JSON config file")]
    config: Option<PathBuf>,
    #[options(help = "replay a captured netstat/lsof dump")]
    dump: Option<PathBuf>,
    #[options(help = "linux, windows, darwin or canonical")]
    platform: Option<Platform>,
    #[options(no_short, help = "location or process")]
    variant: Option<Variant>,
    #[options(help = "marker table path")]
    table: Option<PathBuf>,
    #[options(help = "saved geolocation batch response")]
    geo: Option<PathBuf>,
    #[options(help = "stdout or file,path=...")]
    sink: Option<Sink>,
    #[options(count)]
    verbose: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args_default_or_exit();
    let sink = args.sink.unwrap_or_default();

    let mut builder = Builder::from_default_env();
    builder.filter(None, match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    builder.init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None       => Config::default(),
    };

    config.table       = args.table.unwrap_or(config.table);
    config.variant     = args.variant.unwrap_or(config.variant);
    config.offline_geo = args.geo.or(config.offline_geo);

    let platform = match args.platform {
        Some(platform) => platform,
        None           => Platform::detect()?,
    };

    let source = match args.dump {
        Some(path) => Source::Dump(path),
        None       => Source::Live,
    };

    trace!("{:?}", config);

    let locator = config.locator()?;

    let home = match locator.home().await {
        Ok(home) => home,
        Err(e)   => {
            warn!("own location unavailable: {}", e);
            None
        }
    };

    let scan = Scan {
        platform: platform,
        source:   source,
        locator:  locator,
        variant:  config.variant,
        table:    config.table.clone(),
        timeout:  config.command_timeout(),
    };

    let report = scan.run().await?;

    info!(
        "{} rows observed, {} dropped, {} routable, {} markers",
        report.observed,
        report.dropped.total(),
        report.routable,
        report.payload.markers().len(),
    );

    let hostname = hostname::get()?.to_string_lossy().into_owned();

    sink.send(&Document {
        hostname: &hostname,
        home:     home.as_ref(),
        payload:  &report.payload,
    })?;

    Ok(())
}
