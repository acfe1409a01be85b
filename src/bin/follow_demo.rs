//! Follow-mode demo
//!
//! Simulates a device walking towards a destination, feeds its fixes into
//! the core and logs every state change while the route is kept up to date
//! against the configured OSRM server.
//!
//! Usage: follow_demo <lat> <lon> [name] [--from <lat>,<lon>] [--config <path>]
//!                    [--steps <n>] [--step-meters <m>] [--interval-ms <ms>]

use anyhow::{anyhow, bail, Context, Result};
use navtrack_core::config::NavConfig;
use navtrack_core::geocoding::describe_location;
use navtrack_core::positioning::geodesy::{
    destination_point, distance_meters, initial_bearing, intermediate_point,
};
use navtrack_core::positioning::{FeedPositionSource, PositionFeed};
use navtrack_core::{Coordinate, Destination, NavtrackCore, PositionSample};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct DemoArgs {
    destination: Coordinate,
    name: String,
    origin: Option<Coordinate>,
    config: Option<String>,
    steps: usize,
    step_meters: f64,
    interval: Duration,
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_pair(text: &str) -> Result<Coordinate> {
    let (lat, lon) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("expected <lat>,<lon>, got {:?}", text))?;
    Ok(Coordinate::new(lat.trim().parse()?, lon.trim().parse()?)?)
}

fn parse_args() -> Result<DemoArgs> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let positional: Vec<&String> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| !a.starts_with("--") && (*i == 0 || !args[i - 1].starts_with("--")))
        .map(|(_, a)| a)
        .collect();
    if positional.len() < 2 {
        bail!("usage: follow_demo <lat> <lon> [name] [--from <lat>,<lon>] [--config <path>]");
    }

    let destination = Coordinate::new(
        positional[0].parse().context("destination latitude")?,
        positional[1].parse().context("destination longitude")?,
    )?;
    let name = positional
        .get(2)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Destino".to_string());

    Ok(DemoArgs {
        destination,
        name,
        origin: flag(&args, "--from").map(parse_pair).transpose()?,
        config: flag(&args, "--config").map(str::to_string),
        steps: flag(&args, "--steps").map(str::parse).transpose()?.unwrap_or(30),
        step_meters: flag(&args, "--step-meters")
            .map(str::parse)
            .transpose()?
            .unwrap_or(12.0),
        interval: Duration::from_millis(
            flag(&args, "--interval-ms")
                .map(str::parse)
                .transpose()?
                .unwrap_or(1_000),
        ),
    })
}

fn load_config(path: Option<&str>) -> Result<NavConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            NavConfig::load(Path::new(path))?
        }
        None if Path::new("navtrack.toml").exists() => {
            info!("Loading configuration from navtrack.toml");
            NavConfig::load(Path::new("navtrack.toml"))?
        }
        None => {
            info!("Using default configuration");
            NavConfig::default()
        }
    };
    Ok(config)
}

/// Walk from `origin` towards `destination`, publishing one fix per interval
async fn walk(
    feed: PositionFeed,
    origin: Coordinate,
    destination: Coordinate,
    steps: usize,
    step_meters: f64,
    interval: Duration,
) {
    let mut here = origin;
    let mut ticker = tokio::time::interval(interval);
    for _ in 0..=steps {
        ticker.tick().await;
        feed.push_fix(PositionSample::now(here).with_accuracy(8.0));
        let remaining = distance_meters(&here, &destination);
        debug!(
            %here,
            remaining_m = remaining,
            heading = initial_bearing(&here, &destination),
            "walker step"
        );
        here = if remaining <= step_meters {
            destination
        } else {
            intermediate_point(&here, &destination, step_meters / remaining)
        };
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("navtrack_core=info".parse()?)
                .add_directive("follow_demo=info".parse()?),
        )
        .init();

    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;

    let (source, feed) = FeedPositionSource::new(64);
    let core = NavtrackCore::new(config, Arc::new(source))?;

    let origin = args
        .origin
        .unwrap_or_else(|| destination_point(&args.destination, 270.0, 1_000.0));
    let label = describe_location(core.geocoder(), origin).await;
    info!("Starting from {} ({})", origin, label);

    let walker = tokio::spawn(walk(
        feed,
        origin,
        args.destination,
        args.steps,
        args.step_meters,
        args.interval,
    ));

    let mut snapshots = core.controller().subscribe();
    let logger = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snap = snapshots.borrow_and_update().clone();
            match (&snap.route, &snap.last_error) {
                (_, Some(err)) if err.is_service_failure() => {
                    warn!(state = ?snap.state, "service failure: {}", err)
                }
                (_, Some(err)) => warn!(state = ?snap.state, "{}", err),
                (Some(route), None) => info!(
                    state = ?snap.state,
                    route = %route.id(),
                    "{:.0} m, {:.0} s to go",
                    route.route().distance_meters,
                    route.route().duration_seconds
                ),
                (None, None) => info!(state = ?snap.state, "no route"),
            }
        }
    });

    let destination = Destination::new(args.destination, args.name);
    let route = core.controller().start_route(destination).await?;
    info!(
        "Route ready: {} points, {:.0} m by road ({:.0} m of drawn geometry)",
        route.route().geometry.len(),
        route.route().distance_meters,
        route.route().geometry_length_meters()
    );

    core.controller().enable_follow()?;
    if let Err(e) = walker.await {
        warn!("walker stopped early: {}", e);
    }

    core.controller().cancel();
    logger.abort();
    info!("Demo finished");
    Ok(())
}
