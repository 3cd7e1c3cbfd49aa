use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clustering::composition::analyze_or_none;
use clustering::index::{ClusterOptions, Feature, SpatialIndex};
use clustering::model::{Pinory, PinoryFilter, PinoryType};
use foundation::bounds::GeoBounds;
use markers::friends::{FriendOverlay, HttpFriendSource};
use markers::layer::PinoryLayer;
use markers::reconciler::ReconcilerConfig;
use markers::renderable::MarkerKey;
use markers::session::MapSession;
use markers::tracker::{BoundsTracker, TrackerConfig};
use runtime::clock::ManualClock;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod headless;

use headless::{HeadlessMap, HeadlessView};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pinory map clustering and marker tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the clusters and points visible in a viewport
    Clusters {
        /// JSON array of pinories
        #[arg(long)]
        input: PathBuf,

        /// Viewport: west,south,east,north
        #[arg(long)]
        bbox: String,

        #[arg(long, default_value_t = 10.0)]
        zoom: f64,

        /// Only keep pinories of this category
        #[arg(long)]
        category: Option<String>,

        /// Only keep friend pinories
        #[arg(long)]
        friends_only: bool,
    },

    /// Show how a cluster breaks apart
    Expand {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        cluster: u64,

        /// Number of leaves to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Replay camera moves through a headless map session and print each
    /// reconciliation pass
    Simulate {
        #[arg(long)]
        input: PathBuf,

        /// Camera step as west,south,east,north@zoom (repeatable)
        #[arg(long = "step", required = true)]
        steps: Vec<String>,

        /// Simulated time between steps
        #[arg(long, default_value_t = 120)]
        interval_ms: u64,

        /// Selected pinory id
        #[arg(long)]
        select: Option<String>,

        /// After the last step, click the first cluster and render again
        #[arg(long)]
        expand: bool,
    },

    /// Fetch friend pinories and render them on a headless map
    Friends {
        /// API base URL (default: $PINORY_API_URL or http://localhost:3000)
        #[arg(long)]
        base_url: Option<String>,

        /// Only show this friend's pinories
        #[arg(long)]
        friend: Option<String>,
    },

    /// Check pinories for invalid content or coordinates
    Validate {
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main(Args::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main(args: Args) -> Result<(), String> {
    match args.command {
        Command::Clusters {
            input,
            bbox,
            zoom,
            category,
            friends_only,
        } => {
            let filter = PinoryFilter {
                category,
                mood: None,
                pinory_type: friends_only.then_some(PinoryType::Friend),
            };
            cmd_clusters(&input, &bbox, zoom, &filter)
        }
        Command::Expand {
            input,
            cluster,
            limit,
        } => cmd_expand(&input, cluster, limit),
        Command::Simulate {
            input,
            steps,
            interval_ms,
            select,
            expand,
        } => cmd_simulate(&input, &steps, interval_ms, select, expand),
        Command::Friends { base_url, friend } => cmd_friends(base_url, friend).await,
        Command::Validate { input } => cmd_validate(&input),
    }
}

fn cmd_clusters(input: &Path, bbox: &str, zoom: f64, filter: &PinoryFilter) -> Result<(), String> {
    let mut pinories = load_pinories(input)?;
    if !filter.is_empty() {
        pinories = filter.apply(&pinories);
    }
    let bounds = parse_bbox(bbox)?;
    let index = SpatialIndex::build(Arc::new(pinories), ClusterOptions::from_env());

    let features: Vec<serde_json::Value> = index
        .clusters(&bounds, zoom)
        .iter()
        .map(|f| match f {
            Feature::Cluster(c) => json!({
                "type": "cluster",
                "id": c.id,
                "center": c.center,
                "pointCount": c.point_count,
                "composition": analyze_or_none(&index, c.id),
            }),
            Feature::Point(p) => json!({
                "type": "point",
                "center": p.center,
                "id": index.pinory(p.index).map(|x| x.id.as_str()),
            }),
        })
        .collect();

    info!("{} features at zoom {zoom}", features.len());
    print_json(&features)
}

fn cmd_expand(input: &Path, cluster: u64, limit: usize) -> Result<(), String> {
    let pinories = load_pinories(input)?;
    let index = SpatialIndex::build(Arc::new(pinories), ClusterOptions::from_env());

    let expansion_zoom = index.expansion_zoom(cluster).map_err(|e| e.to_string())?;
    let children = index.children(cluster).map_err(|e| e.to_string())?;
    let leaves: Vec<&str> = index
        .leaves(cluster, limit, 0)
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|p| p.id.as_str())
        .collect();

    print_json(&json!({
        "cluster": cluster,
        "expansionZoom": expansion_zoom,
        "children": children,
        "leaves": leaves,
    }))
}

fn cmd_simulate(
    input: &Path,
    steps: &[String],
    interval_ms: u64,
    select: Option<String>,
    expand: bool,
) -> Result<(), String> {
    let pinories = Arc::new(load_pinories(input)?);
    let cameras = steps
        .iter()
        .map(|s| parse_step(s))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(&(first_bounds, first_zoom)) = cameras.first() else {
        return Err("simulate requires at least one --step".to_string());
    };

    let mut session = MapSession::new(HeadlessMap::new(first_bounds, first_zoom), HeadlessView::default());
    let mut layer = PinoryLayer::attach(&mut session, ClusterOptions::from_env(), ReconcilerConfig::default())
        .map_err(|e| e.to_string())?;
    layer.set_pinories(&pinories);
    layer.select(select);

    let clock = ManualClock::new();
    let interval = Duration::from_millis(interval_ms);
    let mut tracker = BoundsTracker::new(clock.clone(), TrackerConfig::from_env());

    let mut state = tracker.on_map_ready(&session);
    for (i, (bounds, zoom)) in cameras.iter().enumerate() {
        if i > 0 {
            clock.advance(interval);
            session.map_mut().set_camera(*bounds, *zoom);
            match tracker.on_move_end(&session) {
                Some(next) => state = Some(next),
                None => info!("step {i} throttled"),
            }
        }
        let report = layer.render(&mut session, state.as_ref());
        print_json(&json!({
            "step": i,
            "zoom": state.map(|s| s.zoom),
            "markers": session.map().marker_count(),
            "views": session.view().mounted().count(),
            "report": report,
        }))?;
    }

    if expand {
        let Some(key) = layer
            .reconciler()
            .keys()
            .find(|k| matches!(k, MarkerKey::Cluster(_)))
            .cloned()
        else {
            info!("no cluster on screen to expand");
            return Ok(());
        };
        let outcome = layer.click(&key, &mut session);
        info!("clicked {key}: {outcome:?}");

        clock.advance(interval);
        state = tracker.on_move_end(&session).or(state);
        let report = layer.render(&mut session, state.as_ref());
        print_json(&json!({
            "step": "expand",
            "cluster": key.to_string(),
            "zoom": state.map(|s| s.zoom),
            "markers": session.map().marker_count(),
            "report": report,
        }))?;
    }

    layer.teardown(&mut session);
    Ok(())
}

async fn cmd_friends(base_url: Option<String>, friend: Option<String>) -> Result<(), String> {
    let base_url = base_url.unwrap_or_else(|| {
        env::var("PINORY_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
    });
    let source = HttpFriendSource::new(base_url);
    info!("fetching {}", source.url());

    let mut session = MapSession::new(HeadlessMap::new(GeoBounds::world(), 2.0), HeadlessView::default());
    let token = session.claim_pool("friends").map_err(|e| e.to_string())?;
    let mut overlay = FriendOverlay::new(token);

    let outcome = overlay.load(&mut session, &source).await.map_err(|e| e.to_string())?;
    info!("fetch outcome: {outcome:?}");
    let shown = overlay.select_friend(&mut session, friend);

    let visible: Vec<&Pinory> = overlay.visible();
    info!("{shown} friend markers rendered");
    print_json(&visible)
}

fn cmd_validate(input: &Path) -> Result<(), String> {
    let pinories = load_pinories(input)?;
    let problems: Vec<serde_json::Value> = pinories
        .iter()
        .filter_map(|p| {
            p.validate()
                .err()
                .map(|e| json!({ "id": p.id, "error": e.to_string() }))
        })
        .collect();

    info!("{} of {} pinories invalid", problems.len(), pinories.len());
    print_json(&problems)?;
    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("{} invalid pinories", problems.len()))
    }
}

fn load_pinories(path: &Path) -> Result<Vec<Pinory>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("parse {path:?}: {e}"))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn parse_bbox(bbox: &str) -> Result<GeoBounds, String> {
    let parts: Vec<&str> = bbox.split(',').collect();
    if parts.len() != 4 {
        return Err("bbox must be west,south,east,north".to_string());
    }
    let mut v = [0.0f64; 4];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|e| format!("bad bbox value {part:?}: {e}"))?;
    }
    Ok(GeoBounds::new(v[0], v[1], v[2], v[3]))
}

fn parse_step(step: &str) -> Result<(GeoBounds, f64), String> {
    let (bbox, zoom) = step
        .split_once('@')
        .ok_or_else(|| format!("step {step:?} must look like west,south,east,north@zoom"))?;
    let zoom: f64 = zoom
        .trim()
        .parse()
        .map_err(|e| format!("bad zoom in {step:?}: {e}"))?;
    Ok((parse_bbox(bbox)?, zoom))
}
