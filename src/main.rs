use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use camera_relay::Topic;
use clap::Parser;
use crop_decimate_node::capture::SyntheticCamera;
use crop_decimate_node::config::NodeConfig;
use crop_decimate_node::processing::{CameraFrame, ImageRequest};
use crop_decimate_node::session::DeliverySession;
use crop_decimate_node::timer::TokioTimerService;
use crop_decimate_node::{snapshot, telemetry};
use tracing::{info, warn};

/// Crop and decimate a camera stream on request.
///
/// Runs a synthetic camera through a delivery session, sends one request and
/// reports what was delivered.
#[derive(Parser, Debug)]
#[command(name = "crop-decimate")]
#[command(about = "✂️  Crop and decimate a camera stream on request")]
#[command(long_about = "Runs a synthetic camera through the crop/decimate delivery session,
sends a single request built from the flags below and prints the session counters at exit.")]
struct Args {
    /// Node configuration (JSON)
    #[arg(short, long, help = "JSON node configuration; flags below override it")]
    config: Option<PathBuf>,

    #[arg(long, help = "Upstream frame queue depth")]
    queue_size: Option<usize>,

    #[arg(long, help = "Ceiling for rate-limited delivery, in Hz")]
    max_rate: Option<f64>,

    #[arg(long, default_value_t = 640, help = "Camera width in pixels")]
    width: u32,

    #[arg(long, default_value_t = 480, help = "Camera height in pixels")]
    height: u32,

    #[arg(long, default_value_t = 30, help = "Camera frame rate")]
    fps: u32,

    #[arg(long, default_value = "1",
          help = "Decimation factor: 2 (both axes) or 2,3 (horizontal,vertical)")]
    decimation: String,

    #[arg(long, default_value = "0,0,0,0",
          help = "Region of interest x,y,width,height; 0 width/height means to the frame edge")]
    roi: String,

    #[arg(short, long, default_value = "all",
          help = "Delivery mode: once, rate, all, or a raw mode byte")]
    mode: String,

    #[arg(short, long, default_value_t = 10.0, help = "Requested rate for --mode rate, in Hz")]
    frequency: f32,

    /// Run time (supports seconds, minutes, hours)
    #[arg(short, long, default_value = "5s",
          help = "How long to run: 30s (30 seconds), 2m (2 minutes), 1h (1 hour)")]
    duration: String,

    #[arg(long, help = "Save the last delivered frame as PNG")]
    snapshot: Option<PathBuf>,

    #[arg(short, long, help = "Debug logging (RUST_LOG takes precedence)")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.verbose)?;

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(queue_size) = args.queue_size {
        config.queue_size = queue_size;
    }
    if let Some(max_rate) = args.max_rate {
        config.max_video_framerate = max_rate;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let seconds = parse_duration(&args.duration)?;
    let request = build_request(&args)?;

    let camera_topic = Topic::<CameraFrame>::new(config.input_topic.clone());
    let output_topic = Topic::<CameraFrame>::new(config.output_topic.clone());
    let request_topic = Topic::<ImageRequest>::new(config.request_topic.clone());

    let session = DeliverySession::builder()
        .with_config(&config)
        .with_camera_source(camera_topic.clone())
        .with_camera_sink(output_topic.clone())
        .with_request_source(request_topic.clone())
        .with_timer_service(TokioTimerService::current()?)
        .build()?;

    let last_frame: Arc<Mutex<Option<CameraFrame>>> = Arc::new(Mutex::new(None));
    let delivered = Arc::new(AtomicU64::new(0));
    let consumer = {
        let last_frame = last_frame.clone();
        let delivered = delivered.clone();
        output_topic.subscribe(config.queue_size, move |frame: CameraFrame| {
            let n = delivered.fetch_add(1, Ordering::Relaxed) + 1;
            info!(
                n,
                width = frame.image.width(),
                height = frame.image.height(),
                roi_x = frame.info.roi.x_offset,
                roi_y = frame.info.roi.y_offset,
                binning_x = frame.info.binning_x,
                binning_y = frame.info.binning_y,
                "frame delivered"
            );
            if let Ok(mut slot) = last_frame.lock() {
                *slot = Some(frame);
            }
        })?
    };

    let camera = SyntheticCamera::new(args.width, args.height);
    let camera_task = tokio::spawn(camera.run(camera_topic.clone(), args.fps));

    // let the cache fill so the immediate answer to the request has data
    for _ in 0..100 {
        if session.has_cached_frame() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if !session.has_cached_frame() {
        warn!("no camera frame cached yet; the first answer will be empty");
    }

    info!(?request, "sending request");
    request_topic.publish(request);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds as u64)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    camera_task.abort();
    drop(consumer);
    session.shutdown();

    println!("{}", serde_json::to_string_pretty(&session.stats())?);
    println!("frames received by consumer: {}", delivered.load(Ordering::Relaxed));

    if let Some(path) = &args.snapshot {
        let frame = last_frame
            .lock()
            .map_err(|_| anyhow!("snapshot slot poisoned"))?
            .take();
        match frame {
            Some(frame) => {
                snapshot::save_png(&frame.image, path)?;
                println!("snapshot written to {}", path.display());
            }
            None => warn!("no frame delivered; snapshot skipped"),
        }
    }

    Ok(())
}

fn build_request(args: &Args) -> Result<ImageRequest> {
    let (binning_x, binning_y) = parse_decimation(&args.decimation)?;
    let [x, y, width, height] = parse_roi(&args.roi)?;
    Ok(ImageRequest::new(parse_mode(&args.mode)?)
        .with_binning(binning_x, binning_y)
        .with_roi(x, y, width, height)
        .with_frequency(args.frequency))
}

/// Parse duration string like "30s", "2m", "1h" into seconds
fn parse_duration(duration: &str) -> Result<u32> {
    if let Ok(seconds) = duration.parse::<u32>() {
        return Ok(seconds);
    }

    let len = duration.len();
    if len < 2 {
        return Err(anyhow!("Invalid duration format: {}", duration));
    }

    let (num_str, unit) = duration.split_at(len - 1);
    let num: u32 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(anyhow!(
                "Invalid duration unit: {}. Use 's' for seconds, 'm' for minutes, 'h' for hours",
                unit
            ));
        }
    };
    num.checked_mul(scale)
        .ok_or_else(|| anyhow!("Duration too long: {}", duration))
}

/// Parse "2" or "2,3" / "2x3" into horizontal and vertical factors
fn parse_decimation(value: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = value.split([',', 'x']).map(str::trim).collect();
    let parse = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| anyhow!("Invalid decimation factor: {}", s))
    };
    match parts.as_slice() {
        [both] => {
            let factor = parse(both)?;
            Ok((factor, factor))
        }
        [x, y] => Ok((parse(x)?, parse(y)?)),
        _ => bail!("Invalid decimation: {}. Use N or X,Y", value),
    }
}

/// Parse "x,y,width,height"
fn parse_roi(value: &str) -> Result<[u32; 4]> {
    let parts = value
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| anyhow!("Invalid region value: {}", s))
        })
        .collect::<Result<Vec<u32>>>()?;
    parts
        .try_into()
        .map_err(|_| anyhow!("Invalid region: {}. Use x,y,width,height", value))
}

/// Parse a delivery mode name or raw mode byte
fn parse_mode(mode: &str) -> Result<u8> {
    match mode.to_lowercase().as_str() {
        "once" => Ok(ImageRequest::ONCE),
        "rate" | "publish_freq" => Ok(ImageRequest::PUBLISH_FREQ),
        "all" => Ok(ImageRequest::ALL),
        other => other.parse::<u8>().map_err(|_| {
            anyhow!("Invalid mode: {}. Use: once, rate, all, or a mode byte", mode)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("30").unwrap(), 30);
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("2m").unwrap(), 120);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("99999999h").is_err());
        assert!(parse_duration("4294967295m").is_err());
    }

    #[test]
    fn decimation_factors() {
        assert_eq!(parse_decimation("2").unwrap(), (2, 2));
        assert_eq!(parse_decimation("2,3").unwrap(), (2, 3));
        assert_eq!(parse_decimation("4x1").unwrap(), (4, 1));
        assert!(parse_decimation("2,3,4").is_err());
        assert!(parse_decimation("two").is_err());
    }

    #[test]
    fn regions() {
        assert_eq!(parse_roi("100, 50, 200, 100").unwrap(), [100, 50, 200, 100]);
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("1,2,3,-4").is_err());
    }

    #[test]
    fn modes() {
        assert_eq!(parse_mode("once").unwrap(), ImageRequest::ONCE);
        assert_eq!(parse_mode("RATE").unwrap(), ImageRequest::PUBLISH_FREQ);
        assert_eq!(parse_mode("all").unwrap(), ImageRequest::ALL);
        assert_eq!(parse_mode("9").unwrap(), 9);
        assert!(parse_mode("sometimes").is_err());
    }

    #[test]
    fn cli_parses() {
        let args = Args::try_parse_from([
            "crop-decimate",
            "--decimation",
            "2",
            "--roi",
            "100,50,200,100",
            "--mode",
            "rate",
            "--frequency",
            "30",
        ])
        .unwrap();
        let request = build_request(&args).unwrap();
        assert_eq!(request.binning_x, 2);
        assert_eq!(request.roi.width, 200);
        assert_eq!(request.mode, ImageRequest::PUBLISH_FREQ);
        assert_eq!(request.publish_frequency, 30.0);
    }
}
