use image::{ImageReader, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use sift_cli::{Sift, SiftError, SiftFrame};
use sift_extract::ExtractorBuilder;
use std::time::Instant;

struct Args {
    input: String,
    octaves: i32,
    levels: usize,
    first_octave: i32,
    peak_thresh: f64,
    edge_thresh: f64,
    norm_thresh: f64,
    frames_path: Option<String>,
    force_orientations: bool,
    descriptors: bool,
    overlay_path: Option<String>,
    verbose: u8,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: String::new(),
            octaves: -1,
            levels: 3,
            first_octave: 0,
            peak_thresh: -1.0,
            edge_thresh: -1.0,
            norm_thresh: -1.0,
            frames_path: None,
            force_orientations: false,
            descriptors: false,
            overlay_path: None,
            verbose: 0,
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: sift [OPTIONS] IMAGE

Extract SIFT keypoints (and optionally descriptors) from a grayscale image.
Keypoints are printed one per line as: x y sigma angle

Options:
  --octaves N         number of octaves (default: automatic)
  --levels N          levels per octave (default: 3)
  --first-octave N    index of the first octave, may be negative (default: 0)
  --peak-thresh T     DoG peak threshold (default: filter default)
  --edge-thresh T     edge rejection threshold (default: filter default)
  --norm-thresh T     descriptor norm threshold (default: filter default)
  --frames FILE       read keypoints from FILE (lines: x,y,sigma,angle)
                      instead of running detection
  --orientations      recompute orientations for supplied frames
  --descriptors       compute and print quantized descriptors
  --overlay FILE      save a keypoint overlay image to FILE
  -v, -vv, -vvv       increase diagnostic logging
  -h, --help          show this message"
    );
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    value
        .ok_or_else(|| format!("'{}' requires a value", flag))?
        .parse()
        .map_err(|_| format!("'{}' has an invalid value", flag))
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut argv = std::env::args().skip(1);

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--octaves" => {
                args.octaves = parse_value(&arg, argv.next())?;
                if args.octaves < 0 {
                    return Err("'--octaves' must be a non-negative integer".into());
                }
            }
            "--levels" => {
                args.levels = parse_value(&arg, argv.next())?;
                if args.levels < 1 {
                    return Err("'--levels' must be a positive integer".into());
                }
            }
            "--first-octave" => {
                args.first_octave = parse_value(&arg, argv.next())?;
            }
            "--peak-thresh" => {
                args.peak_thresh = parse_value(&arg, argv.next())?;
                if args.peak_thresh < 0.0 {
                    return Err("'--peak-thresh' must be a non-negative real".into());
                }
            }
            "--edge-thresh" => {
                args.edge_thresh = parse_value(&arg, argv.next())?;
                if args.edge_thresh < 1.0 {
                    return Err("'--edge-thresh' must be not smaller than 1".into());
                }
            }
            "--norm-thresh" => {
                args.norm_thresh = parse_value(&arg, argv.next())?;
                if args.norm_thresh < 0.0 {
                    return Err("'--norm-thresh' must be a non-negative real".into());
                }
            }
            "--frames" => {
                args.frames_path = Some(parse_value(&arg, argv.next())?);
            }
            "--orientations" => args.force_orientations = true,
            "--descriptors" => args.descriptors = true,
            "--overlay" => {
                args.overlay_path = Some(parse_value(&arg, argv.next())?);
            }
            "-v" => args.verbose += 1,
            "-vv" => args.verbose += 2,
            "-vvv" => args.verbose += 3,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("unknown option '{}'", arg));
            }
            _ => {
                if !args.input.is_empty() {
                    return Err("exactly one input image is expected".into());
                }
                args.input = arg;
            }
        }
    }

    if args.input.is_empty() {
        return Err("an input image is required".into());
    }
    Ok(args)
}

/// Read caller-supplied frames: one `x,y,sigma,angle` tuple per line.
fn read_frames_file(path: &str) -> Result<Vec<SiftFrame>, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path, e))?;
    let mut frames = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<f64> = line
            .split(',')
            .map(|f| f.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("{}:{}: expected four reals", path, lineno + 1))?;
        if fields.len() != 4 {
            return Err(format!(
                "{}:{}: expected x,y,sigma,angle, got {} fields",
                path,
                lineno + 1,
                fields.len()
            ));
        }
        frames.push(SiftFrame::new(fields[0], fields[1], fields[2], fields[3]));
    }
    Ok(frames)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn run(args: &Args, frames: Option<&[SiftFrame]>) -> Result<(), SiftError> {
    let img = ImageReader::open(&args.input)
        .map_err(image::ImageError::IoError)?
        .decode()?
        .to_luma8();

    let config = ExtractorBuilder::new()
        .octaves(args.octaves)
        .levels(args.levels)
        .first_octave(args.first_octave)
        .peak_thresh(args.peak_thresh)
        .edge_thresh(args.edge_thresh)
        .norm_thresh(args.norm_thresh)
        .descriptors(args.descriptors)
        .force_orientations(args.force_orientations)
        .to_config();
    let sift = Sift::new(config)?;

    let t0 = Instant::now();
    let result = match frames {
        Some(frames) => sift.extract_at(&img, frames)?,
        None => sift.extract(&img)?,
    };
    let elapsed = t0.elapsed();

    log::info!(
        "extracted {} keypoints in {:.2?}",
        result.frames.len(),
        elapsed
    );

    for (i, f) in result.frames.iter().enumerate() {
        print!("{:.4} {:.4} {:.4} {:.4}", f.x, f.y, f.sigma, f.angle);
        if let Some(descriptors) = &result.descriptors {
            for b in descriptors[i].iter() {
                print!(" {}", b);
            }
        }
        println!();
    }

    if let Some(path) = &args.overlay_path {
        let mut overlay: RgbaImage = image::DynamicImage::ImageLuma8(img).into_rgba8();
        for f in &result.frames {
            draw_hollow_circle_mut(
                &mut overlay,
                (f.x as i32, f.y as i32),
                f.sigma.round().max(1.0) as i32,
                Rgba([255, 0, 0, 255]),
            );
        }
        overlay.save(path)?;
        log::info!("saved keypoint overlay to {}", path);
    }

    Ok(())
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("sift: {}", msg);
            print_usage();
            std::process::exit(2);
        }
    };
    init_logging(args.verbose);

    let frames = match &args.frames_path {
        Some(path) => match read_frames_file(path) {
            Ok(frames) => Some(frames),
            Err(msg) => {
                eprintln!("sift: {}", msg);
                std::process::exit(2);
            }
        },
        None => None,
    };

    if let Err(err) = run(&args, frames.as_deref()) {
        eprintln!("sift: {}", err);
        std::process::exit(1);
    }
}
