use argh::FromArgs;
use std::path::{Path, PathBuf};

use recon::image::{Image, ImageSize};
use recon::imgproc::color::gray_f32_from_rgb_u8;
use recon::k3d::camera::CameraIntrinsic;
use recon::k3d::io::ply::{write_ply_ascii, write_ply_binary};
use recon::k3d::pose::{EpipolarGeometry, Pose};
use recon::pipeline::{
    Calibration, FixedIntrinsics, Pipeline, PipelineConfig, PipelineStage, PipelineState,
    Reconstruction, ReconstructionMode,
};

#[derive(FromArgs)]
/// Reconstruct a sparse point cloud from a directory of overlapping photographs
struct Args {
    /// directory with the input images, the first one in name order is the reference
    #[argh(option)]
    images_dir: PathBuf,

    /// output directory for the point clouds and the diagnostics
    #[argh(option)]
    output_dir: PathBuf,

    /// camera intrinsics at full resolution as `fx,fy,cx,cy`
    #[argh(option, from_str_fn(parse_intrinsics))]
    intrinsics: Option<CameraIntrinsic>,

    /// path to a JSON pipeline configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// write ASCII instead of binary PLY files
    #[argh(switch)]
    ascii: bool,
}

fn parse_intrinsics(value: &str) -> Result<CameraIntrinsic, String> {
    let params = value
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match params.as_slice() {
        [fx, fy, cx, cy] => Ok(CameraIntrinsic::new(*fx, *fy, *cx, *cy)),
        _ => Err(format!("expected fx,fy,cx,cy, got {} values", params.len())),
    }
}

#[derive(serde::Serialize)]
struct PairReport<'a> {
    reference: usize,
    target: usize,
    mode: ReconstructionMode,
    correspondences: usize,
    residual: f64,
    geometry: &'a EpipolarGeometry,
    pose: Option<&'a Pose>,
    camera: Option<&'a CameraIntrinsic>,
    points: usize,
    bounds: Option<([f64; 3], [f64; 3])>,
    centroid: Option<[f64; 3]>,
    transitions: &'a [PipelineState],
}

#[derive(serde::Serialize)]
struct FailureReport<'a> {
    reference: usize,
    target: usize,
    stage: PipelineStage,
    error: String,
    transitions: &'a [PipelineState],
}

#[derive(serde::Serialize)]
struct Report<'a> {
    images: Vec<String>,
    mode: ReconstructionMode,
    pairs: Vec<PairReport<'a>>,
    failed: Vec<FailureReport<'a>>,
    skipped: Vec<String>,
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(
                        ext.to_ascii_lowercase().as_str(),
                        "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff"
                    )
                })
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

fn read_gray(path: &Path) -> Result<Image<f32, 1>, Box<dyn std::error::Error>> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .into_rgb8();
    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };
    let rgb = Image::<u8, 3>::new(size, img.into_raw())?;
    Ok(gray_f32_from_rgb_u8(&rgb)?)
}

fn write_outputs(
    args: &Args,
    paths: &[PathBuf],
    reconstruction: &Reconstruction,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&args.output_dir)?;

    for pair in reconstruction.pairs.iter() {
        let path = args
            .output_dir
            .join(format!("pair_{:03}_{:03}.ply", pair.reference, pair.target));
        if args.ascii {
            write_ply_ascii(&path, &pair.cloud)?;
        } else {
            write_ply_binary(&path, &pair.cloud)?;
        }
        println!(
            "pair {}-{}: {} points -> {}",
            pair.reference,
            pair.target,
            pair.cloud.len(),
            path.display()
        );
    }

    let report = Report {
        images: paths.iter().map(|p| p.display().to_string()).collect(),
        mode: reconstruction.mode,
        pairs: reconstruction
            .pairs
            .iter()
            .map(|p| PairReport {
                reference: p.reference,
                target: p.target,
                mode: p.mode,
                correspondences: p.correspondences.len(),
                residual: p.residual,
                geometry: &p.geometry,
                pose: p.pose.as_ref(),
                camera: p.camera.as_ref(),
                points: p.cloud.len(),
                bounds: p.cloud.bounds(),
                centroid: p.cloud.centroid(),
                transitions: &p.transitions,
            })
            .collect(),
        failed: reconstruction
            .failed
            .iter()
            .map(|f| FailureReport {
                reference: f.reference,
                target: f.target,
                stage: f.stage,
                error: f.error.to_string(),
                transitions: &f.transitions,
            })
            .collect(),
        skipped: reconstruction
            .skipped
            .iter()
            .map(|e| e.to_string())
            .collect(),
    };

    let file = std::fs::File::create(args.output_dir.join("reconstruction.json"))?;
    serde_json::to_writer_pretty(file, &report)?;

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => PipelineConfig::default(),
    };

    let paths = list_images(&args.images_dir)?;
    if paths.len() < 2 {
        return Err(format!(
            "need at least two images in {}, found {}",
            args.images_dir.display(),
            paths.len()
        )
        .into());
    }

    let images = paths
        .iter()
        .map(|p| read_gray(p))
        .collect::<Result<Vec<_>, _>>()?;
    for (path, image) in paths.iter().zip(images.iter()) {
        log::info!("loaded {} ({})", path.display(), image.size());
    }

    let pipeline = Pipeline::new(config);

    ctrlc::set_handler({
        let abort = pipeline.abort_handle();
        move || {
            println!("Received Ctrl-C signal. Aborting after the current stage !!");
            abort.abort();
        }
    })?;

    // known intrinsics need no calibration images
    let calibrator = args.intrinsics.map(FixedIntrinsics);
    let calibration = calibrator.as_ref().map(|c| Calibration::new(c, &[]));

    let reconstruction = pipeline.run(&images, calibration)?;
    println!(
        "reconstructed {} points from {} pairs ({} failed, {} images skipped)",
        reconstruction.num_points(),
        reconstruction.pairs.len(),
        reconstruction.failed.len(),
        reconstruction.skipped.len()
    );

    write_outputs(&args, &paths, &reconstruction)?;

    Ok(())
}
