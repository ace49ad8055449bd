// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "simulate", about = "Write a synthetic projection stack of a Gaussian blob phantom")]
pub struct Cli {

    /// Image side in pixels
    #[clap(short, long, default_value = "32")]
    pub size: usize,

    /// Number of projections
    #[clap(short, long, default_value = "500")]
    pub n_images: usize,

    /// Blob position relative to the volume origin, in voxels
    #[clap(long, num_args = 3, allow_negative_numbers = true, default_values = ["3", "-2", "1"])]
    pub centre: Vec<f32>,

    /// Blob width (sigma) in voxels
    #[clap(long, default_value = "2.0")]
    pub sigma: f32,

    /// Standard deviation of added white noise
    #[clap(long, default_value = "0.0")]
    pub noise: f32,

    /// Largest random in-plane shift, in pixels
    #[clap(long, default_value = "0.0")]
    pub max_shift: f32,

    /// Modulate images by a CTF with defocus drawn from this range of µm
    #[clap(long, num_args = 2)]
    pub defocus: Option<Vec<f32>>,

    /// Microscope voltage used with --defocus
    #[clap(long, default_value = "300 kV")]
    pub voltage: ElectricPotential,

    /// Pixel size used with --defocus
    #[clap(long, default_value = "1 Å")]
    pub pixel: Length,

    /// Tag images with `index % groups`
    #[clap(long)]
    pub groups: Option<u32>,

    #[clap(long, default_value = "1")]
    pub seed: u64,

    /// Where to write the image stack
    #[clap(short, long, default_value = "stack.raw")]
    pub output: PathBuf,

    /// Where to write the projection parameters
    #[clap(short, long, default_value = "params.txt")]
    pub params: PathBuf,

    /// Also write the phantom itself
    #[clap(long)]
    pub phantom: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();
    init_logging("info");
    let Cli { size, n_images, sigma, noise, max_shift, groups, seed, .. } = args;
    let centre = match args.centre[..] { [x, y, z] => [x, y, z], _ => return Err("centre needs 3 values".into()) };
    let defocus_range = match args.defocus.as_deref() {
        None => None,
        Some(&[lo, hi]) if 0.0 < lo && lo <= hi => Some((lo, hi)),
        Some(_) => return Err("defocus range must be two increasing positive values".into()),
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let mut progress = Progress::new();
    progress.start(&format!("Simulating {} projections", group_digits(n_images)));
    let bar = image_progress_bar(n_images);
    let mut pixels = Vec::with_capacity(n_images * size * size);
    let mut lines = vec![format!("# phi theta psi sx sy defocus_um group; {size}x{size} blob at {centre:?}, sigma {sigma}")];
    for index in 0..n_images {
        let shift = |rng: &mut StdRng| if max_shift > 0.0 { rng.gen_range(-max_shift..=max_shift) } else { 0.0 };
        let (sx, sy) = (shift(&mut rng), shift(&mut rng));
        let transform = random_orientation(&mut rng).with_shift(sx, sy);
        let mut image = gaussian_projection(size, transform, centre, sigma);
        let defocus = defocus_range.map(|(lo, hi)| um(if lo < hi { rng.gen_range(lo..hi) } else { lo }));
        if let Some(defocus) = defocus {
            let desc = CtfDescriptor::new(defocus, args.voltage, mm(2.7), args.pixel, ratio(0.1));
            image = image.with_ctf_applied(desc);
        }
        if noise > 0.0 { image = image.with_noise_added(&mut rng, noise)?; }
        pixels.extend_from_slice(&image.data);
        let group = groups.map(|g| index as u32 % g.max(1));
        lines.push(ProjectionParams { transform, defocus, group }.to_string());
        bar.inc(1);
    }
    bar.finish_and_clear();
    progress.done();

    progress.start(&format!("Writing {:?} and {:?}", args.output, args.params));
    raw::write(pixels.into_iter(), &args.output)?;
    std::fs::write(&args.params, lines.join("\n") + "\n")?;
    if let Some(path) = &args.phantom {
        gaussian_blob(size, centre, sigma).write_to_raw_file(path)?;
    }
    progress.done();
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};

use gridrec::{
    ctf::CtfDescriptor,
    io::raw,
    synthetic::{gaussian_blob, gaussian_projection, random_orientation},
    utils::{group_digits, image_progress_bar, init_logging, timing::Progress, ProjectionParams},
};
use units::{mm, ratio, um, ElectricPotential, Length};
