// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "fsc", about = "Fourier shell correlation between two volumes")]
pub struct Cli {

    /// First half map (raw f32, cubic)
    pub a: PathBuf,

    /// Second half map (raw f32, cubic)
    pub b: PathBuf,

    /// Radius of the spherical mask applied to both maps, in voxels
    #[clap(short, long)]
    pub mask_radius: Option<Lengthf32>,

    /// Do not mask the maps
    #[clap(long, conflicts_with = "mask_radius")]
    pub no_mask: bool,

    #[clap(short, long, default_value = "0.143")]
    pub threshold: f32,

    /// Consecutive shells required above threshold
    #[clap(short, long, default_value = "3")]
    pub run: usize,

    /// Pixel size, to report resolution in Å
    #[clap(short, long)]
    pub pixel: Option<Length>,

    /// Where to write the FSC table
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {

    let Cli { a, b, mask_radius, no_mask, threshold, run, pixel, output } = Cli::parse();
    init_logging("info");

    let mut progress = Progress::new();
    progress.start("Reading volumes");
    let a = Volume::from_raw_file(&a)?;
    let b = Volume::from_raw_file(&b)?;
    progress.done();

    let (a, b) = if no_mask { (a, b) } else {
        let radius = mask_radius.unwrap_or_else(|| default_radius(a.size));
        let mask = sphere(a.size, radius);
        (a.masked(&mask)?, b.masked(&mask)?)
    };

    progress.start("Correlating");
    let curve = fsc(&a, &b)?;
    progress.done();

    for (r, (f, c)) in curve.frequency.iter().zip(&curve.fsc).enumerate() {
        println!("{r:4} {f:8.4} {c:8.4}");
    }
    match (curve.resolution(threshold, run), pixel) {
        (Resolution::Unresolved, _) => println!("Unresolved"),
        (resolved, Some(pixel)) => println!("Resolution: {:.2} Å", resolved.in_angstrom(angstrom_(pixel)).unwrap_or(f32::INFINITY)),
        (Resolution::Resolved(f), None) => println!("Resolution: {f:.4} cycles/voxel"),
    }
    if let Some(path) = output { curve.write_table(&path)?; }
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use gridrec::{
    fsc::{fsc, Resolution},
    mask::{default_radius, sphere},
    utils::{init_logging, timing::Progress},
    volume::Volume,
};
use units::{angstrom_, Length, todo::Lengthf32};
