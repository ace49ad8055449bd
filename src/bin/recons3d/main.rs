mod cli;

fn main() -> Result<(), Box<dyn Error>> {

    let Cli { config, stack, params: params_file, output, fsc, halves, workers, log } = Cli::parse();
    init_logging(&log);

    let mut progress = Progress::new();

    progress.start("Reading configuration");
    let config = read_config_file(&config)?;
    let params = config.params()?;
    let workers = workers.unwrap_or(config.workers);
    let settings = config.resolution_settings();
    let optics = config.optics();
    progress.done_with_message(&format!("Read configuration: size {}, symmetry {}, {workers} workers",
                                        config.size, params.symmetry.group()));

    let n_images = RawStack::open(&stack, &params_file, config.size, optics)?.len();
    info!("{} images in {stack:?}", group_digits(n_images));

    progress.start("Reconstructing");
    let bar = image_progress_bar(n_images);
    let outcomes = run_local(workers, |comm| -> gridrec::Result<Option<Outcome>> {
        let share = my_share(&comm, n_images)?;
        debug!("Worker {} takes images {share:?}", comm.rank());
        // A failure to open is reported through the image stream, so that
        // every worker still takes part in the collectives
        let source = match RawStack::open(&stack, &params_file, config.size, optics) {
            Ok(s)  => Either::Left(s.restrict(share)),
            Err(e) => Either::Right(std::iter::once(Err(e))),
        }.inspect(|_| bar.inc(1));
        if config.resolution.enabled {
            Ok(estimate(&comm, source, &params, ROOT, &settings)?.map(Outcome::Split))
        } else {
            Ok(reconstruct(&comm, source, &params, ROOT, config.compensate)?.map(Outcome::Plain))
        }
    });
    bar.finish_and_clear();
    let outcome = outcomes.into_iter().nth(ROOT)
        .ok_or("no result from root worker")??
        .ok_or("root worker returned no volume")?;
    progress.done();

    progress.start(&format!("Writing volume to {output:?}"));
    match outcome {
        Outcome::Plain(volume) => volume.write_to_raw_file(&output)?,
        Outcome::Split(result) => {
            result.volume.write_to_raw_file(&output)?;
            if halves {
                for (half, volume) in [("odd", &result.odd), ("even", &result.even)] {
                    if let Some(volume) = volume { volume.write_to_raw_file(&output.with_extension(format!("{half}.raw")))?; }
                }
            }
            match result.estimate {
                Ok(ResolutionEstimate { fsc: curve, resolution }) => {
                    let resolution = config.resolution.floored(resolution);
                    let pixel = config.ctf.as_ref().map(|c| angstrom_(c.pixel));
                    match (resolution, pixel.and_then(|p| resolution.in_angstrom(p))) {
                        (Resolution::Resolved(f), Some(a)) => println!("Resolution: {f:.4} cycles/voxel ({a:.2} Å)"),
                        (Resolution::Resolved(f), None   ) => println!("Resolution: {f:.4} cycles/voxel"),
                        (Resolution::Unresolved , _      ) => println!("Resolution: unresolved"),
                    }
                    if let Some(path) = fsc { curve.write_table(&path)?; }
                },
                Err(e) if !e.is_fatal() => warn!("No resolution estimate: {e}"),
                Err(e) => return Err(e.into()),
            }
        },
    }
    progress.done();
    Ok(())
}

const ROOT: usize = 0;

enum Outcome {
    Plain(Volume),
    Split(ReconstructionResult),
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;

use clap::Parser;
use itertools::Either;
use tracing::{debug, info, warn};

use cli::Cli;
use gridrec::{
    comm::{run_local, Communicator},
    config::read_config_file,
    fsc::Resolution,
    reduction::{my_share, reconstruct},
    resolution::{estimate, ReconstructionResult, ResolutionEstimate},
    source::RawStack,
    utils::{group_digits, image_progress_bar, init_logging, timing::Progress},
    volume::Volume,
};
use units::angstrom_;
