/// Orientation and per-image metadata read from one line of a projection
/// parameter file: `phi theta psi sx sy [defocus_um] [group]`, angles in
/// degrees, shifts in pixels. A defocus of `-` marks a grouped image with no
/// known defocus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub transform: Transform,
    pub defocus: Option<Length>,
    pub group: Option<u32>,
}

const NO_DEFOCUS: &str = "-";

pub fn parse_projection_params(s: &str) -> Result<ProjectionParams, String> {
    let n = s.split_whitespace().collect::<Vec<_>>();
    if !(5..=7).contains(&n.len()) {
        return Err(format!("expected 5 to 7 fields, found {}", n.len()));
    }
    let float = |i: usize| n[i].parse::<f32>().map_err(|e| format!("field {}: {e}", i + 1));

    let transform = Transform::from_degrees(float(0)?, float(1)?, float(2)?)
        .with_shift(float(3)?, float(4)?);
    let defocus = match n.get(5) {
        None | Some(&NO_DEFOCUS) => None,
        Some(_) => Some(um(float(5)?)),
    };
    let group = n.get(6)
        .map(|g| g.parse::<u32>().map_err(|e| format!("field 7: {e}")))
        .transpose()?;
    Ok(ProjectionParams { transform, defocus, group })
}

impl std::fmt::Display for ProjectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = &self.transform;
        write!(f, "{} {} {} {} {}", deg_(t.phi), deg_(t.theta), deg_(t.psi), t.sx, t.sy)?;
        match (self.defocus, self.group) {
            (None   , None   ) => Ok(()),
            (Some(d), None   ) => write!(f, " {}", um_(d)),
            (Some(d), Some(g)) => write!(f, " {} {g}", um_(d)),
            (None   , Some(g)) => write!(f, " {NO_DEFOCUS} {g}"),
        }
    }
}

/// Read a parameter file, one image per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn read_projection_params(path: &Path) -> crate::error::Result<Vec<ProjectionParams>> {
    let text = std::fs::read_to_string(path).map_err(Error::io(path))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !(line.trim().is_empty() || line.trim_start().starts_with('#')))
        .map(|(i, line)| parse_projection_params(line)
             .map_err(|reason| Error::Parse { line: i + 1, text: line.into(), reason }))
        .collect()
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

/// Install a `tracing` subscriber writing to stderr. `RUST_LOG` overrides
/// `base_level`.
pub fn init_logging(base_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(base_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

pub mod timing {

    use super::group_digits;
    use std::time::Instant;
    use std::io::Write;

    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            std::io::stdout().flush().ok();
            self.start_timer();
        }

        /// Print time elapsed since last start or done
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        /// Print message followed by time elapsed since last start or done
        pub fn done_with_message(&mut self, message: &str) {
            println!("{message}: {} ms",
                     group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}

/// A progress bar over `len` images, in the style used by all binaries.
pub fn image_progress_bar(len: usize) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(len as u64);
    let style = indicatif::ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos:>7}/{len:7} {msg}");
    if let Ok(style) = style { bar.set_style(style); }
    bar
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::path::Path;

use tracing_subscriber::EnvFilter;

use geometry::Transform;
use units::{deg_, um, um_, Length};

use crate::error::Error;
