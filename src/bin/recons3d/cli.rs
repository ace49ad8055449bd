#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "recons3d", about = "Direct Fourier reconstruction of a volume from oriented projections")]
pub struct Cli {

    /// TOML configuration file
    #[clap(short, long, default_value = "recons3d-config.toml")]
    pub config: PathBuf,

    /// Headerless little-endian f32 image stack
    #[clap(short, long)]
    pub stack: PathBuf,

    /// One line per image: `phi theta psi sx sy [defocus_um] [group]`
    #[clap(short, long)]
    pub params: PathBuf,

    /// Where to write the reconstructed volume
    #[clap(short, long, default_value = "recons3d.raw")]
    pub output: PathBuf,

    /// Where to write the FSC table, if a resolution estimate is made
    #[clap(long)]
    pub fsc: Option<PathBuf>,

    /// Also write the odd and even half maps next to the output
    #[clap(long)]
    pub halves: bool,

    /// Override the number of workers given in the configuration
    #[clap(short = 'j', long)]
    pub workers: Option<usize>,

    /// Log level, unless overridden by RUST_LOG
    #[clap(long, default_value = "info")]
    pub log: String,
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::path::PathBuf;
