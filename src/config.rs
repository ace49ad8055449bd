//! TOML configuration for the binaries.
//!
//! Physical quantities are written with units, as strings (`"300 kV"`,
//! `"2.7 mm"`) and parsed by `uom`.

pub mod recons3d;

pub use recons3d::{read_config_file, Config};

pub(crate) fn deserialize_uom_opt<'d, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<&str>::deserialize(deserializer)?
        .map(str::parse::<T>)
        .transpose()
        .map_err(de::Error::custom)
}

pub(crate) fn deserialize_uom<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    <&str>::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};
