//! Defines helper methods for Deserializing external types.
use std::str::FromStr;

use log::LevelFilter;
use serde::{de, Deserialize, Deserializer};
use x509_cert::name::Name;

//------------ LevelFilter ---------------------------------------------------

pub fn de_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    LevelFilter::from_str(&string).map_err(de::Error::custom)
}

//------------ Name ----------------------------------------------------------

/// Deserializes an optional RFC 4514 distinguished name, e.g. "CN=RA,O=Example".
pub fn de_name_opt<'de, D>(d: D) -> Result<Option<Name>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(string) => Name::from_str(&string)
            .map(Some)
            .map_err(|e| de::Error::custom(format!("Invalid distinguished name \"{}\": {}", string, e))),
    }
}
