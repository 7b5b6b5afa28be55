//! Storefront presets sharing the same listing-page template.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported storefronts of the template family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Storefront {
    #[default]
    Jumbo,
    Disco,
    Vea,
}

impl Storefront {
    /// Returns the storefront domain.
    pub fn domain(&self) -> &'static str {
        match self {
            Storefront::Jumbo => "jumbo.com.ar",
            Storefront::Disco => "disco.com.ar",
            Storefront::Vea => "vea.com.ar",
        }
    }

    /// Returns the base URL for this storefront.
    pub fn base_url(&self) -> String {
        format!("https://www.{}", self.domain())
    }

    /// Human-readable store name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Storefront::Jumbo => "Jumbo",
            Storefront::Disco => "Disco",
            Storefront::Vea => "Vea",
        }
    }

    /// Returns the Accept-Language header value for this storefront.
    pub fn accept_language(&self) -> &'static str {
        "es-AR,es;q=0.9,en;q=0.8"
    }

    /// Returns all supported storefronts.
    pub fn all() -> &'static [Storefront] {
        &[Storefront::Jumbo, Storefront::Disco, Storefront::Vea]
    }
}

impl fmt::Display for Storefront {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Storefront::Jumbo => "jumbo",
            Storefront::Disco => "disco",
            Storefront::Vea => "vea",
        };
        write!(f, "{}", code)
    }
}

impl FromStr for Storefront {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jumbo" => Ok(Storefront::Jumbo),
            "disco" => Ok(Storefront::Disco),
            "vea" => Ok(Storefront::Vea),
            _ => Err(format!(
                "Unknown storefront: {}. Supported: {}",
                s,
                Storefront::all().iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}
