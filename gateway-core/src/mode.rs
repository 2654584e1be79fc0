use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Process-wide policy selector. Read once at startup from `APP_MODE`
/// (absent defaults to `Dev`) and threaded through as an immutable value —
/// no global mutable singleton holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Mock,
    Dev,
    Prod,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var("APP_MODE") {
            Ok(value) => value.parse().unwrap_or(Mode::Dev),
            Err(_) => Mode::Dev,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "dev" => Ok(Mode::Dev),
            "prod" => Ok(Mode::Prod),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes_case_insensitively() {
        assert_eq!("MOCK".parse::<Mode>().unwrap(), Mode::Mock);
        assert_eq!("prod".parse::<Mode>().unwrap(), Mode::Prod);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!("staging".parse::<Mode>().is_err());
    }
}
