//! Engine configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use coach_core::{GameMode, SessionSettings, Strictness, ThinkSettings};

use crate::error::EngineError;

/// Which side the predictor's `win_probability` refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WinPerspective {
    #[default]
    White,
    SideToMove,
}

impl FromStr for WinPerspective {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(WinPerspective::White),
            "side-to-move" | "side_to_move" => Ok(WinPerspective::SideToMove),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CoachConfig {
    /// Base URL of the move predictor
    pub predictor_url: String,
    pub predictor_timeout: Duration,
    pub win_perspective: WinPerspective,

    /// Explanation service endpoint; explanations are disabled without it
    pub explainer_url: Option<String>,
    pub explainer_timeout: Duration,

    pub human_elo: u32,
    pub opponent_elo: u32,
    pub max_elo: u32,
    pub strictness: Strictness,
    pub clock_secs: u32,
    pub think: ThinkSettings,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            predictor_url: "http://127.0.0.1:5001".to_string(),
            predictor_timeout: Duration::from_secs(10),
            win_perspective: WinPerspective::White,
            explainer_url: None,
            explainer_timeout: Duration::from_secs(120),
            human_elo: 1500,
            opponent_elo: 1500,
            max_elo: 2500,
            strictness: Strictness::Standard,
            clock_secs: 600,
            think: ThinkSettings::default(),
        }
    }
}

impl CoachConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Malformed, out-of-range or zero numbers
    /// fall back to defaults; malformed enumerations are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, default: u64| positive(lookup(key), default);
        let small = |key: &str, default: u32| positive(lookup(key), default);

        let win_perspective = match lookup("PREDICTOR_WIN_PERSPECTIVE") {
            Some(v) => v
                .parse()
                .map_err(|_| EngineError::Config("PREDICTOR_WIN_PERSPECTIVE must be white or side-to-move"))?,
            None => defaults.win_perspective,
        };

        let strictness = match lookup("COACH_STRICTNESS") {
            Some(v) => v
                .parse()
                .map_err(|_| EngineError::Config("COACH_STRICTNESS must be strict, standard or lenient"))?,
            None => defaults.strictness,
        };

        let think = ThinkSettings {
            // Zero is a valid lower bound here
            min_delay: Duration::from_millis(
                lookup("COACH_THINK_MIN_MS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(defaults.think.min_delay.as_millis() as u64),
            ),
            max_delay: Duration::from_millis(number(
                "COACH_THINK_MAX_MS",
                defaults.think.max_delay.as_millis() as u64,
            )),
            acceleration: small("COACH_THINK_ACCELERATION", defaults.think.acceleration),
        };

        Ok(Self {
            predictor_url: lookup("PREDICTOR_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.predictor_url),
            predictor_timeout: Duration::from_secs(number("PREDICTOR_TIMEOUT_SECS", 10)),
            win_perspective,
            explainer_url: lookup("EXPLAINER_URL").filter(|u| !u.trim().is_empty()),
            explainer_timeout: Duration::from_secs(number("EXPLAINER_TIMEOUT_SECS", 120)),
            human_elo: small("COACH_HUMAN_ELO", defaults.human_elo),
            opponent_elo: small("COACH_OPPONENT_ELO", defaults.opponent_elo),
            max_elo: small("COACH_MAX_ELO", defaults.max_elo),
            strictness,
            clock_secs: small("COACH_CLOCK_SECS", defaults.clock_secs),
            think,
        })
    }

    /// Session settings for a new game in `mode` using the configured defaults.
    pub fn session_settings(&self, mode: GameMode) -> SessionSettings {
        SessionSettings {
            mode,
            strictness: self.strictness,
            human_elo: self.human_elo,
            opponent_elo: self.opponent_elo,
            max_elo: self.max_elo,
            clock_secs: self.clock_secs,
            think: self.think,
            seed: None,
        }
    }
}

fn positive<T>(value: Option<String>, default: T) -> T
where
    T: FromStr + PartialEq + Default,
{
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|n| *n != T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<CoachConfig, EngineError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CoachConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.predictor_url, "http://127.0.0.1:5001");
        assert_eq!(cfg.strictness, Strictness::Standard);
        assert_eq!(cfg.clock_secs, 600);
        assert!(cfg.explainer_url.is_none());
        assert_eq!(cfg.win_perspective, WinPerspective::White);
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let cfg = config(&[
            ("PREDICTOR_URL", "http://predictor:9000/"),
            ("COACH_STRICTNESS", "Lenient"),
            ("COACH_CLOCK_SECS", "not-a-number"),
            ("COACH_MAX_ELO", "2800"),
            ("PREDICTOR_WIN_PERSPECTIVE", "side-to-move"),
            ("EXPLAINER_URL", "http://explain:8080/explain"),
        ])
        .unwrap();
        assert_eq!(cfg.predictor_url, "http://predictor:9000");
        assert_eq!(cfg.strictness, Strictness::Lenient);
        assert_eq!(cfg.clock_secs, 600);
        assert_eq!(cfg.max_elo, 2800);
        assert_eq!(cfg.win_perspective, WinPerspective::SideToMove);
        assert_eq!(cfg.explainer_url.as_deref(), Some("http://explain:8080/explain"));
    }

    #[test]
    fn test_zero_and_overflowing_numbers_keep_defaults() {
        let cfg = config(&[
            ("COACH_CLOCK_SECS", "0"),
            ("COACH_MAX_ELO", "4294967297"),
            ("PREDICTOR_TIMEOUT_SECS", "0"),
            ("COACH_THINK_MIN_MS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.clock_secs, 600);
        assert_eq!(cfg.max_elo, 2500);
        assert_eq!(cfg.predictor_timeout, Duration::from_secs(10));
        assert_eq!(cfg.think.min_delay, Duration::ZERO);

        let cfg = config(&[("COACH_CLOCK_SECS", "4294967297")]).unwrap();
        assert_eq!(cfg.clock_secs, 600);
    }

    #[test]
    fn test_bad_enumeration_is_an_error() {
        assert!(matches!(
            config(&[("COACH_STRICTNESS", "brutal")]),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            config(&[("PREDICTOR_WIN_PERSPECTIVE", "black")]),
            Err(EngineError::Config(_))
        ));
    }
}
