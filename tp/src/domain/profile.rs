//! Behavior profiles - the knobs that steer worker and supervisor strategy

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::JsonStore;

/// Errors from profile validation
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile knob {knob} = {value} is outside [0, 1]")]
    KnobOutOfRange { knob: &'static str, value: f64 },

    #[error("Unknown profile: {0}")]
    Unknown(String),
}

/// How the supervisor distributes a task across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// One worker runs the task end-to-end
    #[default]
    Independent,
    /// The task may be decomposed into subtasks spread across workers
    Cooperative,
    /// Several workers race; the first successful result wins
    Competitive,
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::Cooperative => write!(f, "cooperative"),
            Self::Competitive => write!(f, "competitive"),
        }
    }
}

/// A named collection of behavioral knobs.
///
/// Numeric knobs are constrained to [0, 1]; construct via [`Profile::custom`]
/// or call [`Profile::validate`] after deserializing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,

    // Decision-making preferences, each in [0, 1]
    pub creativity_vs_precision: f64,
    pub speed_vs_accuracy: f64,
    pub risk_tolerance: f64,
    pub cost_sensitivity: f64,

    // Tool usage
    pub max_tools_per_step: usize,
    pub tool_retry_limit: u32,

    // Error handling
    pub max_retries: u32,
    pub give_up_after_errors: u32,
    pub auto_pause_on_errors: bool,

    // Skill and command systems
    pub enable_skills: bool,
    pub prefer_skills: bool,
    pub enable_commands: bool,

    // Multi-agent strategy
    pub collaboration_mode: CollaborationMode,
    pub task_decomposition: bool,

    /// Step budget for the decision-action loop
    pub max_steps: u32,
}

impl Default for Profile {
    fn default() -> Self {
        Self::balanced()
    }
}

impl Profile {
    /// Build a custom profile, validating the numeric knobs
    pub fn custom(name: impl Into<String>, description: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder {
            profile: Profile {
                name: name.into(),
                description: description.into(),
                ..Profile::balanced()
            },
        }
    }

    /// Check the [0, 1] constraint on every numeric knob
    pub fn validate(&self) -> Result<(), ProfileError> {
        for (knob, value) in [
            ("creativity_vs_precision", self.creativity_vs_precision),
            ("speed_vs_accuracy", self.speed_vs_accuracy),
            ("risk_tolerance", self.risk_tolerance),
            ("cost_sensitivity", self.cost_sensitivity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProfileError::KnobOutOfRange { knob, value });
            }
        }
        Ok(())
    }

    /// Precise and careful: low risk, pauses on errors, no decomposition
    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            description: "Precise and careful execution with strong error checking".to_string(),
            creativity_vs_precision: 0.1,
            speed_vs_accuracy: 0.2,
            risk_tolerance: 0.1,
            cost_sensitivity: 0.5,
            max_tools_per_step: 2,
            tool_retry_limit: 3,
            max_retries: 2,
            give_up_after_errors: 3,
            auto_pause_on_errors: true,
            enable_skills: true,
            prefer_skills: false,
            enable_commands: true,
            collaboration_mode: CollaborationMode::Independent,
            task_decomposition: false,
            max_steps: 10,
        }
    }

    /// Fast and aggressive: decomposes cooperatively, tool-heavy
    pub fn creative() -> Self {
        Self {
            name: "creative".to_string(),
            description: "Creative and fast execution with a risk-taking approach".to_string(),
            creativity_vs_precision: 0.9,
            speed_vs_accuracy: 0.9,
            risk_tolerance: 0.9,
            cost_sensitivity: 0.3,
            max_tools_per_step: 5,
            tool_retry_limit: 1,
            max_retries: 5,
            give_up_after_errors: 10,
            auto_pause_on_errors: false,
            enable_skills: true,
            prefer_skills: true,
            enable_commands: true,
            collaboration_mode: CollaborationMode::Cooperative,
            task_decomposition: true,
            max_steps: 10,
        }
    }

    /// Reasonable trade-offs everywhere
    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            description: "Balanced approach with reasonable trade-offs".to_string(),
            creativity_vs_precision: 0.5,
            speed_vs_accuracy: 0.5,
            risk_tolerance: 0.5,
            cost_sensitivity: 0.5,
            max_tools_per_step: 3,
            tool_retry_limit: 2,
            max_retries: 3,
            give_up_after_errors: 5,
            auto_pause_on_errors: false,
            enable_skills: true,
            prefer_skills: false,
            enable_commands: true,
            collaboration_mode: CollaborationMode::Independent,
            task_decomposition: true,
            max_steps: 10,
        }
    }

    /// Minimal surface for safe or test environments
    pub fn minimal() -> Self {
        Self {
            name: "minimal".to_string(),
            description: "Minimal, safe execution with basic features".to_string(),
            creativity_vs_precision: 0.3,
            speed_vs_accuracy: 0.3,
            risk_tolerance: 0.2,
            cost_sensitivity: 0.5,
            max_tools_per_step: 1,
            tool_retry_limit: 1,
            max_retries: 1,
            give_up_after_errors: 2,
            auto_pause_on_errors: true,
            enable_skills: false,
            prefer_skills: false,
            enable_commands: false,
            collaboration_mode: CollaborationMode::Independent,
            task_decomposition: false,
            max_steps: 10,
        }
    }

    /// Persistent, skill-preferring production profile
    pub fn autonomous() -> Self {
        Self {
            name: "autonomous".to_string(),
            description: "Highly autonomous with aggressive error recovery".to_string(),
            creativity_vs_precision: 0.7,
            speed_vs_accuracy: 0.6,
            risk_tolerance: 0.7,
            cost_sensitivity: 0.4,
            max_tools_per_step: 4,
            tool_retry_limit: 3,
            max_retries: 4,
            give_up_after_errors: 8,
            auto_pause_on_errors: false,
            enable_skills: true,
            prefer_skills: true,
            enable_commands: true,
            collaboration_mode: CollaborationMode::Cooperative,
            task_decomposition: true,
            max_steps: 10,
        }
    }
}

/// Builder for validated custom profiles
pub struct ProfileBuilder {
    profile: Profile,
}

impl ProfileBuilder {
    pub fn risk_tolerance(mut self, value: f64) -> Self {
        self.profile.risk_tolerance = value;
        self
    }

    pub fn speed_vs_accuracy(mut self, value: f64) -> Self {
        self.profile.speed_vs_accuracy = value;
        self
    }

    pub fn creativity_vs_precision(mut self, value: f64) -> Self {
        self.profile.creativity_vs_precision = value;
        self
    }

    pub fn cost_sensitivity(mut self, value: f64) -> Self {
        self.profile.cost_sensitivity = value;
        self
    }

    pub fn collaboration_mode(mut self, mode: CollaborationMode) -> Self {
        self.profile.collaboration_mode = mode;
        self
    }

    pub fn task_decomposition(mut self, enabled: bool) -> Self {
        self.profile.task_decomposition = enabled;
        self
    }

    pub fn max_tools_per_step(mut self, n: usize) -> Self {
        self.profile.max_tools_per_step = n;
        self
    }

    pub fn max_steps(mut self, n: u32) -> Self {
        self.profile.max_steps = n;
        self
    }

    /// Validate and produce the profile
    pub fn build(self) -> Result<Profile, ProfileError> {
        self.profile.validate()?;
        Ok(self.profile)
    }
}

/// Registry of built-in and persisted custom profiles
pub struct ProfileRegistry {
    store: JsonStore,
    active: String,
}

impl ProfileRegistry {
    /// Open the registry over `data/profiles.json`
    pub fn open(path: impl AsRef<std::path::Path>) -> eyre::Result<Self> {
        let store = JsonStore::open(path)?;
        let active = store.get_as::<String>("active").unwrap_or_else(|| "balanced".to_string());
        Ok(Self { store, active })
    }

    /// Built-in profile names
    pub fn builtin_names() -> &'static [&'static str] {
        &["conservative", "creative", "balanced", "minimal", "autonomous"]
    }

    /// Resolve a profile by name: built-ins first, then persisted customs
    pub fn get(&self, name: &str) -> Result<Profile, ProfileError> {
        match name {
            "conservative" => Ok(Profile::conservative()),
            "creative" => Ok(Profile::creative()),
            "balanced" => Ok(Profile::balanced()),
            "minimal" => Ok(Profile::minimal()),
            "autonomous" => Ok(Profile::autonomous()),
            other => self
                .custom_profiles()
                .into_iter()
                .find(|p| p.name == other)
                .ok_or_else(|| ProfileError::Unknown(other.to_string())),
        }
    }

    /// The currently active profile (falls back to balanced)
    pub fn active_profile(&self) -> Profile {
        self.get(&self.active).unwrap_or_default()
    }

    /// Switch the active profile and persist the choice
    pub fn set_active(&mut self, name: &str) -> eyre::Result<()> {
        self.get(name).map_err(|e| eyre::eyre!(e.to_string()))?;
        self.active = name.to_string();
        self.store.set("active", name)?;
        Ok(())
    }

    /// Save a custom profile
    pub fn save_custom(&mut self, profile: &Profile) -> eyre::Result<()> {
        profile.validate().map_err(|e| eyre::eyre!(e.to_string()))?;

        let mut customs = self.custom_profiles();
        customs.retain(|p| p.name != profile.name);
        customs.push(profile.clone());

        let map: serde_json::Map<String, serde_json::Value> = customs
            .into_iter()
            .map(|p| (p.name.clone(), serde_json::to_value(&p).unwrap_or_default()))
            .collect();
        self.store.set("custom_profiles", map)?;
        Ok(())
    }

    fn custom_profiles(&self) -> Vec<Profile> {
        self.store
            .get_as::<serde_json::Map<String, serde_json::Value>>("custom_profiles")
            .map(|map| {
                map.into_iter()
                    .filter_map(|(_, v)| serde_json::from_value::<Profile>(v).ok())
                    .filter(|p| p.validate().is_ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtins_validate() {
        for profile in [
            Profile::conservative(),
            Profile::creative(),
            Profile::balanced(),
            Profile::minimal(),
            Profile::autonomous(),
        ] {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_custom_out_of_range_rejected() {
        let result = Profile::custom("wild", "too risky").risk_tolerance(1.5).build();
        assert!(matches!(result, Err(ProfileError::KnobOutOfRange { knob: "risk_tolerance", .. })));
    }

    #[test]
    fn test_collaboration_mode_serde() {
        assert_eq!(serde_json::to_string(&CollaborationMode::Competitive).unwrap(), "\"competitive\"");
        let mode: CollaborationMode = serde_json::from_str("\"cooperative\"").unwrap();
        assert_eq!(mode, CollaborationMode::Cooperative);
    }

    #[test]
    fn test_registry_builtin_and_custom() {
        let temp = tempdir().unwrap();
        let mut registry = ProfileRegistry::open(temp.path().join("profiles.json")).unwrap();

        assert_eq!(registry.get("creative").unwrap().name, "creative");
        assert!(registry.get("nope").is_err());

        let custom = Profile::custom("careful-racer", "competitive but cautious")
            .risk_tolerance(0.2)
            .collaboration_mode(CollaborationMode::Competitive)
            .build()
            .unwrap();
        registry.save_custom(&custom).unwrap();

        let loaded = registry.get("careful-racer").unwrap();
        assert_eq!(loaded.collaboration_mode, CollaborationMode::Competitive);

        registry.set_active("careful-racer").unwrap();
        assert_eq!(registry.active_profile().name, "careful-racer");
    }

    #[test]
    fn test_registry_active_persists() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("profiles.json");

        {
            let mut registry = ProfileRegistry::open(&path).unwrap();
            registry.set_active("minimal").unwrap();
        }

        let registry = ProfileRegistry::open(&path).unwrap();
        assert_eq!(registry.active_profile().name, "minimal");
    }
}
