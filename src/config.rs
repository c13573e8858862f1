/// Hard limits applied while validating a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum arguments per command, not counting the program itself.
    pub max_args: usize,
    /// Maximum commands in one pipeline.
    pub max_commands: usize,
    /// Maximum tracked background jobs.
    pub max_background: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_args: 16,
            max_commands: 16,
            max_background: 16,
        }
    }
}

/// Runtime configuration for a shell session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    pub limits: Limits,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "msh> ".to_string(),
            limits: Limits::default(),
        }
    }
}

impl ShellConfig {
    /// Defaults overridden by `MSH_PROMPT`, `MSH_MAX_ARGS`, `MSH_MAX_COMMANDS`
    /// and `MSH_MAX_BACKGROUND`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(prompt) = lookup("MSH_PROMPT") {
            config.prompt = prompt;
        }

        let limits = &mut config.limits;
        override_limit(&lookup, "MSH_MAX_ARGS", &mut limits.max_args);
        override_limit(&lookup, "MSH_MAX_COMMANDS", &mut limits.max_commands);
        override_limit(&lookup, "MSH_MAX_BACKGROUND", &mut limits.max_background);

        config
    }
}

fn override_limit(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut usize) {
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => *slot = value,
        _ => log::warn!("ignoring {key}={raw:?}: expected a positive integer"),
    }
}
