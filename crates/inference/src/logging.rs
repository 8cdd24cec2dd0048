use crate::config::InferenceConfig;

/// Install logging for the configured environment and level.
pub fn setup_logging(config: &InferenceConfig) -> bool {
    common::setup_logging(config.log_level.clone(), config.environment.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_keeps_the_first() {
        let config = InferenceConfig::test_default();
        setup_logging(&config);
        assert!(!setup_logging(&config));
    }
}
