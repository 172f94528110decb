//! Platform capability profile
//!
//! Decides whether a recognition engine is usable here and which
//! result-handling quirks apply.

use crate::engine::EngineFactory;

/// What the host platform offers to recognition engines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformProfile {
    /// Audio capture and processing APIs needed by non-native engines exist
    pub audio_capture: bool,

    /// The platform reports zero-confidence false-positive finals and fires
    /// duplicate final callbacks in quick succession
    pub mobile_result_quirks: bool,
}

impl PlatformProfile {
    pub fn desktop() -> Self {
        Self {
            audio_capture: true,
            mobile_result_quirks: false,
        }
    }

    pub fn mobile() -> Self {
        Self {
            audio_capture: true,
            mobile_result_quirks: true,
        }
    }

    /// Whether the given engine can run on this platform
    pub fn supports(&self, factory: Option<&dyn EngineFactory>) -> bool {
        match factory {
            Some(factory) => factory.is_native() || self.audio_capture,
            None => false,
        }
    }

    /// Continuous-listening support reported at startup detection.
    /// Platforms with mobile result quirks cannot keep a session alive.
    pub fn initial_continuous_support(&self, supported: bool) -> bool {
        supported && !self.mobile_result_quirks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedFactory;

    #[test]
    fn test_missing_factory_is_unsupported() {
        assert!(!PlatformProfile::desktop().supports(None));
    }

    #[test]
    fn test_native_engine_needs_no_capture_apis() {
        let platform = PlatformProfile::default();
        assert!(platform.supports(Some(&ScriptedFactory::native())));
        assert!(!platform.supports(Some(&ScriptedFactory::polyfill())));
    }

    #[test]
    fn test_polyfill_needs_capture_apis() {
        assert!(PlatformProfile::desktop().supports(Some(&ScriptedFactory::polyfill())));
    }

    #[test]
    fn test_mobile_has_no_initial_continuous_support() {
        assert!(!PlatformProfile::mobile().initial_continuous_support(true));
        assert!(PlatformProfile::desktop().initial_continuous_support(true));
        assert!(!PlatformProfile::desktop().initial_continuous_support(false));
    }
}
