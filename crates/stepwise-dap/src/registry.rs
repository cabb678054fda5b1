//! Adapter registry
//!
//! Maps a language to its [`AdapterFactory`]. Lookup order: factories
//! registered explicitly, then each [`AdapterResolver`] in the order added,
//! then the builtin factories. Successful loads and environment checks are
//! cached per language.

use crate::adapters::{builtin_factory, AdapterFactory, EnvironmentReport};
use crate::{Error, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use stepwise_core::DebugLanguage;
use tracing::{debug, info, warn};

/// Outcome of asking one resolver for a language
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<dyn AdapterFactory>),
    NotFound,
    /// Something exists for the language but cannot be used
    Malformed(String),
}

/// A source of adapter factories
pub trait AdapterResolver: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, language: DebugLanguage) -> Resolution;
}

/// Factories shipped with this crate
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinResolver;

impl AdapterResolver for BuiltinResolver {
    fn name(&self) -> &str {
        "builtin"
    }

    fn resolve(&self, language: DebugLanguage) -> Resolution {
        match builtin_factory(language) {
            Some(factory) => Resolution::Found(factory),
            None => Resolution::NotFound,
        }
    }
}

/// Availability of one language's adapter on this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterAvailability {
    pub language: DebugLanguage,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_guidance: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AdapterAvailability {
    fn from_report(factory: &dyn AdapterFactory, report: EnvironmentReport) -> Self {
        let metadata = factory.metadata();
        Self {
            language: factory.language(),
            available: report.is_valid(),
            adapter_name: Some(metadata.adapter_name),
            executable: report.executable,
            version: report.version,
            install_guidance: Some(metadata.install_guidance),
            errors: report.errors,
            warnings: report.warnings,
        }
    }

    fn unavailable(language: DebugLanguage, error: &Error) -> Self {
        let install_guidance = match error {
            Error::AdapterNotInstalled { guidance, .. } => Some(guidance.clone()),
            _ => None,
        };
        Self {
            language,
            available: false,
            adapter_name: None,
            executable: None,
            version: None,
            install_guidance,
            errors: vec![error.to_string()],
            warnings: Vec::new(),
        }
    }
}

pub struct AdapterRegistry {
    registered: DashMap<DebugLanguage, Arc<dyn AdapterFactory>>,
    resolvers: Vec<Arc<dyn AdapterResolver>>,
    include_builtins: bool,
    loaded: DashMap<DebugLanguage, Arc<dyn AdapterFactory>>,
    availability: DashMap<DebugLanguage, AdapterAvailability>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field(
                "resolvers",
                &self.resolvers.iter().map(|r| r.name().to_string()).collect::<Vec<_>>(),
            )
            .field("include_builtins", &self.include_builtins)
            .field("loaded", &self.loaded.len())
            .finish()
    }
}

impl AdapterRegistry {
    /// Registry with the builtin factories
    pub fn new() -> Self {
        Self {
            registered: DashMap::new(),
            resolvers: Vec::new(),
            include_builtins: true,
            loaded: DashMap::new(),
            availability: DashMap::new(),
        }
    }

    /// Registry that only knows what is registered or resolved explicitly
    pub fn without_builtins() -> Self {
        Self {
            include_builtins: false,
            ..Self::new()
        }
    }

    /// Add a resolver, consulted after earlier ones and before builtins
    pub fn with_resolver(mut self, resolver: Arc<dyn AdapterResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Register a factory for its declared language, replacing any cached one
    pub fn register(&self, factory: Arc<dyn AdapterFactory>) {
        let language = factory.language();
        debug!(language = %language, "Registered adapter factory");
        self.loaded.remove(&language);
        self.availability.remove(&language);
        self.registered.insert(language, factory);
    }

    fn resolution_chain(&self) -> Vec<Arc<dyn AdapterResolver>> {
        let mut chain = self.resolvers.clone();
        if self.include_builtins {
            chain.push(Arc::new(BuiltinResolver));
        }
        chain
    }

    /// Find the factory for a language
    pub fn load_adapter(&self, language: DebugLanguage) -> Result<Arc<dyn AdapterFactory>> {
        if let Some(factory) = self.loaded.get(&language) {
            return Ok(factory.clone());
        }

        let registered = self.registered.get(&language).map(|f| f.clone());
        let factory = match registered {
            Some(factory) => factory,
            None => self.resolve(language)?,
        };

        if factory.language() != language {
            return Err(Error::AdapterMalformed {
                language: language.to_string(),
                reason: format!(
                    "factory declares language '{}'",
                    factory.language()
                ),
            });
        }

        self.loaded.insert(language, factory.clone());
        Ok(factory)
    }

    fn resolve(&self, language: DebugLanguage) -> Result<Arc<dyn AdapterFactory>> {
        for resolver in self.resolution_chain() {
            match resolver.resolve(language) {
                Resolution::Found(factory) => {
                    debug!(language = %language, resolver = resolver.name(), "Resolved adapter");
                    return Ok(factory);
                }
                Resolution::NotFound => continue,
                Resolution::Malformed(reason) => {
                    warn!(language = %language, resolver = resolver.name(), "Malformed adapter: {}", reason);
                    return Err(Error::AdapterMalformed {
                        language: language.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(Error::AdapterNotInstalled {
            language: language.to_string(),
            guidance: install_guidance(language),
        })
    }

    /// Whether the adapter loads and its environment validates. Never fails.
    pub async fn is_adapter_available(&self, language: DebugLanguage) -> bool {
        self.availability_of(language).await.available
    }

    async fn availability_of(&self, language: DebugLanguage) -> AdapterAvailability {
        if let Some(cached) = self.availability.get(&language) {
            return cached.clone();
        }
        let availability = match self.load_adapter(language) {
            Ok(factory) => {
                let report = factory.validate_environment().await;
                AdapterAvailability::from_report(factory.as_ref(), report)
            }
            Err(e) => AdapterAvailability::unavailable(language, &e),
        };
        self.availability.insert(language, availability.clone());
        availability
    }

    /// Availability of every builtin language plus registered ones
    pub async fn list_available_adapters(&self) -> Vec<AdapterAvailability> {
        let mut languages: Vec<DebugLanguage> = DebugLanguage::SUPPORTED.to_vec();
        for entry in self.registered.iter() {
            if !languages.contains(entry.key()) {
                languages.push(*entry.key());
            }
        }
        languages.sort();

        let mut result = Vec::with_capacity(languages.len());
        for language in languages {
            result.push(self.availability_of(language).await);
        }
        info!(
            "{} of {} adapters available",
            result.iter().filter(|a| a.available).count(),
            result.len()
        );
        result
    }

    /// Forget cached loads and environment checks
    pub fn clear_cache(&self) {
        self.loaded.clear();
        self.availability.clear();
    }
}

/// Install hint for a language with no usable factory
fn install_guidance(language: DebugLanguage) -> String {
    match builtin_factory(language) {
        Some(factory) => factory.metadata().install_guidance,
        None => format!(
            "No builtin adapter for '{}'; register a factory for it",
            language
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedResolver(fn(DebugLanguage) -> Resolution);

    impl AdapterResolver for FixedResolver {
        fn name(&self) -> &str {
            "fixed"
        }

        fn resolve(&self, language: DebugLanguage) -> Resolution {
            (self.0)(language)
        }
    }

    #[test]
    fn test_builtin_resolution_is_cached() {
        let registry = AdapterRegistry::new();
        let first = registry.load_adapter(DebugLanguage::Python).unwrap();
        let second = registry.load_adapter(DebugLanguage::Python).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_mock_is_not_installed_without_registration() {
        let registry = AdapterRegistry::new();
        let err = registry.load_adapter(DebugLanguage::Mock).unwrap_err();
        match err {
            Error::AdapterNotInstalled { language, guidance } => {
                assert_eq!(language, "mock");
                assert!(guidance.contains("register"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_installed_differs_from_malformed() {
        let registry = AdapterRegistry::without_builtins().with_resolver(Arc::new(
            FixedResolver(|language| match language {
                DebugLanguage::Go => Resolution::Malformed("missing entry point".to_string()),
                _ => Resolution::NotFound,
            }),
        ));

        assert!(matches!(
            registry.load_adapter(DebugLanguage::Go),
            Err(Error::AdapterMalformed { .. })
        ));
        assert!(matches!(
            registry.load_adapter(DebugLanguage::Python),
            Err(Error::AdapterNotInstalled { .. })
        ));
    }

    #[test]
    fn test_factory_for_wrong_language_is_malformed() {
        let registry = AdapterRegistry::without_builtins().with_resolver(Arc::new(
            FixedResolver(|_| Resolution::Found(builtin_factory(DebugLanguage::Go).unwrap())),
        ));
        let err = registry.load_adapter(DebugLanguage::Rust).unwrap_err();
        assert!(matches!(err, Error::AdapterMalformed { .. }), "got {:?}", err);
    }

    #[test]
    fn test_earlier_resolver_wins_over_builtin() {
        let registry = AdapterRegistry::new().with_resolver(Arc::new(FixedResolver(|language| {
            match language {
                DebugLanguage::Rust => Resolution::Malformed("shadowed".to_string()),
                _ => Resolution::NotFound,
            }
        })));
        assert!(registry.load_adapter(DebugLanguage::Rust).is_err());
        assert!(registry.load_adapter(DebugLanguage::Python).is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_language_never_fails() {
        let registry = AdapterRegistry::without_builtins();
        assert!(!registry.is_adapter_available(DebugLanguage::Python).await);
        let list = registry.list_available_adapters().await;
        assert_eq!(list.len(), DebugLanguage::SUPPORTED.len());
        assert!(list.iter().all(|a| !a.available && !a.errors.is_empty()));
        assert!(list.iter().all(|a| a.install_guidance.is_some()));
    }
}
