//! Startup-built table mapping controller lookup keys to factories.

use std::collections::HashMap;
use std::fmt;

use mpbridge_proto::Route;
use mpbridge_proto::route::{ROUTE_SEPARATOR, controller_lookup_key, controller_type_name};

use super::controller::ControllerFactory;
use super::errors::{RegistryError, RouteError};

struct Entry {
    type_name: String,
    factory: ControllerFactory,
}

/// Immutable table of controllers, keyed by `"{prefix}.{lookup_key}"`.
///
/// Share it behind an `Arc`; it is never modified after [`RegistryBuilder::build`].
pub struct ControllerRegistry {
    prefix: String,
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        formatter
            .debug_struct("ControllerRegistry")
            .field("prefix", &self.prefix)
            .field("keys", &keys)
            .finish()
    }
}

/// A route matched to its registered controller.
pub struct ResolvedController {
    /// Full registry key, including the prefix.
    pub key: String,
    /// Type name recorded at registration.
    pub type_name: String,
    /// Factory that builds the controller.
    pub factory: ControllerFactory,
}

impl ControllerRegistry {
    /// Starts a registry whose keys are qualified with `prefix`.
    pub fn builder(prefix: impl Into<String>) -> RegistryBuilder {
        RegistryBuilder {
            prefix: prefix.into(),
            entries: HashMap::new(),
        }
    }

    /// Prefix qualifying every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of registered controllers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no controller is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the controller for `route`.
    ///
    /// The lookup key decides which entry is used; the type name derived
    /// from the route must then match the one recorded for that entry.
    pub fn resolve(&self, route: &Route) -> Result<ResolvedController, RouteError> {
        let key = qualify(&self.prefix, &route.lookup_key());
        let entry = self
            .entries
            .get(&key)
            .ok_or_else(|| RouteError::UnknownController { key: key.clone() })?;
        let derived = route.type_name();
        if entry.type_name != derived {
            return Err(RouteError::NameMismatch {
                key,
                registered: entry.type_name.clone(),
                derived,
            });
        }
        Ok(ResolvedController {
            key,
            type_name: entry.type_name.clone(),
            factory: entry.factory.clone(),
        })
    }
}

/// Collects registrations before the registry is frozen.
pub struct RegistryBuilder {
    prefix: String,
    entries: HashMap<String, Entry>,
}

impl RegistryBuilder {
    /// Registers `factory` for routes whose namespace is `namespace`.
    pub fn register(
        mut self,
        namespace: &str,
        factory: ControllerFactory,
    ) -> Result<Self, RegistryError> {
        if namespace.is_empty() || namespace.contains(ROUTE_SEPARATOR) {
            return Err(RegistryError::InvalidNamespace {
                namespace: namespace.to_owned(),
            });
        }
        let key = qualify(&self.prefix, &controller_lookup_key(namespace));
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate { key });
        }
        self.entries.insert(
            key,
            Entry {
                type_name: controller_type_name(namespace),
                factory,
            },
        );
        Ok(self)
    }

    /// Freezes the registrations.
    pub fn build(self) -> ControllerRegistry {
        ControllerRegistry {
            prefix: self.prefix,
            entries: self.entries,
        }
    }
}

fn qualify(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::dispatch::EchoController;

    #[fixture]
    fn registry() -> ControllerRegistry {
        ControllerRegistry::builder("controllers")
            .register("test", EchoController::factory())
            .and_then(|builder| builder.register("userProfile", EchoController::factory()))
            .expect("register controllers")
            .build()
    }

    fn route(text: &str) -> Route {
        Route::parse(text).expect("valid route")
    }

    #[rstest]
    #[case("test/test", "controllers.test_controller", "TestController")]
    #[case("userProfile/show", "controllers.user_profile_controller", "UserProfileController")]
    fn resolves_registered_namespaces(
        registry: ControllerRegistry,
        #[case] text: &str,
        #[case] key: &str,
        #[case] type_name: &str,
    ) {
        let resolved = registry.resolve(&route(text)).expect("resolved");
        assert_eq!(resolved.key, key);
        assert_eq!(resolved.type_name, type_name);
    }

    #[rstest]
    fn resolution_is_deterministic(registry: ControllerRegistry) {
        let first = registry.resolve(&route("test/a")).expect("first");
        let second = registry.resolve(&route("test/a")).expect("second");
        assert_eq!(first.key, second.key);
        assert_eq!(first.type_name, second.type_name);
    }

    #[rstest]
    fn unknown_namespace_is_rejected(registry: ControllerRegistry) {
        let error = registry
            .resolve(&route("missing/run"))
            .err()
            .expect("unknown controller");
        assert_eq!(
            error,
            RouteError::UnknownController {
                key: "controllers.missing_controller".into()
            }
        );
    }

    #[rstest]
    fn diverging_type_name_is_rejected(registry: ControllerRegistry) {
        let error = registry
            .resolve(&route("user_profile/show"))
            .err()
            .expect("name mismatch");
        assert!(matches!(
            error,
            RouteError::NameMismatch { ref registered, ref derived, .. }
                if registered == "UserProfileController" && derived == "User_profileController"
        ));
    }

    #[test]
    fn colliding_namespaces_are_duplicates() {
        let error = ControllerRegistry::builder("controllers")
            .register("userProfile", EchoController::factory())
            .and_then(|builder| builder.register("user_profile", EchoController::factory()))
            .err()
            .expect("duplicate key");
        assert_eq!(
            error,
            RegistryError::Duplicate {
                key: "controllers.user_profile_controller".into()
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    fn invalid_namespaces_are_rejected(#[case] namespace: &str) {
        let error = ControllerRegistry::builder("controllers")
            .register(namespace, EchoController::factory())
            .err()
            .expect("invalid namespace");
        assert!(matches!(error, RegistryError::InvalidNamespace { .. }));
    }

    #[test]
    fn empty_prefix_leaves_key_unqualified() {
        let registry = ControllerRegistry::builder("")
            .register("test", EchoController::factory())
            .expect("register")
            .build();
        let resolved = registry.resolve(&route("test/x")).expect("resolved");
        assert_eq!(resolved.key, "test_controller");
    }
}
