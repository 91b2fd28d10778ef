//! Deployment environments.
//!
//! The set of environments is closed. Adding one means extending
//! [`Environment`], [`EnvironmentMap`] and the promotion order used by the
//! pipeline builder; the compiler points at every place that needs a value.

use serde::{Deserialize, Serialize};

/// A deployment target with its own isolated resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Every environment, in promotion order.
    pub const ALL: [Environment; 2] = [Environment::Development, Environment::Production];

    /// Canonical name, also used as stage name and `ENVIRONMENT` value.
    pub fn name(self) -> &'static str {
        match self {
            Environment::Development => "Development",
            Environment::Production => "Production",
        }
    }

    /// Suffix appended to every physical resource name in this environment.
    pub fn name_suffix(self) -> &'static str {
        self.name()
    }

    /// Whether promotion into this environment waits for a manual approval.
    pub fn requires_approval(self) -> bool {
        match self {
            Environment::Development => false,
            Environment::Production => true,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per environment.
///
/// Lookup is an exhaustive match over [`Environment`], so it can never come
/// back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMap<T> {
    pub development: T,
    pub production: T,
}

impl<T> EnvironmentMap<T> {
    /// Build a map by calling `f` once per environment, in promotion order.
    pub fn from_fn(mut f: impl FnMut(Environment) -> T) -> Self {
        let development = f(Environment::Development);
        let production = f(Environment::Production);
        Self {
            development,
            production,
        }
    }

    /// Fallible variant of [`EnvironmentMap::from_fn`]; stops at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(Environment) -> Result<T, E>,
    ) -> Result<Self, E> {
        let development = f(Environment::Development)?;
        let production = f(Environment::Production)?;
        Ok(Self {
            development,
            production,
        })
    }

    pub fn get(&self, env: Environment) -> &T {
        match env {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
        }
    }

    /// Iterate entries in promotion order.
    pub fn iter(&self) -> impl Iterator<Item = (Environment, &T)> {
        Environment::ALL.into_iter().map(move |env| (env, self.get(env)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Environment, &T) -> U) -> EnvironmentMap<U> {
        EnvironmentMap::from_fn(|env| f(env, self.get(env)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes_are_distinct() {
        let suffixes: Vec<_> = Environment::ALL.iter().map(|e| e.name_suffix()).collect();
        assert_eq!(suffixes, vec!["Development", "Production"]);
    }

    #[test]
    fn test_only_production_is_gated() {
        assert!(!Environment::Development.requires_approval());
        assert!(Environment::Production.requires_approval());
    }

    #[test]
    fn test_map_is_total() {
        let map = EnvironmentMap::from_fn(|env| env.name().len());
        for env in Environment::ALL {
            assert_eq!(*map.get(env), env.name().len());
        }
        assert_eq!(map.iter().count(), Environment::ALL.len());
    }

    #[test]
    fn test_try_from_fn_stops_at_first_error() {
        let mut seen = Vec::new();
        let result: Result<EnvironmentMap<()>, String> = EnvironmentMap::try_from_fn(|env| {
            seen.push(env);
            Err(format!("{env} failed"))
        });

        assert_eq!(result.unwrap_err(), "Development failed");
        assert_eq!(seen, vec![Environment::Development]);
    }
}
