//! # Object Builder
//!
//! Builds an object by threading it through a list of modifiers. Each
//! modifier decides on its own whether it applies; enabled modifiers run in
//! registration order and see everything earlier ones produced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("modifier {modifier} failed: {reason}")]
    Modifier {
        modifier: &'static str,
        reason: String,
    },
    #[error("invalid build input: {0}")]
    Invalid(String),
    #[error("failed to serialize object for hashing: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A toggleable mutation on a build target
///
/// Modifiers never read cluster state; everything they need is handed to
/// them when they are constructed.
pub trait Modifier<T> {
    fn enabled(&self) -> bool;
    fn modify(&self, target: &mut T) -> Result<(), BuildError>;
}

pub struct Builder<'a, T> {
    target: T,
    modifiers: Vec<Box<dyn Modifier<T> + 'a>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Builder<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("target", &self.target)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}

impl<'a, T> Builder<'a, T> {
    pub fn new(base: T) -> Self {
        Self {
            target: base,
            modifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_modifier(mut self, modifier: impl Modifier<T> + 'a) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }

    #[must_use]
    pub fn add_modifiers(
        mut self,
        modifiers: impl IntoIterator<Item = Box<dyn Modifier<T> + 'a>>,
    ) -> Self {
        self.modifiers.extend(modifiers);
        self
    }

    /// Run every enabled modifier; stops at the first error
    pub fn build(self) -> Result<T, BuildError> {
        let Builder {
            mut target,
            modifiers,
        } = self;
        for modifier in modifiers.iter().filter(|m| m.enabled()) {
            modifier.modify(&mut target)?;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Push {
        value: u8,
        enabled: bool,
    }

    impl Modifier<Vec<u8>> for Push {
        fn enabled(&self) -> bool {
            self.enabled
        }

        fn modify(&self, target: &mut Vec<u8>) -> Result<(), BuildError> {
            target.push(self.value);
            Ok(())
        }
    }

    struct Fail;

    impl Modifier<Vec<u8>> for Fail {
        fn enabled(&self) -> bool {
            true
        }

        fn modify(&self, _target: &mut Vec<u8>) -> Result<(), BuildError> {
            Err(BuildError::Modifier {
                modifier: "fail",
                reason: "boom".to_string(),
            })
        }
    }

    struct Count<'c>(&'c Cell<u8>);

    impl Modifier<Vec<u8>> for Count<'_> {
        fn enabled(&self) -> bool {
            true
        }

        fn modify(&self, _target: &mut Vec<u8>) -> Result<(), BuildError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_enabled_modifiers_run_in_order() {
        let built = Builder::new(vec![0])
            .add_modifier(Push { value: 1, enabled: true })
            .add_modifier(Push { value: 2, enabled: false })
            .add_modifier(Push { value: 3, enabled: true })
            .build()
            .unwrap();
        assert_eq!(built, vec![0, 1, 3]);
    }

    #[test]
    fn test_boxed_modifiers_follow_registered_ones() {
        let boxed: Vec<Box<dyn Modifier<Vec<u8>>>> = vec![
            Box::new(Push { value: 2, enabled: true }),
            Box::new(Push { value: 3, enabled: true }),
        ];
        let built = Builder::new(Vec::new())
            .add_modifier(Push { value: 1, enabled: true })
            .add_modifiers(boxed)
            .build()
            .unwrap();
        assert_eq!(built, vec![1, 2, 3]);
    }

    #[test]
    fn test_build_short_circuits_on_error() {
        let calls = Cell::new(0);
        let result = Builder::new(Vec::new())
            .add_modifier(Fail)
            .add_modifier(Count(&calls))
            .build();
        assert!(matches!(result, Err(BuildError::Modifier { modifier: "fail", .. })));
        assert_eq!(calls.get(), 0, "modifiers after a failure must not run");
    }
}
