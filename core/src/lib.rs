//! # Farm MFA Core
//!
//! Core traits and types shared by the authentication adapter, the replay
//! subsystem and the farm service.
//!
//! ## Core Concepts
//!
//! - **State**: the per-request session data a reducer mutates
//! - **Action**: every input to a reducer (host commands and effect results)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of I/O to perform, executed by the runtime driver
//! - **Environment**: injected collaborators (providers, stores, clock)
//!
//! Handlers never perform I/O themselves. They describe it as an [`effect::Effect`]
//! whose result is fed back as another action, so the whole decision logic can
//! be exercised synchronously in tests.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the trait every state machine implements.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects returned by a single reduction.
    ///
    /// Most reductions yield zero or one effect; four inline slots avoid a heap
    /// allocation in the common case.
    pub type Effects<Action> = SmallVec<[Effect<Action>; 4]>;

    /// The Reducer trait - core abstraction for decision logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SessionReducer {
    ///     type State = SessionState;
    ///     type Action = SessionAction;
    ///     type Environment = AdapterEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SessionState,
    ///         action: SessionAction,
    ///         env: &AdapterEnvironment,
    ///     ) -> Effects<SessionAction> {
    ///         match action {
    ///             SessionAction::Submit { form } => self.dispatch(state, form, env),
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Validates the action, updates state in place and returns the
        /// effect descriptions the runtime should execute.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values, not execution.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should
    /// happen, returned from reducers and executed by the runtime driver.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Box an async block into a [`Effect::Future`].
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }

        /// Returns `true` when executing this effect can never yield an action.
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Logon dates, delivery windows and replay expiry are all computed from
    /// a `Clock`, never from `Utc::now()` directly.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn none_effect_is_none() {
        assert!(Effect::<u8>::None.is_none());
        assert_eq!(format!("{:?}", Effect::<u8>::None), "Effect::None");
    }

    #[test]
    fn future_effect_is_not_none() {
        let effect: Effect<u8> = Effect::future(async { Some(1) });
        assert!(!effect.is_none());
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
