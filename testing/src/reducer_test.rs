//! Given-When-Then helper for reducers.
//!
//! Reducers are synchronous; effects are only inspected, never executed. To
//! simulate what an effect would have produced, pass the resulting event as a
//! later action with [`ReducerTest::when_actions`].

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use farm_mfa_core::{effect::Effect, reducer::Reducer};

type StateAssertion<S> = Box<dyn FnOnce(&S)>;

type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers
///
/// # Example
///
/// ```ignore
/// use farm_mfa_testing::ReducerTest;
///
/// ReducerTest::new(SessionReducer::new())
///     .with_env(test_environment())
///     .given_state(session_in(UiMode::Identification))
///     .when_action(SessionAction::Submit { form })
///     .then_state(|state| assert_eq!(state.current_retries, 0))
///     .then_effects(|effects| assertions::assert_has_future_effect(effects))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add several actions, reduced in order (When)
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of the last action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, actions, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)]
    #[allow(clippy::expect_used)]
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use farm_mfa_core::effect::Effect;

    /// Assert that no effect can produce an action
    ///
    /// # Panics
    ///
    /// Panics if any effect is not `Effect::None`.
    #[allow(clippy::panic)]
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)]
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)]
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|effect| matches!(effect, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_mfa_core::reducer::{Effects, Reducer};
    use farm_mfa_core::smallvec;

    #[derive(Clone, Debug)]
    struct Attempts {
        failures: u32,
        locked: bool,
    }

    #[derive(Clone, Debug)]
    enum AttemptAction {
        Fail,
        Verify,
    }

    struct AttemptReducer;

    struct Limit(u32);

    impl Reducer for AttemptReducer {
        type State = Attempts;
        type Action = AttemptAction;
        type Environment = Limit;

        fn reduce(&self, state: &mut Attempts, action: AttemptAction, env: &Limit) -> Effects<AttemptAction> {
            match action {
                AttemptAction::Fail => {
                    state.failures += 1;
                    state.locked = state.failures >= env.0;
                    smallvec![Effect::None]
                },
                AttemptAction::Verify => {
                    smallvec![Effect::future(async { Some(AttemptAction::Fail) })]
                },
            }
        }
    }

    #[test]
    fn sequence_of_actions_accumulates_state() {
        ReducerTest::new(AttemptReducer)
            .with_env(Limit(3))
            .given_state(Attempts { failures: 0, locked: false })
            .when_actions([AttemptAction::Fail, AttemptAction::Fail, AttemptAction::Fail])
            .then_state(|state| {
                assert_eq!(state.failures, 3);
                assert!(state.locked);
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn effects_of_last_action_are_checked() {
        ReducerTest::new(AttemptReducer)
            .with_env(Limit(3))
            .given_state(Attempts { failures: 0, locked: false })
            .when_action(AttemptAction::Fail)
            .when_action(AttemptAction::Verify)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }
}
