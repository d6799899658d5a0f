//! # Farm MFA Runtime
//!
//! Executes the effects returned by reducers and feeds the resulting actions
//! back until the reducer has nothing left to do.
//!
//! Authentication requests are short-lived: the host hands the adapter one
//! request, the adapter must answer it, and nothing may keep running after the
//! answer has been produced. The [`Driver`] therefore runs a reducer to
//! quiescence inside the caller's task instead of spawning long-lived effects.
//!
//! ## Example
//!
//! ```ignore
//! use farm_mfa_runtime::Driver;
//!
//! let driver = Driver::new(SessionReducer::new(), environment);
//! let report = driver.run(&mut session, SessionAction::Begin { options_requested: false }).await?;
//! assert!(report.actions_processed >= 1);
//! ```

use farm_mfa_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::time::Instant;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the driver
pub mod error {
    use thiserror::Error;

    /// Errors that can occur while driving a reducer
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum DriverError {
        /// The reducer kept producing follow-up actions past the configured limit.
        ///
        /// This indicates a transition cycle in the state machine.
        #[error("Reducer did not settle after {0} actions")]
        StepLimitExceeded(usize),
    }
}

pub use error::DriverError;

/// Driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Maximum number of actions reduced for one inbound action
    pub max_actions: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_actions: 64 }
    }
}

impl DriverConfig {
    /// Create a configuration with the given action limit.
    #[must_use]
    pub const fn new(max_actions: usize) -> Self {
        Self { max_actions }
    }
}

/// Outcome of one [`Driver::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverReport {
    /// Actions reduced, including the inbound one
    pub actions_processed: usize,
}

/// Runs a reducer and its effects until no more actions are produced.
pub struct Driver<R: Reducer> {
    reducer: R,
    environment: R::Environment,
    config: DriverConfig,
}

impl<R> Driver<R>
where
    R: Reducer,
    R::Action: Send + std::fmt::Debug + 'static,
{
    /// Create a driver with the default configuration.
    pub fn new(reducer: R, environment: R::Environment) -> Self {
        Self {
            reducer,
            environment,
            config: DriverConfig::default(),
        }
    }

    /// Override the driver configuration.
    #[must_use]
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Access the environment the reducer runs with.
    pub const fn environment(&self) -> &R::Environment {
        &self.environment
    }

    /// Reduce `action` against `state`, execute every effect and feed the
    /// produced actions back in FIFO order until the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::StepLimitExceeded`] when more than
    /// `max_actions` actions are reduced. The state reflects every action
    /// reduced before the limit was hit.
    #[tracing::instrument(skip(self, state, action), name = "driver_run")]
    pub async fn run(
        &self,
        state: &mut R::State,
        action: R::Action,
    ) -> Result<DriverReport, DriverError> {
        let mut queue = VecDeque::from([action]);
        let mut processed = 0usize;

        while let Some(action) = queue.pop_front() {
            if processed >= self.config.max_actions {
                tracing::error!(limit = self.config.max_actions, "Reducer did not settle");
                metrics::DriverMetrics::record_step_limit();
                return Err(DriverError::StepLimitExceeded(self.config.max_actions));
            }
            processed += 1;

            tracing::trace!(?action, "Reducing action");
            let start = Instant::now();
            let effects = self.reducer.reduce(state, action, &self.environment);
            metrics::DriverMetrics::record_action(start.elapsed());

            for effect in effects {
                queue.extend(execute(effect).await);
            }
        }

        tracing::debug!(actions = processed, "Reducer settled");
        Ok(DriverReport {
            actions_processed: processed,
        })
    }
}

/// Execute one effect and return the action it yields, if any.
pub async fn execute<A>(effect: Effect<A>) -> Option<A> {
    match effect {
        Effect::None => None,
        Effect::Future(fut) => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_mfa_core::reducer::Effects;
    use farm_mfa_core::smallvec;

    #[derive(Debug, Default)]
    struct Counter {
        value: u32,
        trail: Vec<&'static str>,
    }

    #[derive(Debug, Clone)]
    enum CounterAction {
        Start,
        Step(&'static str),
        Loop,
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Counter;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(&self, state: &mut Counter, action: CounterAction, _env: &()) -> Effects<CounterAction> {
            match action {
                CounterAction::Start => smallvec![
                    Effect::future(async { Some(CounterAction::Step("first")) }),
                    Effect::future(async { None }),
                    Effect::None,
                    Effect::future(async { Some(CounterAction::Step("second")) }),
                ],
                CounterAction::Step(name) => {
                    state.value += 1;
                    state.trail.push(name);
                    smallvec![Effect::None]
                },
                CounterAction::Loop => {
                    state.value += 1;
                    smallvec![Effect::future(async { Some(CounterAction::Loop) })]
                },
            }
        }
    }

    #[tokio::test]
    async fn runs_effects_until_settled() {
        let driver = Driver::new(CounterReducer, ());
        let mut state = Counter::default();

        let report = driver.run(&mut state, CounterAction::Start).await;

        assert_eq!(report, Ok(DriverReport { actions_processed: 3 }));
        assert_eq!(state.value, 2);
        assert_eq!(state.trail, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn stops_runaway_reducers() {
        let driver = Driver::new(CounterReducer, ()).with_config(DriverConfig::new(5));
        let mut state = Counter::default();

        let result = driver.run(&mut state, CounterAction::Loop).await;

        assert_eq!(result, Err(DriverError::StepLimitExceeded(5)));
        assert_eq!(state.value, 5);
    }
}
