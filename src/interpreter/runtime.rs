use crate::interpreter::ast::Clause;
use crate::interpreter::parser::{DelimitedGrammar, ScriptGrammar};
use crate::interpreter::verbs::{Dispatcher, VerbContext};
use crate::runtime::context::{AnimationContext, InteractionContext};
use crate::runtime::error::{DispatchError, DispatchResult};
use crate::runtime::events::{EventBus, RunId, ScriptEvent, ScriptEventKind};
use crate::runtime::performer::Performer;
use crate::runtime::wait::WaitOutcome;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutable state of the runner, reset at the start of each run.
#[derive(Default)]
struct RunState {
    run_id: Option<RunId>,
    is_running: bool,
    repeat: bool,
    loop_count: u32,
    cancel: CancellationToken,
    startup_run: HashSet<String>,
    completion: Vec<Clause>,
    /// Contexts the completion clauses run against on explicit stop.
    animation: AnimationContext,
    interaction: InteractionContext,
}

/// How the main loop ended.
enum LoopExit {
    /// Loop finished after `passes` full passes.
    Finished { passes: u32 },
    /// A clause failed under `stop_on_failed_command`.
    Failed,
}

/// Script runner and loop controller for one character.
///
/// At most one script runs at a time; a second `run_animation_script` while
/// one is active is rejected, not queued.
pub struct ScriptRunner {
    performer: Arc<Performer>,
    dispatcher: Arc<Dispatcher>,
    grammar: Arc<dyn ScriptGrammar>,
    state: Mutex<RunState>,
    events: EventBus,
}

impl ScriptRunner {
    /// Create a runner with the standard verb table and grammar.
    pub fn new(performer: Arc<Performer>) -> Self {
        let events = EventBus::new(performer.config().event_capacity);
        Self {
            performer,
            dispatcher: Arc::new(Dispatcher::standard()),
            grammar: Arc::new(DelimitedGrammar),
            state: Mutex::new(RunState::default()),
            events,
        }
    }

    /// Replace the verb table.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    /// Replace the script grammar.
    pub fn with_grammar(mut self, grammar: impl ScriptGrammar + 'static) -> Self {
        self.grammar = Arc::new(grammar);
        self
    }

    /// Character state the runner acts on.
    pub fn performer(&self) -> &Arc<Performer> {
        &self.performer
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.events.subscribe()
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.state.lock().is_running
    }

    /// Whether the active run repeats.
    pub fn is_repeating(&self) -> bool {
        let state = self.state.lock();
        state.is_running && state.repeat
    }

    /// Loop pass the active (or last) run reached.
    pub fn loop_count(&self) -> u32 {
        self.state.lock().loop_count
    }

    /// Deliver an external sync signal (peer `SYNC`, local event) to the
    /// wait slot. Returns whether it released the pending wait.
    pub fn signal(&self, name: &str) -> bool {
        self.performer.wait_slot().resolve(name)
    }

    /// Run `script` against the given contexts.
    ///
    /// Returns `false` when another run is active, when a clause fails under
    /// `stop_on_failed_command`, or when the run is canceled before a full
    /// pass completes.
    pub async fn run_animation_script(
        &self,
        script: &str,
        repeat: bool,
        animation: &mut AnimationContext,
        interaction: &mut InteractionContext,
    ) -> bool {
        let Some((run_id, cancel)) = self.begin(repeat, animation, interaction) else {
            warn!(animation = %animation.name, "script already running; rejecting new run");
            return false;
        };
        info!(%run_id, animation = %animation.name, repeat, "script started");
        self.events.emit(run_id, ScriptEventKind::Started, 0);

        let parsed = self.grammar.parse(script);
        if !parsed.skipped.is_empty() {
            debug!(%run_id, skipped = parsed.skipped.len(), "script had malformed clauses");
        }
        self.record_completion(run_id, parsed.completion());

        let stop_on_failed = self.performer.config().stop_on_failed_command;

        for clause in parsed.startup() {
            if cancel.is_cancelled() {
                break;
            }
            if !self.first_startup_run(run_id, clause) {
                continue;
            }
            let result = self
                .dispatch(clause, animation, interaction, 0, &cancel)
                .await;
            self.checkpoint(run_id, animation, interaction);
            if let Err(err) = result {
                if matches!(err, DispatchError::Canceled(_)) {
                    break;
                }
                warn!(%run_id, verb = %clause.verb, error = %err, "startup clause failed");
                if stop_on_failed {
                    self.finish(run_id, ScriptEventKind::Failed, 0, animation, interaction);
                    return false;
                }
            }
        }

        let main: Vec<&Clause> = parsed.main_loop().collect();
        match self
            .run_loop(run_id, &main, repeat, stop_on_failed, animation, interaction, &cancel)
            .await
        {
            LoopExit::Failed => {
                let loop_count = self.loop_count();
                self.finish(run_id, ScriptEventKind::Failed, loop_count, animation, interaction);
                false
            }
            LoopExit::Finished { passes } if passes > 0 => {
                info!(%run_id, passes, "script completed");
                self.finish(run_id, ScriptEventKind::Completed, passes, animation, interaction);
                true
            }
            LoopExit::Finished { .. } => {
                info!(%run_id, "script canceled before completing a pass");
                self.finish(run_id, ScriptEventKind::Canceled, 0, animation, interaction);
                false
            }
        }
    }

    /// Cancel the active run and fire the accumulated completion clauses
    /// once, in first-seen order. Returns `false` when there was nothing to
    /// stop.
    ///
    /// Completion clauses run against the contexts as of the last clause the
    /// run dispatched. Whatever they change (spoken text, transcript) is
    /// stored back and readable through [`ScriptRunner::last_contexts`].
    pub async fn stop_running_animation_scripts(&self) -> bool {
        let (run_id, was_running, completion, mut animation, mut interaction) = {
            let mut state = self.state.lock();
            state.cancel.cancel();
            let was_running = state.is_running;
            state.is_running = false;
            (
                state.run_id,
                was_running,
                std::mem::take(&mut state.completion),
                state.animation.clone(),
                state.interaction.clone(),
            )
        };
        self.performer.wait_slot().clear();

        if !was_running && completion.is_empty() {
            return false;
        }
        let run_id = run_id.unwrap_or_else(Uuid::nil);
        info!(%run_id, clauses = completion.len(), "stopping script");

        // The run's token is already canceled; completion clauses get a fresh one.
        let cancel = CancellationToken::new();
        for clause in &completion {
            if let Err(err) = self
                .dispatch(clause, &mut animation, &mut interaction, 0, &cancel)
                .await
            {
                warn!(%run_id, verb = %clause.verb, error = %err, "completion clause failed");
            }
        }

        let loop_count = {
            let mut state = self.state.lock();
            // Skip the write-back if a new run started meanwhile.
            if state.run_id == Some(run_id) && !state.is_running {
                state.animation = animation;
                state.interaction = interaction;
            }
            state.loop_count
        };
        self.events.emit(run_id, ScriptEventKind::Stopped, loop_count);
        true
    }

    /// Animation and interaction contexts as the last run (and its
    /// completion clauses, after a stop) left them.
    pub fn last_contexts(&self) -> (AnimationContext, InteractionContext) {
        let state = self.state.lock();
        (state.animation.clone(), state.interaction.clone())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        run_id: RunId,
        clauses: &[&Clause],
        repeat: bool,
        stop_on_failed: bool,
        animation: &mut AnimationContext,
        interaction: &mut InteractionContext,
        cancel: &CancellationToken,
    ) -> LoopExit {
        let mut passes = 0;
        let mut loop_count: u32 = 0;

        loop {
            loop_count += 1;
            if loop_count > 1 {
                // A pass of instant capability calls never suspends; give a
                // concurrent stop the chance to run.
                tokio::task::yield_now().await;
            }
            if cancel.is_cancelled() || (loop_count > 1 && !repeat) {
                break;
            }
            if loop_count > 1 {
                debug!(%run_id, loop_count, "repeating script");
                self.events.emit(run_id, ScriptEventKind::Repeating, loop_count);
            }
            self.set_loop_count(run_id, loop_count);

            let mut dispatched = 0;
            for clause in clauses {
                if cancel.is_cancelled() {
                    return LoopExit::Finished { passes };
                }
                if self.performer.wait_slot().suspend(cancel).await == WaitOutcome::Canceled {
                    return LoopExit::Finished { passes };
                }
                if !clause.fires_on_pass(loop_count) {
                    debug!(%run_id, verb = %clause.verb, loop_count, "loop limit reached; skipping");
                    continue;
                }

                dispatched += 1;
                let result = self
                    .dispatch(clause, animation, interaction, loop_count, cancel)
                    .await;
                self.checkpoint(run_id, animation, interaction);
                match result {
                    Ok(()) => {}
                    Err(DispatchError::Canceled(_)) => return LoopExit::Finished { passes },
                    Err(err) => {
                        warn!(%run_id, verb = %clause.verb, loop_count, error = %err, "clause failed");
                        if stop_on_failed {
                            return LoopExit::Failed;
                        }
                    }
                }
            }

            // Loop limits only ever shrink the pass, so an empty pass stays empty.
            if dispatched == 0 && passes > 0 {
                debug!(%run_id, loop_count, "every clause is past its loop limit");
                break;
            }
            passes += 1;
            self.events.emit(run_id, ScriptEventKind::PassComplete, loop_count);
            if dispatched == 0 {
                debug!(%run_id, "script has no main-loop clauses");
                break;
            }
        }

        LoopExit::Finished { passes }
    }

    async fn dispatch(
        &self,
        clause: &Clause,
        animation: &mut AnimationContext,
        interaction: &mut InteractionContext,
        loop_index: u32,
        cancel: &CancellationToken,
    ) -> DispatchResult<()> {
        let mut cx = VerbContext {
            performer: &self.performer,
            animation,
            interaction,
            loop_index,
            cancel,
        };
        let report = self.dispatcher.dispatch(clause, &mut cx).await?;
        if let Some(report) = report.filter(|report| !report.all_acked()) {
            // Relay failures never abort the local run.
            warn!(verb = %clause.verb, failed = report.failed.len(), "fan-out partially failed");
        }
        Ok(())
    }

    fn begin(
        &self,
        repeat: bool,
        animation: &AnimationContext,
        interaction: &InteractionContext,
    ) -> Option<(RunId, CancellationToken)> {
        let mut state = self.state.lock();
        if state.is_running {
            return None;
        }
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *state = RunState {
            run_id: Some(run_id),
            is_running: true,
            repeat,
            loop_count: 0,
            cancel: cancel.clone(),
            startup_run: HashSet::new(),
            completion: Vec::new(),
            animation: animation.clone(),
            interaction: interaction.clone(),
        };
        drop(state);
        self.performer.wait_slot().clear();
        Some((run_id, cancel))
    }

    fn record_completion<'a>(&self, run_id: RunId, clauses: impl Iterator<Item = &'a Clause>) {
        let mut state = self.state.lock();
        if state.run_id != Some(run_id) {
            return;
        }
        for clause in clauses {
            if !state.completion.iter().any(|seen| seen.text == clause.text) {
                state.completion.push(clause.clone());
            }
        }
    }

    fn first_startup_run(&self, run_id: RunId, clause: &Clause) -> bool {
        let mut state = self.state.lock();
        state.run_id == Some(run_id) && state.startup_run.insert(clause.text.clone())
    }

    /// Keep the stored contexts current so a stop sees mid-run changes.
    fn checkpoint(
        &self,
        run_id: RunId,
        animation: &AnimationContext,
        interaction: &InteractionContext,
    ) {
        let mut state = self.state.lock();
        if state.run_id == Some(run_id) && state.is_running {
            state.animation = animation.clone();
            state.interaction = interaction.clone();
        }
    }

    fn set_loop_count(&self, run_id: RunId, loop_count: u32) {
        let mut state = self.state.lock();
        if state.run_id == Some(run_id) {
            state.loop_count = loop_count;
        }
    }

    fn finish(
        &self,
        run_id: RunId,
        kind: ScriptEventKind,
        loop_index: u32,
        animation: &AnimationContext,
        interaction: &InteractionContext,
    ) {
        {
            let mut state = self.state.lock();
            // A stop followed by a new run must not be reset by the old one.
            if state.run_id == Some(run_id) {
                // After a stop the completion clauses own the stored contexts.
                if state.is_running {
                    state.animation = animation.clone();
                    state.interaction = interaction.clone();
                }
                state.is_running = false;
                state.repeat = false;
            }
        }
        self.events.emit(run_id, kind, loop_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capabilities, CapabilityCall, RecordingCapabilities};
    use crate::runtime::EngineConfig;
    use std::time::Duration;

    fn setup(config: EngineConfig) -> (Arc<ScriptRunner>, Arc<RecordingCapabilities>) {
        let recorder = Arc::new(RecordingCapabilities::new());
        let performer = Performer::new(config, Capabilities::recording(recorder.clone()));
        (Arc::new(ScriptRunner::new(Arc::new(performer))), recorder)
    }

    async fn run(runner: &ScriptRunner, script: &str, repeat: bool) -> bool {
        let mut animation = AnimationContext::default();
        let mut interaction = InteractionContext::default();
        runner
            .run_animation_script(script, repeat, &mut animation, &mut interaction)
            .await
    }

    #[tokio::test]
    async fn local_clauses_run_once_in_order() {
        let (runner, recorder) = setup(EngineConfig::default());
        assert!(run(&runner, "LIGHT:on;STOP;HALT", false).await);
        assert_eq!(
            recorder.calls(),
            vec![
                CapabilityCall::Flashlight { on: true },
                CapabilityCall::Stop,
                CapabilityCall::Halt,
            ]
        );
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn failures_continue_unless_configured_to_stop() {
        let (runner, recorder) = setup(EngineConfig::default());
        assert!(run(&runner, "DANCE:1;STOP", false).await);
        assert_eq!(recorder.take_calls(), vec![CapabilityCall::Stop]);

        let (runner, recorder) = setup(EngineConfig {
            stop_on_failed_command: true,
            ..EngineConfig::default()
        });
        let mut events = runner.subscribe();
        assert!(!run(&runner, "DANCE:1;STOP", false).await);
        assert!(recorder.calls().is_empty());

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.kind)
            .collect();
        assert_eq!(kinds, vec![ScriptEventKind::Started, ScriptEventKind::Failed]);
    }

    #[tokio::test]
    async fn failing_startup_clause_aborts_when_configured() {
        let (runner, recorder) = setup(EngineConfig {
            stop_on_failed_command: true,
            ..EngineConfig::default()
        });
        assert!(!run(&runner, "*HEAD:1,2;STOP", false).await);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn loop_limits_cap_repeats() {
        let (runner, recorder) = setup(EngineConfig::default());
        let (stopper, calls) = (runner.clone(), recorder.clone());
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if calls.calls().iter().filter(|c| **c == CapabilityCall::Halt).count() >= 3 {
                    stopper.stop_running_animation_scripts().await;
                    break;
                }
            }
        });

        assert!(run(&runner, "STOP{2};HALT;PAUSE:10", true).await);
        let stops = recorder
            .calls()
            .iter()
            .filter(|c| **c == CapabilityCall::Stop)
            .count();
        assert_eq!(stops, 2);
    }

    #[tokio::test]
    async fn duplicate_completion_clauses_fire_once() {
        let (runner, recorder) = setup(EngineConfig::default());
        assert!(run(&runner, "#STOP;#STOP;#HALT", false).await);
        assert!(recorder.calls().is_empty());

        assert!(runner.stop_running_animation_scripts().await);
        assert_eq!(
            recorder.take_calls(),
            vec![CapabilityCall::Stop, CapabilityCall::Halt]
        );
        assert!(!runner.stop_running_animation_scripts().await);
    }

    #[tokio::test]
    async fn clause_with_both_markers_skips_the_main_loop() {
        let (runner, recorder) = setup(EngineConfig::default());
        assert!(run(&runner, "*#LIGHT:on;HALT", false).await);
        assert_eq!(
            recorder.take_calls(),
            vec![CapabilityCall::Flashlight { on: true }, CapabilityCall::Halt]
        );
        runner.stop_running_animation_scripts().await;
        assert_eq!(
            recorder.take_calls(),
            vec![CapabilityCall::Flashlight { on: true }]
        );
    }
}
