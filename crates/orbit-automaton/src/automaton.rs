//! Online video automaton.
//!
//! The monitor consumes fused frames in strictly increasing `frame_idx` order
//! and reports when the accumulated trace of the current epoch satisfies the
//! specification. The caller resets it on acceptance to scan for the next
//! occurrence.
//!
//! # State
//!
//! The specification is compiled into one tagged state per AST node kind:
//!
//! | Node | State |
//! |------|-------|
//! | `Prop`, `AND`, `OR`, `NOT` | none, evaluated per admitted frame |
//! | top-level boolean | `accepted` flag |
//! | top-level `UNTIL(L, R)` | `UntilPhase` |
//!
//! `UNTIL(L, R)` holds while every admitted frame of the current prefix
//! satisfies `L`. A frame satisfying both extends the prefix, a frame with
//! `R` but no longer `L` accepts, and a frame with neither breaks the prefix.
//! The match therefore covers the whole `L` stretch preceding `R`.

use orbit_models::{FrameIndex, VideoFrame};
use tracing::{debug, trace};

use crate::error::{AutomatonError, AutomatonResult};
use crate::spec::{Formula, Specification};

/// Monitor construction options.
#[derive(Debug, Clone)]
pub struct AutomatonConfig {
    /// Seed an empty `L` prefix, so `R` alone can accept.
    pub include_initial_state: bool,
    /// A proposition is true on a frame iff its probability is strictly above this.
    pub detection_threshold: f64,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            include_initial_state: true,
            detection_threshold: 0.5,
        }
    }
}

/// Stateless boolean condition over one frame's valuation.
#[derive(Debug, Clone)]
enum Condition {
    Prop(String),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Compile a boolean subformula. `UNTIL` never appears below the root of a
    /// validated specification.
    fn compile(formula: &Formula) -> Self {
        match formula {
            Formula::Prop(name) => Condition::Prop(name.clone()),
            Formula::And(l, r) => {
                Condition::And(Box::new(Self::compile(l)), Box::new(Self::compile(r)))
            }
            Formula::Or(l, r) => {
                Condition::Or(Box::new(Self::compile(l)), Box::new(Self::compile(r)))
            }
            Formula::Not(x) => Condition::Not(Box::new(Self::compile(x))),
            Formula::Until(l, _) => Self::compile(l),
        }
    }

    fn eval(&self, frame: &VideoFrame, threshold: f64) -> bool {
        match self {
            Condition::Prop(name) => frame.is_active(name, threshold),
            Condition::And(l, r) => l.eval(frame, threshold) && r.eval(frame, threshold),
            Condition::Or(l, r) => l.eval(frame, threshold) || r.eval(frame, threshold),
            Condition::Not(x) => !x.eval(frame, threshold),
        }
    }
}

/// Progress of the top-level `UNTIL`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UntilPhase {
    /// No `L` prefix yet.
    Idle,
    /// Every frame since `prefix_start` satisfied `L`. An empty prefix
    /// (`prefix_start == None`) is the seeded initial state.
    Holding {
        prefix_start: Option<FrameIndex>,
        prefix_len: usize,
        right_seen: bool,
    },
    Accepted { at: FrameIndex },
}

#[derive(Debug, Clone)]
enum MonitorState {
    /// Specification without `UNTIL`: accepts on the first satisfying frame.
    Invariant {
        condition: Condition,
        accepted_at: Option<FrameIndex>,
    },
    Until {
        left: Condition,
        right: Condition,
        phase: UntilPhase,
    },
}

impl MonitorState {
    fn initial(spec: &Specification, include_initial_state: bool) -> Self {
        match spec.formula() {
            Formula::Until(l, r) => MonitorState::Until {
                left: Condition::compile(l),
                right: Condition::compile(r),
                phase: initial_until_phase(include_initial_state),
            },
            other => MonitorState::Invariant {
                condition: Condition::compile(other),
                accepted_at: None,
            },
        }
    }

    fn accepted_at(&self) -> Option<FrameIndex> {
        match self {
            MonitorState::Invariant { accepted_at, .. } => *accepted_at,
            MonitorState::Until {
                phase: UntilPhase::Accepted { at },
                ..
            } => Some(*at),
            MonitorState::Until { .. } => None,
        }
    }

    /// Advance on one admitted frame.
    fn step(&mut self, frame: &VideoFrame, threshold: f64, include_initial_state: bool) {
        let idx = frame.frame_idx;
        match self {
            MonitorState::Invariant {
                condition,
                accepted_at,
            } => {
                if accepted_at.is_none() && condition.eval(frame, threshold) {
                    *accepted_at = Some(idx);
                }
            }
            MonitorState::Until { left, right, phase } => {
                let l = left.eval(frame, threshold);
                let r = right.eval(frame, threshold);
                trace!(frame = idx, left = l, right = r, "until step");

                let next = match (phase.clone(), l, r) {
                    (UntilPhase::Accepted { at }, _, _) => UntilPhase::Accepted { at },
                    (UntilPhase::Idle, true, _) => UntilPhase::Holding {
                        prefix_start: Some(idx),
                        prefix_len: 1,
                        right_seen: r,
                    },
                    (UntilPhase::Idle, false, _) => UntilPhase::Idle,
                    (
                        UntilPhase::Holding {
                            prefix_start,
                            prefix_len,
                            right_seen,
                        },
                        false,
                        r,
                    ) => {
                        if r || right_seen {
                            debug!(frame = idx, ?prefix_start, prefix_len, "until satisfied");
                            UntilPhase::Accepted { at: idx }
                        } else {
                            trace!(frame = idx, prefix_len, "until prefix broken");
                            initial_until_phase(include_initial_state)
                        }
                    }
                    (
                        UntilPhase::Holding {
                            prefix_start,
                            prefix_len,
                            right_seen,
                        },
                        true,
                        _,
                    ) => UntilPhase::Holding {
                        prefix_start: prefix_start.or(Some(idx)),
                        prefix_len: prefix_len + 1,
                        right_seen: right_seen || r,
                    },
                };
                *phase = next;
            }
        }
    }
}

fn initial_until_phase(include_initial_state: bool) -> UntilPhase {
    if include_initial_state {
        UntilPhase::Holding {
            prefix_start: None,
            prefix_len: 0,
            right_seen: false,
        }
    } else {
        UntilPhase::Idle
    }
}

/// Incremental monitor for one specification.
///
/// One instance per search run; it is not shared across runs.
#[derive(Debug, Clone)]
pub struct VideoAutomaton {
    spec: Specification,
    config: AutomatonConfig,
    state: MonitorState,
    /// Admitted frames of the current epoch
    trace: Vec<FrameIndex>,
    /// Last admitted frame over the whole stream (survives `reset`)
    last_admitted: Option<FrameIndex>,
    /// Set by the `add_frame` that reached acceptance, consumed by `check_automaton`
    newly_accepted: bool,
}

impl VideoAutomaton {
    /// Build a monitor in its initial configuration.
    pub fn new(spec: Specification, config: AutomatonConfig) -> Self {
        let state = MonitorState::initial(&spec, config.include_initial_state);
        Self {
            spec,
            config,
            state,
            trace: Vec::new(),
            last_admitted: None,
            newly_accepted: false,
        }
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    pub fn config(&self) -> &AutomatonConfig {
        &self.config
    }

    /// Gate: true iff the frame activates at least one proposition of the
    /// specification.
    pub fn validate_frame(&self, frame: &VideoFrame) -> bool {
        frame
            .thresholded_detected_objects(self.config.detection_threshold)
            .keys()
            .any(|prop| self.spec.contains(prop))
    }

    /// Admit a validated frame into the current epoch.
    pub fn add_frame(&mut self, frame: &VideoFrame) -> AutomatonResult<()> {
        if let Some(previous) = self.last_admitted {
            if frame.frame_idx <= previous {
                return Err(AutomatonError::OutOfOrder {
                    previous,
                    got: frame.frame_idx,
                });
            }
        }
        if let Some(at) = self.state.accepted_at() {
            return Err(AutomatonError::EpochAccepted(at));
        }

        self.trace.push(frame.frame_idx);
        self.last_admitted = Some(frame.frame_idx);
        self.state.step(
            frame,
            self.config.detection_threshold,
            self.config.include_initial_state,
        );

        if let Some(at) = self.state.accepted_at() {
            debug!(frame = at, epoch_len = self.trace.len(), "specification satisfied");
            self.newly_accepted = true;
        }
        Ok(())
    }

    /// End of stream. A pending `UNTIL` whose `R` already held inside the
    /// current prefix accepts at the last admitted frame. Returns true iff
    /// this newly reached acceptance.
    pub fn finish(&mut self) -> bool {
        let (MonitorState::Until { phase, .. }, Some(last)) = (&mut self.state, self.last_admitted)
        else {
            return false;
        };
        match phase {
            UntilPhase::Holding {
                prefix_start,
                prefix_len,
                right_seen: true,
            } if !self.trace.is_empty() => {
                debug!(
                    frame = last,
                    ?prefix_start,
                    prefix_len = *prefix_len,
                    "until satisfied at end of stream"
                );
                *phase = UntilPhase::Accepted { at: last };
                true
            }
            _ => false,
        }
    }

    /// True exactly once, after the `add_frame` that newly reached acceptance.
    pub fn check_automaton(&mut self) -> bool {
        std::mem::take(&mut self.newly_accepted)
    }

    /// Discard the epoch trace and return to the initial configuration.
    pub fn reset(&mut self) {
        self.state = MonitorState::initial(&self.spec, self.config.include_initial_state);
        self.trace.clear();
        self.newly_accepted = false;
    }

    /// Admitted frames of the current epoch.
    pub fn trace(&self) -> &[FrameIndex] {
        &self.trace
    }

    /// Frame at which the current epoch accepted, if it has.
    pub fn accepted_at(&self) -> Option<FrameIndex> {
        self.state.accepted_at()
    }
}
