//! Care-pathway log with an explicit pointer to the step in progress.
//!
//! Steps before the current one are `completed`, steps after it are `pending`,
//! and only the current step is `processing`. Advancing never rewrites a
//! completed step: moving back to an earlier status opens a new step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

labelled_enum! {
    pub enum StepStatus {
        Completed => "completed",
        Processing => "processing",
        Pending => "pending",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub step: String,
    pub time: Option<DateTime<Utc>>,
    pub by: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TimelineStep {
    pub fn pending(step: impl Into<String>, by: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            time: None,
            by: by.into(),
            status: StepStatus::Pending,
            details: None,
        }
    }

    fn complete(&mut self, at: DateTime<Utc>) {
        self.status = StepStatus::Completed;
        self.time.get_or_insert(at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTimeline")]
pub struct Timeline {
    #[serde(rename = "timeline", default)]
    steps: Vec<TimelineStep>,
    #[serde(rename = "currentStepIndex", default)]
    current: Option<usize>,
}

/// Stored shape. Older records carry a `processing` step but no index.
#[derive(Deserialize)]
struct RawTimeline {
    #[serde(rename = "timeline", default)]
    steps: Vec<TimelineStep>,
    #[serde(rename = "currentStepIndex", default)]
    current: Option<usize>,
}

impl From<RawTimeline> for Timeline {
    fn from(raw: RawTimeline) -> Self {
        // An index past the end is dropped; the last processing step stands in.
        let current = raw.current.filter(|&i| i < raw.steps.len()).or_else(|| {
            raw.steps
                .iter()
                .rposition(|s| s.status == StepStatus::Processing)
        });
        Self {
            steps: raw.steps,
            current,
        }
    }
}

impl Timeline {
    /// A timeline holding one step already in progress.
    pub fn seeded(step: impl Into<String>, by: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            steps: vec![TimelineStep {
                step: step.into(),
                time: Some(at),
                by: by.into(),
                status: StepStatus::Processing,
                details: None,
            }],
            current: Some(0),
        }
    }

    pub fn steps(&self) -> &[TimelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&TimelineStep> {
        self.current.and_then(|i| self.steps.get(i))
    }

    /// Queue a future step at the end of the plan.
    pub fn plan(&mut self, step: TimelineStep) {
        self.steps.push(TimelineStep {
            status: StepStatus::Pending,
            time: None,
            ..step
        });
    }

    /// Index where the next step goes: right after the current one, or at the
    /// first pending step when nothing is in progress.
    fn next_slot(&self) -> usize {
        match self.current.filter(|&i| i < self.steps.len()) {
            Some(i) => i + 1,
            None => self
                .steps
                .iter()
                .position(|s| s.status == StepStatus::Pending)
                .unwrap_or(self.steps.len()),
        }
    }

    /// Complete the current step and make `step` the one in progress.
    ///
    /// A planned pending step with the same name is reused, completing any
    /// planned steps skipped on the way; otherwise a new step is inserted right
    /// after the current one.
    pub fn advance_to(
        &mut self,
        step: &str,
        by: &str,
        at: DateTime<Utc>,
        details: Option<String>,
    ) -> &TimelineStep {
        let idx = self.enter(step, by, at);
        let current = &mut self.steps[idx];
        current.status = StepStatus::Processing;
        current.time = Some(at);
        current.by = by.to_string();
        if details.is_some() {
            current.details = details;
        }
        self.current = Some(idx);
        current
    }

    /// Complete the current step and record `step` as finished, leaving nothing
    /// in progress. A planned `step` is reused like in `advance_to`.
    pub fn close(&mut self, step: &str, by: &str, at: DateTime<Utc>) {
        let idx = self.enter(step, by, at);
        let closed = &mut self.steps[idx];
        closed.status = StepStatus::Completed;
        closed.time = Some(at);
        closed.by = by.to_string();
        self.current = None;
    }

    /// Completes the current step and returns the index of the slot for `step`:
    /// the first planned pending step with that name, completing the planned
    /// steps skipped on the way, or a fresh step right after the current one.
    fn enter(&mut self, step: &str, by: &str, at: DateTime<Utc>) -> usize {
        let slot = self.next_slot();
        if let Some(current) = self.current.take().and_then(|i| self.steps.get_mut(i)) {
            current.complete(at);
        }

        let planned = self.steps[slot..]
            .iter()
            .position(|s| s.status == StepStatus::Pending && s.step == step)
            .map(|offset| slot + offset);

        match planned {
            Some(idx) => {
                for skipped in &mut self.steps[slot..idx] {
                    skipped.complete(at);
                }
                idx
            }
            None => {
                self.steps.insert(slot, TimelineStep::pending(step, by));
                slot
            }
        }
    }

    /// Time the first step named `step` was entered.
    pub fn entered_at(&self, step: &str) -> Option<DateTime<Utc>> {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .find(|s| s.step == step)
            .and_then(|s| s.time)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.steps.first().and_then(|s| s.time)
    }

    /// Checks the ordering invariants: one processing step at most, completed
    /// steps before it, pending steps after it, and non-decreasing times.
    pub fn is_consistent(&self) -> bool {
        let processing: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == StepStatus::Processing)
            .map(|(i, _)| i)
            .collect();

        let shape_ok = match self.current {
            Some(i) if i < self.steps.len() => {
                processing == [i]
                    && self.steps[..i].iter().all(|s| s.status == StepStatus::Completed)
                    && self.steps[i + 1..].iter().all(|s| s.status == StepStatus::Pending)
            }
            Some(_) => false,
            None => {
                processing.is_empty()
                    && !self.steps.windows(2).any(|w| {
                        w[0].status == StepStatus::Pending && w[1].status == StepStatus::Completed
                    })
            }
        };

        let times: Vec<DateTime<Utc>> = self
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .filter_map(|s| s.time)
            .collect();
        let ordered = times.windows(2).all(|w| w[0] <= w[1]);

        shape_ok && ordered
    }
}
